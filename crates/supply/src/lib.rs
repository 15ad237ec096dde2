//! Client for the secondary supply-system API.

pub mod client;

pub use client::{
    NewSupplyOrder, SupplyClient, SupplyError, SupplyLocation, SupplyOrderItem, SupplyProduct,
};
