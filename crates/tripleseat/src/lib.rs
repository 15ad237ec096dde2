pub mod client;

pub use client::{
    EventLineItem, EventRecord, InvoiceSummary, TripleseatClient, TripleseatError,
};
