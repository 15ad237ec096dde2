pub mod client;

pub use client::{
    NewOrder, NewOrderDiscount, NewOrderItem, NewOrderPayment, OrderSummary, Product, RevelClient,
    RevelError,
};
