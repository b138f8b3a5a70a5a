//! Route handlers, one module per resource.

pub mod guest;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
