//! Domain layer for the storefront.
//!
//! This crate holds the plain data model and the rules that do not need I/O:
//! - Catalog products and variants, with price and sale-price validation
//! - Cart lines submitted at checkout
//! - Orders with prices frozen at placement time
//! - Reservation planning: validating a cart against loaded products

pub mod cart;
pub mod catalog;
pub mod error;
pub mod order;
pub mod reservation;
pub mod value_objects;

pub use cart::CartLine;
pub use catalog::{CatalogError, Product, Variant, VariantAttributes};
pub use error::DomainError;
pub use order::{
    Contact, GuestIdentity, Order, OrderError, OrderLine, OrderOwner, PaymentResult,
    RegisteredUser,
};
pub use reservation::{ReservationError, ReservationLine, ReservationPlan, plan_reservation};
pub use value_objects::{InvalidAmount, Money, PaymentMethod, ShippingAddress, UnknownPaymentMethod};
