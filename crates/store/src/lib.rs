//! Storage for the storefront: catalog, orders and the saga log.
//!
//! Each concern is a trait so the order saga can run against PostgreSQL in
//! production and against [`InMemoryStore`] in tests.

pub mod catalog;
pub mod error;
pub mod memory;
pub mod orders;
pub mod postgres;
pub mod query;
pub mod record;
pub mod saga_log;

pub use catalog::CatalogStore;
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use orders::OrderStore;
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use record::{SagaRecord, Version};
pub use saga_log::SagaLog;

/// Everything the order saga needs from storage.
pub trait Store: CatalogStore + OrderStore + SagaLog + Clone + 'static {}

impl<T: CatalogStore + OrderStore + SagaLog + Clone + 'static> Store for T {}
