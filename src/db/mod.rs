pub mod memory;
pub mod pool;
pub mod postgres;
pub mod queries;
pub mod store;

pub use memory::{CustomerRow, MemoryInvoiceStore, TableCounts, VendorRow};
pub use pool::{apply_schema, create_pool};
pub use postgres::{write_invoice, PgInvoiceStore};
pub use store::{ConflictPolicy, InvoiceStore, PersistenceError};
