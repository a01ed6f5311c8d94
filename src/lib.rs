pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod service;
pub mod storage;

pub use config::AppConfig;
pub use db::{create_pool, InvoiceStore, MemoryInvoiceStore, PgInvoiceStore};
pub use service::{ApprovalService, InvoicePipeline};
pub use storage::{FilesystemObjectStore, MemoryObjectStore, ObjectStore};
