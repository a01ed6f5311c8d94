use crate::db::{InvoiceStore, PersistenceError};
use crate::models::{InvoiceDetail, InvoiceFilter, InvoiceSummary};
use bigdecimal::BigDecimal;
use std::sync::Arc;

/// 登记簿查询上限
pub const MAX_LIMIT: i64 = 1000;

const CSV_HEADER: [&str; 6] = [
    "invoice_id",
    "invoice_number",
    "vendor_name",
    "total_amount",
    "status",
    "processed_at",
];

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv export failed: {0}")]
    Buffer(String),
}

/// 发票登记簿 (只读视图)
pub struct InvoiceRegister {
    store: Arc<dyn InvoiceStore>,
}

impl InvoiceRegister {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    pub async fn recent(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceSummary>, PersistenceError> {
        let filter = InvoiceFilter {
            status: filter.status,
            limit: filter.limit.clamp(1, MAX_LIMIT),
        };
        self.store.list_invoices(&filter).await
    }

    pub async fn detail(&self, invoice_id: i64) -> Result<Option<InvoiceDetail>, PersistenceError> {
        self.store.invoice_detail(invoice_id).await
    }

    pub async fn export_csv(&self, filter: &InvoiceFilter) -> Result<String, RegisterError> {
        let rows = self.recent(filter).await?;
        write_csv(&rows)
    }
}

/// 将 Option<BigDecimal> 转换为 CSV 字符串
fn option_to_csv(val: &Option<BigDecimal>) -> String {
    val.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

pub fn write_csv(rows: &[InvoiceSummary]) -> Result<String, RegisterError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for row in rows {
        writer.write_record(&[
            row.invoice_id.to_string(),
            row.invoice_number.clone(),
            row.vendor_name.clone(),
            option_to_csv(&row.total_amount),
            row.status.to_string(),
            row.processed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| RegisterError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| RegisterError::Buffer(e.to_string()))
}
