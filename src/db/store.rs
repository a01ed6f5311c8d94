use crate::models::{
    InvoiceDetail, InvoiceFilter, InvoiceRecord, InvoiceSummary, PersistedInvoice, Status,
    StatusTransition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 同一供应商下发票号重复时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// 拒绝并返回 DuplicateInvoice
    #[default]
    Reject,
    /// 覆盖已有发票并重建明细
    Update,
    /// 保留已有发票，不写入新数据
    Ignore,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("invoice {invoice_number} already exists for vendor {vendor_name}")]
    DuplicateInvoice {
        invoice_number: String,
        vendor_name: String,
    },

    #[error("record has no {0}; cannot persist an invoice without it")]
    MissingKey(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl PersistenceError {
    /// 重复发票属于终态失败，不应重试
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            PersistenceError::DuplicateInvoice { .. } | PersistenceError::MissingKey(_)
        )
    }
}

/// 发票持久化接口
///
/// `persist` 在一个事务内写入 vendor / customer / invoice / 明细 / 银行信息，
/// 任一步失败整体回滚。
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn persist(
        &self,
        record: &InvoiceRecord,
        status: Status,
        policy: ConflictPolicy,
    ) -> Result<PersistedInvoice, PersistenceError>;

    async fn find_invoice(&self, invoice_id: i64)
        -> Result<Option<InvoiceSummary>, PersistenceError>;

    async fn invoice_detail(&self, invoice_id: i64)
        -> Result<Option<InvoiceDetail>, PersistenceError>;

    /// 登记簿：按 processed_at 倒序
    async fn list_invoices(&self, filter: &InvoiceFilter)
        -> Result<Vec<InvoiceSummary>, PersistenceError>;

    /// 单行更新状态与处理时间；发票不存在时返回 None
    async fn transition_status(
        &self,
        invoice_id: i64,
        status: Status,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, PersistenceError>;
}
