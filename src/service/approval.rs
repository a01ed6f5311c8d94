use crate::db::{InvoiceStore, PersistenceError};
use crate::models::{ApprovalAction, Status, StatusTransition};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Missing required parameters: invoice_id and action")]
    MissingParameters,

    #[error("Invalid invoice_id: {0}")]
    InvalidInvoiceId(String),

    #[error("Invalid action '{0}'. Must be 'approve' or 'reject'")]
    InvalidAction(String),

    #[error("Invoice {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// 审批确认信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalReceipt {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub vendor_name: String,
    pub amount: Option<BigDecimal>,
    pub action: ApprovalAction,
    pub previous_status: Status,
    pub new_status: Status,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalReceipt {
    fn new(action: ApprovalAction, transition: StatusTransition) -> Self {
        Self {
            invoice_id: transition.invoice_id,
            invoice_number: transition.invoice_number,
            vendor_name: transition.vendor_name,
            amount: transition.total_amount,
            action,
            previous_status: transition.previous_status,
            new_status: transition.new_status,
            decided_at: transition.processed_at,
        }
    }
}

/// 人工审批：approve / reject 单张发票
pub struct ApprovalService {
    store: Arc<dyn InvoiceStore>,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    /// 原始请求参数入口
    pub async fn apply(
        &self,
        invoice_id: Option<&str>,
        action: Option<&str>,
    ) -> Result<ApprovalReceipt, ApprovalError> {
        let (Some(raw_id), Some(raw_action)) = (non_blank(invoice_id), non_blank(action)) else {
            return Err(ApprovalError::MissingParameters);
        };

        let invoice_id: i64 = raw_id
            .parse()
            .map_err(|_| ApprovalError::InvalidInvoiceId(raw_id.to_string()))?;
        let action: ApprovalAction = raw_action
            .parse()
            .map_err(|_| ApprovalError::InvalidAction(raw_action.to_string()))?;

        self.decide(invoice_id, action).await
    }

    pub async fn decide(&self, invoice_id: i64, action: ApprovalAction) -> Result<ApprovalReceipt, ApprovalError> {
        let transition = self
            .store
            .transition_status(invoice_id, action.target_status(), Utc::now())
            .await?
            .ok_or(ApprovalError::NotFound(invoice_id))?;

        // 不限制前置状态，重复审批只记录
        if transition.previous_status != Status::PendingReview {
            tracing::warn!(
                "Invoice {} was {} before {}; applying anyway",
                invoice_id,
                transition.previous_status,
                action.as_str()
            );
        }

        tracing::info!(
            "✓ Invoice {} ({}) {} → {}",
            invoice_id,
            transition.invoice_number,
            transition.previous_status,
            transition.new_status
        );

        Ok(ApprovalReceipt::new(action, transition))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryInvoiceStore;

    fn service() -> ApprovalService {
        ApprovalService::new(Arc::new(MemoryInvoiceStore::new()))
    }

    #[tokio::test]
    async fn rejects_missing_parameters() {
        let svc = service();
        assert!(matches!(svc.apply(None, Some("approve")).await, Err(ApprovalError::MissingParameters)));
        assert!(matches!(svc.apply(Some("1"), Some("  ")).await, Err(ApprovalError::MissingParameters)));
    }

    #[tokio::test]
    async fn rejects_malformed_parameters() {
        let svc = service();
        assert!(matches!(
            svc.apply(Some("abc"), Some("approve")).await,
            Err(ApprovalError::InvalidInvoiceId(id)) if id == "abc"
        ));
        assert!(matches!(
            svc.apply(Some("1"), Some("escalate")).await,
            Err(ApprovalError::InvalidAction(a)) if a == "escalate"
        ));
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let svc = service();
        assert!(matches!(svc.apply(Some("99"), Some("reject")).await, Err(ApprovalError::NotFound(99))));
    }
}
