use crate::models::{format_money, ApprovalAction, Classification, InvoiceRecord, ReviewReason, Status};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum NotificationDispatchError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification endpoint responded with status {0}")]
    Rejected(u16),
}

/// 审批请求消息
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub vendor_name: String,
    pub amount: BigDecimal,
    pub approve_url: Url,
    pub reject_url: Url,
    pub subject: String,
    pub message: String,
}

/// 通知投递通道
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), NotificationDispatchError>;
}

/// JSON webhook 通道
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: Url,
}

impl WebhookChannel {
    pub fn new(url: Url) -> Result<Self, NotificationDispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), NotificationDispatchError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "subject": request.subject,
                "message": request.message,
                "invoice_id": request.invoice_id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotificationDispatchError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// 只写日志的通道 (未配置 webhook 时使用)
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), NotificationDispatchError> {
        tracing::info!("[notification] {}\n{}", request.subject, request.message);
        Ok(())
    }
}

/// 通知结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum NotificationOutcome {
    NotRequired,
    Sent,
    Failed(String),
}

/// 大额发票审批通知
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    approval_endpoint: Url,
    high_value_threshold: BigDecimal,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>, approval_endpoint: Url, high_value_threshold: BigDecimal) -> Self {
        Self {
            channel,
            approval_endpoint,
            high_value_threshold,
        }
    }

    /// 只有因金额进入复核的发票才发通知；仅低置信度的不发
    pub fn is_eligible(classification: &Classification) -> bool {
        classification.status == Status::PendingReview && classification.has_reason(ReviewReason::Amount)
    }

    /// `<endpoint>?invoice_id=<id>&action=<approve|reject>`
    pub fn decision_url(&self, invoice_id: i64, action: ApprovalAction) -> Url {
        let mut url = self.approval_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("invoice_id", &invoice_id.to_string())
            .append_pair("action", action.as_str());
        url
    }

    pub fn build_request(&self, invoice_id: i64, record: &InvoiceRecord) -> ApprovalRequest {
        let invoice_number = record.invoice_number.clone().unwrap_or_default();
        let vendor_name = record.company_name.clone().unwrap_or_default();
        let amount = record.total_amount_value().unwrap_or_else(BigDecimal::zero);
        let approve_url = self.decision_url(invoice_id, ApprovalAction::Approve);
        let reject_url = self.decision_url(invoice_id, ApprovalAction::Reject);

        let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        let message = format!(
            "High-Value Invoice Requires Approval\n\n\
             Invoice Number: {}\n\
             Vendor: {}\n\
             Amount: {}\n\
             Date: {}\n\
             Due Date: {}\n\
             PO Number: {}\n\n\
             Confidence Score: {}%\n\n\
             This invoice exceeds the {} threshold and requires manual approval.\n\n\
             ----- ACTION REQUIRED -----\n\n\
             APPROVE: {}\n\n\
             REJECT: {}\n\n\
             Click one of the links above to approve or reject this invoice.",
            invoice_number,
            vendor_name,
            format_money(&amount),
            or_dash(record.invoice_date.map(|d| d.to_string())),
            or_dash(record.due_date.map(|d| d.to_string())),
            or_dash(record.po_number.clone()),
            record.confidence_percent(),
            format_money(&self.high_value_threshold),
            approve_url,
            reject_url,
        );

        ApprovalRequest {
            invoice_id,
            subject: format!("High-Value Invoice Approval Required: {}", invoice_number),
            invoice_number,
            vendor_name,
            amount,
            approve_url,
            reject_url,
            message,
        }
    }

    /// 按策略发送通知；投递失败只记录，不影响已提交的数据
    pub async fn notify(
        &self,
        invoice_id: i64,
        record: &InvoiceRecord,
        classification: &Classification,
    ) -> NotificationOutcome {
        if !Self::is_eligible(classification) {
            return NotificationOutcome::NotRequired;
        }

        let request = self.build_request(invoice_id, record);
        match self.channel.publish(&request).await {
            Ok(()) => {
                tracing::info!("✓ Approval notification sent for invoice {}", invoice_id);
                NotificationOutcome::Sent
            }
            Err(e) => {
                tracing::error!(
                    invoice_id,
                    "⚠ Failed to send approval notification, manual follow-up required: {}",
                    e
                );
                NotificationOutcome::Failed(e.to_string())
            }
        }
    }
}
