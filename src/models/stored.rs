use super::Status;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 发票登记簿行 (列表 / 导出)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct InvoiceSummary {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub vendor_name: String,
    pub total_amount: Option<BigDecimal>,
    #[sqlx(try_from = "String")]
    pub status: Status,
    pub processed_at: Option<DateTime<Utc>>,
}

/// 发票主表 + 供应商/客户名
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct InvoiceHeader {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub vendor_id: i64,
    pub vendor_name: String,
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub total_amount: Option<BigDecimal>,
    pub po_number: Option<String>,
    pub payment_terms: Option<String>,
    pub payment_instructions: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: Status,
    pub confidence_score: Option<BigDecimal>,
    pub s3_key: Option<String>,
    pub s3_bucket: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// 明细行 (按 line_number 排序读取)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LineItemRow {
    pub line_number: i32,
    pub description: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit_price: Option<BigDecimal>,
    pub amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct BankDetailsRow {
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
}

/// 完整发票视图
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub header: InvoiceHeader,
    pub line_items: Vec<LineItemRow>,
    pub bank_details: Option<BankDetailsRow>,
}

/// 审批状态流转结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTransition {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub vendor_name: String,
    pub total_amount: Option<BigDecimal>,
    pub previous_status: Status,
    pub new_status: Status,
    pub processed_at: DateTime<Utc>,
}

/// 入库方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    Inserted,
    Updated,
    Ignored,   // 重复发票按 ignore 策略跳过
}

/// 入库结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedInvoice {
    pub invoice_id: i64,
    pub vendor_id: i64,
    pub customer_id: Option<i64>,
    pub line_item_count: usize,
    pub bank_details_inserted: bool,
    pub disposition: WriteDisposition,
}

/// 登记簿查询条件
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<Status>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

impl Default for InvoiceFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: default_limit(),
        }
    }
}
