use crate::storage::ObjectLocation;
use bigdecimal::{BigDecimal, FromPrimitive, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 发票明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: Option<String>,
    pub quantity: Option<BigDecimal>,
    pub unit_price: Option<BigDecimal>,
    pub amount: Option<BigDecimal>,
    pub line_number: i32,   // 从 1 开始的顺序号
}

/// 供应商收款银行信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankInfo {
    pub bank_name: String,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
}

/// 规范化后的发票记录 (由抽取结果解析而来)
///
/// 所有可选字段缺失时为 `None`，不视为错误；是否可入库由校验器决定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub job_id: String,            // 关联 ID (抽取任务 ID)
    pub source: ObjectLocation,    // 抽取结果文件位置
    pub invoice_number: Option<String>,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_contact: Option<String>,
    pub bill_to: Option<String>,
    pub client_email: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub invoice_date_text: Option<String>,  // 原始日期文本，区分缺失与无法识别
    pub due_date: Option<NaiveDate>,
    pub po_number: Option<String>,
    pub subtotal: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,   // 已取绝对值
    pub tax: Option<BigDecimal>,
    pub total_amount: Option<String>,   // 原始文本，数值合法性由校验器判断
    pub payment_terms: Option<String>,
    pub payment_instructions: Option<String>,
    pub bank: Option<BankInfo>,
    pub confidence: f64,                // [0, 1]
    pub line_items: Vec<LineItem>,
}

impl InvoiceRecord {
    /// 解析后的总金额；缺失或无法解析时返回 None
    pub fn total_amount_value(&self) -> Option<BigDecimal> {
        self.total_amount.as_deref().and_then(parse_amount)
    }

    /// 置信度百分比，保留两位小数 (入库快照)
    pub fn confidence_percent(&self) -> BigDecimal {
        BigDecimal::from_f64(self.confidence * 100.0)
            .map(|v| v.round(2))
            .unwrap_or_else(BigDecimal::zero)
    }

    /// 供应商名 + 发票号构成入库的自然键
    pub fn natural_key(&self) -> Option<(&str, &str)> {
        let number = non_empty(self.invoice_number.as_deref())?;
        let vendor = non_empty(self.company_name.as_deref())?;
        Some((number, vendor))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 解析金额文本，容忍货币符号、千分位和空白
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

/// 金额格式化为 `$75,000.00`
pub fn format_money(amount: &BigDecimal) -> String {
    let fixed = amount.round(2).with_scale(2).to_string();
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${}.{}", sign, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_strips_currency_and_separators() {
        assert_eq!(parse_amount("$75,000.00"), Some(BigDecimal::from(75000)));
        assert_eq!(parse_amount(" 100.50 "), BigDecimal::from_str("100.50").ok());
        assert_eq!(parse_amount("-12"), Some(BigDecimal::from(-12)));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("   "), None);
    }

    #[test]
    fn format_money_groups_thousands() {
        assert_eq!(format_money(&BigDecimal::from(75000)), "$75,000.00");
        assert_eq!(format_money(&BigDecimal::from(100)), "$100.00");
        assert_eq!(
            format_money(&BigDecimal::from_str("1234567.891").unwrap()),
            "$1,234,567.89"
        );
        assert_eq!(format_money(&BigDecimal::from(-5000)), "-$5,000.00");
    }
}
