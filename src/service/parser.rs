use crate::models::{parse_amount, BankInfo, InvoiceRecord, LineItem};
use crate::storage::ObjectLocation;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// 抽取结果文件命名约定
const OUTPUT_SEGMENT: &str = "custom_output";
const RESULT_FILE: &str = "result.json";

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y", "%B %d, %Y", "%b %d, %Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed extraction payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed extraction payload: {0}")]
    Structure(String),
}

/// 是否为抽取服务产出的结果文件
pub fn is_extraction_result(key: &str) -> bool {
    key.contains(OUTPUT_SEGMENT) && key.ends_with(RESULT_FILE)
}

/// 从结果路径取关联 ID: `/job-id/0/custom_output/0/result.json` → `job-id`
pub fn correlation_id_from_key(key: &str) -> Option<&str> {
    key.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// 解析抽取结果为规范化发票记录
///
/// 缺失字段一律为 None；只有整体结构无法解码时才返回错误。
pub fn parse_extraction(raw: &[u8], source: &ObjectLocation) -> Result<InvoiceRecord, ParseError> {
    let payload: Value = serde_json::from_slice(raw)?;
    let root = payload
        .as_object()
        .ok_or_else(|| ParseError::Structure("top level is not an object".to_string()))?;

    let empty = Map::new();
    let inference = object_field(root, "inference_result")?.unwrap_or(&empty);
    let payment_details = object_field(inference, "payment_details")?.unwrap_or(&empty);
    let bank_details = object_field(inference, "bank_details")?.unwrap_or(&empty);

    let confidence = object_field(root, "matched_blueprint")?
        .and_then(|bp| bp.get("confidence"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let line_items = match inference.get("invoice_items") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| parse_line_item(idx, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(ParseError::Structure("invoice_items is not an array".to_string())),
    };

    let bank = text(bank_details, "bank_name").map(|bank_name| BankInfo {
        bank_name,
        account_number: text(bank_details, "account_number"),
        routing_number: text(bank_details, "routing_number"),
    });

    let job_id = correlation_id_from_key(&source.key).unwrap_or_default().to_string();
    let invoice_date_text = text(inference, "invoice_date");

    Ok(InvoiceRecord {
        job_id,
        source: source.clone(),
        invoice_number: text(inference, "invoice_number"),
        company_name: text(inference, "company_name"),
        company_address: text(inference, "company_address"),
        company_contact: text(inference, "company_contact_information"),
        bill_to: text(inference, "bill_to"),
        client_email: text(inference, "client_email"),
        invoice_date: invoice_date_text.as_deref().and_then(|raw| date_or_warn("invoice_date", raw)),
        invoice_date_text,
        due_date: text(inference, "due_date").and_then(|raw| date_or_warn("due_date", &raw)),
        po_number: text(inference, "po_number"),
        subtotal: decimal(inference, "subtotal"),
        discount: decimal(inference, "discount").map(|d| d.abs()),
        tax: decimal(inference, "tax"),
        total_amount: text(inference, "total_amount"),
        payment_terms: text(inference, "payment_terms"),
        payment_instructions: text(payment_details, "payment_instructions"),
        bank,
        confidence,
        line_items,
    })
}

fn parse_line_item(idx: usize, item: &Value) -> Result<LineItem, ParseError> {
    let fields = item
        .as_object()
        .ok_or_else(|| ParseError::Structure(format!("invoice_items[{}] is not an object", idx)))?;
    Ok(LineItem {
        description: text(fields, "description"),
        quantity: decimal(fields, "quantity"),
        unit_price: decimal(fields, "unit_price"),
        amount: decimal(fields, "amount"),
        line_number: idx as i32 + 1,
    })
}

/// 可选的嵌套对象；存在但类型不对视为结构错误
fn object_field<'a>(
    parent: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a Map<String, Value>>, ParseError> {
    match parent.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ParseError::Structure(format!("{} is not an object", name))),
    }
}

/// 文本字段：数字转成文本，空串视为缺失
fn text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    let value = match fields.get(name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn decimal(fields: &Map<String, Value>, name: &str) -> Option<BigDecimal> {
    let raw = text(fields, name)?;
    let parsed = parse_amount(&raw);
    if parsed.is_none() {
        tracing::warn!("Ignoring non-numeric {}: {:?}", name, raw);
    }
    parsed
}

/// 日期文本 → 日期；带时间的取日期部分
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn date_or_warn(name: &str, raw: &str) -> Option<NaiveDate> {
    let parsed = parse_date(raw);
    if parsed.is_none() {
        tracing::warn!("Unrecognised {} format: {:?}", name, raw);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn location() -> ObjectLocation {
        ObjectLocation::new("output", "/job-42/0/custom_output/0/result.json")
    }

    #[test]
    fn recognises_result_files_only() {
        assert!(is_extraction_result("job/0/custom_output/0/result.json"));
        assert!(!is_extraction_result("job/0/standard_output/0/result.json"));
        assert!(!is_extraction_result("job/0/custom_output/0/job_metadata.json"));
    }

    #[test]
    fn correlation_id_ignores_leading_slash() {
        assert_eq!(correlation_id_from_key("/job-42/0/custom_output/0/result.json"), Some("job-42"));
        assert_eq!(correlation_id_from_key("job-42/0/result.json"), Some("job-42"));
        assert_eq!(correlation_id_from_key("/"), None);
    }

    #[test]
    fn parses_full_payload() {
        let payload = json!({
            "matched_blueprint": { "confidence": 0.87 },
            "inference_result": {
                "invoice_number": "INV-1",
                "company_name": "Acme",
                "company_contact_information": "555-0100",
                "bill_to": "Globex",
                "invoice_date": "2025-01-01",
                "due_date": "01/31/2025",
                "subtotal": "1,000.00",
                "discount": -50,
                "tax": 80.5,
                "total_amount": 1030.5,
                "payment_details": { "payment_instructions": "Wire only" },
                "bank_details": { "bank_name": "First Bank", "account_number": "0001" },
                "invoice_items": [
                    { "description": "Widget", "quantity": 2, "unit_price": "500", "amount": "1000" },
                    { "description": "Shipping" }
                ]
            }
        });
        let record = parse_extraction(payload.to_string().as_bytes(), &location()).unwrap();

        assert_eq!(record.job_id, "job-42");
        assert_eq!(record.invoice_number.as_deref(), Some("INV-1"));
        assert_eq!(record.company_contact.as_deref(), Some("555-0100"));
        assert_eq!(record.invoice_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(record.due_date, NaiveDate::from_ymd_opt(2025, 1, 31));
        assert_eq!(record.subtotal, Some(BigDecimal::from(1000)));
        assert_eq!(record.discount, Some(BigDecimal::from(50)));
        assert_eq!(record.total_amount.as_deref(), Some("1030.5"));
        assert_eq!(record.total_amount_value(), BigDecimal::from_str("1030.5").ok());
        assert_eq!(record.payment_instructions.as_deref(), Some("Wire only"));
        assert_eq!(record.bank.as_ref().map(|b| b.bank_name.as_str()), Some("First Bank"));
        assert_eq!(record.line_items.len(), 2);
        assert_eq!(record.line_items[1].line_number, 2);
        assert_eq!(record.line_items[1].amount, None);
        assert!((record.confidence - 0.87).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_fields_default_to_absent() {
        let record = parse_extraction(br#"{"inference_result": {}}"#, &location()).unwrap();
        assert!(record.invoice_number.is_none());
        assert!(record.company_name.is_none());
        assert!(record.bank.is_none());
        assert!(record.line_items.is_empty());
        assert_eq!(record.confidence, 0.0);

        let record = parse_extraction(b"{}", &location()).unwrap();
        assert!(record.total_amount.is_none());
    }

    #[test]
    fn blank_strings_are_absent() {
        let payload = json!({ "inference_result": { "company_name": "   ", "total_amount": "" } });
        let record = parse_extraction(payload.to_string().as_bytes(), &location()).unwrap();
        assert!(record.company_name.is_none());
        assert!(record.total_amount.is_none());
    }

    #[test]
    fn timestamps_keep_their_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert_eq!(parse_date("2025-01-01T00:00:00Z"), expected);
        assert_eq!(parse_date("2025-01-01T23:30:00+09:00"), expected);
        assert_eq!(parse_date("2025-01-01T08:15:00"), expected);
        assert_eq!(parse_date("2025-01-01T08:15:00.250"), expected);
        assert_eq!(parse_date("2025-01-01 08:15:00"), expected);
        assert_eq!(parse_date("Jan 1, 2025"), expected);
    }

    #[test]
    fn iso_timestamp_invoice_date_is_parsed() {
        let payload = json!({ "inference_result": { "invoice_date": "2025-01-01T00:00:00Z" } });
        let record = parse_extraction(payload.to_string().as_bytes(), &location()).unwrap();
        assert_eq!(record.invoice_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(record.invoice_date_text.as_deref(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn unusable_invoice_date_keeps_raw_text() {
        let payload = json!({ "inference_result": { "invoice_date": "sometime in March" } });
        let record = parse_extraction(payload.to_string().as_bytes(), &location()).unwrap();
        assert_eq!(record.invoice_date, None);
        assert_eq!(record.invoice_date_text.as_deref(), Some("sometime in March"));
    }

    #[test]
    fn malformed_payloads_fail() {
        assert!(matches!(parse_extraction(b"not json", &location()), Err(ParseError::Json(_))));
        assert!(matches!(parse_extraction(b"[1, 2]", &location()), Err(ParseError::Structure(_))));
        assert!(matches!(
            parse_extraction(br#"{"inference_result": "oops"}"#, &location()),
            Err(ParseError::Structure(_))
        ));
        assert!(matches!(
            parse_extraction(br#"{"inference_result": {"invoice_items": {}}}"#, &location()),
            Err(ParseError::Structure(_))
        ));
    }
}
