use crate::models::{
    parse_amount, InvoiceRecord, RequiredField, ValidationError, ValidationOutcome,
    ValidationWarning,
};
use bigdecimal::{BigDecimal, Zero};

/// 默认置信度阈值 (70%)
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// 业务规则校验：必填字段、总金额、置信度
#[derive(Debug, Clone)]
pub struct Validator {
    confidence_threshold: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl Validator {
    pub fn new(confidence_threshold: f64) -> Self {
        Self { confidence_threshold }
    }

    pub fn validate(&self, record: &InvoiceRecord) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        for field in RequiredField::ALL {
            if !is_present(record, field) {
                outcome.errors.push(ValidationError::MissingField { field });
            }
        }

        if let Some(raw) = record.total_amount.as_deref().filter(|s| !s.trim().is_empty()) {
            let positive = parse_amount(raw).map_or(false, |v| v > BigDecimal::zero());
            if !positive {
                outcome.errors.push(ValidationError::InvalidAmount { value: raw.to_string() });
            }
        }

        if record.confidence < self.confidence_threshold {
            outcome.warnings.push(ValidationWarning::LowConfidence {
                confidence: record.confidence,
                threshold: self.confidence_threshold,
            });
        }

        outcome
    }
}

fn is_present(record: &InvoiceRecord, field: RequiredField) -> bool {
    let text = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.trim().is_empty());
    match field {
        RequiredField::InvoiceNumber => text(&record.invoice_number),
        RequiredField::CompanyName => text(&record.company_name),
        RequiredField::TotalAmount => text(&record.total_amount),
        // 无法识别的日期文本也算已提供，入库为 NULL
        RequiredField::InvoiceDate => record.invoice_date.is_some() || text(&record.invoice_date_text),
    }
}
