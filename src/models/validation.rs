use serde::Serialize;
use std::fmt;

/// 必填字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    InvoiceNumber,
    CompanyName,
    TotalAmount,
    InvoiceDate,
}

impl RequiredField {
    pub const ALL: [RequiredField; 4] = [
        RequiredField::InvoiceNumber,
        RequiredField::CompanyName,
        RequiredField::TotalAmount,
        RequiredField::InvoiceDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::InvoiceNumber => "invoice_number",
            RequiredField::CompanyName => "company_name",
            RequiredField::TotalAmount => "total_amount",
            RequiredField::InvoiceDate => "invoice_date",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阻断性校验错误：发票会被归类为 failed，但仍走完流水线
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: RequiredField },

    #[error("Invalid total amount: {value}")]
    InvalidAmount { value: String },
}

/// 非阻断告警：只标记复核
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    LowConfidence { confidence: f64, threshold: f64 },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::LowConfidence { confidence, threshold } => write!(
                f,
                "Low confidence: {:.2}% (threshold {:.2}%)",
                confidence * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// 校验结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn needs_review(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 总金额是否已被校验拒绝 (拒绝后不入库该金额)
    pub fn rejected_amount(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidAmount { .. }))
    }

    pub fn missing_fields(&self) -> Vec<RequiredField> {
        self.errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::MissingField { field } => Some(*field),
                _ => None,
            })
            .collect()
    }
}
