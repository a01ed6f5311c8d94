use crate::models::{Classification, ReviewReason, Status, ValidationOutcome};
use bigdecimal::BigDecimal;
use indexmap::IndexSet;

/// 默认大额阈值 ($50,000)
pub const DEFAULT_HIGH_VALUE_THRESHOLD: i64 = 50_000;

/// 状态分类器 (纯函数，无副作用)
///
/// 判定顺序 (先命中先返回)：
/// 1. 校验失败 → failed
/// 2. 总金额超过阈值 → pending_review
/// 3. 需要复核 (低置信度) → pending_review
/// 4. 其余 → approved
///
/// `rejected` 只能由人工审批产生。
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    high_value_threshold: BigDecimal,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(BigDecimal::from(DEFAULT_HIGH_VALUE_THRESHOLD))
    }
}

impl StatusClassifier {
    pub fn new(high_value_threshold: BigDecimal) -> Self {
        Self { high_value_threshold }
    }

    pub fn high_value_threshold(&self) -> &BigDecimal {
        &self.high_value_threshold
    }

    pub fn classify(&self, is_valid: bool, needs_review: bool, total_amount: Option<&BigDecimal>) -> Status {
        self.evaluate(is_valid, needs_review, total_amount).status
    }

    /// 状态 + 全部触发原因
    pub fn evaluate(
        &self,
        is_valid: bool,
        needs_review: bool,
        total_amount: Option<&BigDecimal>,
    ) -> Classification {
        let high_value = total_amount.map_or(false, |total| *total > self.high_value_threshold);

        let mut reasons = IndexSet::new();
        if !is_valid {
            reasons.insert(ReviewReason::Validation);
        }
        if high_value {
            reasons.insert(ReviewReason::Amount);
        }
        if needs_review {
            reasons.insert(ReviewReason::Confidence);
        }

        let status = if !is_valid {
            Status::Failed
        } else if high_value || needs_review {
            Status::PendingReview
        } else {
            Status::Approved
        };

        Classification { status, reasons }
    }

    pub fn classify_outcome(&self, outcome: &ValidationOutcome, total_amount: Option<&BigDecimal>) -> Classification {
        self.evaluate(outcome.is_valid(), outcome.needs_review(), total_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn amount(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn decision_table() {
        let c = StatusClassifier::default();
        let low = amount("100.00");
        let high = amount("75000.00");

        for needs_review in [false, true] {
            for total in [Some(&low), Some(&high), None] {
                assert_eq!(c.classify(false, needs_review, total), Status::Failed);
            }
        }
        assert_eq!(c.classify(true, false, Some(&high)), Status::PendingReview);
        assert_eq!(c.classify(true, true, Some(&high)), Status::PendingReview);
        assert_eq!(c.classify(true, true, Some(&low)), Status::PendingReview);
        assert_eq!(c.classify(true, false, Some(&low)), Status::Approved);
    }

    #[test]
    fn threshold_is_exclusive() {
        let c = StatusClassifier::default();
        assert_eq!(c.classify(true, false, Some(&amount("50000.00"))), Status::Approved);
        assert_eq!(c.classify(true, false, Some(&amount("50000.01"))), Status::PendingReview);
    }

    #[test]
    fn reasons_record_every_trigger() {
        let c = StatusClassifier::new(amount("1000"));

        let high_and_low_conf = c.evaluate(true, true, Some(&amount("5000")));
        assert_eq!(high_and_low_conf.status, Status::PendingReview);
        assert!(high_and_low_conf.has_reason(ReviewReason::Amount));
        assert!(high_and_low_conf.has_reason(ReviewReason::Confidence));

        let confidence_only = c.evaluate(true, true, Some(&amount("10")));
        assert!(!confidence_only.has_reason(ReviewReason::Amount));

        let invalid = c.evaluate(false, false, None);
        assert_eq!(invalid.reasons.iter().copied().collect::<Vec<_>>(), vec![ReviewReason::Validation]);
    }
}
