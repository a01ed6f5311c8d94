use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 发票生命周期状态 (`invoices.status`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Approved,
    PendingReview,
    Rejected,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Approved => "approved",
            Status::PendingReview => "pending_review",
            Status::Rejected => "rejected",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown invoice status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Status::Approved),
            "pending_review" => Ok(Status::PendingReview),
            "rejected" => Ok(Status::Rejected),
            "failed" => Ok(Status::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// sqlx 行映射使用 #[sqlx(try_from = "String")]
impl TryFrom<String> for Status {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 进入人工复核 (或失败) 的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    Amount,
    Confidence,
    Validation,
}

/// 分类结果：状态 + 触发的原因集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: Status,
    pub reasons: IndexSet<ReviewReason>,
}

impl Classification {
    pub fn has_reason(&self, reason: ReviewReason) -> bool {
        self.reasons.contains(&reason)
    }
}

/// 审批动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }

    pub fn target_status(&self) -> Status {
        match self {
            ApprovalAction::Approve => Status::Approved,
            ApprovalAction::Reject => Status::Rejected,
        }
    }
}

impl FromStr for ApprovalAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ApprovalAction::Approve),
            "reject" => Ok(ApprovalAction::Reject),
            other => Err(other.to_string()),
        }
    }
}
