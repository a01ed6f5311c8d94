pub mod approval;
pub mod classifier;
pub mod notifier;
pub mod parser;
pub mod pipeline;
pub mod reconciler;
pub mod register;
pub mod validator;

pub use approval::{ApprovalError, ApprovalReceipt, ApprovalService};
pub use classifier::StatusClassifier;
pub use notifier::{
    ApprovalRequest, LogChannel, NotificationChannel, NotificationDispatchError,
    NotificationOutcome, Notifier, WebhookChannel,
};
pub use parser::{parse_extraction, ParseError};
pub use pipeline::{InvoicePipeline, PipelineError, PipelineOutcome, ProcessingReport};
pub use reconciler::{ArtifactBuckets, ArtifactReconciler, ReconcileOutcome};
pub use register::{InvoiceRegister, RegisterError};
pub use validator::Validator;
