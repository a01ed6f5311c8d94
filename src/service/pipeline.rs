use super::classifier::StatusClassifier;
use super::notifier::{NotificationOutcome, Notifier};
use super::parser::{self, ParseError};
use super::reconciler::{ArtifactReconciler, ReconcileOutcome};
use super::validator::Validator;
use crate::db::{ConflictPolicy, InvoiceStore, PersistenceError};
use crate::models::{
    PersistedInvoice, ReviewReason, Status, ValidationError, ValidationWarning, WriteDisposition,
};
use crate::storage::{ObjectLocation, ObjectStore, StorageError};
use indexmap::IndexSet;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Malformed(#[from] ParseError),

    #[error("failed to read extraction result: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to persist invoice for job {job_id}: {source}")]
    Persistence {
        job_id: String,
        #[source]
        source: PersistenceError,
    },
}

/// 单次处理报告
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub job_id: String,
    pub source: ObjectLocation,
    pub invoice_number: Option<String>,
    pub status: Status,
    pub reasons: IndexSet<ReviewReason>,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub persisted: Option<PersistedInvoice>,
    pub notification: NotificationOutcome,
    pub artifact: Option<ReconcileOutcome>,
}

impl ProcessingReport {
    pub fn invoice_id(&self) -> Option<i64> {
        self.persisted.as_ref().map(|p| p.invoice_id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// 非抽取结果文件
    Skipped { location: ObjectLocation },
    Processed(ProcessingReport),
}

/// 发票处理流水线
///
/// parse → validate → classify → persist → notify → reconcile，严格顺序执行。
/// 校验失败不会中断流水线，只有解析和入库失败才返回错误。
pub struct InvoicePipeline {
    store: Arc<dyn InvoiceStore>,
    objects: Arc<dyn ObjectStore>,
    validator: Validator,
    classifier: StatusClassifier,
    notifier: Notifier,
    reconciler: Arc<ArtifactReconciler>,
    conflict_policy: ConflictPolicy,
    source_bucket: Option<String>,   // 只接收该 bucket 的事件
}

impl InvoicePipeline {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        objects: Arc<dyn ObjectStore>,
        validator: Validator,
        classifier: StatusClassifier,
        notifier: Notifier,
        reconciler: Arc<ArtifactReconciler>,
    ) -> Self {
        Self {
            store,
            objects,
            validator,
            classifier,
            notifier,
            reconciler,
            conflict_policy: ConflictPolicy::default(),
            source_bucket: None,
        }
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_source_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.source_bucket = Some(bucket.into());
        self
    }

    /// 存储事件入口
    pub async fn process_event(&self, location: &ObjectLocation) -> Result<PipelineOutcome, PipelineError> {
        if let Some(bucket) = self.source_bucket.as_deref().filter(|b| *b != location.bucket) {
            tracing::warn!("Ignoring event from bucket {} (expected {})", location.bucket, bucket);
            return Ok(PipelineOutcome::Skipped {
                location: location.clone(),
            });
        }

        if !parser::is_extraction_result(&location.key) {
            tracing::debug!("Ignoring non-result object {}", location);
            return Ok(PipelineOutcome::Skipped {
                location: location.clone(),
            });
        }

        let raw = self.objects.get(location).await?;
        self.process_payload(&raw, location)
            .await
            .map(PipelineOutcome::Processed)
    }

    pub async fn process_payload(
        &self,
        raw: &[u8],
        source: &ObjectLocation,
    ) -> Result<ProcessingReport, PipelineError> {
        let mut record = parser::parse_extraction(raw, source)?;
        let job_id = record.job_id.clone();
        tracing::info!(
            "========== Processing job {} ({}) ==========",
            job_id,
            record.invoice_number.as_deref().unwrap_or("-")
        );

        let outcome = self.validator.validate(&record);
        for error in &outcome.errors {
            tracing::warn!("[{}] {}", job_id, error);
        }
        for warning in &outcome.warnings {
            tracing::warn!("[{}] {}", job_id, warning);
        }

        // 被拒绝的金额不入库
        if outcome.rejected_amount() {
            record.total_amount = None;
        }
        let total = record.total_amount_value();
        let classification = self.classifier.classify_outcome(&outcome, total.as_ref());
        let status = classification.status;
        tracing::info!("[{}] status = {} {:?}", job_id, status, classification.reasons);

        let persisted = if record.natural_key().is_some() {
            match self.store.persist(&record, status, self.conflict_policy).await {
                Ok(persisted) => Some(persisted),
                Err(source) => {
                    tracing::error!("✗ [{}] persistence failed: {}", job_id, source);
                    self.reconcile_quietly(&job_id, Status::Failed).await;
                    return Err(PipelineError::Persistence { job_id, source });
                }
            }
        } else {
            tracing::warn!("[{}] no invoice number or vendor, record not persisted", job_id);
            None
        };

        let notification = match &persisted {
            Some(p) if p.disposition != WriteDisposition::Ignored => {
                self.notifier.notify(p.invoice_id, &record, &classification).await
            }
            _ => NotificationOutcome::NotRequired,
        };

        let artifact = self.reconcile_quietly(&job_id, status).await;

        Ok(ProcessingReport {
            job_id,
            source: source.clone(),
            invoice_number: record.invoice_number,
            status,
            reasons: classification.reasons,
            errors: outcome.errors,
            warnings: outcome.warnings,
            persisted,
            notification,
            artifact,
        })
    }

    /// 归档失败只记录日志，不影响处理结果
    async fn reconcile_quietly(&self, job_id: &str, status: Status) -> Option<ReconcileOutcome> {
        match self.reconciler.reconcile(job_id, status).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!("⚠ [{}] artifact reconciliation failed: {}", job_id, e);
                None
            }
        }
    }
}
