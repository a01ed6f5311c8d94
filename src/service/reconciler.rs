use crate::models::Status;
use crate::storage::{ObjectLocation, ObjectStore, StorageError, Tags};
use serde::Serialize;
use std::sync::Arc;

/// 关联 ID 标签
pub const CORRELATION_TAG: &str = "bedrock_job_id";
/// 处理状态标签
pub const PROCESSING_STATUS_TAG: &str = "processing_status";
pub const IN_PROGRESS: &str = "in_progress";

/// 原始单据所在的三个区域
#[derive(Debug, Clone)]
pub struct ArtifactBuckets {
    pub staging: String,
    pub processed: String,
    pub failed: String,
}

impl ArtifactBuckets {
    /// approved → processed，其余状态 → failed
    pub fn terminal_for(&self, status: Status) -> &str {
        match status {
            Status::Approved => &self.processed,
            _ => &self.failed,
        }
    }
}

/// 归档结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Relocated {
        from: ObjectLocation,
        to: ObjectLocation,
    },
    /// 之前的调用已完成搬移
    AlreadyRelocated { location: ObjectLocation },
    NotFound { job_id: String },
}

/// 原始单据归档
///
/// 按关联标签在 staging 中线性查找，然后 copy + delete 搬到终态区域。
/// 两步之间失败时，重复调用会收敛：目标已存在则跳过 copy 只做 delete。
pub struct ArtifactReconciler {
    objects: Arc<dyn ObjectStore>,
    buckets: ArtifactBuckets,
}

impl ArtifactReconciler {
    pub fn new(objects: Arc<dyn ObjectStore>, buckets: ArtifactBuckets) -> Self {
        Self { objects, buckets }
    }

    pub fn buckets(&self) -> &ArtifactBuckets {
        &self.buckets
    }

    /// 上传时打标签：关联 ID + in_progress
    pub async fn tag_for_processing(&self, location: &ObjectLocation, job_id: &str) -> Result<(), StorageError> {
        let mut tags = self.objects.get_tags(location).await?;
        tags.insert(CORRELATION_TAG.to_string(), job_id.to_string());
        tags.insert(PROCESSING_STATUS_TAG.to_string(), IN_PROGRESS.to_string());
        self.objects.put_tags(location, &tags).await?;

        tracing::info!("Tagged {} with job {}", location, job_id);
        Ok(())
    }

    /// 在 bucket 中查找关联标签等于 job_id 的对象
    pub async fn locate(&self, bucket: &str, job_id: &str) -> Result<Option<ObjectLocation>, StorageError> {
        for key in self.objects.list(bucket).await? {
            let location = ObjectLocation::new(bucket, key);
            match self.objects.get_tags(&location).await {
                Ok(tags) if carries_job(&tags, job_id) => return Ok(Some(location)),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping {} during tag scan: {}", location, e),
            }
        }
        Ok(None)
    }

    pub async fn reconcile(&self, job_id: &str, status: Status) -> Result<ReconcileOutcome, StorageError> {
        let Some(from) = self.locate(&self.buckets.staging, job_id).await? else {
            return self.find_relocated(job_id).await;
        };

        let to = from.in_bucket(self.buckets.terminal_for(status));
        if self.is_copied(&to, job_id).await? {
            tracing::info!("{} already present, finishing interrupted move", to);
        } else {
            self.objects.copy(&from, &to).await?;
        }
        self.objects.delete(&from).await?;

        tracing::info!("✓ Moved artifact {} → {} ({})", from, to, status);
        Ok(ReconcileOutcome::Relocated { from, to })
    }

    async fn is_copied(&self, to: &ObjectLocation, job_id: &str) -> Result<bool, StorageError> {
        if !self.objects.exists(to).await? {
            return Ok(false);
        }
        Ok(carries_job(&self.objects.get_tags(to).await?, job_id))
    }

    async fn find_relocated(&self, job_id: &str) -> Result<ReconcileOutcome, StorageError> {
        for bucket in [&self.buckets.processed, &self.buckets.failed] {
            if let Some(location) = self.locate(bucket, job_id).await? {
                tracing::info!("Artifact for job {} already at {}", job_id, location);
                return Ok(ReconcileOutcome::AlreadyRelocated { location });
            }
        }

        tracing::warn!("⚠ No staged artifact tagged with job {}; needs manual investigation", job_id);
        Ok(ReconcileOutcome::NotFound {
            job_id: job_id.to_string(),
        })
    }
}

fn carries_job(tags: &Tags, job_id: &str) -> bool {
    tags.get(CORRELATION_TAG).map_or(false, |v| v == job_id)
}
