//! Shared harness for the end-to-end tests: in-memory invoice store, in-memory
//! object store and a notification channel that records what it was asked to send.

#![allow(dead_code)]

use async_trait::async_trait;
use invoice_pipeline::db::{ConflictPolicy, MemoryInvoiceStore};
use invoice_pipeline::models::InvoiceRecord;
use invoice_pipeline::service::reconciler::CORRELATION_TAG;
use invoice_pipeline::service::{
    ApprovalRequest, ApprovalService, ArtifactBuckets, ArtifactReconciler, InvoicePipeline,
    InvoiceRegister, NotificationChannel, NotificationDispatchError, Notifier, StatusClassifier,
    Validator,
};
use invoice_pipeline::storage::{MemoryObjectStore, ObjectLocation, ObjectStore, Tags};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

pub const STAGING: &str = "staging";
pub const OUTPUT: &str = "output";
pub const PROCESSED: &str = "processed";
pub const FAILED: &str = "failed";
pub const APPROVAL_ENDPOINT: &str = "https://approvals.test/api/approval";

#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<ApprovalRequest>>,
    fail: AtomicBool,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<ApprovalRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), NotificationDispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationDispatchError::Rejected(503));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryInvoiceStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub channel: Arc<RecordingChannel>,
    pub reconciler: Arc<ArtifactReconciler>,
    pub pipeline: Arc<InvoicePipeline>,
    pub approvals: Arc<ApprovalService>,
    pub register: Arc<InvoiceRegister>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::default())
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        let store = Arc::new(MemoryInvoiceStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let channel = Arc::new(RecordingChannel::default());

        let reconciler = Arc::new(ArtifactReconciler::new(
            objects.clone(),
            ArtifactBuckets {
                staging: STAGING.into(),
                processed: PROCESSED.into(),
                failed: FAILED.into(),
            },
        ));
        let classifier = StatusClassifier::default();
        let notifier = Notifier::new(
            channel.clone(),
            Url::parse(APPROVAL_ENDPOINT).unwrap(),
            classifier.high_value_threshold().clone(),
        );
        let pipeline = InvoicePipeline::new(
            store.clone(),
            objects.clone(),
            Validator::default(),
            classifier,
            notifier,
            reconciler.clone(),
        )
        .with_conflict_policy(policy)
        .with_source_bucket(OUTPUT);

        Self {
            approvals: Arc::new(ApprovalService::new(store.clone())),
            register: Arc::new(InvoiceRegister::new(store.clone())),
            pipeline: Arc::new(pipeline),
            store,
            objects,
            channel,
            reconciler,
        }
    }

    /// Stages the source document tagged with `job_id` and writes the extraction
    /// result under the job's output prefix. Returns the result location.
    pub async fn stage(&self, job_id: &str, payload: &Value) -> ObjectLocation {
        let artifact = ObjectLocation::new(STAGING, format!("{}.pdf", job_id));
        self.objects.put(&artifact, b"%PDF-1.4").await.unwrap();
        self.reconciler.tag_for_processing(&artifact, job_id).await.unwrap();

        let result = result_location(job_id);
        self.objects
            .put(&result, payload.to_string().as_bytes())
            .await
            .unwrap();
        result
    }

    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects.list(bucket).await.unwrap()
    }

    pub async fn tags(&self, location: &ObjectLocation) -> Tags {
        self.objects.get_tags(location).await.unwrap()
    }
}

pub fn result_location(job_id: &str) -> ObjectLocation {
    ObjectLocation::new(OUTPUT, format!("/{}/0/custom_output/0/result.json", job_id))
}

pub fn payload(number: Option<&str>, company: Option<&str>, total: &str, confidence: f64) -> Value {
    let mut inference = json!({
        "total_amount": total,
        "invoice_date": "2025-01-01",
        "bill_to": "Globex",
        "invoice_items": [
            { "description": "Consulting", "quantity": 1, "unit_price": total, "amount": total }
        ]
    });
    if let Some(number) = number {
        inference["invoice_number"] = json!(number);
    }
    if let Some(company) = company {
        inference["company_name"] = json!(company);
    }
    json!({
        "matched_blueprint": { "confidence": confidence },
        "inference_result": inference
    })
}

pub fn tagged_job(tags: &Tags) -> Option<&str> {
    tags.get(CORRELATION_TAG).map(String::as_str)
}

pub fn record(number: &str, vendor: &str, total: &str) -> InvoiceRecord {
    InvoiceRecord {
        job_id: "job-fixture".into(),
        source: result_location("job-fixture"),
        invoice_number: Some(number.into()),
        company_name: Some(vendor.into()),
        company_address: None,
        company_contact: None,
        bill_to: None,
        client_email: None,
        invoice_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 1),
        invoice_date_text: Some("2025-01-01".into()),
        due_date: None,
        po_number: None,
        subtotal: None,
        discount: None,
        tax: None,
        total_amount: Some(total.into()),
        payment_terms: None,
        payment_instructions: None,
        bank: None,
        confidence: 0.95,
        line_items: Vec::new(),
    }
}
