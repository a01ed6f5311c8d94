pub mod handlers;
pub mod pages;

pub use handlers::*;

use crate::service::{ApprovalService, ArtifactReconciler, InvoicePipeline, InvoiceRegister};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InvoicePipeline>,
    pub approvals: Arc<ApprovalService>,
    pub register: Arc<InvoiceRegister>,
    pub reconciler: Arc<ArtifactReconciler>,
}

pub fn router(state: AppState) -> Router {
    // 流水线入口
    let pipeline_routes = Router::new()
        .route("/api/extractions", post(handlers::process_extraction))
        .route("/api/artifacts/tag", post(handlers::tag_artifact));

    // 审批 + 登记簿
    let invoice_routes = Router::new()
        .route("/api/approval", get(handlers::approval))
        .route("/api/invoices", get(handlers::list_invoices))
        .route("/api/invoices/export", get(handlers::export_invoices))
        .route("/api/invoices/:id", get(handlers::invoice_detail));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(pipeline_routes)
        .merge(invoice_routes)
        .layer(ServiceBuilder::new())
        .with_state(state)
}
