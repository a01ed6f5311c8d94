use super::{pages, AppState};
use crate::models::InvoiceFilter;
use crate::service::{ApprovalError, PipelineOutcome};
use crate::storage::{ObjectLocation, StorageError};
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// 请求体: 打标签
#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub bucket: String,
    pub key: String,
    pub job_id: String,
}

/// 审批参数 (缺失或格式错误由服务层判定)
#[derive(Debug, Deserialize)]
pub struct ApprovalParams {
    pub invoice_id: Option<String>,
    pub action: Option<String>,
}

/// 通用响应体
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

fn failure(status: StatusCode, message: String) -> Response {
    let response = MessageResponse {
        success: false,
        message,
    };
    (status, Json(response)).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 抽取结果到达：跑完整条流水线
pub async fn process_extraction(
    State(state): State<AppState>,
    Json(location): Json<ObjectLocation>,
) -> Response {
    match state.pipeline.process_event(&location).await {
        Ok(outcome) => {
            if let PipelineOutcome::Processed(report) = &outcome {
                tracing::info!("Job {} finished as {}", report.job_id, report.status);
            }
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(e) => {
            tracing::error!("✗ Pipeline failed for {}: {}", location, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
        }
    }
}

/// 原始单据上传后打标签
pub async fn tag_artifact(State(state): State<AppState>, Json(req): Json<TagRequest>) -> Response {
    let location = ObjectLocation::new(req.bucket, req.key);
    match state.reconciler.tag_for_processing(&location, &req.job_id).await {
        Ok(()) => {
            let response = MessageResponse {
                success: true,
                message: format!("Tagged {} with job {}", location, req.job_id),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(StorageError::NotFound(missing)) => {
            failure(StatusCode::NOT_FOUND, format!("Object not found: {}", missing))
        }
        Err(StorageError::InvalidKey(key)) => {
            failure(StatusCode::BAD_REQUEST, format!("Invalid object key: {}", key))
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

/// 审批链接入口，返回 HTML
pub async fn approval(State(state): State<AppState>, Query(params): Query<ApprovalParams>) -> Response {
    let result = state
        .approvals
        .apply(params.invoice_id.as_deref(), params.action.as_deref())
        .await;

    match result {
        Ok(receipt) => (StatusCode::OK, Html(pages::confirmation(&receipt))).into_response(),
        Err(e) => {
            let status = match &e {
                ApprovalError::MissingParameters
                | ApprovalError::InvalidInvoiceId(_)
                | ApprovalError::InvalidAction(_) => StatusCode::BAD_REQUEST,
                ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
                ApprovalError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!("✗ Approval failed: {}", e);
            } else {
                tracing::warn!("Approval request rejected: {}", e);
            }
            (status, Html(pages::error(&e.to_string()))).into_response()
        }
    }
}

/// 登记簿
pub async fn list_invoices(State(state): State<AppState>, Query(filter): Query<InvoiceFilter>) -> Response {
    match state.register.recent(&filter).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

/// 登记簿 CSV 导出
pub async fn export_invoices(State(state): State<AppState>, Query(filter): Query<InvoiceFilter>) -> Response {
    match state.register.export_csv(&filter).await {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"invoices.csv\""),
            ],
            csv,
        )
            .into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

/// 单张发票 (含明细和银行信息)
pub async fn invoice_detail(State(state): State<AppState>, Path(invoice_id): Path<i64>) -> Response {
    match state.register.detail(invoice_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("Invoice {} not found", invoice_id)),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}
