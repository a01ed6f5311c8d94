use invoice_pipeline::api::{self, AppState};
use invoice_pipeline::db::{apply_schema, create_pool, InvoiceStore, MemoryInvoiceStore, PgInvoiceStore};
use invoice_pipeline::service::{
    ApprovalService, ArtifactBuckets, ArtifactReconciler, InvoicePipeline, InvoiceRegister,
    LogChannel, NotificationChannel, Notifier, StatusClassifier, Validator, WebhookChannel,
};
use invoice_pipeline::storage::{FilesystemObjectStore, MemoryObjectStore, ObjectStore};
use invoice_pipeline::AppConfig;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env()?;
    info!("Starting server with config: {:?}", config);

    // 发票存储：有数据库地址用 PostgreSQL，否则内存
    let store: Arc<dyn InvoiceStore> = match &config.database.url {
        Some(url) => {
            let pool = create_pool(url, &config.database).await?;
            info!("Database pool created");
            if config.database.apply_schema {
                apply_schema(&pool).await?;
            }
            Arc::new(PgInvoiceStore::new(pool))
        }
        None => {
            warn!("No database url configured, using in-memory invoice store");
            Arc::new(MemoryInvoiceStore::new())
        }
    };

    // 对象存储
    let objects: Arc<dyn ObjectStore> = match &config.storage.root {
        Some(root) => {
            info!("Object store root: {}", root);
            Arc::new(FilesystemObjectStore::new(root))
        }
        None => {
            warn!("No storage root configured, using in-memory object store");
            Arc::new(MemoryObjectStore::new())
        }
    };

    // 通知通道
    let channel: Arc<dyn NotificationChannel> = match &config.notification.webhook_url {
        Some(url) => Arc::new(WebhookChannel::new(url.clone())?),
        None => Arc::new(LogChannel),
    };
    let notifier = Notifier::new(
        channel,
        config.notification.approval_endpoint_url()?,
        config.pipeline.high_value_threshold.clone(),
    );

    let reconciler = Arc::new(ArtifactReconciler::new(
        objects.clone(),
        ArtifactBuckets {
            staging: config.storage.staging_bucket.clone(),
            processed: config.storage.processed_bucket.clone(),
            failed: config.storage.failed_bucket.clone(),
        },
    ));

    let pipeline = InvoicePipeline::new(
        store.clone(),
        objects,
        Validator::new(config.pipeline.confidence_threshold),
        StatusClassifier::new(config.pipeline.high_value_threshold.clone()),
        notifier,
        reconciler.clone(),
    )
    .with_conflict_policy(config.pipeline.conflict_policy)
    .with_source_bucket(config.storage.output_bucket.clone());

    let state = AppState {
        pipeline: Arc::new(pipeline),
        approvals: Arc::new(ApprovalService::new(store.clone())),
        register: Arc::new(InvoiceRegister::new(store)),
        reconciler,
    };
    let app = api::router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/extractions      - process extraction result ({})", config.storage.output_bucket);
    info!("  POST /api/artifacts/tag    - tag staged artifact");
    info!("  GET  /api/approval         - approve / reject invoice");
    info!("  GET  /api/invoices[/export|/:id]");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
