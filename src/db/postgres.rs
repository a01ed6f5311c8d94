use super::queries;
use super::store::{ConflictPolicy, InvoiceStore, PersistenceError};
use crate::models::{
    InvoiceDetail, InvoiceFilter, InvoiceRecord, InvoiceSummary, PersistedInvoice, Status,
    StatusTransition, WriteDisposition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

/// PostgreSQL 发票存储
#[derive(Debug, Clone)]
pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 在调用方事务内写入一张发票 (不提交)
///
/// 顺序: vendor upsert → customer → invoice → 明细 → 银行信息。
pub async fn write_invoice(
    conn: &mut PgConnection,
    record: &InvoiceRecord,
    status: Status,
    policy: ConflictPolicy,
) -> Result<PersistedInvoice, PersistenceError> {
    let (invoice_number, vendor_name) = record
        .natural_key()
        .ok_or(PersistenceError::MissingKey("invoice number or vendor name"))?;

    let vendor_id = queries::upsert_vendor(&mut *conn, record, vendor_name).await?;

    let customer_id = match record.bill_to.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => Some(
            queries::find_or_insert_customer(&mut *conn, name, record.client_email.as_deref())
                .await?,
        ),
        None => None,
    };

    let (invoice_id, inserted) = queries::insert_invoice(
        &mut *conn,
        record,
        invoice_number,
        vendor_id,
        customer_id,
        status,
        policy,
        Utc::now(),
    )
    .await
    .map_err(|e| duplicate_or_database(e, invoice_number, vendor_name))?;

    let disposition = match (inserted, policy) {
        (true, _) => WriteDisposition::Inserted,
        (false, ConflictPolicy::Update) => WriteDisposition::Updated,
        (false, _) => WriteDisposition::Ignored,
    };

    if disposition == WriteDisposition::Ignored {
        tracing::info!(
            "Invoice {} for vendor {} already exists (id {}), ignoring duplicate",
            invoice_number, vendor_name, invoice_id
        );
        return Ok(PersistedInvoice {
            invoice_id,
            vendor_id,
            customer_id,
            line_item_count: 0,
            bank_details_inserted: false,
            disposition,
        });
    }

    if disposition == WriteDisposition::Updated {
        let removed = queries::delete_line_items(&mut *conn, invoice_id).await?;
        tracing::debug!("Replacing {} line items of invoice {}", removed, invoice_id);
    }

    let line_item_count = queries::insert_line_items(&mut *conn, invoice_id, &record.line_items).await?;

    let bank_details_inserted = match &record.bank {
        Some(bank) => queries::insert_bank_details(&mut *conn, vendor_id, bank).await?,
        None => false,
    };

    Ok(PersistedInvoice {
        invoice_id,
        vendor_id,
        customer_id,
        line_item_count: line_item_count as usize,
        bank_details_inserted,
        disposition,
    })
}

/// 唯一约束冲突转换为 DuplicateInvoice
fn duplicate_or_database(err: sqlx::Error, invoice_number: &str, vendor_name: &str) -> PersistenceError {
    if let sqlx::Error::Database(db_err) = &err {
        let unique_violation = db_err.code().as_deref() == Some("23505");
        if unique_violation && db_err.constraint() == Some(queries::INVOICE_UNIQUE_CONSTRAINT) {
            return PersistenceError::DuplicateInvoice {
                invoice_number: invoice_number.to_string(),
                vendor_name: vendor_name.to_string(),
            };
        }
    }
    PersistenceError::Database(err)
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn persist(
        &self,
        record: &InvoiceRecord,
        status: Status,
        policy: ConflictPolicy,
    ) -> Result<PersistedInvoice, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        // 出错时 tx 被 drop，事务自动回滚
        let persisted = match write_invoice(&mut tx, record, status, policy).await {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::error!("✗ Invoice write for job {} rolled back: {}", record.job_id, e);
                return Err(e);
            }
        };

        tx.commit().await?;
        tracing::info!(
            "✓ Invoice {:?} saved (ID: {}, status: {}, {} line items)",
            record.invoice_number, persisted.invoice_id, status, persisted.line_item_count
        );
        Ok(persisted)
    }

    async fn find_invoice(&self, invoice_id: i64) -> Result<Option<InvoiceSummary>, PersistenceError> {
        Ok(queries::get_invoice_summary(&self.pool, invoice_id).await?)
    }

    async fn invoice_detail(&self, invoice_id: i64) -> Result<Option<InvoiceDetail>, PersistenceError> {
        let Some(header) = queries::get_invoice_header(&self.pool, invoice_id).await? else {
            return Ok(None);
        };
        let line_items = queries::list_line_items(&self.pool, invoice_id).await?;
        let bank_details = queries::get_bank_details(&self.pool, header.vendor_id).await?;
        Ok(Some(InvoiceDetail {
            header,
            line_items,
            bank_details,
        }))
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceSummary>, PersistenceError> {
        Ok(queries::list_invoices(&self.pool, filter).await?)
    }

    async fn transition_status(
        &self,
        invoice_id: i64,
        status: Status,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let Some((invoice_number, vendor_name, total_amount, current)) =
            queries::lock_invoice_for_update(&mut tx, invoice_id).await?
        else {
            return Ok(None);
        };

        let previous_status: Status = current
            .parse()
            .map_err(|e: crate::models::UnknownStatus| PersistenceError::Aborted(e.to_string()))?;

        queries::update_status(&mut tx, invoice_id, status, at).await?;
        tx.commit().await?;

        Ok(Some(StatusTransition {
            invoice_id,
            invoice_number,
            vendor_name,
            total_amount,
            previous_status,
            new_status: status,
            processed_at: at,
        }))
    }
}
