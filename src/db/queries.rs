use super::store::ConflictPolicy;
use crate::models::{
    BankDetailsRow, BankInfo, InvoiceFilter, InvoiceHeader, InvoiceRecord, InvoiceSummary,
    LineItem, LineItemRow, Status,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};

/// invoices 表唯一约束名
pub const INVOICE_UNIQUE_CONSTRAINT: &str = "invoices_invoice_number_vendor_id_key";

/// 插入或更新供应商 (按名称)；冲突时只更新地址和电话，不动审批标记
pub async fn upsert_vendor(
    conn: &mut PgConnection,
    record: &InvoiceRecord,
    vendor_name: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO vendors (vendor_name, vendor_address, vendor_phone, vendor_email, payment_terms, is_approved)
        VALUES ($1, $2, $3, NULL, $4, TRUE)
        ON CONFLICT (vendor_name) DO UPDATE SET
            vendor_address = EXCLUDED.vendor_address,
            vendor_phone = EXCLUDED.vendor_phone
        RETURNING vendor_id
        "#
    )
    .bind(vendor_name)
    .bind(&record.company_address)
    .bind(&record.company_contact)
    .bind(&record.payment_terms)
    .fetch_one(conn)
    .await
}

/// 客户先查后插 (同名客户复用，不更新)
pub async fn find_or_insert_customer(
    conn: &mut PgConnection,
    customer_name: &str,
    customer_email: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let existing = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT customer_id
        FROM customers
        WHERE customer_name = $1
        ORDER BY customer_id
        LIMIT 1
        "#
    )
    .bind(customer_name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(customer_id) = existing {
        return Ok(customer_id);
    }

    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO customers (customer_name, customer_address, customer_email)
        VALUES ($1, $1, $2)
        RETURNING customer_id
        "#
    )
    .bind(customer_name)
    .bind(customer_email)
    .fetch_one(conn)
    .await
}

/// 插入发票主表
///
/// 返回 `(invoice_id, inserted)`；`inserted = false` 表示命中了已有发票
/// (update 策略下为覆盖，ignore 策略下为跳过)。reject 策略下冲突以数据库错误返回。
pub async fn insert_invoice(
    conn: &mut PgConnection,
    record: &InvoiceRecord,
    invoice_number: &str,
    vendor_id: i64,
    customer_id: Option<i64>,
    status: Status,
    policy: ConflictPolicy,
    processed_at: DateTime<Utc>,
) -> Result<(i64, bool), sqlx::Error> {
    let conflict_clause = match policy {
        ConflictPolicy::Reject => "",
        ConflictPolicy::Update => {
            r#"
            ON CONFLICT (invoice_number, vendor_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                invoice_date = EXCLUDED.invoice_date,
                due_date = EXCLUDED.due_date,
                subtotal = EXCLUDED.subtotal,
                discount = EXCLUDED.discount,
                tax_amount = EXCLUDED.tax_amount,
                total_amount = EXCLUDED.total_amount,
                po_number = EXCLUDED.po_number,
                payment_terms = EXCLUDED.payment_terms,
                payment_instructions = EXCLUDED.payment_instructions,
                status = EXCLUDED.status,
                confidence_score = EXCLUDED.confidence_score,
                s3_key = EXCLUDED.s3_key,
                s3_bucket = EXCLUDED.s3_bucket,
                processed_at = EXCLUDED.processed_at
            "#
        }
        ConflictPolicy::Ignore => "ON CONFLICT (invoice_number, vendor_id) DO NOTHING",
    };

    let sql = format!(
        r#"
        INSERT INTO invoices (
            invoice_number, vendor_id, customer_id,
            invoice_date, due_date,
            subtotal, discount, tax_amount, total_amount,
            po_number, payment_terms, payment_instructions,
            status, confidence_score,
            s3_key, s3_bucket,
            processed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        {}
        RETURNING invoice_id, (xmax = 0) AS inserted
        "#,
        conflict_clause
    );

    let row = sqlx::query(&sql)
        .bind(invoice_number)
        .bind(vendor_id)
        .bind(customer_id)
        .bind(record.invoice_date)
        .bind(record.due_date)
        .bind(&record.subtotal)
        .bind(record.discount.clone().unwrap_or_default())
        .bind(&record.tax)
        .bind(record.total_amount_value())
        .bind(&record.po_number)
        .bind(&record.payment_terms)
        .bind(&record.payment_instructions)
        .bind(status.as_str())
        .bind(record.confidence_percent())
        .bind(&record.source.key)
        .bind(&record.source.bucket)
        .bind(processed_at)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok((row.try_get("invoice_id")?, row.try_get("inserted")?)),
        // ignore 策略命中冲突：返回已有发票
        None => {
            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT invoice_id FROM invoices WHERE invoice_number = $1 AND vendor_id = $2",
            )
            .bind(invoice_number)
            .bind(vendor_id)
            .fetch_one(conn)
            .await?;
            Ok((existing, false))
        }
    }
}

/// 删除发票全部明细 (覆盖写入前)
pub async fn delete_line_items(conn: &mut PgConnection, invoice_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
        .bind(invoice_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// 批量插入明细，line_number 按位置从 1 开始编号
pub async fn insert_line_items(
    conn: &mut PgConnection,
    invoice_id: i64,
    items: &[LineItem],
) -> Result<u64, sqlx::Error> {
    if items.is_empty() {
        return Ok(0);
    }

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO invoice_line_items (
            invoice_id, description, quantity, unit_price, amount, line_number
        ) "
    );

    query_builder.push_values(items.iter().enumerate(), |mut b, (idx, item)| {
        b.push_bind(invoice_id)
            .push_bind(item.description.clone())
            .push_bind(item.quantity.clone())
            .push_bind(item.unit_price.clone())
            .push_bind(item.amount.clone())
            .push_bind(idx as i32 + 1);
    });

    let result = query_builder.build().execute(conn).await?;
    tracing::debug!("Inserted {} line items for invoice {}", result.rows_affected(), invoice_id);
    Ok(result.rows_affected())
}

/// 银行信息每个供应商只保留首条
pub async fn insert_bank_details(
    conn: &mut PgConnection,
    vendor_id: i64,
    bank: &BankInfo,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO bank_details (vendor_id, bank_name, account_number, routing_number)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (vendor_id) DO NOTHING
        "#
    )
    .bind(vendor_id)
    .bind(&bank.bank_name)
    .bind(&bank.account_number)
    .bind(&bank.routing_number)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

const SUMMARY_SELECT: &str = r#"
    SELECT i.invoice_id, i.invoice_number, v.vendor_name, i.total_amount, i.status, i.processed_at
    FROM invoices i
    JOIN vendors v ON i.vendor_id = v.vendor_id
"#;

/// 查询发票概要
pub async fn get_invoice_summary(
    pool: &PgPool,
    invoice_id: i64,
) -> Result<Option<InvoiceSummary>, sqlx::Error> {
    let sql = format!("{} WHERE i.invoice_id = $1", SUMMARY_SELECT);
    sqlx::query_as::<_, InvoiceSummary>(&sql)
        .bind(invoice_id)
        .fetch_optional(pool)
        .await
}

/// 登记簿查询 (最近处理的在前)
pub async fn list_invoices(
    pool: &PgPool,
    filter: &InvoiceFilter,
) -> Result<Vec<InvoiceSummary>, sqlx::Error> {
    let sql = format!(
        r#"{}
        WHERE ($1::varchar IS NULL OR i.status = $1)
        ORDER BY i.processed_at DESC NULLS LAST, i.invoice_id DESC
        LIMIT $2
        "#,
        SUMMARY_SELECT
    );
    sqlx::query_as::<_, InvoiceSummary>(&sql)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.limit)
    .fetch_all(pool)
    .await
}

/// 查询发票主表 (含供应商、客户名)
pub async fn get_invoice_header(
    pool: &PgPool,
    invoice_id: i64,
) -> Result<Option<InvoiceHeader>, sqlx::Error> {
    sqlx::query_as::<_, InvoiceHeader>(
        r#"
        SELECT i.invoice_id, i.invoice_number, i.vendor_id, v.vendor_name,
               i.customer_id, c.customer_name,
               i.invoice_date, i.due_date,
               i.subtotal, i.discount, i.tax_amount, i.total_amount,
               i.po_number, i.payment_terms, i.payment_instructions,
               i.status, i.confidence_score, i.s3_key, i.s3_bucket, i.processed_at
        FROM invoices i
        JOIN vendors v ON i.vendor_id = v.vendor_id
        LEFT JOIN customers c ON i.customer_id = c.customer_id
        WHERE i.invoice_id = $1
        "#
    )
    .bind(invoice_id)
    .fetch_optional(pool)
    .await
}

/// 查询明细 (按 line_number 升序)
pub async fn list_line_items(
    pool: &PgPool,
    invoice_id: i64,
) -> Result<Vec<LineItemRow>, sqlx::Error> {
    sqlx::query_as::<_, LineItemRow>(
        r#"
        SELECT line_number, description, quantity, unit_price, amount
        FROM invoice_line_items
        WHERE invoice_id = $1
        ORDER BY line_number
        "#
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await
}

pub async fn get_bank_details(
    pool: &PgPool,
    vendor_id: i64,
) -> Result<Option<BankDetailsRow>, sqlx::Error> {
    sqlx::query_as::<_, BankDetailsRow>(
        r#"
        SELECT bank_name, account_number, routing_number
        FROM bank_details
        WHERE vendor_id = $1
        LIMIT 1
        "#
    )
    .bind(vendor_id)
    .fetch_optional(pool)
    .await
}

/// 审批用：锁定发票行并读取当前状态
pub async fn lock_invoice_for_update(
    conn: &mut PgConnection,
    invoice_id: i64,
) -> Result<Option<(String, String, Option<BigDecimal>, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String, Option<BigDecimal>, String)>(
        r#"
        SELECT i.invoice_number, v.vendor_name, i.total_amount, i.status
        FROM invoices i
        JOIN vendors v ON i.vendor_id = v.vendor_id
        WHERE i.invoice_id = $1
        FOR UPDATE OF i
        "#
    )
    .bind(invoice_id)
    .fetch_optional(conn)
    .await
}

pub async fn update_status(
    conn: &mut PgConnection,
    invoice_id: i64,
    status: Status,
    processed_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET status = $1, processed_at = $2
        WHERE invoice_id = $3
        "#
    )
    .bind(status.as_str())
    .bind(processed_at)
    .bind(invoice_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
