//! PostgreSQL store tests.
//!
//! Need a scratch database: `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

mod common;

use bigdecimal::BigDecimal;
use chrono::Utc;
use common::record;
use invoice_pipeline::config::DatabaseConfig;
use invoice_pipeline::db::{
    apply_schema, create_pool, write_invoice, ConflictPolicy, InvoiceStore, PersistenceError,
    PgInvoiceStore,
};
use invoice_pipeline::models::{BankInfo, InvoiceFilter, LineItem, Status, WriteDisposition};
use sqlx::PgPool;
use std::str::FromStr;

struct TestDb {
    pool: PgPool,
    prefix: String,
}

impl TestDb {
    async fn new() -> Self {
        let url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "postgresql:///invoice_pipeline_test".into());

        let pool = create_pool(&url, &DatabaseConfig::default()).await.unwrap();
        apply_schema(&pool).await.unwrap();
        let prefix = format!("pgtest_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
        Self { pool, prefix }
    }

    fn name(&self, base: &str) -> String {
        format!("{}_{}", self.prefix, base)
    }

    async fn count_invoices(&self, number: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE invoice_number = $1")
            .bind(number)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn cleanup(&self) {
        let pattern = format!("{}%", self.prefix);
        sqlx::query("DELETE FROM invoices WHERE invoice_number LIKE $1")
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("DELETE FROM bank_details WHERE vendor_id IN (SELECT vendor_id FROM vendors WHERE vendor_name LIKE $1)")
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("DELETE FROM vendors WHERE vendor_name LIKE $1")
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("DELETE FROM customers WHERE customer_name LIKE $1")
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();
    }
}

fn items(n: usize) -> Vec<LineItem> {
    (1..=n)
        .map(|i| LineItem {
            description: Some(format!("item {}", i)),
            quantity: Some(BigDecimal::from(i as i64)),
            unit_price: BigDecimal::from_str("10.50").ok(),
            amount: BigDecimal::from_str("10.50").ok().map(|p| p * BigDecimal::from(i as i64)),
            line_number: i as i32,
        })
        .collect()
}

#[tokio::test]
#[ignore]
async fn persist_round_trips_line_items_in_order() {
    let db = TestDb::new().await;
    let store = PgInvoiceStore::new(db.pool.clone());

    let mut rec = record(&db.name("INV-1"), &db.name("Acme"), "1,000.00");
    rec.bill_to = Some(db.name("Globex"));
    rec.line_items = items(5);
    rec.bank = Some(BankInfo {
        bank_name: "First Bank".into(),
        account_number: Some("0001".into()),
        routing_number: Some("021000021".into()),
    });

    let persisted = store.persist(&rec, Status::Approved, ConflictPolicy::Reject).await.unwrap();
    assert_eq!(persisted.disposition, WriteDisposition::Inserted);
    assert!(persisted.bank_details_inserted);

    let detail = store.invoice_detail(persisted.invoice_id).await.unwrap().unwrap();
    let numbers: Vec<i32> = detail.line_items.iter().map(|li| li.line_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert_eq!(detail.line_items[2].description.as_deref(), Some("item 3"));
    assert_eq!(detail.header.total_amount, BigDecimal::from_str("1000.00").ok());
    assert_eq!(detail.header.confidence_score, BigDecimal::from_str("95.00").ok());
    assert_eq!(detail.header.customer_name, Some(db.name("Globex")));
    assert_eq!(
        detail.bank_details.and_then(|b| b.bank_name),
        Some("First Bank".to_string())
    );

    let listed = store
        .list_invoices(&InvoiceFilter { status: Some(Status::Approved), limit: 1000 })
        .await
        .unwrap();
    assert!(listed.iter().any(|s| s.invoice_id == persisted.invoice_id));

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn uncommitted_write_leaves_no_rows() {
    let db = TestDb::new().await;
    let number = db.name("INV-ATOMIC");
    let mut rec = record(&number, &db.name("Acme"), "100.00");
    rec.line_items = items(3);

    {
        let mut tx = db.pool.begin().await.unwrap();
        let persisted = write_invoice(&mut tx, &rec, Status::Approved, ConflictPolicy::Reject)
            .await
            .unwrap();
        assert_eq!(persisted.line_item_count, 3);
        // 明细已写入但未提交，事务随 drop 回滚
    }

    assert_eq!(db.count_invoices(&number).await, 0);
    let line_items: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM invoice_line_items li JOIN invoices i USING (invoice_id) WHERE i.invoice_number = $1",
    )
    .bind(&number)
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(line_items, 0);

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn duplicate_invoice_is_typed() {
    let db = TestDb::new().await;
    let store = PgInvoiceStore::new(db.pool.clone());
    let rec = record(&db.name("INV-DUP"), &db.name("Acme"), "100.00");

    store.persist(&rec, Status::Approved, ConflictPolicy::Reject).await.unwrap();
    let err = store.persist(&rec, Status::Approved, ConflictPolicy::Reject).await.unwrap_err();
    assert!(matches!(err, PersistenceError::DuplicateInvoice { .. }));

    let ignored = store.persist(&rec, Status::Approved, ConflictPolicy::Ignore).await.unwrap();
    assert_eq!(ignored.disposition, WriteDisposition::Ignored);

    let updated = store.persist(&rec, Status::Failed, ConflictPolicy::Update).await.unwrap();
    assert_eq!(updated.disposition, WriteDisposition::Updated);
    assert_eq!(
        store.find_invoice(updated.invoice_id).await.unwrap().unwrap().status,
        Status::Failed
    );
    assert_eq!(db.count_invoices(&rec.invoice_number.clone().unwrap()).await, 1);

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn transition_status_reports_previous_state() {
    let db = TestDb::new().await;
    let store = PgInvoiceStore::new(db.pool.clone());
    let rec = record(&db.name("INV-T"), &db.name("Acme"), "75000.00");
    let id = store
        .persist(&rec, Status::PendingReview, ConflictPolicy::Reject)
        .await
        .unwrap()
        .invoice_id;

    let at = Utc::now();
    let transition = store.transition_status(id, Status::Rejected, at).await.unwrap().unwrap();
    assert_eq!(transition.previous_status, Status::PendingReview);
    assert_eq!(transition.new_status, Status::Rejected);

    assert!(store.transition_status(-1, Status::Approved, at).await.unwrap().is_none());

    db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn bank_details_keep_the_first_account() {
    let db = TestDb::new().await;
    let store = PgInvoiceStore::new(db.pool.clone());
    let vendor = db.name("Acme");

    let mut first = record(&db.name("INV-B1"), &vendor, "100.00");
    first.bank = Some(BankInfo {
        bank_name: "First Bank".into(),
        account_number: Some("0001".into()),
        routing_number: None,
    });
    let mut second = record(&db.name("INV-B2"), &vendor, "200.00");
    second.bank = Some(BankInfo {
        bank_name: "Second Bank".into(),
        account_number: Some("0002".into()),
        routing_number: None,
    });

    assert!(store.persist(&first, Status::Approved, ConflictPolicy::Reject).await.unwrap().bank_details_inserted);
    let persisted = store.persist(&second, Status::Approved, ConflictPolicy::Reject).await.unwrap();
    assert!(!persisted.bank_details_inserted);

    let detail = store.invoice_detail(persisted.invoice_id).await.unwrap().unwrap();
    assert_eq!(detail.bank_details.and_then(|b| b.bank_name), Some("First Bank".to_string()));

    db.cleanup().await;
}
