//! Approval decisions over {approve, reject} × {existing, missing invoice}.

mod common;

use common::*;
use invoice_pipeline::db::{ConflictPolicy, InvoiceStore};
use invoice_pipeline::models::{ApprovalAction, Status};
use invoice_pipeline::service::ApprovalError;

async fn pending_invoice(h: &Harness) -> i64 {
    h.store
        .persist(&record("INV-100", "Acme", "75000.00"), Status::PendingReview, ConflictPolicy::Reject)
        .await
        .unwrap()
        .invoice_id
}

#[tokio::test]
async fn approve_existing_invoice() {
    let h = Harness::new();
    let id = pending_invoice(&h).await;

    let receipt = h.approvals.decide(id, ApprovalAction::Approve).await.unwrap();
    assert_eq!(receipt.invoice_number, "INV-100");
    assert_eq!(receipt.vendor_name, "Acme");
    assert_eq!(receipt.previous_status, Status::PendingReview);
    assert_eq!(receipt.new_status, Status::Approved);
    assert_eq!(h.store.find_invoice(id).await.unwrap().unwrap().status, Status::Approved);
}

#[tokio::test]
async fn reject_existing_invoice() {
    let h = Harness::new();
    let id = pending_invoice(&h).await;

    let receipt = h.approvals.apply(Some(&id.to_string()), Some("reject")).await.unwrap();
    assert_eq!(receipt.new_status, Status::Rejected);

    let invoice = h.store.find_invoice(id).await.unwrap().unwrap();
    assert_eq!(invoice.status, Status::Rejected);
    assert_eq!(invoice.processed_at, Some(receipt.decided_at));
}

#[tokio::test]
async fn approve_missing_invoice() {
    let h = Harness::new();
    let err = h.approvals.decide(404, ApprovalAction::Approve).await.unwrap_err();
    assert!(matches!(err, ApprovalError::NotFound(404)));
}

#[tokio::test]
async fn reject_missing_invoice() {
    let h = Harness::new();
    let err = h.approvals.apply(Some("404"), Some("reject")).await.unwrap_err();
    assert!(matches!(err, ApprovalError::NotFound(404)));
    assert_eq!(h.store.counts().invoices, 0);
}

#[tokio::test]
async fn re_approval_is_applied() {
    let h = Harness::new();
    let id = pending_invoice(&h).await;

    h.approvals.decide(id, ApprovalAction::Approve).await.unwrap();
    let again = h.approvals.decide(id, ApprovalAction::Approve).await.unwrap();
    assert_eq!(again.previous_status, Status::Approved);
    assert_eq!(again.new_status, Status::Approved);
}

#[tokio::test]
async fn action_must_match_exactly() {
    let h = Harness::new();
    let id = pending_invoice(&h).await;

    for raw in ["Approve", "APPROVE", "Reject"] {
        let err = h.approvals.apply(Some(&id.to_string()), Some(raw)).await.unwrap_err();
        assert!(matches!(err, ApprovalError::InvalidAction(ref a) if a == raw), "action {:?}", raw);
    }
    assert_eq!(h.store.find_invoice(id).await.unwrap().unwrap().status, Status::PendingReview);
}
