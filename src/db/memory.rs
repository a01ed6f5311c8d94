use super::store::{ConflictPolicy, InvoiceStore, PersistenceError};
use crate::models::{
    BankDetailsRow, InvoiceDetail, InvoiceFilter, InvoiceHeader, InvoiceRecord, InvoiceSummary,
    LineItemRow, PersistedInvoice, Status, StatusTransition, WriteDisposition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// vendors 表行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorRow {
    pub vendor_id: i64,
    pub vendor_name: String,
    pub vendor_address: Option<String>,
    pub vendor_phone: Option<String>,
    pub payment_terms: Option<String>,   // 首次写入后不再更新
    pub is_approved: bool,
}

/// customers 表行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRow {
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone)]
struct InvoiceRow {
    header: InvoiceHeader,
}

#[derive(Debug, Clone)]
struct LineItemEntry {
    invoice_id: i64,
    row: LineItemRow,
}

#[derive(Debug, Clone)]
struct BankRow {
    vendor_id: i64,
    row: BankDetailsRow,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    vendors: Vec<VendorRow>,
    customers: Vec<CustomerRow>,
    invoices: Vec<InvoiceRow>,
    line_items: Vec<LineItemEntry>,
    bank_details: Vec<BankRow>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// 各表行数 (测试断言用)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub vendors: usize,
    pub customers: usize,
    pub invoices: usize,
    pub line_items: usize,
    pub bank_details: usize,
}

/// 进程内发票存储
///
/// 每次 `persist` 在表的副本上执行全部写入，成功后整体替换，
/// 与数据库事务一样要么全部可见要么全部不可见。
#[derive(Debug, Default)]
pub struct MemoryInvoiceStore {
    tables: Mutex<Tables>,
    fail_before_commit: AtomicBool,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让下一次 persist 在所有写入完成后、提交前失败
    pub fn fail_next_commit(&self) {
        self.fail_before_commit.store(true, Ordering::SeqCst);
    }

    pub fn counts(&self) -> TableCounts {
        let tables = self.lock();
        TableCounts {
            vendors: tables.vendors.len(),
            customers: tables.customers.len(),
            invoices: tables.invoices.len(),
            line_items: tables.line_items.len(),
            bank_details: tables.bank_details.len(),
        }
    }

    pub fn vendor(&self, vendor_name: &str) -> Option<VendorRow> {
        self.lock()
            .vendors
            .iter()
            .find(|v| v.vendor_name == vendor_name)
            .cloned()
    }

    pub fn customer(&self, customer_name: &str) -> Option<CustomerRow> {
        self.lock()
            .customers
            .iter()
            .find(|c| c.customer_name == customer_name)
            .cloned()
    }

    /// 供应商的收款银行信息
    pub fn bank_details_for(&self, vendor_name: &str) -> Option<BankDetailsRow> {
        let tables = self.lock();
        let vendor_id = tables.vendors.iter().find(|v| v.vendor_name == vendor_name)?.vendor_id;
        tables
            .bank_details
            .iter()
            .find(|b| b.vendor_id == vendor_id)
            .map(|b| b.row.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_invoice(
    tables: &mut Tables,
    record: &InvoiceRecord,
    status: Status,
    policy: ConflictPolicy,
) -> Result<PersistedInvoice, PersistenceError> {
    let (invoice_number, vendor_name) = record
        .natural_key()
        .ok_or(PersistenceError::MissingKey("invoice number or vendor name"))?;

    // vendor upsert
    let vendor_id = match tables.vendors.iter_mut().find(|v| v.vendor_name == vendor_name) {
        Some(vendor) => {
            vendor.vendor_address = record.company_address.clone();
            vendor.vendor_phone = record.company_contact.clone();
            vendor.vendor_id
        }
        None => {
            let vendor_id = tables.next_id();
            tables.vendors.push(VendorRow {
                vendor_id,
                vendor_name: vendor_name.to_string(),
                vendor_address: record.company_address.clone(),
                vendor_phone: record.company_contact.clone(),
                payment_terms: record.payment_terms.clone(),
                is_approved: true,
            });
            vendor_id
        }
    };

    // customer 先查后插
    let customer = record.bill_to.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let customer_id = match customer {
        Some(name) => match tables.customers.iter().find(|c| c.customer_name == name) {
            Some(existing) => Some(existing.customer_id),
            None => {
                let customer_id = tables.next_id();
                tables.customers.push(CustomerRow {
                    customer_id,
                    customer_name: name.to_string(),
                    customer_email: record.client_email.clone(),
                });
                Some(customer_id)
            }
        },
        None => None,
    };

    let existing = tables
        .invoices
        .iter()
        .position(|i| i.header.invoice_number == invoice_number && i.header.vendor_id == vendor_id);

    let disposition = match (existing, policy) {
        (None, _) => WriteDisposition::Inserted,
        (Some(_), ConflictPolicy::Reject) => {
            return Err(PersistenceError::DuplicateInvoice {
                invoice_number: invoice_number.to_string(),
                vendor_name: vendor_name.to_string(),
            })
        }
        (Some(_), ConflictPolicy::Update) => WriteDisposition::Updated,
        (Some(_), ConflictPolicy::Ignore) => WriteDisposition::Ignored,
    };

    let invoice_id = match existing {
        Some(idx) => tables.invoices[idx].header.invoice_id,
        None => tables.next_id(),
    };

    if disposition == WriteDisposition::Ignored {
        return Ok(PersistedInvoice {
            invoice_id,
            vendor_id,
            customer_id,
            line_item_count: 0,
            bank_details_inserted: false,
            disposition,
        });
    }

    let header = InvoiceHeader {
        invoice_id,
        invoice_number: invoice_number.to_string(),
        vendor_id,
        vendor_name: vendor_name.to_string(),
        customer_id,
        customer_name: customer.map(str::to_string),
        invoice_date: record.invoice_date,
        due_date: record.due_date,
        subtotal: record.subtotal.clone(),
        discount: Some(record.discount.clone().unwrap_or_default()),
        tax_amount: record.tax.clone(),
        total_amount: record.total_amount_value(),
        po_number: record.po_number.clone(),
        payment_terms: record.payment_terms.clone(),
        payment_instructions: record.payment_instructions.clone(),
        status,
        confidence_score: Some(record.confidence_percent()),
        s3_key: Some(record.source.key.clone()),
        s3_bucket: Some(record.source.bucket.clone()),
        processed_at: Some(Utc::now()),
    };

    match existing {
        Some(idx) => {
            tables.invoices[idx].header = header;
            tables.line_items.retain(|li| li.invoice_id != invoice_id);
        }
        None => tables.invoices.push(InvoiceRow { header }),
    }

    for (idx, item) in record.line_items.iter().enumerate() {
        tables.line_items.push(LineItemEntry {
            invoice_id,
            row: LineItemRow {
                line_number: idx as i32 + 1,
                description: item.description.clone(),
                quantity: item.quantity.clone(),
                unit_price: item.unit_price.clone(),
                amount: item.amount.clone(),
            },
        });
    }

    let bank_details_inserted = match &record.bank {
        Some(bank) if !tables.bank_details.iter().any(|b| b.vendor_id == vendor_id) => {
            tables.bank_details.push(BankRow {
                vendor_id,
                row: BankDetailsRow {
                    bank_name: Some(bank.bank_name.clone()),
                    account_number: bank.account_number.clone(),
                    routing_number: bank.routing_number.clone(),
                },
            });
            true
        }
        _ => false,
    };

    Ok(PersistedInvoice {
        invoice_id,
        vendor_id,
        customer_id,
        line_item_count: record.line_items.len(),
        bank_details_inserted,
        disposition,
    })
}

fn summary_of(header: &InvoiceHeader) -> InvoiceSummary {
    InvoiceSummary {
        invoice_id: header.invoice_id,
        invoice_number: header.invoice_number.clone(),
        vendor_name: header.vendor_name.clone(),
        total_amount: header.total_amount.clone(),
        status: header.status,
        processed_at: header.processed_at,
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn persist(
        &self,
        record: &InvoiceRecord,
        status: Status,
        policy: ConflictPolicy,
    ) -> Result<PersistedInvoice, PersistenceError> {
        let mut tables = self.lock();
        let mut staged = tables.clone();

        let persisted = write_invoice(&mut staged, record, status, policy)?;

        if self.fail_before_commit.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::Aborted(
                "injected failure before commit".to_string(),
            ));
        }

        *tables = staged;
        Ok(persisted)
    }

    async fn find_invoice(&self, invoice_id: i64) -> Result<Option<InvoiceSummary>, PersistenceError> {
        Ok(self
            .lock()
            .invoices
            .iter()
            .find(|i| i.header.invoice_id == invoice_id)
            .map(|i| summary_of(&i.header)))
    }

    async fn invoice_detail(&self, invoice_id: i64) -> Result<Option<InvoiceDetail>, PersistenceError> {
        let tables = self.lock();
        let Some(invoice) = tables.invoices.iter().find(|i| i.header.invoice_id == invoice_id) else {
            return Ok(None);
        };

        let mut line_items: Vec<LineItemRow> = tables
            .line_items
            .iter()
            .filter(|li| li.invoice_id == invoice_id)
            .map(|li| li.row.clone())
            .collect();
        line_items.sort_by_key(|li| li.line_number);

        let bank_details = tables
            .bank_details
            .iter()
            .find(|b| b.vendor_id == invoice.header.vendor_id)
            .map(|b| b.row.clone());

        Ok(Some(InvoiceDetail {
            header: invoice.header.clone(),
            line_items,
            bank_details,
        }))
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceSummary>, PersistenceError> {
        let tables = self.lock();
        let mut rows: Vec<InvoiceSummary> = tables
            .invoices
            .iter()
            .filter(|i| filter.status.map_or(true, |s| i.header.status == s))
            .map(|i| summary_of(&i.header))
            .collect();
        rows.sort_by(|a, b| {
            b.processed_at
                .cmp(&a.processed_at)
                .then_with(|| b.invoice_id.cmp(&a.invoice_id))
        });
        rows.truncate(filter.limit.max(0) as usize);
        Ok(rows)
    }

    async fn transition_status(
        &self,
        invoice_id: i64,
        status: Status,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, PersistenceError> {
        let mut tables = self.lock();
        let Some(invoice) = tables
            .invoices
            .iter_mut()
            .find(|i| i.header.invoice_id == invoice_id)
        else {
            return Ok(None);
        };

        let previous_status = invoice.header.status;
        invoice.header.status = status;
        invoice.header.processed_at = Some(at);

        Ok(Some(StatusTransition {
            invoice_id,
            invoice_number: invoice.header.invoice_number.clone(),
            vendor_name: invoice.header.vendor_name.clone(),
            total_amount: invoice.header.total_amount.clone(),
            previous_status,
            new_status: status,
            processed_at: at,
        }))
    }
}
