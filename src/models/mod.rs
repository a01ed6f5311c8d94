pub mod invoice;
pub mod status;
pub mod stored;
pub mod validation;

pub use invoice::{format_money, parse_amount, BankInfo, InvoiceRecord, LineItem};
pub use status::{ApprovalAction, Classification, ReviewReason, Status, UnknownStatus};
pub use stored::{
    BankDetailsRow, InvoiceDetail, InvoiceFilter, InvoiceHeader, InvoiceSummary, LineItemRow,
    PersistedInvoice, StatusTransition, WriteDisposition,
};
pub use validation::{RequiredField, ValidationError, ValidationOutcome, ValidationWarning};
