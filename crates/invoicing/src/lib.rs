//! Invoicing domain module.
//!
//! This crate contains business rules for invoices and the records around them
//! (customers, line items, audit history, share links, reminders, statistics),
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod company;
pub mod history;
pub mod invoice;
pub mod item;
pub mod money;
pub mod numbering;
pub mod reminder;
pub mod sharing;
pub mod stats;

pub use company::{Company, ContactInfo, Customer, NewCompany, NewCustomer, User};
pub use history::{HistoryAction, HistoryEntry};
pub use invoice::{
    Invoice, InvoiceStatus, InvoiceType, InvoiceUpdate, NewInvoice, PaymentDetails, StatusChange,
    build_items,
};
pub use item::{InvoiceItem, ItemUpdate, NewInvoiceItem};
pub use money::Totals;
pub use numbering::InvoiceNumber;
pub use reminder::{NewReminder, Reminder, ReminderOutcome};
pub use sharing::{ShareDenied, ShareState, generate_share_token};
pub use stats::{CompanyStats, StatsRange};
