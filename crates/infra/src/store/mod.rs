//! Persistence boundary.
//!
//! Reads go straight through [`BillingStore`]. Every mutation runs inside
//! [`BillingStore::transaction`]: the closure sees a [`StoreTx`] and either all
//! of its writes become visible or none do. Invoice number allocation happens
//! through the same transaction, so a number is never handed out without its
//! invoice and vice versa.

mod memory;
mod sequence;

pub use memory::InMemoryBillingStore;
pub use sequence::InvoiceSequences;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use invoicely_core::{
    CompanyId, CustomerId, ExpectedVersion, InvoiceId, InvoiceItemId, ScheduleId, UserId,
};
use invoicely_invoicing::{
    Company, Customer, HistoryEntry, Invoice, InvoiceItem, InvoiceNumber, Reminder, User,
};
use invoicely_recurring::RecurringSchedule;

use crate::error::StoreError;

/// Write side of a store transaction.
///
/// Reads through the transaction see its own uncommitted writes. Records owned
/// by another company behave as absent.
pub trait StoreTx {
    /// Reserve the next `{year}{seq:04}` number for `company_id`.
    fn allocate_invoice_number(
        &mut self,
        company_id: CompanyId,
        year: i32,
    ) -> Result<InvoiceNumber, StoreError>;

    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError>;
    fn put_company(&mut self, company: Company) -> Result<(), StoreError>;

    fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Option<Customer>, StoreError>;
    fn put_customer(&mut self, customer: Customer) -> Result<(), StoreError>;
    /// Hard delete. `Conflict` while any invoice still references the customer.
    fn remove_customer(&mut self, company_id: CompanyId, id: CustomerId) -> Result<(), StoreError>;

    fn put_user(&mut self, user: User) -> Result<(), StoreError>;

    fn invoice(&self, company_id: CompanyId, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;
    /// Insert a new invoice. `Conflict` when its number is already taken
    /// within the company. Returns the stored record (version 1).
    fn insert_invoice(&mut self, invoice: Invoice) -> Result<Invoice, StoreError>;
    /// Replace an invoice after the version check. Returns the stored record.
    fn update_invoice(
        &mut self,
        invoice: Invoice,
        expected: ExpectedVersion,
    ) -> Result<Invoice, StoreError>;

    fn invoice_items(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError>;
    /// Insert or replace a line item by id.
    fn put_item(&mut self, item: InvoiceItem) -> Result<(), StoreError>;
    fn remove_item(&mut self, invoice_id: InvoiceId, item_id: InvoiceItemId) -> Result<(), StoreError>;
    fn remove_items(&mut self, invoice_id: InvoiceId) -> Result<usize, StoreError>;

    /// Insert-only.
    fn append_history(&mut self, entry: HistoryEntry) -> Result<(), StoreError>;
    /// Insert-only.
    fn insert_reminder(&mut self, reminder: Reminder) -> Result<(), StoreError>;

    fn schedule(
        &self,
        company_id: CompanyId,
        id: ScheduleId,
    ) -> Result<Option<RecurringSchedule>, StoreError>;
    /// Schedules using `invoice_id` as their template.
    fn schedules_for_template(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
    ) -> Result<Vec<RecurringSchedule>, StoreError>;
    /// Schedules whose template bills `customer_id`.
    fn schedules_for_customer(
        &self,
        company_id: CompanyId,
        customer_id: CustomerId,
    ) -> Result<Vec<RecurringSchedule>, StoreError>;
    /// Insert (`ExpectedVersion::Exact(0)`) or replace a schedule after the
    /// version check. Returns the stored record.
    fn put_schedule(
        &mut self,
        schedule: RecurringSchedule,
        expected: ExpectedVersion,
    ) -> Result<RecurringSchedule, StoreError>;
}

/// Billing persistence.
///
/// Implementations must run each transaction atomically and serialize
/// number allocation per company and year.
pub trait BillingStore: Send + Sync {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E>,
        E: From<StoreError>;

    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError>;
    fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Option<Customer>, StoreError>;
    fn customers(&self, company_id: CompanyId) -> Result<Vec<Customer>, StoreError>;
    fn users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError>;

    /// Includes tombstoned invoices; callers decide whether to hide them.
    fn invoice(&self, company_id: CompanyId, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;
    fn invoices(&self, company_id: CompanyId) -> Result<Vec<Invoice>, StoreError>;
    fn invoice_items(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError>;
    fn invoice_by_share_token(&self, token: &str) -> Result<Option<Invoice>, StoreError>;

    /// Number the next allocation would return, without reserving it.
    fn peek_invoice_number(&self, company_id: CompanyId, year: i32) -> Result<InvoiceNumber, StoreError>;

    /// Entries for one invoice in insertion order.
    fn history(&self, company_id: CompanyId, invoice_id: InvoiceId) -> Result<Vec<HistoryEntry>, StoreError>;
    fn reminders(&self, company_id: CompanyId, invoice_id: InvoiceId) -> Result<Vec<Reminder>, StoreError>;

    fn schedule(&self, company_id: CompanyId, id: ScheduleId) -> Result<Option<RecurringSchedule>, StoreError>;
    fn schedules(&self, company_id: CompanyId) -> Result<Vec<RecurringSchedule>, StoreError>;
    /// Active schedules of every company with `next_generation_date <= today`.
    fn due_schedules(&self, today: NaiveDate) -> Result<Vec<RecurringSchedule>, StoreError>;

    /// Atomically count one view of a live share link. Returns `false` when
    /// the token does not resolve at `now`.
    fn record_share_view(&self, token: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
}

impl<S> BillingStore for Arc<S>
where
    S: BillingStore,
{
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).transaction(f)
    }

    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError> {
        (**self).company(id)
    }

    fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        (**self).customer(company_id, id)
    }

    fn customers(&self, company_id: CompanyId) -> Result<Vec<Customer>, StoreError> {
        (**self).customers(company_id)
    }

    fn users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        (**self).users(ids)
    }

    fn invoice(&self, company_id: CompanyId, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        (**self).invoice(company_id, id)
    }

    fn invoices(&self, company_id: CompanyId) -> Result<Vec<Invoice>, StoreError> {
        (**self).invoices(company_id)
    }

    fn invoice_items(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError> {
        (**self).invoice_items(invoice_id)
    }

    fn invoice_by_share_token(&self, token: &str) -> Result<Option<Invoice>, StoreError> {
        (**self).invoice_by_share_token(token)
    }

    fn peek_invoice_number(&self, company_id: CompanyId, year: i32) -> Result<InvoiceNumber, StoreError> {
        (**self).peek_invoice_number(company_id, year)
    }

    fn history(&self, company_id: CompanyId, invoice_id: InvoiceId) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(company_id, invoice_id)
    }

    fn reminders(&self, company_id: CompanyId, invoice_id: InvoiceId) -> Result<Vec<Reminder>, StoreError> {
        (**self).reminders(company_id, invoice_id)
    }

    fn schedule(&self, company_id: CompanyId, id: ScheduleId) -> Result<Option<RecurringSchedule>, StoreError> {
        (**self).schedule(company_id, id)
    }

    fn schedules(&self, company_id: CompanyId) -> Result<Vec<RecurringSchedule>, StoreError> {
        (**self).schedules(company_id)
    }

    fn due_schedules(&self, today: NaiveDate) -> Result<Vec<RecurringSchedule>, StoreError> {
        (**self).due_schedules(today)
    }

    fn record_share_view(&self, token: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        (**self).record_share_view(token, now)
    }
}
