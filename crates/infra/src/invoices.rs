//! Invoice lifecycle operations: creation with atomic numbering, status
//! transitions, field and line-item edits, delivery, reminders and deletion.
//!
//! Every mutation runs in one store transaction together with its audit
//! entry, so an invoice never changes without a matching history row.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use invoicely_core::{
    Clock, CompanyId, CustomerId, DomainError, ExpectedVersion, InvoiceId, InvoiceItemId, UserId,
};
use invoicely_invoicing::{
    HistoryAction, HistoryEntry, Invoice, InvoiceItem, InvoiceNumber, InvoiceStatus,
    InvoiceUpdate, ItemUpdate, NewInvoice, NewInvoiceItem, NewReminder, Reminder,
    ReminderOutcome, build_items,
};

use invoicely_recurring::RecurringSchedule;

use crate::error::{BillingError, BillingResult, StoreError};
use crate::store::{BillingStore, StoreTx};

/// Tuning for invoice creation.
#[derive(Debug, Clone)]
pub struct InvoiceSettings {
    /// How many freshly allocated numbers to try before giving up with
    /// `Conflict`.
    pub max_number_attempts: u32,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            max_number_attempts: 3,
        }
    }
}

impl InvoiceSettings {
    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts.max(1);
        self
    }
}

/// Invoice with its line items and the status readers should see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    /// Effective status (`sent` past due reads as `overdue`).
    pub status: InvoiceStatus,
    pub items: Vec<InvoiceItem>,
}

/// One listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub invoice: Invoice,
    pub status: InvoiceStatus,
}

/// Listing filter. Empty matches every live invoice of the company.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceQuery {
    /// Matched against the effective status.
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<CustomerId>,
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
}

impl InvoiceQuery {
    fn matches(&self, invoice: &Invoice, status: InvoiceStatus) -> bool {
        self.status.is_none_or(|s| s == status)
            && self.customer_id.is_none_or(|c| c == invoice.customer_id)
            && self.issued_from.is_none_or(|from| invoice.issue_date >= from)
            && self.issued_to.is_none_or(|to| invoice.issue_date <= to)
    }
}

pub struct InvoiceService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    settings: InvoiceSettings,
}

impl<S: BillingStore> InvoiceService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            settings: InvoiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: InvoiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Create a draft invoice with its line items.
    ///
    /// Without an explicit number the next one for the company and issue year
    /// is allocated inside the same transaction.
    #[instrument(skip(self, input), fields(company_id = %input.company_id), err)]
    pub fn create_invoice(
        &self,
        user_id: Option<UserId>,
        input: NewInvoice,
    ) -> BillingResult<InvoiceDetails> {
        let now = self.clock.now();
        let today = self.clock.today();
        let attempts = self.settings.max_number_attempts;

        let (invoice, items) = self.store.transaction(|tx| {
            tx.company(input.company_id)?.ok_or(BillingError::NotFound)?;
            let customer = tx
                .customer(input.company_id, input.customer_id)?
                .ok_or(BillingError::NotFound)?;
            if !customer.can_be_invoiced() {
                return Err(BillingError::Validation(format!(
                    "customer {} is inactive",
                    customer.id
                )));
            }

            let id = InvoiceId::new();
            let items = build_items(id, &input.items, input.invoice_type)?;
            let invoice = match input.invoice_number.as_deref() {
                Some(raw) => {
                    let number = InvoiceNumber::parse(raw)?;
                    let invoice = Invoice::create(id, &input, number, &items, now)?;
                    tx.insert_invoice(invoice)?
                }
                None => {
                    let (invoice, ()) = insert_with_next_number(
                        tx,
                        input.company_id,
                        input.issue_date.year(),
                        attempts,
                        |number| Ok((Invoice::create(id, &input, number, &items, now)?, ())),
                    )?;
                    invoice
                }
            };
            for item in &items {
                tx.put_item(item.clone())?;
            }

            tx.append_history(
                HistoryEntry::new(invoice.id, invoice.company_id, user_id, HistoryAction::Created, now)
                    .with_values(None, Some(snapshot(&invoice)))
                    .with_description(format!("Invoice {} created", invoice.invoice_number)),
            )?;
            Ok::<_, BillingError>((invoice, items))
        })?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total(),
            "invoice created"
        );
        Ok(details(invoice, items, today))
    }

    /// Number the next allocation would use. Nothing is reserved.
    pub fn next_invoice_number(&self, company_id: CompanyId, year: i32) -> BillingResult<InvoiceNumber> {
        self.store
            .company(company_id)?
            .ok_or(BillingError::NotFound)?;
        Ok(self.store.peek_invoice_number(company_id, year)?)
    }

    pub fn invoice_with_items(&self, company_id: CompanyId, id: InvoiceId) -> BillingResult<InvoiceDetails> {
        let invoice = self
            .store
            .invoice(company_id, id)?
            .filter(|i| !i.is_deleted())
            .ok_or(BillingError::NotFound)?;
        let items = self.store.invoice_items(id)?;
        Ok(details(invoice, items, self.clock.today()))
    }

    /// Live invoices of a company, newest first.
    pub fn invoices(&self, company_id: CompanyId, query: &InvoiceQuery) -> BillingResult<Vec<InvoiceRow>> {
        let today = self.clock.today();
        let mut rows: Vec<InvoiceRow> = self
            .store
            .invoices(company_id)?
            .into_iter()
            .filter(|i| !i.is_deleted())
            .map(|invoice| {
                let status = invoice.effective_status(today);
                InvoiceRow { invoice, status }
            })
            .filter(|row| query.matches(&row.invoice, row.status))
            .collect();
        rows.sort_by(|a, b| {
            b.invoice
                .issue_date
                .cmp(&a.invoice.issue_date)
                .then_with(|| b.invoice.invoice_number.cmp(&a.invoice.invoice_number))
        });
        Ok(rows)
    }

    /// Stored status write. `overdue` is derived and never accepted here.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %id), err)]
    pub fn update_invoice_status(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        next: InvoiceStatus,
    ) -> BillingResult<InvoiceDetails> {
        let now = self.clock.now();

        let (invoice, cancelled) = self.store.transaction(|tx| {
            let mut invoice = load_live(tx, company_id, id)?;
            let version = invoice.version;
            let change = invoice.transition(next, now)?;
            let stored = tx.update_invoice(invoice, ExpectedVersion::Exact(version))?;
            tx.append_history(HistoryEntry::status_changed(
                id, company_id, user_id, change, now,
            ))?;
            // A cancelled invoice can no longer serve as a template.
            let cancelled = if next == InvoiceStatus::Cancelled {
                let schedules = tx.schedules_for_template(company_id, id)?;
                cancel_schedules(tx, schedules, now)?
            } else {
                0
            };
            Ok::<_, BillingError>((stored, cancelled))
        })?;

        if cancelled > 0 {
            warn!(schedules = cancelled, "cancelled invoice was a recurring template, schedules cancelled");
        }
        info!(status = %next, "invoice status changed");
        self.invoice_details(invoice)
    }

    /// Field update. Sent invoices only accept due date, payment details and
    /// notes; paid and cancelled invoices are read-only.
    #[instrument(skip(self, update), fields(company_id = %company_id, invoice_id = %id))]
    pub fn update_invoice(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        update: InvoiceUpdate,
    ) -> BillingResult<InvoiceDetails> {
        let now = self.clock.now();

        let invoice = self.store.transaction(|tx| {
            let mut invoice = load_live(tx, company_id, id)?;
            let version = invoice.version;

            if let Some(customer_id) = update.customer_id {
                let customer = tx
                    .customer(company_id, customer_id)?
                    .ok_or(BillingError::NotFound)?;
                if !customer.can_be_invoiced() {
                    return Err(BillingError::Validation(format!(
                        "customer {customer_id} is inactive"
                    )));
                }
            }

            let Some((old, new)) = invoice.apply_update(&update, now)? else {
                return Ok(invoice);
            };
            let stored = tx.update_invoice(invoice, ExpectedVersion::Exact(version))?;
            tx.append_history(
                HistoryEntry::new(id, company_id, user_id, HistoryAction::Updated, now)
                    .with_values(Some(old), Some(new))
                    .with_description("Invoice details updated"),
            )?;
            Ok::<_, BillingError>(stored)
        })?;

        self.invoice_details(invoice)
    }

    /// Tombstone the invoice and drop its line items. History stays.
    ///
    /// Active schedules using it as a template are cancelled in the same
    /// transaction.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %id))]
    pub fn delete_invoice(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
    ) -> BillingResult<()> {
        let now = self.clock.now();

        let cancelled = self.store.transaction(|tx| {
            let mut invoice = load_live(tx, company_id, id)?;
            let version = invoice.version;
            invoice.mark_deleted(now)?;
            let number = invoice.invoice_number.clone();
            tx.update_invoice(invoice, ExpectedVersion::Exact(version))?;
            let removed = tx.remove_items(id)?;

            let schedules = tx.schedules_for_template(company_id, id)?;
            let cancelled = cancel_schedules(tx, schedules, now)?;

            tx.append_history(
                HistoryEntry::new(id, company_id, user_id, HistoryAction::Deleted, now)
                    .with_values(None, Some(json!({ "removed_items": removed })))
                    .with_description(format!("Invoice {number} deleted")),
            )?;
            Ok::<_, BillingError>(cancelled)
        })?;

        if cancelled > 0 {
            warn!(schedules = cancelled, "deleted invoice was a recurring template, schedules cancelled");
        }
        info!("invoice deleted");
        Ok(())
    }

    #[instrument(skip(self, input), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub fn add_item(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        user_id: Option<UserId>,
        input: NewInvoiceItem,
    ) -> BillingResult<InvoiceDetails> {
        self.edit_items(company_id, invoice_id, user_id, |invoice, items| {
            let position = items.iter().map(|i| i.position).max().unwrap_or(0) + 1;
            let item = InvoiceItem::new(
                InvoiceItemId::new(),
                invoice.id,
                position,
                &input,
                invoice.invoice_type,
            )?;
            let change = json!({ "item_added": item.description, "total": item.total });
            items.push(item.clone());
            Ok((ItemEdit::Put(item), change))
        })
    }

    #[instrument(skip(self, update), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub fn update_item(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        user_id: Option<UserId>,
        update: ItemUpdate,
    ) -> BillingResult<InvoiceDetails> {
        self.edit_items(company_id, invoice_id, user_id, |invoice, items| {
            let item = items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or(DomainError::NotFound)?;
            item.apply(&update, invoice.invoice_type)?;
            let change = json!({ "item_updated": item.description, "total": item.total });
            Ok((ItemEdit::Put(item.clone()), change))
        })
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub fn remove_item(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        user_id: Option<UserId>,
    ) -> BillingResult<InvoiceDetails> {
        self.edit_items(company_id, invoice_id, user_id, |_, items| {
            let idx = items
                .iter()
                .position(|i| i.id == item_id)
                .ok_or(DomainError::NotFound)?;
            let removed = items.remove(idx);
            let change = json!({ "item_removed": removed.description });
            Ok((ItemEdit::Remove(item_id), change))
        })
    }

    /// Record that the invoice went out by email; a draft becomes `sent`.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %id))]
    pub fn record_delivery(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        recipient: &str,
    ) -> BillingResult<InvoiceDetails> {
        let now = self.clock.now();
        let recipient = recipient.trim();
        if !recipient.contains('@') {
            return Err(BillingError::Validation(
                "delivery recipient must be an email address".to_string(),
            ));
        }

        let invoice = self.store.transaction(|tx| {
            let mut invoice = load_live(tx, company_id, id)?;
            let version = invoice.version;
            if invoice.stored_status().is_terminal() {
                return Err(BillingError::from(DomainError::invariant(format!(
                    "a {} invoice cannot be delivered",
                    invoice.stored_status()
                ))));
            }

            let change = if invoice.stored_status() == InvoiceStatus::Draft {
                Some(invoice.transition(InvoiceStatus::Sent, now)?)
            } else {
                None
            };
            let stored = match change {
                Some(_) => tx.update_invoice(invoice, ExpectedVersion::Exact(version))?,
                None => invoice,
            };

            tx.append_history(
                HistoryEntry::new(id, company_id, user_id, HistoryAction::EmailSent, now)
                    .with_values(None, Some(json!({ "recipient": recipient })))
                    .with_description(format!("Invoice emailed to {recipient}")),
            )?;
            if let Some(change) = change {
                tx.append_history(HistoryEntry::status_changed(
                    id, company_id, user_id, change, now,
                ))?;
            }
            Ok::<_, BillingError>(stored)
        })?;

        info!("invoice delivered");
        self.invoice_details(invoice)
    }

    /// Store a payment reminder. Delivered reminders also land in the history.
    #[instrument(skip(self, input), fields(company_id = %company_id, invoice_id = %id))]
    pub fn record_reminder(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        input: NewReminder,
    ) -> BillingResult<Reminder> {
        let now = self.clock.now();
        let today = self.clock.today();

        let reminder = self.store.transaction(|tx| {
            let invoice = load_live(tx, company_id, id)?;
            let reminder = Reminder::for_invoice(&invoice, user_id, &input, today, now)?;
            tx.insert_reminder(reminder.clone())?;
            if reminder.outcome == ReminderOutcome::Sent {
                tx.append_history(
                    HistoryEntry::new(id, company_id, user_id, HistoryAction::ReminderSent, now)
                        .with_values(
                            None,
                            Some(json!({ "recipient": reminder.recipient, "subject": reminder.subject })),
                        )
                        .with_description(format!("Payment reminder sent to {}", reminder.recipient)),
                )?;
            }
            Ok::<_, BillingError>(reminder)
        })?;

        debug!(reminder_id = %reminder.id, outcome = ?reminder.outcome, "reminder recorded");
        Ok(reminder)
    }

    /// Reminders of an invoice, newest first.
    pub fn reminders(&self, company_id: CompanyId, id: InvoiceId) -> BillingResult<Vec<Reminder>> {
        self.store
            .invoice(company_id, id)?
            .ok_or(BillingError::NotFound)?;
        let mut reminders = self.store.reminders(company_id, id)?;
        reminders.reverse();
        reminders.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(reminders)
    }

    fn edit_items<F>(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        user_id: Option<UserId>,
        edit: F,
    ) -> BillingResult<InvoiceDetails>
    where
        F: FnOnce(&Invoice, &mut Vec<InvoiceItem>) -> Result<(ItemEdit, serde_json::Value), DomainError>,
    {
        let now = self.clock.now();

        let (invoice, items) = self.store.transaction(|tx| {
            let mut invoice = load_live(tx, company_id, invoice_id)?;
            invoice.ensure_items_editable()?;
            let version = invoice.version;
            let old_total = invoice.total();

            let mut items = tx.invoice_items(invoice_id)?;
            let (op, change) = edit(&invoice, &mut items)?;
            match op {
                ItemEdit::Put(item) => tx.put_item(item)?,
                ItemEdit::Remove(item_id) => tx.remove_item(invoice_id, item_id)?,
            }

            invoice.recalculate(&items, now);
            let stored = tx.update_invoice(invoice, ExpectedVersion::Exact(version))?;
            tx.append_history(
                HistoryEntry::new(invoice_id, company_id, user_id, HistoryAction::Updated, now)
                    .with_values(Some(json!({ "total": old_total })), Some(change))
                    .with_description("Line items changed"),
            )?;
            Ok::<_, BillingError>((stored, items))
        })?;

        Ok(details(invoice, items, self.clock.today()))
    }

    fn invoice_details(&self, invoice: Invoice) -> BillingResult<InvoiceDetails> {
        let items = self.store.invoice_items(invoice.id)?;
        Ok(details(invoice, items, self.clock.today()))
    }
}

enum ItemEdit {
    Put(InvoiceItem),
    Remove(InvoiceItemId),
}

pub(crate) fn details(invoice: Invoice, items: Vec<InvoiceItem>, today: NaiveDate) -> InvoiceDetails {
    InvoiceDetails {
        status: invoice.effective_status(today),
        invoice,
        items,
    }
}

/// Load an invoice of `company_id` that has not been deleted.
pub(crate) fn load_live(
    tx: &dyn StoreTx,
    company_id: CompanyId,
    id: InvoiceId,
) -> BillingResult<Invoice> {
    tx.invoice(company_id, id)?
        .filter(|i| !i.is_deleted())
        .ok_or(BillingError::NotFound)
}

/// Allocate a number, build the invoice and insert it, re-allocating when
/// the store reports the number as taken.
pub(crate) fn insert_with_next_number<X, F>(
    tx: &mut dyn StoreTx,
    company_id: CompanyId,
    year: i32,
    attempts: u32,
    mut build: F,
) -> BillingResult<(Invoice, X)>
where
    F: FnMut(InvoiceNumber) -> Result<(Invoice, X), DomainError>,
{
    let mut last_conflict = None;
    for attempt in 1..=attempts.max(1) {
        let number = tx.allocate_invoice_number(company_id, year)?;
        let (invoice, extra) = build(number)?;
        match tx.insert_invoice(invoice) {
            Ok(stored) => return Ok((stored, extra)),
            Err(StoreError::Conflict(msg)) => {
                warn!(attempt, error = %msg, "allocated invoice number already taken");
                last_conflict = Some(msg);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(BillingError::Conflict(last_conflict.unwrap_or_else(|| {
        format!("could not allocate an invoice number for {year}")
    })))
}

/// Cancel the still active schedules among `schedules`; returns how many
/// were stopped.
pub(crate) fn cancel_schedules(
    tx: &mut dyn StoreTx,
    schedules: Vec<RecurringSchedule>,
    now: DateTime<Utc>,
) -> BillingResult<usize> {
    let mut cancelled = 0;
    for mut schedule in schedules {
        let version = schedule.version;
        if schedule.cancel(now) {
            tx.put_schedule(schedule, ExpectedVersion::Exact(version))?;
            cancelled += 1;
        }
    }
    Ok(cancelled)
}

pub(crate) fn snapshot(invoice: &Invoice) -> serde_json::Value {
    json!({
        "invoice_number": invoice.invoice_number,
        "status": invoice.stored_status(),
        "issue_date": invoice.issue_date,
        "due_date": invoice.due_date,
        "total": invoice.total(),
        "currency": invoice.currency,
    })
}
