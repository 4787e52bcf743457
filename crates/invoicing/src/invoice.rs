use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use invoicely_core::{CompanyId, CustomerId, DomainError, DomainResult, InvoiceId, InvoiceItemId};

use crate::item::{InvoiceItem, NewInvoiceItem};
use crate::money::{Totals, validate_currency, validate_exchange_rate};
use crate::numbering::InvoiceNumber;
use crate::sharing::ShareState;

/// Document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Invoice,
    Proforma,
    CreditNote,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Invoice => "invoice",
            InvoiceType::Proforma => "proforma",
            InvoiceType::CreditNote => "credit_note",
        }
    }
}

/// Invoice status lifecycle.
///
/// `Overdue` is a read-time view over `Sent` + past due date. It is never
/// written through a transition; see [`Invoice::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown invoice status '{other}'"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Stored transitions. A legacy stored `overdue` behaves like `sent`.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent)
                | (Sent, Paid)
                | (Overdue, Paid)
                | (Draft, Cancelled)
                | (Sent, Cancelled)
                | (Overdue, Cancelled)
        )
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How and where the customer should pay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub payment_method: Option<String>,
    pub bank_account: Option<String>,
    /// Payment reference the bank transfer must carry.
    pub variable_symbol: Option<String>,
}

/// Input for creating an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub company_id: CompanyId,
    pub customer_id: CustomerId,
    pub invoice_type: InvoiceType,
    /// Caller-chosen number; allocated from the company sequence when `None`.
    pub invoice_number: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub exchange_rate: Option<Decimal>,
    pub payment: PaymentDetails,
    pub notes: Option<String>,
    pub items: Vec<NewInvoiceItem>,
}

/// Field update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub customer_id: Option<CustomerId>,
    pub invoice_type: Option<InvoiceType>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub exchange_rate: Option<Decimal>,
    pub payment: Option<PaymentDetails>,
    pub notes: Option<String>,
}

/// Outcome of a stored status write, used for the audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

/// Invoice record.
///
/// Status and amounts are only changed through methods, which keep the
/// lifecycle rules and `total == subtotal + vat_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub company_id: CompanyId,
    pub customer_id: CustomerId,
    pub invoice_number: InvoiceNumber,
    pub invoice_type: InvoiceType,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Due date before its first change.
    pub original_due_date: Option<NaiveDate>,
    status: InvoiceStatus,
    pub currency: String,
    pub exchange_rate: Option<Decimal>,
    totals: Totals,
    pub payment: PaymentDetails,
    pub notes: Option<String>,
    pub share: ShareState,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every write.
    pub version: u64,
}

impl Invoice {
    /// Build a draft invoice. `items` must already belong to `id`.
    pub fn create(
        id: InvoiceId,
        input: &NewInvoice,
        invoice_number: InvoiceNumber,
        items: &[InvoiceItem],
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_currency(&input.currency)?;
        validate_exchange_rate(input.exchange_rate)?;
        validate_dates(input.issue_date, input.due_date)?;
        if items.iter().any(|i| i.invoice_id != id) {
            return Err(DomainError::invariant("line item belongs to another invoice"));
        }

        Ok(Self {
            id,
            company_id: input.company_id,
            customer_id: input.customer_id,
            invoice_number,
            invoice_type: input.invoice_type,
            issue_date: input.issue_date,
            due_date: input.due_date,
            original_due_date: None,
            status: InvoiceStatus::Draft,
            currency: input.currency.clone(),
            exchange_rate: input.exchange_rate,
            totals: Totals::from_items(items),
            payment: input.payment.clone(),
            notes: normalize(input.notes.clone()),
            share: ShareState::default(),
            sent_at: None,
            paid_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// New draft copying customer, amounts, currency and payment details.
    ///
    /// Sharing state, timestamps and lifecycle are not carried over.
    pub fn duplicate(
        &self,
        id: InvoiceId,
        invoice_number: InvoiceNumber,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_dates(issue_date, due_date)?;
        Ok(Self {
            id,
            company_id: self.company_id,
            customer_id: self.customer_id,
            invoice_number,
            invoice_type: self.invoice_type,
            issue_date,
            due_date,
            original_due_date: None,
            status: InvoiceStatus::Draft,
            currency: self.currency.clone(),
            exchange_rate: self.exchange_rate,
            totals: self.totals,
            payment: self.payment.clone(),
            notes,
            share: ShareState::default(),
            sent_at: None,
            paid_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Persisted status, which may still say `sent` for an overdue invoice.
    pub fn stored_status(&self) -> InvoiceStatus {
        self.status
    }

    /// Status as reported to readers: `sent` past its due date reads as `overdue`.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        if self.is_overdue(today) {
            InvoiceStatus::Overdue
        } else {
            self.status
        }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        matches!(self.status, InvoiceStatus::Sent | InvoiceStatus::Overdue) && self.due_date < today
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn subtotal(&self) -> Decimal {
        self.totals.subtotal()
    }

    pub fn vat_amount(&self) -> Decimal {
        self.totals.vat_amount()
    }

    pub fn total(&self) -> Decimal {
        self.totals.total()
    }

    /// Apply a stored status write.
    ///
    /// `overdue` is never a valid target; it is derived at read time.
    pub fn transition(&mut self, next: InvoiceStatus, now: DateTime<Utc>) -> DomainResult<StatusChange> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(DomainError::transition(from, next));
        }

        self.status = next;
        match next {
            InvoiceStatus::Sent => self.sent_at = Some(now),
            InvoiceStatus::Paid => self.paid_at = Some(now),
            _ => {}
        }
        self.updated_at = now;

        Ok(StatusChange { from, to: next })
    }

    /// Apply a field update. Returns `(old, new)` snapshots of the changed
    /// fields, or `None` when nothing changed.
    ///
    /// Drafts are fully editable. Sent invoices only accept due date, payment
    /// details and notes. Paid and cancelled invoices are read-only.
    pub fn apply_update(
        &mut self,
        update: &InvoiceUpdate,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<(JsonValue, JsonValue)>> {
        self.ensure_editable()?;

        let draft_only = update.customer_id.is_some()
            || update.invoice_type.is_some()
            || update.issue_date.is_some()
            || update.currency.is_some()
            || update.exchange_rate.is_some();
        if draft_only && self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant(format!(
                "customer, type, issue date and currency are fixed once an invoice is {}",
                self.status
            )));
        }

        let mut next = self.clone();
        let mut old = Map::new();
        let mut new = Map::new();

        if let Some(customer_id) = update.customer_id.filter(|c| *c != self.customer_id) {
            old.insert("customer_id".into(), json!(self.customer_id));
            new.insert("customer_id".into(), json!(customer_id));
            next.customer_id = customer_id;
        }
        if let Some(kind) = update.invoice_type.filter(|k| *k != self.invoice_type) {
            old.insert("invoice_type".into(), json!(self.invoice_type));
            new.insert("invoice_type".into(), json!(kind));
            next.invoice_type = kind;
        }
        if let Some(issue_date) = update.issue_date.filter(|d| *d != self.issue_date) {
            old.insert("issue_date".into(), json!(self.issue_date));
            new.insert("issue_date".into(), json!(issue_date));
            next.issue_date = issue_date;
        }
        if let Some(due_date) = update.due_date.filter(|d| *d != self.due_date) {
            old.insert("due_date".into(), json!(self.due_date));
            new.insert("due_date".into(), json!(due_date));
            if next.original_due_date.is_none() {
                next.original_due_date = Some(self.due_date);
            }
            next.due_date = due_date;
        }
        if let Some(currency) = update.currency.as_ref().filter(|c| **c != self.currency) {
            validate_currency(currency)?;
            old.insert("currency".into(), json!(self.currency));
            new.insert("currency".into(), json!(currency));
            next.currency = currency.clone();
        }
        if let Some(rate) = update.exchange_rate.filter(|r| Some(*r) != self.exchange_rate) {
            validate_exchange_rate(Some(rate))?;
            old.insert("exchange_rate".into(), json!(self.exchange_rate));
            new.insert("exchange_rate".into(), json!(rate));
            next.exchange_rate = Some(rate);
        }
        if let Some(payment) = update.payment.as_ref().filter(|p| **p != self.payment) {
            old.insert("payment".into(), json!(self.payment));
            new.insert("payment".into(), json!(payment));
            next.payment = payment.clone();
        }
        if let Some(notes) = update.notes.as_ref() {
            let notes = normalize(Some(notes.clone()));
            if notes != self.notes {
                old.insert("notes".into(), json!(self.notes));
                new.insert("notes".into(), json!(notes));
                next.notes = notes;
            }
        }

        if new.is_empty() {
            return Ok(None);
        }

        validate_dates(next.issue_date, next.due_date)?;
        next.updated_at = now;
        *self = next;
        Ok(Some((JsonValue::Object(old), JsonValue::Object(new))))
    }

    /// Line items may only change while the invoice is a draft.
    pub fn ensure_items_editable(&self) -> DomainResult<()> {
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant(format!(
                "line items are fixed once an invoice is {}",
                self.status
            )));
        }
        Ok(())
    }

    /// Recompute amounts from the current line items.
    pub fn recalculate<'a>(
        &mut self,
        items: impl IntoIterator<Item = &'a InvoiceItem>,
        now: DateTime<Utc>,
    ) {
        self.totals = Totals::from_items(items);
        self.updated_at = now;
    }

    /// Tombstone the invoice. Paid invoices are kept for the books.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == InvoiceStatus::Paid {
            return Err(DomainError::invariant("paid invoices cannot be deleted"));
        }
        if self.is_deleted() {
            return Err(DomainError::not_found());
        }
        self.share.revoke();
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_editable(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "invoice is {} and can no longer be edited",
                self.status
            )));
        }
        Ok(())
    }
}

/// Build line items for a new invoice, numbered from 1.
pub fn build_items(
    invoice_id: InvoiceId,
    inputs: &[NewInvoiceItem],
    invoice_type: InvoiceType,
) -> DomainResult<Vec<InvoiceItem>> {
    inputs
        .iter()
        .enumerate()
        .map(|(idx, input)| {
            InvoiceItem::new(
                InvoiceItemId::new(),
                invoice_id,
                idx as u32 + 1,
                input,
                invoice_type,
            )
        })
        .collect()
}

fn validate_dates(issue_date: NaiveDate, due_date: NaiveDate) -> DomainResult<()> {
    if due_date < issue_date {
        return Err(DomainError::validation(format!(
            "due date {due_date} is before issue date {issue_date}"
        )));
    }
    Ok(())
}

fn normalize(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
