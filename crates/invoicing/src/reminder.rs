use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invoicely_core::{CompanyId, DomainError, DomainResult, InvoiceId, ReminderId, UserId};

use crate::invoice::{Invoice, InvoiceStatus};

/// Delivery result reported by the outbound mail collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderOutcome {
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReminder {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub outcome: ReminderOutcome,
}

/// Payment reminder. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub invoice_id: InvoiceId,
    pub company_id: CompanyId,
    pub user_id: Option<UserId>,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub outcome: ReminderOutcome,
    pub sent_at: DateTime<Utc>,
}

impl Reminder {
    /// Only invoices awaiting payment take reminders.
    pub fn for_invoice(
        invoice: &Invoice,
        user_id: Option<UserId>,
        input: &NewReminder,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        match invoice.effective_status(today) {
            InvoiceStatus::Sent | InvoiceStatus::Overdue => {}
            other => {
                return Err(DomainError::invariant(format!(
                    "reminders can only be sent for unpaid sent invoices, invoice is {other}"
                )));
            }
        }

        let recipient = input.recipient.trim();
        if recipient.is_empty() || !recipient.contains('@') {
            return Err(DomainError::validation("reminder recipient must be an email address"));
        }
        if input.subject.trim().is_empty() {
            return Err(DomainError::validation("reminder subject must not be empty"));
        }

        Ok(Self {
            id: ReminderId::new(),
            invoice_id: invoice.id,
            company_id: invoice.company_id,
            user_id,
            recipient: recipient.to_string(),
            subject: input.subject.trim().to_string(),
            body: input.body.clone(),
            outcome: input.outcome,
            sent_at: now,
        })
    }
}
