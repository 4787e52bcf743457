//! Append-only invoice audit trail entries.
//!
//! Entries are built here and only ever inserted by the store; there is no
//! update or delete path for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use invoicely_core::{CompanyId, HistoryEntryId, InvoiceId, UserId};

use crate::invoice::StatusChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    StatusChanged,
    EmailSent,
    ReminderSent,
    ShareEnabled,
    ShareRevoked,
    Deleted,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::StatusChanged => "status_changed",
            HistoryAction::EmailSent => "email_sent",
            HistoryAction::ReminderSent => "reminder_sent",
            HistoryAction::ShareEnabled => "share_enabled",
            HistoryAction::ShareRevoked => "share_revoked",
            HistoryAction::Deleted => "deleted",
        }
    }
}

impl core::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row. `user_id == None` marks a system action (recurring generation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub invoice_id: InvoiceId,
    pub company_id: CompanyId,
    pub user_id: Option<UserId>,
    pub action: HistoryAction,
    pub old_value: Option<JsonValue>,
    pub new_value: Option<JsonValue>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        invoice_id: InvoiceId,
        company_id: CompanyId,
        user_id: Option<UserId>,
        action: HistoryAction,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            invoice_id,
            company_id,
            user_id,
            action,
            old_value: None,
            new_value: None,
            description: None,
            created_at: at,
        }
    }

    pub fn with_values(mut self, old: Option<JsonValue>, new: Option<JsonValue>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Entry for a stored status write.
    pub fn status_changed(
        invoice_id: InvoiceId,
        company_id: CompanyId,
        user_id: Option<UserId>,
        change: StatusChange,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(invoice_id, company_id, user_id, HistoryAction::StatusChanged, at)
            .with_values(
                Some(JsonValue::String(change.from.as_str().to_string())),
                Some(JsonValue::String(change.to.as_str().to_string())),
            )
            .with_description(format!("Status changed from {} to {}", change.from, change.to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::InvoiceStatus;

    #[test]
    fn status_entry_snapshots_both_sides() {
        let entry = HistoryEntry::status_changed(
            InvoiceId::new(),
            CompanyId::new(),
            None,
            StatusChange {
                from: InvoiceStatus::Sent,
                to: InvoiceStatus::Paid,
            },
            Utc::now(),
        );

        assert_eq!(entry.action, HistoryAction::StatusChanged);
        assert_eq!(entry.old_value, Some(JsonValue::from("sent")));
        assert_eq!(entry.new_value, Some(JsonValue::from("paid")));
        assert!(entry.user_id.is_none());
    }

    #[test]
    fn actions_serialize_snake_case() {
        let json = serde_json::to_string(&HistoryAction::EmailSent).unwrap();
        assert_eq!(json, "\"email_sent\"");
    }
}
