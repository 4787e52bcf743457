//! Invoice audit trail.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use invoicely_core::{Clock, CompanyId, InvoiceId, UserId};
use invoicely_invoicing::{HistoryAction, HistoryEntry};

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// History entry with the acting user's display name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryView {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    /// `None` for system actions or users unknown to the store.
    pub user_name: Option<String>,
}

pub struct AuditTrail<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: BillingStore> AuditTrail<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append an entry for an invoice of `company_id`.
    ///
    /// The invoice may already be deleted; its trail stays writable for
    /// callers documenting after-the-fact actions.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        invoice_id: InvoiceId,
        company_id: CompanyId,
        user_id: Option<UserId>,
        action: HistoryAction,
        old_value: Option<JsonValue>,
        new_value: Option<JsonValue>,
        description: Option<String>,
    ) -> BillingResult<HistoryEntry> {
        let mut entry = HistoryEntry::new(invoice_id, company_id, user_id, action, self.clock.now())
            .with_values(old_value, new_value);
        entry.description = description;

        let stored = entry.clone();
        self.store.transaction(|tx| {
            tx.invoice(company_id, invoice_id)?
                .ok_or(BillingError::NotFound)?;
            tx.append_history(entry)?;
            Ok::<_, BillingError>(())
        })?;

        debug!(
            invoice_id = %invoice_id,
            action = %action,
            "history entry recorded"
        );
        Ok(stored)
    }

    /// Full trail of an invoice, newest first. Deleted invoices keep theirs.
    pub fn history(&self, company_id: CompanyId, invoice_id: InvoiceId) -> BillingResult<Vec<HistoryView>> {
        self.store
            .invoice(company_id, invoice_id)?
            .ok_or(BillingError::NotFound)?;

        let mut entries = self.store.history(company_id, invoice_id)?;
        // Insertion order breaks ties between entries written at the same instant.
        entries.reverse();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut user_ids: Vec<UserId> = entries.iter().filter_map(|e| e.user_id).collect();
        user_ids.sort();
        user_ids.dedup();
        let names: HashMap<UserId, String> = self
            .store
            .users(&user_ids)?
            .into_iter()
            .map(|u| (u.id, u.display_name))
            .collect();

        Ok(entries
            .into_iter()
            .map(|entry| HistoryView {
                user_name: entry.user_id.and_then(|id| names.get(&id).cloned()),
                entry,
            })
            .collect())
    }
}
