//! Public share links.
//!
//! Resolution never tells a caller why a token failed: unknown, revoked,
//! expired and deleted all come back as `NotFound`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use invoicely_core::{Clock, CompanyId, ExpectedVersion, InvoiceId, UserId};
use invoicely_invoicing::{HistoryAction, HistoryEntry, generate_share_token};

use crate::error::{BillingError, BillingResult};
use crate::invoices::{InvoiceDetails, details, load_live};
use crate::store::BillingStore;

#[derive(Debug, Clone)]
pub struct ShareSettings {
    /// Lifetime of a link when the caller does not pick one.
    pub default_expiry_days: i64,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            default_expiry_days: 30,
        }
    }
}

impl ShareSettings {
    pub fn with_default_expiry_days(mut self, days: i64) -> Self {
        self.default_expiry_days = days;
        self
    }
}

/// Freshly issued link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Owner-facing view of an invoice's sharing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareStatus {
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub view_count: u64,
}

pub struct ShareService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    settings: ShareSettings,
}

impl<S: BillingStore> ShareService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            settings: ShareSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ShareSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Issue a new token, replacing any previous one, and reset the view count.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id), err)]
    pub fn issue_share_token(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        user_id: Option<UserId>,
        expires_in_days: Option<i64>,
    ) -> BillingResult<ShareLink> {
        let now = self.clock.now();
        let days = expires_in_days.unwrap_or(self.settings.default_expiry_days);

        let link = self.store.transaction(|tx| {
            let mut invoice = load_live(tx, company_id, invoice_id)?;
            let version = invoice.version;
            let token = generate_share_token();
            invoice.share.issue(token.clone(), now, days)?;
            let expires_at = invoice.share.expires_at.ok_or_else(|| {
                BillingError::Store("share expiry missing after issue".to_string())
            })?;
            tx.update_invoice(invoice, ExpectedVersion::Exact(version))?;
            tx.append_history(
                HistoryEntry::new(invoice_id, company_id, user_id, HistoryAction::ShareEnabled, now)
                    .with_values(None, Some(json!({ "expires_at": expires_at })))
                    .with_description(format!("Public link enabled for {days} days")),
            )?;
            Ok::<_, BillingError>(ShareLink { token, expires_at })
        })?;

        info!(expires_at = %link.expires_at, "share link issued");
        Ok(link)
    }

    /// Invoice behind a live token.
    pub fn resolve_share_token(&self, token: &str) -> BillingResult<InvoiceDetails> {
        let now = self.clock.now();
        let invoice = self
            .store
            .invoice_by_share_token(token)?
            .filter(|i| !i.is_deleted())
            .ok_or(BillingError::NotFound)?;

        if let Err(reason) = invoice.share.check(token, now) {
            debug!(invoice_id = %invoice.id, reason = ?reason, "share token rejected");
            return Err(BillingError::NotFound);
        }

        let items = self.store.invoice_items(invoice.id)?;
        Ok(details(invoice, items, self.clock.today()))
    }

    /// Count one public view. Unknown or dead tokens are ignored.
    pub fn record_share_view(&self, token: &str) -> BillingResult<()> {
        if !self.store.record_share_view(token, self.clock.now())? {
            debug!("view for unknown or inactive share token ignored");
        }
        Ok(())
    }

    /// Disable sharing and clear the token. Revoking twice is a no-op.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub fn revoke_share_token(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        user_id: Option<UserId>,
    ) -> BillingResult<()> {
        let now = self.clock.now();

        let revoked = self.store.transaction(|tx| {
            let mut invoice = load_live(tx, company_id, invoice_id)?;
            let version = invoice.version;
            if !invoice.share.revoke() {
                return Ok(false);
            }
            invoice.updated_at = now;
            tx.update_invoice(invoice, ExpectedVersion::Exact(version))?;
            tx.append_history(
                HistoryEntry::new(invoice_id, company_id, user_id, HistoryAction::ShareRevoked, now)
                    .with_description("Public link revoked"),
            )?;
            Ok::<_, BillingError>(true)
        })?;

        if revoked {
            info!("share link revoked");
        }
        Ok(())
    }

    pub fn share_status(&self, company_id: CompanyId, invoice_id: InvoiceId) -> BillingResult<ShareStatus> {
        let invoice = self
            .store
            .invoice(company_id, invoice_id)?
            .filter(|i| !i.is_deleted())
            .ok_or(BillingError::NotFound)?;
        let now = self.clock.now();
        let share = invoice.share;

        Ok(ShareStatus {
            enabled: share.enabled,
            expired: share.expires_at.is_some_and(|at| now >= at),
            expires_at: share.expires_at,
            view_count: share.view_count,
        })
    }
}
