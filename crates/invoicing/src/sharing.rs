//! Public share-link state carried on an invoice.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use invoicely_core::{DomainError, DomainResult};

/// Random bytes behind each token.
const TOKEN_BYTES: usize = 32;

/// Opaque, URL-safe share token from the OS random source.
pub fn generate_share_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Why a token did not resolve. Never shown to the public caller; the boundary
/// collapses all of these into not-found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareDenied {
    Disabled,
    Expired,
    Mismatch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareState {
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub view_count: u64,
    pub enabled: bool,
}

impl ShareState {
    /// Replace any existing token, enable sharing and reset the view count.
    pub fn issue(&mut self, token: String, now: DateTime<Utc>, expires_in_days: i64) -> DomainResult<()> {
        if expires_in_days < 1 {
            return Err(DomainError::validation("share link must be valid for at least one day"));
        }
        let expires_at = Duration::try_days(expires_in_days)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| DomainError::validation("share link expiry is out of range"))?;

        self.token = Some(token);
        self.expires_at = Some(expires_at);
        self.view_count = 0;
        self.enabled = true;
        Ok(())
    }

    /// Clear the token and disable sharing. Returns whether anything changed.
    pub fn revoke(&mut self) -> bool {
        let changed = self.enabled || self.token.is_some();
        self.token = None;
        self.expires_at = None;
        self.enabled = false;
        changed
    }

    /// Public access check for `token` at `now`. Expiry is exclusive.
    pub fn check(&self, token: &str, now: DateTime<Utc>) -> Result<(), ShareDenied> {
        if !self.enabled {
            return Err(ShareDenied::Disabled);
        }
        if self.token.as_deref() != Some(token) {
            return Err(ShareDenied::Mismatch);
        }
        match self.expires_at {
            Some(expires_at) if now < expires_at => Ok(()),
            _ => Err(ShareDenied::Expired),
        }
    }

    pub fn record_view(&mut self) {
        self.view_count = self.view_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_unique() {
        let a = generate_share_token();
        let b = generate_share_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn issued_token_resolves_until_expiry() {
        let now = Utc::now();
        let mut share = ShareState::default();
        share.issue("tok".to_string(), now, 30).unwrap();

        assert_eq!(share.check("tok", now), Ok(()));
        assert_eq!(share.check("tok", now + Duration::days(30)), Err(ShareDenied::Expired));
        assert_eq!(share.check("other", now), Err(ShareDenied::Mismatch));
    }

    #[test]
    fn reissue_resets_view_count() {
        let now = Utc::now();
        let mut share = ShareState::default();
        share.issue("a".to_string(), now, 1).unwrap();
        share.record_view();
        share.record_view();
        share.issue("b".to_string(), now, 1).unwrap();
        assert_eq!(share.view_count, 0);
    }

    #[test]
    fn revoke_is_idempotent() {
        let mut share = ShareState::default();
        share.issue("a".to_string(), Utc::now(), 7).unwrap();

        assert!(share.revoke());
        assert!(!share.revoke());
        assert_eq!(share.check("a", Utc::now()), Err(ShareDenied::Disabled));
    }

    #[test]
    fn zero_day_links_are_rejected() {
        let mut share = ShareState::default();
        assert!(share.issue("a".to_string(), Utc::now(), 0).is_err());
        assert!(!share.enabled);
    }
}
