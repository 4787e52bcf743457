//! Invoice number format: `{year}{sequence:04}` (e.g. `20240001`).
//!
//! Allocation itself lives with the store (it must be atomic); this module only
//! knows how numbers look and how to read a sequence back out of one.

use serde::{Deserialize, Serialize};

use invoicely_core::{DomainError, DomainResult};

/// Longest caller-supplied number we accept.
const MAX_LEN: usize = 32;

/// Highest sequence the allocator hands out. Caller-chosen numbers with a
/// larger suffix are kept as opaque strings and never move the counter.
pub const MAX_SEQUENCE: u32 = 999_999;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    /// Sequence numbers are padded to four digits and simply grow past 9999.
    pub fn format(year: i32, sequence: u32) -> Self {
        Self(format!("{year}{sequence:04}"))
    }

    /// Accept a caller-chosen number (imports, manual numbering).
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::validation("invoice number must not be empty"));
        }
        if raw.len() > MAX_LEN {
            return Err(DomainError::validation(format!(
                "invoice number must be at most {MAX_LEN} characters"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/')
        {
            return Err(DomainError::validation(
                "invoice number may only contain letters, digits, '-' and '/'",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix if this number follows the `{year}{digits}` scheme.
    pub fn sequence_for(&self, year: i32) -> Option<u32> {
        let suffix = self.0.strip_prefix(&year.to_string())?;
        parse_sequence(suffix)
    }

    /// Year prefix and sequence of a `{yyyy}{digits}` number, whatever year
    /// the invoice was issued in.
    pub fn scheme_parts(&self) -> Option<(i32, u32)> {
        let (year, suffix) = self.0.split_at_checked(4)?;
        if !year.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some((year.parse().ok()?, parse_sequence(suffix)?))
    }
}

fn parse_sequence(suffix: &str) -> Option<u32> {
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().filter(|seq| *seq <= MAX_SEQUENCE)
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Next number after everything in `existing` for `year`; `{year}0001` when empty.
pub fn next_after<'a>(
    year: i32,
    existing: impl IntoIterator<Item = &'a InvoiceNumber>,
) -> InvoiceNumber {
    let max = existing
        .into_iter()
        .filter_map(|n| n.sequence_for(year))
        .max()
        .unwrap_or(0);
    InvoiceNumber::format(year, max + 1)
}
