//! Money arithmetic shared by line items and invoices.
//!
//! Amounts are `Decimal` in the invoice currency, rounded half away from zero
//! to two places at line level. Invoice totals are sums of already-rounded
//! line amounts, so `total == subtotal + vat_amount` holds exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use invoicely_core::{DomainError, DomainResult};

use crate::item::InvoiceItem;

/// Decimal places kept for stored amounts.
pub const MONEY_SCALE: u32 = 2;

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Net, VAT and gross amount of one line.
///
/// `total` equals `quantity * unit_price * (1 + vat_rate / 100)` within one
/// rounding step.
pub fn line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    vat_rate: Decimal,
) -> DomainResult<(Decimal, Decimal, Decimal)> {
    let net = quantity
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::invariant("line amount overflow"))?;
    let subtotal = round_money(net);
    let vat = subtotal
        .checked_mul(vat_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(round_money)
        .ok_or_else(|| DomainError::invariant("line vat overflow"))?;
    let total = subtotal
        .checked_add(vat)
        .ok_or_else(|| DomainError::invariant("line total overflow"))?;
    Ok((subtotal, vat, total))
}

/// Invoice-level amounts. Only constructible from line items (or zero), so the
/// sum invariant cannot be broken by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    subtotal: Decimal,
    vat_amount: Decimal,
    total: Decimal,
}

impl Totals {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a InvoiceItem>) -> Self {
        let mut subtotal = Decimal::ZERO;
        let mut vat_amount = Decimal::ZERO;
        for item in items {
            subtotal += item.subtotal;
            vat_amount += item.vat_amount;
        }
        Self {
            subtotal,
            vat_amount,
            total: subtotal + vat_amount,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    pub fn vat_amount(&self) -> Decimal {
        self.vat_amount
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// `total == subtotal + vat_amount` within one minor unit.
    pub fn is_consistent(&self) -> bool {
        let tolerance = Decimal::new(1, MONEY_SCALE);
        (self.total - (self.subtotal + self.vat_amount)).abs() < tolerance
    }
}

/// ISO-4217 style code: three upper-case ASCII letters.
pub fn validate_currency(code: &str) -> DomainResult<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "currency must be a three-letter upper-case code, got '{code}'"
        )))
    }
}

/// A stored conversion rate must be strictly positive.
pub fn validate_exchange_rate(rate: Option<Decimal>) -> DomainResult<()> {
    match rate {
        Some(r) if r <= Decimal::ZERO => Err(DomainError::validation(
            "exchange rate must be positive",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn line_amounts_round_half_away_from_zero() {
        let (subtotal, vat, total) = line_amounts(d("3"), d("0.335"), d("21")).unwrap();
        assert_eq!(subtotal, d("1.01"));
        assert_eq!(vat, d("0.21"));
        assert_eq!(total, d("1.22"));
    }

    #[test]
    fn zero_vat_line_total_equals_net() {
        let (subtotal, vat, total) = line_amounts(d("2"), d("500"), Decimal::ZERO).unwrap();
        assert_eq!(subtotal, d("1000"));
        assert_eq!(vat, Decimal::ZERO);
        assert_eq!(total, d("1000"));
    }

    #[test]
    fn currency_codes_are_checked() {
        assert!(validate_currency("CZK").is_ok());
        assert!(validate_currency("czk").is_err());
        assert!(validate_currency("EURO").is_err());
    }

    #[test]
    fn exchange_rate_must_be_positive() {
        assert!(validate_exchange_rate(None).is_ok());
        assert!(validate_exchange_rate(Some(d("25.1"))).is_ok());
        assert!(validate_exchange_rate(Some(Decimal::ZERO)).is_err());
    }
}
