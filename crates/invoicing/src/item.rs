//! Invoice line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoicely_core::{DomainError, DomainResult, InvoiceId, InvoiceItemId};

use crate::invoice::InvoiceType;
use crate::money::line_amounts;

/// Input for a new line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub unit_price: Decimal,
    /// Percent, e.g. `21` for 21 %.
    pub vat_rate: Decimal,
}

/// Partial line update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub unit_price: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
}

/// Stored line with its derived amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub position: u32,
    pub description: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceItem {
    pub fn new(
        id: InvoiceItemId,
        invoice_id: InvoiceId,
        position: u32,
        input: &NewInvoiceItem,
        invoice_type: InvoiceType,
    ) -> DomainResult<Self> {
        validate_line(
            &input.description,
            input.quantity,
            input.unit_price,
            input.vat_rate,
            invoice_type,
        )?;
        let (subtotal, vat_amount, total) =
            line_amounts(input.quantity, input.unit_price, input.vat_rate)?;

        Ok(Self {
            id,
            invoice_id,
            position,
            description: input.description.trim().to_string(),
            quantity: input.quantity,
            unit: input.unit.clone(),
            unit_price: input.unit_price,
            vat_rate: input.vat_rate,
            subtotal,
            vat_amount,
            total,
        })
    }

    /// Apply a partial update and recompute the derived amounts.
    pub fn apply(&mut self, update: &ItemUpdate, invoice_type: InvoiceType) -> DomainResult<()> {
        let description = update
            .description
            .clone()
            .unwrap_or_else(|| self.description.clone());
        let quantity = update.quantity.unwrap_or(self.quantity);
        let unit_price = update.unit_price.unwrap_or(self.unit_price);
        let vat_rate = update.vat_rate.unwrap_or(self.vat_rate);

        validate_line(&description, quantity, unit_price, vat_rate, invoice_type)?;
        let (subtotal, vat_amount, total) = line_amounts(quantity, unit_price, vat_rate)?;

        self.description = description.trim().to_string();
        self.quantity = quantity;
        if update.unit.is_some() {
            self.unit = update.unit.clone();
        }
        self.unit_price = unit_price;
        self.vat_rate = vat_rate;
        self.subtotal = subtotal;
        self.vat_amount = vat_amount;
        self.total = total;
        Ok(())
    }

    /// Verbatim copy attached to another invoice (recurring generation).
    pub fn copy_to(&self, id: InvoiceItemId, invoice_id: InvoiceId) -> Self {
        Self {
            id,
            invoice_id,
            ..self.clone()
        }
    }
}

fn validate_line(
    description: &str,
    quantity: Decimal,
    unit_price: Decimal,
    vat_rate: Decimal,
    invoice_type: InvoiceType,
) -> DomainResult<()> {
    if description.trim().is_empty() {
        return Err(DomainError::validation("item description must not be empty"));
    }
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation("item quantity must be positive"));
    }
    if vat_rate < Decimal::ZERO || vat_rate > Decimal::ONE_HUNDRED {
        return Err(DomainError::validation(
            "item vat rate must be between 0 and 100",
        ));
    }
    if unit_price < Decimal::ZERO && invoice_type != InvoiceType::CreditNote {
        return Err(DomainError::validation(
            "negative unit price is only allowed on credit notes",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn input(quantity: &str, unit_price: &str, vat_rate: &str) -> NewInvoiceItem {
        NewInvoiceItem {
            description: "Consulting".to_string(),
            quantity: d(quantity),
            unit: Some("h".to_string()),
            unit_price: d(unit_price),
            vat_rate: d(vat_rate),
        }
    }

    #[test]
    fn new_item_computes_amounts() {
        let item = InvoiceItem::new(
            InvoiceItemId::new(),
            InvoiceId::new(),
            1,
            &input("10", "1500", "21"),
            InvoiceType::Invoice,
        )
        .unwrap();

        assert_eq!(item.subtotal, d("15000"));
        assert_eq!(item.vat_amount, d("3150"));
        assert_eq!(item.total, d("18150"));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let err = InvoiceItem::new(
            InvoiceItemId::new(),
            InvoiceId::new(),
            1,
            &input("0", "10", "21"),
            InvoiceType::Invoice,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_price_only_on_credit_notes() {
        let line = input("1", "-200", "21");
        assert!(
            InvoiceItem::new(InvoiceItemId::new(), InvoiceId::new(), 1, &line, InvoiceType::Invoice)
                .is_err()
        );
        let credit = InvoiceItem::new(
            InvoiceItemId::new(),
            InvoiceId::new(),
            1,
            &line,
            InvoiceType::CreditNote,
        )
        .unwrap();
        assert_eq!(credit.total, d("-242"));
    }

    #[test]
    fn update_recomputes_amounts() {
        let mut item = InvoiceItem::new(
            InvoiceItemId::new(),
            InvoiceId::new(),
            1,
            &input("1", "100", "21"),
            InvoiceType::Invoice,
        )
        .unwrap();

        item.apply(
            &ItemUpdate {
                quantity: Some(d("3")),
                ..Default::default()
            },
            InvoiceType::Invoice,
        )
        .unwrap();

        assert_eq!(item.subtotal, d("300"));
        assert_eq!(item.vat_amount, d("63"));
        assert_eq!(item.total, d("363"));
    }

    #[test]
    fn invalid_update_leaves_item_untouched() {
        let mut item = InvoiceItem::new(
            InvoiceItemId::new(),
            InvoiceId::new(),
            1,
            &input("1", "100", "21"),
            InvoiceType::Invoice,
        )
        .unwrap();
        let before = item.clone();

        let err = item
            .apply(
                &ItemUpdate {
                    vat_rate: Some(d("150")),
                    ..Default::default()
                },
                InvoiceType::Invoice,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(item, before);
    }

    proptest! {
        /// Property: line total stays within one minor unit of
        /// quantity * unit_price * (1 + vat_rate / 100).
        #[test]
        fn line_total_tracks_exact_formula(
            qty_cents in 1i64..100_000,
            price_cents in 0i64..10_000_000,
            vat in 0u32..=100,
        ) {
            let quantity = Decimal::new(qty_cents, 2);
            let unit_price = Decimal::new(price_cents, 2);
            let vat_rate = Decimal::from(vat);
            let item = InvoiceItem::new(
                InvoiceItemId::new(),
                InvoiceId::new(),
                1,
                &NewInvoiceItem {
                    description: "x".to_string(),
                    quantity,
                    unit: None,
                    unit_price,
                    vat_rate,
                },
                InvoiceType::Invoice,
            ).unwrap();

            let exact = quantity * unit_price * (Decimal::ONE + vat_rate / Decimal::ONE_HUNDRED);
            let tolerance = Decimal::new(1, 2) + Decimal::new(5, 3);
            prop_assert!((item.total - exact).abs() <= tolerance);
            prop_assert_eq!(item.total, item.subtotal + item.vat_amount);
        }
    }
}
