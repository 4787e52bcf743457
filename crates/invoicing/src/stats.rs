//! Read-only company rollups.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use invoicely_core::{DomainError, DomainResult};

use crate::company::Customer;
use crate::invoice::{Invoice, InvoiceStatus};

/// Inclusive issue-date window. Both ends open means whole history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRange {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl StatsRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> DomainResult<Self> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(DomainError::validation(format!(
                    "date range starts ({from}) after it ends ({to})"
                )));
            }
        }
        Ok(Self { from, to })
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyStats {
    pub revenue: Decimal,
    pub invoice_count: u64,
    pub paid_invoices: u64,
    /// Outstanding amount on sent invoices, overdue included. Drafts were
    /// never billed and cancelled invoices are void, so neither counts even
    /// though neither is paid.
    pub unpaid_amount: Decimal,
    pub overdue_count: u64,
    pub active_customers: u64,
}

impl CompanyStats {
    /// Single pass over one company's invoices.
    ///
    /// Deleted invoices and invoices issued outside `range` are skipped; each
    /// invoice is counted at most once. `active_customers` is not range-bound.
    pub fn compute<'a>(
        invoices: impl IntoIterator<Item = &'a Invoice>,
        customers: impl IntoIterator<Item = &'a Customer>,
        range: &StatsRange,
        today: NaiveDate,
    ) -> Self {
        let mut stats = Self::default();

        for invoice in invoices {
            if invoice.is_deleted() || !range.contains(invoice.issue_date) {
                continue;
            }
            stats.invoice_count += 1;
            match invoice.effective_status(today) {
                InvoiceStatus::Paid => {
                    stats.paid_invoices += 1;
                    stats.revenue += invoice.total();
                }
                InvoiceStatus::Overdue => {
                    stats.overdue_count += 1;
                    stats.unpaid_amount += invoice.total();
                }
                InvoiceStatus::Sent => stats.unpaid_amount += invoice.total(),
                InvoiceStatus::Draft | InvoiceStatus::Cancelled => {}
            }
        }

        stats.active_customers = customers.into_iter().filter(|c| c.is_active).count() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{InvoiceType, NewInvoice, PaymentDetails, build_items};
    use crate::item::NewInvoiceItem;
    use crate::numbering::InvoiceNumber;
    use chrono::Utc;
    use invoicely_core::{CompanyId, CustomerId, InvoiceId};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(seq: u32, amount: i64, issue: NaiveDate, due: NaiveDate) -> Invoice {
        let input = NewInvoice {
            company_id: CompanyId::new(),
            customer_id: CustomerId::new(),
            invoice_type: InvoiceType::Invoice,
            invoice_number: None,
            issue_date: issue,
            due_date: due,
            currency: "CZK".to_string(),
            exchange_rate: None,
            payment: PaymentDetails::default(),
            notes: None,
            items: vec![NewInvoiceItem {
                description: "Work".to_string(),
                quantity: Decimal::ONE,
                unit: None,
                unit_price: Decimal::from(amount),
                vat_rate: Decimal::ZERO,
            }],
        };
        let id = InvoiceId::new();
        let items = build_items(id, &input.items, input.invoice_type).unwrap();
        Invoice::create(id, &input, InvoiceNumber::format(2024, seq), &items, Utc::now()).unwrap()
    }

    #[test]
    fn paid_sent_and_draft_rollup() {
        let now = Utc::now();
        let mut paid = invoice(1, 1000, date(2024, 1, 2), date(2024, 1, 16));
        paid.transition(InvoiceStatus::Sent, now).unwrap();
        paid.transition(InvoiceStatus::Paid, now).unwrap();
        let mut late = invoice(2, 500, date(2024, 1, 3), date(2024, 1, 10));
        late.transition(InvoiceStatus::Sent, now).unwrap();
        let draft = invoice(3, 700, date(2024, 1, 4), date(2024, 1, 18));

        let range = StatsRange::new(Some(date(2024, 1, 1)), Some(date(2024, 1, 31))).unwrap();
        let no_customers: Vec<Customer> = Vec::new();
        let stats = CompanyStats::compute(
            &[paid, late, draft],
            &no_customers,
            &range,
            date(2024, 2, 1),
        );

        assert_eq!(stats.revenue, Decimal::from(1000));
        assert_eq!(stats.unpaid_amount, Decimal::from(500));
        assert_eq!(stats.overdue_count, 1);
        assert_eq!(stats.invoice_count, 3);
        assert_eq!(stats.paid_invoices, 1);
    }

    #[test]
    fn range_is_inclusive_and_open_ends_cover_everything() {
        let a = invoice(1, 10, date(2024, 1, 1), date(2024, 1, 1));
        let b = invoice(2, 20, date(2024, 6, 30), date(2024, 7, 1));
        let today = date(2024, 7, 1);
        let no_customers: Vec<Customer> = Vec::new();

        let june = StatsRange::new(Some(date(2024, 6, 1)), Some(date(2024, 6, 30))).unwrap();
        assert_eq!(CompanyStats::compute([&a, &b], &no_customers, &june, today).invoice_count, 1);
        assert_eq!(
            CompanyStats::compute([&a, &b], &no_customers, &StatsRange::all(), today).invoice_count,
            2
        );
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(StatsRange::new(Some(date(2024, 2, 1)), Some(date(2024, 1, 1))).is_err());
    }
}
