use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invoicely_core::{CompanyId, CustomerId, DomainError, DomainResult, InvoiceId, ScheduleId};
use invoicely_invoicing::{Invoice, InvoiceStatus};

use crate::pattern::RecurrencePattern;

/// Recurring generation schedule for one template invoice.
///
/// Never deleted; cancellation and exhaustion only clear `is_active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: ScheduleId,
    pub company_id: CompanyId,
    pub template_invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub pattern: RecurrencePattern,
    pub next_generation_date: NaiveDate,
    pub generated_count: u32,
    pub is_active: bool,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every write.
    pub version: u64,
}

impl RecurringSchedule {
    pub fn create(
        id: ScheduleId,
        template: &Invoice,
        pattern: RecurrencePattern,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_usable_template(template)?;
        pattern.validate()?;
        let next_generation_date = pattern.first_date(today)?;
        if pattern.is_past_end(next_generation_date) {
            return Err(DomainError::validation(format!(
                "first generation date {next_generation_date} is after the end date"
            )));
        }

        Ok(Self {
            id,
            company_id: template.company_id,
            template_invoice_id: template.id,
            customer_id: template.customer_id,
            pattern,
            next_generation_date,
            generated_count: 0,
            is_active: true,
            last_generated_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_active && self.next_generation_date <= today
    }

    /// Advance after one generated invoice.
    ///
    /// Deactivates the schedule once `max_occurrences` is reached or the next
    /// date falls after `end_date`.
    pub fn record_generation(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::invariant("schedule is not active"));
        }
        let next = self.pattern.advance(self.next_generation_date)?;

        self.next_generation_date = next;
        self.generated_count = self.generated_count.saturating_add(1);
        self.last_generated_at = Some(now);
        self.updated_at = now;
        if self.pattern.is_exhausted(self.generated_count) || self.pattern.is_past_end(next) {
            self.is_active = false;
        }
        Ok(())
    }

    /// Stop generating. Returns whether the schedule was still active.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.updated_at = now;
        true
    }

    /// Swap the pattern and recompute the next date from `today`.
    ///
    /// The generated count carries over, so a lower `max_occurrences` can end
    /// the schedule immediately. Inactive schedules stay inactive.
    pub fn reschedule(
        &mut self,
        pattern: RecurrencePattern,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::invariant(
                "cancelled or finished schedules cannot be rescheduled",
            ));
        }
        pattern.validate()?;
        let next = pattern.first_date(today)?;

        self.pattern = pattern;
        self.next_generation_date = next;
        self.updated_at = now;
        if pattern.is_exhausted(self.generated_count) || pattern.is_past_end(next) {
            self.is_active = false;
        }
        Ok(())
    }
}

/// Templates must still exist and must not be cancelled.
pub(crate) fn ensure_usable_template(template: &Invoice) -> DomainResult<()> {
    if template.is_deleted() {
        return Err(DomainError::not_found());
    }
    if template.stored_status() == InvoiceStatus::Cancelled {
        return Err(DomainError::invariant(
            "cancelled invoices cannot be used as recurring templates",
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use invoicely_invoicing::{
        InvoiceNumber, InvoiceType, NewInvoice, NewInvoiceItem, PaymentDetails, build_items,
    };
    use rust_decimal::Decimal;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn template() -> (Invoice, Vec<invoicely_invoicing::InvoiceItem>) {
        let input = NewInvoice {
            company_id: CompanyId::new(),
            customer_id: CustomerId::new(),
            invoice_type: InvoiceType::Invoice,
            invoice_number: None,
            issue_date: date(2024, 1, 1),
            due_date: date(2024, 1, 15),
            currency: "EUR".to_string(),
            exchange_rate: Some(Decimal::new(2530, 2)),
            payment: PaymentDetails {
                payment_method: Some("bank_transfer".to_string()),
                bank_account: Some("CZ6508000000192000145399".to_string()),
                variable_symbol: Some("20240001".to_string()),
            },
            notes: None,
            items: vec![NewInvoiceItem {
                description: "Monthly retainer".to_string(),
                quantity: Decimal::ONE,
                unit: Some("month".to_string()),
                unit_price: Decimal::from(1200),
                vat_rate: Decimal::from(21),
            }],
        };
        let id = InvoiceId::new();
        let items = build_items(id, &input.items, input.invoice_type).unwrap();
        let invoice =
            Invoice::create(id, &input, InvoiceNumber::format(2024, 1), &items, Utc::now())
                .unwrap();
        (invoice, items)
    }

    #[test]
    fn monthly_from_start_date() {
        let (template, _) = template();
        let pattern = RecurrencePattern::monthly(1)
            .unwrap()
            .with_start_date(date(2024, 1, 15));

        let mut schedule =
            RecurringSchedule::create(ScheduleId::new(), &template, pattern, date(2024, 1, 15), Utc::now())
                .unwrap();
        assert_eq!(schedule.next_generation_date, date(2024, 1, 15));
        assert!(schedule.is_due(date(2024, 1, 15)));

        schedule.record_generation(Utc::now()).unwrap();
        assert_eq!(schedule.next_generation_date, date(2024, 2, 15));
        assert_eq!(schedule.generated_count, 1);
        assert!(schedule.last_generated_at.is_some());
        assert!(schedule.is_active);
    }

    #[test]
    fn deactivates_at_max_occurrences() {
        let (template, _) = template();
        let pattern = RecurrencePattern::monthly(1).unwrap().with_max_occurrences(2);
        let mut schedule =
            RecurringSchedule::create(ScheduleId::new(), &template, pattern, date(2024, 1, 1), Utc::now())
                .unwrap();

        schedule.record_generation(Utc::now()).unwrap();
        assert!(schedule.is_active);
        schedule.record_generation(Utc::now()).unwrap();
        assert!(!schedule.is_active);
        assert!(schedule.record_generation(Utc::now()).is_err());
    }

    #[test]
    fn deactivates_when_next_date_passes_end() {
        let (template, _) = template();
        let pattern = RecurrencePattern::monthly(1)
            .unwrap()
            .with_end_date(date(2024, 3, 10));
        let mut schedule =
            RecurringSchedule::create(ScheduleId::new(), &template, pattern, date(2024, 1, 1), Utc::now())
                .unwrap();
        assert_eq!(schedule.next_generation_date, date(2024, 2, 1));

        schedule.record_generation(Utc::now()).unwrap();
        assert_eq!(schedule.next_generation_date, date(2024, 3, 1));
        assert!(schedule.is_active);
        schedule.record_generation(Utc::now()).unwrap();
        assert!(!schedule.is_active);
    }

    #[test]
    fn cancelled_schedule_is_never_due() {
        let (template, _) = template();
        let pattern = RecurrencePattern::monthly(1).unwrap();
        let mut schedule =
            RecurringSchedule::create(ScheduleId::new(), &template, pattern, date(2024, 1, 1), Utc::now())
                .unwrap();

        assert!(schedule.cancel(Utc::now()));
        assert!(!schedule.cancel(Utc::now()));
        assert!(!schedule.is_due(date(2030, 1, 1)));
        assert!(schedule
            .reschedule(pattern, date(2024, 1, 1), Utc::now())
            .is_err());
    }

    #[test]
    fn reschedule_recomputes_from_today() {
        let (template, _) = template();
        let mut schedule = RecurringSchedule::create(
            ScheduleId::new(),
            &template,
            RecurrencePattern::monthly(1).unwrap(),
            date(2024, 1, 1),
            Utc::now(),
        )
        .unwrap();

        let weekly = RecurrencePattern::new(crate::pattern::Recurrence::Weekly {
            interval: crate::pattern::Interval::ONE,
        });
        schedule.reschedule(weekly, date(2024, 1, 10), Utc::now()).unwrap();
        assert_eq!(schedule.next_generation_date, date(2024, 1, 17));
        assert_eq!(schedule.pattern, weekly);
    }

    #[test]
    fn cancelled_template_is_rejected() {
        let (mut template, _) = template();
        template
            .transition(InvoiceStatus::Cancelled, Utc::now())
            .unwrap();
        let err = RecurringSchedule::create(
            ScheduleId::new(),
            &template,
            RecurrencePattern::monthly(1).unwrap(),
            date(2024, 1, 1),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
