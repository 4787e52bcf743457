use std::sync::{Arc, Mutex, TryLockError};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use invoicely_core::{Clock, CompanyId, ExpectedVersion, InvoiceId, ScheduleId};
use invoicely_invoicing::{HistoryAction, HistoryEntry};
use invoicely_recurring::{GeneratedInvoice, RecurrencePattern, RecurringSchedule, materialize};

use crate::error::{BillingError, BillingResult};
use crate::invoices::{insert_with_next_number, load_live, snapshot};
use crate::store::BillingStore;

#[derive(Debug, Clone)]
pub struct RecurringSettings {
    /// Days between issue and due date of generated invoices.
    pub generated_due_days: u32,
    pub max_number_attempts: u32,
}

impl Default for RecurringSettings {
    fn default() -> Self {
        Self {
            generated_due_days: 14,
            max_number_attempts: 3,
        }
    }
}

impl RecurringSettings {
    pub fn with_generated_due_days(mut self, days: u32) -> Self {
        self.generated_due_days = days;
        self
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts.max(1);
        self
    }
}

/// A schedule that could not be processed in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationFailure {
    pub schedule_id: ScheduleId,
    pub company_id: CompanyId,
    pub error: String,
}

/// Outcome of one `run_due_generation` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationRun {
    pub generated: Vec<GeneratedInvoice>,
    pub failed: Vec<GenerationFailure>,
    /// Another run was still in progress; nothing was done.
    pub skipped: bool,
}

/// Schedules recurring invoices and materializes the due ones.
///
/// Runs are not reentrant: a call made while another is in progress returns
/// immediately with `skipped` set.
pub struct RecurringEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    settings: RecurringSettings,
    running: Mutex<()>,
}

impl<S: BillingStore> RecurringEngine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            settings: RecurringSettings::default(),
            running: Mutex::new(()),
        }
    }

    pub fn with_settings(mut self, settings: RecurringSettings) -> Self {
        self.settings = settings;
        self
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Start generating copies of `template_id` on `pattern`.
    #[instrument(skip(self, pattern), fields(company_id = %company_id, invoice_id = %template_id), err)]
    pub fn schedule_recurring(
        &self,
        company_id: CompanyId,
        template_id: InvoiceId,
        pattern: RecurrencePattern,
    ) -> BillingResult<RecurringSchedule> {
        let today = self.clock.today();
        let now = self.clock.now();

        let schedule = self.store.transaction(|tx| {
            let template = load_live(tx, company_id, template_id)?;
            let schedule = RecurringSchedule::create(ScheduleId::new(), &template, pattern, today, now)?;
            Ok::<_, BillingError>(tx.put_schedule(schedule, ExpectedVersion::Exact(0))?)
        })?;

        info!(
            schedule_id = %schedule.id,
            frequency = schedule.pattern.recurrence.frequency(),
            next_generation_date = %schedule.next_generation_date,
            "recurring schedule created"
        );
        Ok(schedule)
    }

    /// Stop a schedule for good. Already generated invoices are untouched.
    #[instrument(skip(self), fields(company_id = %company_id, schedule_id = %id))]
    pub fn cancel_recurring(&self, company_id: CompanyId, id: ScheduleId) -> BillingResult<RecurringSchedule> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let mut schedule = tx.schedule(company_id, id)?.ok_or(BillingError::NotFound)?;
            let version = schedule.version;
            if !schedule.cancel(now) {
                return Ok(schedule);
            }
            info!("recurring schedule cancelled");
            Ok(tx.put_schedule(schedule, ExpectedVersion::Exact(version))?)
        })
    }

    /// Replace the pattern and recompute the next date from today.
    #[instrument(skip(self, pattern), fields(company_id = %company_id, schedule_id = %id))]
    pub fn reschedule_recurring(
        &self,
        company_id: CompanyId,
        id: ScheduleId,
        pattern: RecurrencePattern,
    ) -> BillingResult<RecurringSchedule> {
        let today = self.clock.today();
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let mut schedule = tx.schedule(company_id, id)?.ok_or(BillingError::NotFound)?;
            let version = schedule.version;
            schedule.reschedule(pattern, today, now)?;
            Ok(tx.put_schedule(schedule, ExpectedVersion::Exact(version))?)
        })
    }

    pub fn recurring_schedule(&self, company_id: CompanyId, id: ScheduleId) -> BillingResult<RecurringSchedule> {
        self.store
            .schedule(company_id, id)?
            .ok_or(BillingError::NotFound)
    }

    pub fn schedules(&self, company_id: CompanyId) -> BillingResult<Vec<RecurringSchedule>> {
        Ok(self.store.schedules(company_id)?)
    }

    /// Materialize every schedule due today.
    ///
    /// Each schedule is one transaction (number, invoice, items, history,
    /// schedule advance). A failing schedule is logged and reported in the
    /// result; the others still run.
    pub fn run_due_generation(&self) -> BillingResult<GenerationRun> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                warn!("recurring generation already running, skipping");
                return Ok(GenerationRun {
                    skipped: true,
                    ..GenerationRun::default()
                });
            }
        };

        let today = self.clock.today();
        let now = self.clock.now();
        let due = self.store.due_schedules(today)?;

        let mut run = GenerationRun::default();
        for schedule in due {
            match self.generate_one(&schedule, today, now) {
                Ok(generated) => {
                    info!(
                        schedule_id = %schedule.id,
                        invoice_id = %generated.invoice_id,
                        invoice_number = %generated.invoice_number,
                        "recurring invoice generated"
                    );
                    run.generated.push(generated);
                }
                Err(error) => {
                    warn!(
                        schedule_id = %schedule.id,
                        company_id = %schedule.company_id,
                        error = %error,
                        "recurring generation failed"
                    );
                    run.failed.push(GenerationFailure {
                        schedule_id: schedule.id,
                        company_id: schedule.company_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            due_date = %today,
            generated = run.generated.len(),
            failed = run.failed.len(),
            "recurring generation finished"
        );
        Ok(run)
    }

    fn generate_one(
        &self,
        due: &RecurringSchedule,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> BillingResult<GeneratedInvoice> {
        let due_days = self.settings.generated_due_days;
        let attempts = self.settings.max_number_attempts;

        self.store.transaction(|tx| {
            let mut schedule = tx
                .schedule(due.company_id, due.id)?
                .ok_or(BillingError::NotFound)?;
            if schedule.version != due.version || !schedule.is_due(today) {
                return Err(BillingError::Conflict(format!(
                    "schedule {} changed since it was selected",
                    due.id
                )));
            }

            let template = load_live(tx, schedule.company_id, schedule.template_invoice_id)?;
            let customer = tx
                .customer(template.company_id, template.customer_id)?
                .ok_or(BillingError::NotFound)?;
            if !customer.can_be_invoiced() {
                return Err(BillingError::Validation(format!(
                    "customer {} is inactive",
                    customer.id
                )));
            }
            let template_items = tx.invoice_items(template.id)?;
            let invoice_id = InvoiceId::new();

            let (invoice, items) = insert_with_next_number(
                tx,
                schedule.company_id,
                today.year(),
                attempts,
                |number| {
                    materialize(
                        &template,
                        &template_items,
                        invoice_id,
                        number,
                        today,
                        due_days,
                        now,
                    )
                },
            )?;
            for item in items {
                tx.put_item(item)?;
            }
            tx.append_history(
                HistoryEntry::new(invoice.id, invoice.company_id, None, HistoryAction::Created, now)
                    .with_values(None, Some(snapshot(&invoice)))
                    .with_description(format!(
                        "Invoice {} generated from recurring schedule",
                        invoice.invoice_number
                    )),
            )?;

            schedule.record_generation(now)?;
            let schedule = tx.put_schedule(schedule, ExpectedVersion::Exact(due.version))?;
            if !schedule.is_active {
                info!(schedule_id = %schedule.id, generated_count = schedule.generated_count, "recurring schedule finished");
            }

            Ok(GeneratedInvoice {
                schedule_id: schedule.id,
                company_id: schedule.company_id,
                template_invoice_id: template.id,
                invoice_id: invoice.id,
                invoice_number: invoice.invoice_number,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBillingStore;
    use invoicely_core::ManualClock;

    #[test]
    fn overlapping_run_is_skipped() {
        let clock = Arc::new(ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let engine = RecurringEngine::new(Arc::new(InMemoryBillingStore::new()), clock);

        let _held = engine.running.lock().unwrap();
        let run = engine.run_due_generation().unwrap();
        assert!(run.skipped);
        assert!(run.generated.is_empty());
    }

    #[test]
    fn empty_store_generates_nothing() {
        let clock = Arc::new(ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let engine = RecurringEngine::new(InMemoryBillingStore::new(), clock);

        let run = engine.run_due_generation().unwrap();
        assert!(!run.skipped);
        assert!(run.generated.is_empty());
        assert!(run.failed.is_empty());
    }
}
