//! Billing core entry point.
//!
//! [`Billing`] wires every infra service over one store and one clock and is
//! what routing layers and the scheduling host call into.

pub mod config;

pub use config::BillingConfig;

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use invoicely_core::{
    Clock, CompanyId, CustomerId, InvoiceId, InvoiceItemId, ScheduleId, SystemClock, UserId,
};
use invoicely_infra::BillingResult;
use invoicely_infra::audit::{AuditTrail, HistoryView};
use invoicely_infra::invoices::{InvoiceDetails, InvoiceQuery, InvoiceRow, InvoiceService};
use invoicely_infra::parties::PartyService;
use invoicely_infra::recurring::{
    GenerationRun, RecurringEngine, RecurringSettings, RecurringWorker, RecurringWorkerConfig,
    RecurringWorkerHandle,
};
use invoicely_infra::sharing::{ShareLink, ShareService, ShareSettings, ShareStatus};
use invoicely_infra::stats::StatsService;
use invoicely_infra::store::{BillingStore, InMemoryBillingStore};
use invoicely_invoicing::{
    Company, CompanyStats, Customer, HistoryAction, HistoryEntry, InvoiceNumber, InvoiceStatus,
    InvoiceUpdate, ItemUpdate, NewCompany, NewCustomer, NewInvoice, NewInvoiceItem, NewReminder,
    Reminder, User,
};
use invoicely_recurring::{RecurrencePattern, RecurringSchedule};

/// All billing operations over a shared store.
pub struct Billing<S> {
    parties: PartyService<S>,
    invoices: InvoiceService<S>,
    audit: AuditTrail<S>,
    shares: ShareService<S>,
    stats: StatsService<S>,
    recurring: Arc<RecurringEngine<S>>,
    worker: RecurringWorkerConfig,
}

impl Billing<Arc<InMemoryBillingStore>> {
    /// Fresh in-memory store on the system clock.
    pub fn in_memory(config: &BillingConfig) -> Self {
        Self::new(Arc::new(InMemoryBillingStore::new()), Arc::new(SystemClock), config)
    }
}

impl<S: BillingStore + Clone> Billing<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: &BillingConfig) -> Self {
        let recurring = RecurringEngine::new(store.clone(), clock.clone()).with_settings(
            RecurringSettings::default().with_generated_due_days(config.generated_due_days),
        );

        Self {
            parties: PartyService::new(store.clone(), clock.clone()),
            invoices: InvoiceService::new(store.clone(), clock.clone()),
            audit: AuditTrail::new(store.clone(), clock.clone()),
            shares: ShareService::new(store.clone(), clock.clone()).with_settings(
                ShareSettings::default().with_default_expiry_days(config.share_token_days),
            ),
            stats: StatsService::new(store, clock),
            recurring: Arc::new(recurring),
            worker: RecurringWorkerConfig::default().with_tick_interval(config.tick_interval()),
        }
    }

    // Companies, customers, users

    pub fn create_company(&self, input: NewCompany) -> BillingResult<Company> {
        self.parties.create_company(input)
    }

    pub fn company(&self, id: CompanyId) -> BillingResult<Company> {
        self.parties.company(id)
    }

    pub fn register_user(&self, display_name: &str, email: Option<String>) -> BillingResult<User> {
        self.parties.register_user(display_name, email)
    }

    pub fn create_customer(&self, input: NewCustomer) -> BillingResult<Customer> {
        self.parties.create_customer(input)
    }

    pub fn customers(&self, company_id: CompanyId) -> BillingResult<Vec<Customer>> {
        self.parties.customers(company_id)
    }

    pub fn deactivate_customer(&self, company_id: CompanyId, id: CustomerId) -> BillingResult<Customer> {
        self.parties.deactivate_customer(company_id, id)
    }

    pub fn remove_customer(&self, company_id: CompanyId, id: CustomerId) -> BillingResult<()> {
        self.parties.remove_customer(company_id, id)
    }

    // Invoices

    pub fn create_invoice(&self, user_id: Option<UserId>, input: NewInvoice) -> BillingResult<InvoiceDetails> {
        self.invoices.create_invoice(user_id, input)
    }

    pub fn next_invoice_number(&self, company_id: CompanyId, year: i32) -> BillingResult<InvoiceNumber> {
        self.invoices.next_invoice_number(company_id, year)
    }

    pub fn invoice_with_items(&self, company_id: CompanyId, id: InvoiceId) -> BillingResult<InvoiceDetails> {
        self.invoices.invoice_with_items(company_id, id)
    }

    pub fn invoices(&self, company_id: CompanyId, query: &InvoiceQuery) -> BillingResult<Vec<InvoiceRow>> {
        self.invoices.invoices(company_id, query)
    }

    pub fn update_invoice_status(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        status: InvoiceStatus,
    ) -> BillingResult<InvoiceDetails> {
        self.invoices.update_invoice_status(company_id, id, user_id, status)
    }

    pub fn update_invoice(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        update: InvoiceUpdate,
    ) -> BillingResult<InvoiceDetails> {
        self.invoices.update_invoice(company_id, id, user_id, update)
    }

    pub fn delete_invoice(&self, company_id: CompanyId, id: InvoiceId, user_id: Option<UserId>) -> BillingResult<()> {
        self.invoices.delete_invoice(company_id, id, user_id)
    }

    pub fn add_item(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        user_id: Option<UserId>,
        input: NewInvoiceItem,
    ) -> BillingResult<InvoiceDetails> {
        self.invoices.add_item(company_id, invoice_id, user_id, input)
    }

    pub fn update_item(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        user_id: Option<UserId>,
        update: ItemUpdate,
    ) -> BillingResult<InvoiceDetails> {
        self.invoices.update_item(company_id, invoice_id, item_id, user_id, update)
    }

    pub fn remove_item(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        user_id: Option<UserId>,
    ) -> BillingResult<InvoiceDetails> {
        self.invoices.remove_item(company_id, invoice_id, item_id, user_id)
    }

    pub fn record_delivery(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        recipient: &str,
    ) -> BillingResult<InvoiceDetails> {
        self.invoices.record_delivery(company_id, id, user_id, recipient)
    }

    pub fn record_reminder(
        &self,
        company_id: CompanyId,
        id: InvoiceId,
        user_id: Option<UserId>,
        input: NewReminder,
    ) -> BillingResult<Reminder> {
        self.invoices.record_reminder(company_id, id, user_id, input)
    }

    pub fn reminders(&self, company_id: CompanyId, id: InvoiceId) -> BillingResult<Vec<Reminder>> {
        self.invoices.reminders(company_id, id)
    }

    // Audit trail

    #[allow(clippy::too_many_arguments)]
    pub fn record_history(
        &self,
        invoice_id: InvoiceId,
        company_id: CompanyId,
        user_id: Option<UserId>,
        action: HistoryAction,
        old_value: Option<JsonValue>,
        new_value: Option<JsonValue>,
        description: Option<String>,
    ) -> BillingResult<HistoryEntry> {
        self.audit
            .record(invoice_id, company_id, user_id, action, old_value, new_value, description)
    }

    pub fn history(&self, company_id: CompanyId, invoice_id: InvoiceId) -> BillingResult<Vec<HistoryView>> {
        self.audit.history(company_id, invoice_id)
    }

    // Share links

    pub fn issue_share_token(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        user_id: Option<UserId>,
        expires_in_days: Option<i64>,
    ) -> BillingResult<ShareLink> {
        self.shares
            .issue_share_token(company_id, invoice_id, user_id, expires_in_days)
    }

    pub fn resolve_share_token(&self, token: &str) -> BillingResult<InvoiceDetails> {
        self.shares.resolve_share_token(token)
    }

    pub fn record_share_view(&self, token: &str) -> BillingResult<()> {
        self.shares.record_share_view(token)
    }

    pub fn revoke_share_token(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
        user_id: Option<UserId>,
    ) -> BillingResult<()> {
        self.shares.revoke_share_token(company_id, invoice_id, user_id)
    }

    pub fn share_status(&self, company_id: CompanyId, invoice_id: InvoiceId) -> BillingResult<ShareStatus> {
        self.shares.share_status(company_id, invoice_id)
    }

    // Recurring

    pub fn schedule_recurring(
        &self,
        company_id: CompanyId,
        template_id: InvoiceId,
        pattern: RecurrencePattern,
    ) -> BillingResult<RecurringSchedule> {
        self.recurring.schedule_recurring(company_id, template_id, pattern)
    }

    pub fn cancel_recurring(&self, company_id: CompanyId, id: ScheduleId) -> BillingResult<RecurringSchedule> {
        self.recurring.cancel_recurring(company_id, id)
    }

    pub fn reschedule_recurring(
        &self,
        company_id: CompanyId,
        id: ScheduleId,
        pattern: RecurrencePattern,
    ) -> BillingResult<RecurringSchedule> {
        self.recurring.reschedule_recurring(company_id, id, pattern)
    }

    pub fn recurring_schedule(&self, company_id: CompanyId, id: ScheduleId) -> BillingResult<RecurringSchedule> {
        self.recurring.recurring_schedule(company_id, id)
    }

    pub fn schedules(&self, company_id: CompanyId) -> BillingResult<Vec<RecurringSchedule>> {
        self.recurring.schedules(company_id)
    }

    pub fn run_due_generation(&self) -> BillingResult<GenerationRun> {
        self.recurring.run_due_generation()
    }

    /// Start the background generation thread on the configured tick.
    pub fn spawn_recurring_worker(&self) -> RecurringWorkerHandle
    where
        S: 'static,
    {
        RecurringWorker::spawn(self.recurring.clone(), self.worker.clone())
    }

    // Statistics

    pub fn company_stats(
        &self,
        company_id: CompanyId,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> BillingResult<CompanyStats> {
        self.stats.company_stats(company_id, date_from, date_to)
    }
}
