use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};

use invoicely_core::{
    CompanyId, CustomerId, ExpectedVersion, InvoiceId, InvoiceItemId, ScheduleId, UserId,
};
use invoicely_invoicing::{
    Company, Customer, HistoryEntry, Invoice, InvoiceItem, InvoiceNumber, Reminder, User,
};
use invoicely_recurring::RecurringSchedule;

use super::sequence::InvoiceSequences;
use super::{BillingStore, StoreTx};
use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
struct State {
    companies: HashMap<CompanyId, Company>,
    customers: HashMap<CustomerId, Customer>,
    users: HashMap<UserId, User>,
    invoices: HashMap<InvoiceId, Invoice>,
    items: HashMap<InvoiceId, Vec<InvoiceItem>>,
    history: Vec<HistoryEntry>,
    reminders: Vec<Reminder>,
    schedules: HashMap<ScheduleId, RecurringSchedule>,
    sequences: InvoiceSequences,
    share_tokens: HashMap<String, InvoiceId>,
}

impl State {
    fn numbers_of(&self, company_id: CompanyId) -> Vec<InvoiceNumber> {
        self.invoices
            .values()
            .filter(|i| i.company_id == company_id)
            .map(|i| i.invoice_number.clone())
            .collect()
    }

    /// A number is unique within the company. Numbers carry their year, so
    /// this also covers uniqueness per company and year.
    fn ensure_number_free(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let taken = self.invoices.values().any(|i| {
            i.id != invoice.id
                && i.company_id == invoice.company_id
                && i.invoice_number == invoice.invoice_number
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "invoice number {} already used",
                invoice.invoice_number
            )));
        }
        Ok(())
    }

    fn owned_invoice(&self, company_id: CompanyId, id: InvoiceId) -> Option<&Invoice> {
        self.invoices.get(&id).filter(|i| i.company_id == company_id)
    }

    fn index_share_token(&mut self, before: Option<&Invoice>, after: &Invoice) {
        if let Some(token) = before.and_then(|b| b.share.token.as_ref()) {
            self.share_tokens.remove(token);
        }
        if let Some(token) = after.share.token.as_ref() {
            self.share_tokens.insert(token.clone(), after.id);
        }
    }
}

/// In-memory billing store.
///
/// Intended for tests/dev. A transaction works on a staged copy of the whole
/// state under the write lock and swaps it in only when the closure succeeds.
/// Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    state: RwLock<State>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl BillingStore for InMemoryBillingStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let mut tx = MemoryTx {
            staged: guard.clone(),
        };
        let out = f(&mut tx)?;
        *guard = tx.staged;
        Ok(out)
    }

    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(self.read()?.companies.get(&id).cloned())
    }

    fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let state = self.read()?;
        Ok(state
            .customers
            .get(&id)
            .filter(|c| c.company_id == company_id)
            .cloned())
    }

    fn customers(&self, company_id: CompanyId) -> Result<Vec<Customer>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| c.company_id == company_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn users(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        let state = self.read()?;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    fn invoice(&self, company_id: CompanyId, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self.read()?.owned_invoice(company_id, id).cloned())
    }

    fn invoices(&self, company_id: CompanyId) -> Result<Vec<Invoice>, StoreError> {
        let state = self.read()?;
        Ok(state
            .invoices
            .values()
            .filter(|i| i.company_id == company_id)
            .cloned()
            .collect())
    }

    fn invoice_items(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError> {
        Ok(self.read()?.items.get(&invoice_id).cloned().unwrap_or_default())
    }

    fn invoice_by_share_token(&self, token: &str) -> Result<Option<Invoice>, StoreError> {
        let state = self.read()?;
        Ok(state
            .share_tokens
            .get(token)
            .and_then(|id| state.invoices.get(id))
            .cloned())
    }

    fn peek_invoice_number(&self, company_id: CompanyId, year: i32) -> Result<InvoiceNumber, StoreError> {
        let state = self.read()?;
        let numbers = state.numbers_of(company_id);
        Ok(state.sequences.peek(company_id, year, &numbers))
    }

    fn history(&self, company_id: CompanyId, invoice_id: InvoiceId) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .history
            .iter()
            .filter(|e| e.company_id == company_id && e.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    fn reminders(&self, company_id: CompanyId, invoice_id: InvoiceId) -> Result<Vec<Reminder>, StoreError> {
        let state = self.read()?;
        Ok(state
            .reminders
            .iter()
            .filter(|r| r.company_id == company_id && r.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    fn schedule(&self, company_id: CompanyId, id: ScheduleId) -> Result<Option<RecurringSchedule>, StoreError> {
        let state = self.read()?;
        Ok(state
            .schedules
            .get(&id)
            .filter(|s| s.company_id == company_id)
            .cloned())
    }

    fn schedules(&self, company_id: CompanyId) -> Result<Vec<RecurringSchedule>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<RecurringSchedule> = state
            .schedules
            .values()
            .filter(|s| s.company_id == company_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.next_generation_date, s.id));
        Ok(out)
    }

    fn due_schedules(&self, today: NaiveDate) -> Result<Vec<RecurringSchedule>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<RecurringSchedule> = state
            .schedules
            .values()
            .filter(|s| s.is_due(today))
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.next_generation_date, s.id));
        Ok(out)
    }

    fn record_share_view(&self, token: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let Some(id) = state.share_tokens.get(token).copied() else {
            return Ok(false);
        };
        let Some(invoice) = state.invoices.get_mut(&id) else {
            return Ok(false);
        };
        if invoice.is_deleted() || invoice.share.check(token, now).is_err() {
            return Ok(false);
        }
        invoice.share.record_view();
        Ok(true)
    }
}

struct MemoryTx {
    staged: State,
}

impl StoreTx for MemoryTx {
    fn allocate_invoice_number(
        &mut self,
        company_id: CompanyId,
        year: i32,
    ) -> Result<InvoiceNumber, StoreError> {
        let numbers = self.staged.numbers_of(company_id);
        self.staged.sequences.allocate(company_id, year, &numbers)
    }

    fn company(&self, id: CompanyId) -> Result<Option<Company>, StoreError> {
        Ok(self.staged.companies.get(&id).cloned())
    }

    fn put_company(&mut self, company: Company) -> Result<(), StoreError> {
        self.staged.companies.insert(company.id, company);
        Ok(())
    }

    fn customer(&self, company_id: CompanyId, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .staged
            .customers
            .get(&id)
            .filter(|c| c.company_id == company_id)
            .cloned())
    }

    fn put_customer(&mut self, customer: Customer) -> Result<(), StoreError> {
        if let Some(existing) = self.staged.customers.get(&customer.id) {
            if existing.company_id != customer.company_id {
                return Err(StoreError::TenantIsolation(format!(
                    "customer {} belongs to another company",
                    customer.id
                )));
            }
        }
        self.staged.customers.insert(customer.id, customer);
        Ok(())
    }

    fn remove_customer(&mut self, company_id: CompanyId, id: CustomerId) -> Result<(), StoreError> {
        if self.customer(company_id, id)?.is_none() {
            return Err(StoreError::NotFound);
        }
        let referenced = self.staged.invoices.values().any(|i| i.customer_id == id)
            || self.staged.schedules.values().any(|s| s.customer_id == id);
        if referenced {
            return Err(StoreError::Conflict(format!(
                "customer {id} is referenced by invoices"
            )));
        }
        self.staged.customers.remove(&id);
        Ok(())
    }

    fn put_user(&mut self, user: User) -> Result<(), StoreError> {
        self.staged.users.insert(user.id, user);
        Ok(())
    }

    fn invoice(&self, company_id: CompanyId, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self.staged.owned_invoice(company_id, id).cloned())
    }

    fn insert_invoice(&mut self, mut invoice: Invoice) -> Result<Invoice, StoreError> {
        if self.staged.invoices.contains_key(&invoice.id) {
            return Err(StoreError::Conflict(format!("invoice {} already exists", invoice.id)));
        }
        self.staged.ensure_number_free(&invoice)?;
        self.staged
            .sequences
            .observe(invoice.company_id, &invoice.invoice_number);
        invoice.version = 1;
        self.staged.index_share_token(None, &invoice);
        self.staged.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    fn update_invoice(
        &mut self,
        mut invoice: Invoice,
        expected: ExpectedVersion,
    ) -> Result<Invoice, StoreError> {
        let current = self
            .staged
            .invoices
            .get(&invoice.id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        if current.company_id != invoice.company_id {
            return Err(StoreError::TenantIsolation(format!(
                "invoice {} belongs to another company",
                invoice.id
            )));
        }
        if !expected.matches(current.version) {
            return Err(StoreError::Conflict(format!(
                "invoice {} changed concurrently (expected {expected:?}, found {})",
                invoice.id, current.version
            )));
        }
        if current.invoice_number != invoice.invoice_number {
            self.staged.ensure_number_free(&invoice)?;
            self.staged
                .sequences
                .observe(invoice.company_id, &invoice.invoice_number);
        }

        // View counts are bumped outside transactions; keep the stored count
        // while the token is unchanged.
        if invoice.share.token == current.share.token {
            invoice.share.view_count = current.share.view_count;
        }
        invoice.version = current.version + 1;
        self.staged.index_share_token(Some(&current), &invoice);
        self.staged.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    fn invoice_items(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError> {
        Ok(self.staged.items.get(&invoice_id).cloned().unwrap_or_default())
    }

    fn put_item(&mut self, item: InvoiceItem) -> Result<(), StoreError> {
        if !self.staged.invoices.contains_key(&item.invoice_id) {
            return Err(StoreError::NotFound);
        }
        let items = self.staged.items.entry(item.invoice_id).or_default();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        items.sort_by_key(|i| i.position);
        Ok(())
    }

    fn remove_item(&mut self, invoice_id: InvoiceId, item_id: InvoiceItemId) -> Result<(), StoreError> {
        let items = self
            .staged
            .items
            .get_mut(&invoice_id)
            .ok_or(StoreError::NotFound)?;
        let before = items.len();
        items.retain(|i| i.id != item_id);
        if items.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn remove_items(&mut self, invoice_id: InvoiceId) -> Result<usize, StoreError> {
        Ok(self
            .staged
            .items
            .remove(&invoice_id)
            .map(|items| items.len())
            .unwrap_or(0))
    }

    fn append_history(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
        let owned = self
            .staged
            .owned_invoice(entry.company_id, entry.invoice_id)
            .is_some();
        if !owned {
            return Err(StoreError::TenantIsolation(format!(
                "history entry for invoice {} outside its company",
                entry.invoice_id
            )));
        }
        self.staged.history.push(entry);
        Ok(())
    }

    fn insert_reminder(&mut self, reminder: Reminder) -> Result<(), StoreError> {
        if self.staged.reminders.iter().any(|r| r.id == reminder.id) {
            return Err(StoreError::Conflict(format!("reminder {} already stored", reminder.id)));
        }
        self.staged.reminders.push(reminder);
        Ok(())
    }

    fn schedule(
        &self,
        company_id: CompanyId,
        id: ScheduleId,
    ) -> Result<Option<RecurringSchedule>, StoreError> {
        Ok(self
            .staged
            .schedules
            .get(&id)
            .filter(|s| s.company_id == company_id)
            .cloned())
    }

    fn schedules_for_template(
        &self,
        company_id: CompanyId,
        invoice_id: InvoiceId,
    ) -> Result<Vec<RecurringSchedule>, StoreError> {
        Ok(self
            .staged
            .schedules
            .values()
            .filter(|s| s.company_id == company_id && s.template_invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    fn schedules_for_customer(
        &self,
        company_id: CompanyId,
        customer_id: CustomerId,
    ) -> Result<Vec<RecurringSchedule>, StoreError> {
        Ok(self
            .staged
            .schedules
            .values()
            .filter(|s| s.company_id == company_id && s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    fn put_schedule(
        &mut self,
        mut schedule: RecurringSchedule,
        expected: ExpectedVersion,
    ) -> Result<RecurringSchedule, StoreError> {
        let current = match self.staged.schedules.get(&schedule.id) {
            Some(existing) if existing.company_id != schedule.company_id => {
                return Err(StoreError::TenantIsolation(format!(
                    "schedule {} belongs to another company",
                    schedule.id
                )));
            }
            Some(existing) => existing.version,
            None => 0,
        };
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "schedule {} changed concurrently (expected {expected:?}, found {current})",
                schedule.id
            )));
        }

        schedule.version = current + 1;
        self.staged.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use invoicely_invoicing::{InvoiceType, NewInvoice, PaymentDetails};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn draft(company_id: CompanyId, number: InvoiceNumber) -> Invoice {
        let input = NewInvoice {
            company_id,
            customer_id: CustomerId::new(),
            invoice_type: InvoiceType::Invoice,
            invoice_number: None,
            issue_date: date(2024, 3, 1),
            due_date: date(2024, 3, 15),
            currency: "CZK".to_string(),
            exchange_rate: None,
            payment: PaymentDetails::default(),
            notes: None,
            items: vec![],
        };
        Invoice::create(InvoiceId::new(), &input, number, &[], Utc::now()).unwrap()
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();

        let result: Result<(), StoreError> = store.transaction(|tx| {
            let number = tx.allocate_invoice_number(company, 2024)?;
            tx.insert_invoice(draft(company, number))?;
            Err(StoreError::Storage("boom".to_string()))
        });

        assert!(result.is_err());
        assert!(store.invoices(company).unwrap().is_empty());
        assert_eq!(store.peek_invoice_number(company, 2024).unwrap().as_str(), "20240001");
    }

    #[test]
    fn duplicate_number_in_same_year_conflicts() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let number = InvoiceNumber::format(2024, 1);

        store
            .transaction(|tx| tx.insert_invoice(draft(company, number.clone())).map(|_| ()))
            .unwrap();
        let err = store
            .transaction(|tx| tx.insert_invoice(draft(company, number.clone())).map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Issued in another year, same number.
        let mut next_year = draft(company, number.clone());
        next_year.issue_date = date(2025, 1, 2);
        let err = store
            .transaction(|tx| tx.insert_invoice(next_year).map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Another company may use the same number.
        store
            .transaction(|tx| tx.insert_invoice(draft(CompanyId::new(), number.clone())).map(|_| ()))
            .unwrap();
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let stored = store
            .transaction(|tx| tx.insert_invoice(draft(company, InvoiceNumber::format(2024, 1))))
            .unwrap();
        assert_eq!(stored.version, 1);

        let updated = store
            .transaction(|tx| tx.update_invoice(stored.clone(), ExpectedVersion::Exact(1)))
            .unwrap();
        assert_eq!(updated.version, 2);

        let err = store
            .transaction(|tx| tx.update_invoice(stored.clone(), ExpectedVersion::Exact(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn other_companies_see_nothing() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let stored = store
            .transaction(|tx| tx.insert_invoice(draft(company, InvoiceNumber::format(2024, 1))))
            .unwrap();

        assert!(store.invoice(CompanyId::new(), stored.id).unwrap().is_none());
        let err = store
            .transaction(|tx| {
                let mut moved = stored.clone();
                moved.company_id = CompanyId::new();
                tx.update_invoice(moved, ExpectedVersion::Any)
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::TenantIsolation(_)));
    }
}
