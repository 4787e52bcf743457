//! Companies, customers and users.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use invoicely_core::{Clock, CompanyId, CustomerId, UserId};
use invoicely_invoicing::{Company, Customer, NewCompany, NewCustomer, User};

use crate::error::{BillingError, BillingResult};
use crate::invoices::cancel_schedules;
use crate::store::BillingStore;

pub struct PartyService<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: BillingStore> PartyService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn create_company(&self, input: NewCompany) -> BillingResult<Company> {
        let company = Company::create(CompanyId::new(), &input, self.clock.now())?;
        self.store.transaction(|tx| {
            tx.put_company(company.clone())?;
            Ok::<_, BillingError>(())
        })?;
        info!(company_id = %company.id, "company created");
        Ok(company)
    }

    pub fn company(&self, id: CompanyId) -> BillingResult<Company> {
        self.store.company(id)?.ok_or(BillingError::NotFound)
    }

    pub fn register_user(&self, display_name: &str, email: Option<String>) -> BillingResult<User> {
        let user = User::new(UserId::new(), display_name, email)?;
        self.store.transaction(|tx| {
            tx.put_user(user.clone())?;
            Ok::<_, BillingError>(())
        })?;
        Ok(user)
    }

    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub fn create_customer(&self, input: NewCustomer) -> BillingResult<Customer> {
        let customer = Customer::create(CustomerId::new(), &input, self.clock.now())?;
        self.store.transaction(|tx| {
            tx.company(input.company_id)?
                .ok_or(BillingError::NotFound)?;
            tx.put_customer(customer.clone())?;
            Ok::<_, BillingError>(())
        })?;
        info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    /// All customers of a company, inactive ones included.
    pub fn customers(&self, company_id: CompanyId) -> BillingResult<Vec<Customer>> {
        self.store
            .company(company_id)?
            .ok_or(BillingError::NotFound)?;
        Ok(self.store.customers(company_id)?)
    }

    /// Soft delete. Existing invoices keep pointing at the customer; recurring
    /// schedules billing it are cancelled in the same transaction.
    #[instrument(skip(self), fields(company_id = %company_id, customer_id = %id))]
    pub fn deactivate_customer(&self, company_id: CompanyId, id: CustomerId) -> BillingResult<Customer> {
        let now = self.clock.now();
        let (customer, cancelled) = self.store.transaction(|tx| {
            let mut customer = tx.customer(company_id, id)?.ok_or(BillingError::NotFound)?;
            customer.deactivate();
            tx.put_customer(customer.clone())?;
            let schedules = tx.schedules_for_customer(company_id, id)?;
            let cancelled = cancel_schedules(tx, schedules, now)?;
            Ok::<_, BillingError>((customer, cancelled))
        })?;

        if cancelled > 0 {
            warn!(schedules = cancelled, "customer deactivated, recurring schedules cancelled");
        }
        info!("customer deactivated");
        Ok(customer)
    }

    /// Hard delete, refused with `Conflict` while invoices reference the customer.
    pub fn remove_customer(&self, company_id: CompanyId, id: CustomerId) -> BillingResult<()> {
        self.store.transaction(|tx| {
            tx.remove_customer(company_id, id)?;
            Ok::<_, BillingError>(())
        })?;
        info!(company_id = %company_id, customer_id = %id, "customer removed");
        Ok(())
    }
}
