use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use invoicely_core::{Clock, CompanyId};
use invoicely_invoicing::{CompanyStats, StatsRange};

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// Read-only rollups over a company's invoices.
pub struct StatsService<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: BillingStore> StatsService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Omitted bounds mean whole history on that side.
    pub fn company_stats(
        &self,
        company_id: CompanyId,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> BillingResult<CompanyStats> {
        let range = StatsRange::new(date_from, date_to)?;
        self.store
            .company(company_id)?
            .ok_or(BillingError::NotFound)?;

        let invoices = self.store.invoices(company_id)?;
        let customers = self.store.customers(company_id)?;
        let stats = CompanyStats::compute(&invoices, &customers, &range, self.clock.today());

        debug!(
            company_id = %company_id,
            invoice_count = stats.invoice_count,
            revenue = %stats.revenue,
            "company stats computed"
        );
        Ok(stats)
    }
}
