//! Infrastructure layer: the persistence boundary, application services and
//! the recurring generation worker.
//!
//! Services compose a [`store::BillingStore`] with an injected
//! [`invoicely_core::Clock`]; they contain no IO of their own.

pub mod audit;
pub mod error;
pub mod invoices;
pub mod parties;
pub mod recurring;
pub mod sharing;
pub mod stats;
pub mod store;


pub use error::{BillingError, BillingResult, StoreError};
