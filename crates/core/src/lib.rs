//! Shared building blocks for the billing domain.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, optimistic version checks and the
//! injectable clock.

pub mod clock;
pub mod error;
pub mod id;
pub mod version;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{
    CompanyId, CustomerId, HistoryEntryId, InvoiceId, InvoiceItemId, ReminderId, ScheduleId,
    UserId,
};
pub use version::ExpectedVersion;
