//! Recurring invoice schedules.
//!
//! Pure domain logic: the recurrence pattern and its date arithmetic, the
//! schedule lifecycle, and cloning a template invoice into a new draft. Timing
//! and persistence are driven from `invoicely-infra`.

pub mod generation;
pub mod pattern;
pub mod schedule;

pub use generation::{GeneratedInvoice, generated_note, materialize};
pub use pattern::{Interval, Recurrence, RecurrencePattern};
pub use schedule::RecurringSchedule;
