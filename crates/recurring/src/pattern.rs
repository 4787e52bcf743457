use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use invoicely_core::{DomainError, DomainResult};

/// Repeat interval, always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Interval(u32);

impl Interval {
    pub const ONE: Interval = Interval(1);

    pub fn new(value: u32) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::validation("recurrence interval must be at least 1"));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Interval {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Interval> for u32 {
    fn from(value: Interval) -> Self {
        value.0
    }
}

/// How often a schedule fires.
///
/// Serialized as `{"frequency": "monthly", "interval": 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "lowercase")]
pub enum Recurrence {
    Daily { interval: Interval },
    Weekly { interval: Interval },
    Monthly { interval: Interval },
    Quarterly { interval: Interval },
    Yearly { interval: Interval },
}

impl Recurrence {
    pub fn frequency(&self) -> &'static str {
        match self {
            Recurrence::Daily { .. } => "daily",
            Recurrence::Weekly { .. } => "weekly",
            Recurrence::Monthly { .. } => "monthly",
            Recurrence::Quarterly { .. } => "quarterly",
            Recurrence::Yearly { .. } => "yearly",
        }
    }

    pub fn interval(&self) -> Interval {
        match *self {
            Recurrence::Daily { interval }
            | Recurrence::Weekly { interval }
            | Recurrence::Monthly { interval }
            | Recurrence::Quarterly { interval }
            | Recurrence::Yearly { interval } => interval,
        }
    }

    /// Next occurrence strictly after `from`.
    ///
    /// Month-based steps keep the day of month and clamp to the last day of
    /// shorter months (Jan 31 + 1 month = Feb 29 in a leap year).
    pub fn advance(&self, from: NaiveDate) -> DomainResult<NaiveDate> {
        let n = self.interval().get();
        let next = match self {
            Recurrence::Daily { .. } => from.checked_add_days(Days::new(u64::from(n))),
            Recurrence::Weekly { .. } => from.checked_add_days(Days::new(u64::from(n) * 7)),
            Recurrence::Monthly { .. } => from.checked_add_months(Months::new(n)),
            Recurrence::Quarterly { .. } => n
                .checked_mul(3)
                .and_then(|m| from.checked_add_months(Months::new(m))),
            Recurrence::Yearly { .. } => n
                .checked_mul(12)
                .and_then(|m| from.checked_add_months(Months::new(m))),
        };
        next.ok_or_else(|| {
            DomainError::validation(format!(
                "next {} occurrence after {from} is out of range",
                self.frequency()
            ))
        })
    }
}

/// Recurrence plus the optional bounds that end a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    #[serde(flatten)]
    pub recurrence: Recurrence,
    /// First generation date, used when it is not already in the past.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub max_occurrences: Option<u32>,
}

impl RecurrencePattern {
    pub fn new(recurrence: Recurrence) -> Self {
        Self {
            recurrence,
            start_date: None,
            end_date: None,
            max_occurrences: None,
        }
    }

    pub fn monthly(interval: u32) -> DomainResult<Self> {
        Ok(Self::new(Recurrence::Monthly {
            interval: Interval::new(interval)?,
        }))
    }

    pub fn with_start_date(mut self, start: NaiveDate) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn with_end_date(mut self, end: NaiveDate) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn with_max_occurrences(mut self, max: u32) -> Self {
        self.max_occurrences = Some(max);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.max_occurrences == Some(0) {
            return Err(DomainError::validation("max occurrences must be at least 1"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(DomainError::validation(format!(
                    "recurrence ends ({end}) before it starts ({start})"
                )));
            }
        }
        Ok(())
    }

    /// First generation date for a schedule created or rescheduled on `today`.
    pub fn first_date(&self, today: NaiveDate) -> DomainResult<NaiveDate> {
        match self.start_date {
            Some(start) if start >= today => Ok(start),
            _ => self.recurrence.advance(today),
        }
    }

    pub fn advance(&self, from: NaiveDate) -> DomainResult<NaiveDate> {
        self.recurrence.advance(from)
    }

    pub fn is_past_end(&self, date: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| date > end)
    }

    pub fn is_exhausted(&self, generated_count: u32) -> bool {
        self.max_occurrences.is_some_and(|max| generated_count >= max)
    }
}
