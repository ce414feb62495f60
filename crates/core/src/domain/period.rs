use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::numeric::tenth_percent;

/// The fiscal quarter whose end date bounds the bookings forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalQuarter {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodInfo {
    pub quarter_start: NaiveDate,
    pub quarter_end: NaiveDate,
    pub as_of_date: NaiveDate,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub total_days: i64,
    pub quarter_pct_complete: Decimal,
}

impl FiscalQuarter {
    pub fn total_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whole days from `as_of` to quarter end; a renewal `n` days out lands
    /// inside the quarter iff `n <= days_remaining(as_of)`.
    pub fn days_remaining(&self, as_of: NaiveDate) -> i64 {
        (self.end - as_of).num_days()
    }

    pub fn period_info(&self, as_of: NaiveDate) -> PeriodInfo {
        let total_days = self.total_days();
        let days_elapsed = ((as_of - self.start).num_days() + 1).clamp(0, total_days);
        let quarter_pct_complete = if total_days > 0 {
            tenth_percent(Decimal::from(days_elapsed), Decimal::from(total_days))
        } else {
            Decimal::ZERO
        };

        PeriodInfo {
            quarter_start: self.start,
            quarter_end: self.end,
            as_of_date: as_of,
            days_elapsed,
            days_remaining: total_days - days_elapsed,
            total_days,
            quarter_pct_complete,
        }
    }
}

/// The inclusive date window a warehouse query covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The window of equal length ending the day before this one starts.
    pub fn previous(&self) -> Self {
        let end = self.start - Duration::days(1);
        let start = end - Duration::days(self.len_days() - 1);
        Self { start, end }
    }
}
