use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// day count convention mapping a date interval to a year fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayCountConvention {
    /// 30 days per month / 360 days per year, with end-of-month adjustment
    Thirty360,
    /// actual days / 365
    Act365,
    /// actual days / 360
    Act360,
    /// actual days / actual days in year, split at year boundaries (ISDA)
    ActActIsda,
}

impl DayCountConvention {
    /// day count between two dates under the convention
    pub fn days_between(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        match self {
            DayCountConvention::Thirty360 => days_30_360(start, end),
            _ => (end - start).num_days(),
        }
    }

    /// non-negative year fraction for the interval [start, end)
    pub fn year_fraction(&self, start: NaiveDate, end: NaiveDate) -> Decimal {
        if end <= start {
            return Decimal::ZERO;
        }
        match self {
            DayCountConvention::Thirty360 => {
                Decimal::from(days_30_360(start, end)) / Decimal::from(360)
            }
            DayCountConvention::Act365 => {
                Decimal::from((end - start).num_days()) / Decimal::from(365)
            }
            DayCountConvention::Act360 => {
                Decimal::from((end - start).num_days()) / Decimal::from(360)
            }
            DayCountConvention::ActActIsda => act_act_isda(start, end),
        }
    }
}

/// 30/360 day count with the standard end-of-month adjustment
fn days_30_360(start: NaiveDate, end: NaiveDate) -> i64 {
    let y1 = start.year() as i64;
    let y2 = end.year() as i64;
    let m1 = start.month() as i64;
    let m2 = end.month() as i64;
    let d1 = (start.day() as i64).min(30);
    let d2 = if d1 == 30 {
        (end.day() as i64).min(30)
    } else {
        end.day() as i64
    };

    (360 * (y2 - y1) + 30 * (m2 - m1) + (d2 - d1)).max(0)
}

/// ACT/ACT ISDA: split the interval at year boundaries, each sub-interval
/// divided by its own year basis
fn act_act_isda(start: NaiveDate, end: NaiveDate) -> Decimal {
    let mut fraction = Decimal::ZERO;
    let mut cursor = start;

    while cursor < end {
        let year_end = NaiveDate::from_ymd_opt(cursor.year() + 1, 1, 1).expect("valid year start");
        let segment_end = end.min(year_end);
        let days = (segment_end - cursor).num_days();
        let basis = if is_leap_year(cursor.year()) { 366 } else { 365 };
        fraction += Decimal::from(days) / Decimal::from(basis);
        cursor = segment_end;
    }

    fraction
}

pub(crate) fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
