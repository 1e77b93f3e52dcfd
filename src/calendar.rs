use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// business-day adjustment mode for raw schedule dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessDayMode {
    /// keep the raw date even if it is a non-business day
    Unadjusted,
    /// roll forward to the next business day
    Following,
    /// roll backward to the previous business day
    Preceding,
    /// roll forward unless that crosses into the next calendar month,
    /// in which case roll backward
    ModifiedFollowing,
    /// roll backward unless that crosses into the previous calendar month,
    /// in which case roll forward
    ModifiedPreceding,
}

/// holiday calendar: a set of holiday dates plus a weekly-off mask
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessCalendar {
    pub calendar_id: String,
    holidays: BTreeSet<NaiveDate>,
    weekly_off: Vec<Weekday>,
}

impl BusinessCalendar {
    /// calendar with the given holidays and a Saturday/Sunday weekly off
    pub fn new(calendar_id: impl Into<String>, holidays: Vec<NaiveDate>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            holidays: holidays.into_iter().collect(),
            weekly_off: vec![Weekday::Sat, Weekday::Sun],
        }
    }

    /// calendar with no holidays and no weekly off (every day is a business day)
    pub fn all_days(calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            holidays: BTreeSet::new(),
            weekly_off: Vec::new(),
        }
    }

    /// override the weekly-off mask
    pub fn with_weekly_off(mut self, weekly_off: Vec<Weekday>) -> Self {
        self.weekly_off = weekly_off;
        self
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !self.weekly_off.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// shift a raw date to a business day per the mode
    pub fn adjust(&self, date: NaiveDate, mode: BusinessDayMode) -> NaiveDate {
        if mode == BusinessDayMode::Unadjusted || self.is_business_day(date) {
            return date;
        }
        match mode {
            BusinessDayMode::Unadjusted => date,
            BusinessDayMode::Following => self.roll(date, 1),
            BusinessDayMode::Preceding => self.roll(date, -1),
            BusinessDayMode::ModifiedFollowing => {
                let rolled = self.roll(date, 1);
                if rolled.month() != date.month() {
                    self.roll(date, -1)
                } else {
                    rolled
                }
            }
            BusinessDayMode::ModifiedPreceding => {
                let rolled = self.roll(date, -1);
                if rolled.month() != date.month() {
                    self.roll(date, 1)
                } else {
                    rolled
                }
            }
        }
    }

    fn roll(&self, date: NaiveDate, step: i64) -> NaiveDate {
        let mut cursor = date;
        loop {
            cursor += Duration::days(step);
            if self.is_business_day(cursor) {
                return cursor;
            }
        }
    }
}
