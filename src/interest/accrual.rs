use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::daycount::DayCountConvention;
use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::rates::{BenchmarkSet, RateBasis};
use crate::types::AccountId;

/// accrual row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccrualStatus {
    Accrued,
    Posted,
    Reversed,
}

/// daily interest accrual record, keyed by (account, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestAccrual {
    pub account_id: AccountId,
    pub accrual_date: NaiveDate,
    pub opening_principal: Money,
    pub rate: Rate,
    pub day_count: DayCountConvention,
    pub accrued: Money,
    pub cumulative: Money,
    pub status: AccrualStatus,
}

/// dated principal track: each point records the outstanding balance at the
/// end of a date, and interest for a date reads the balance left by the
/// latest change strictly before it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrincipalHistory {
    points: BTreeMap<NaiveDate, Money>,
}

impl PrincipalHistory {
    pub fn new() -> Self {
        Self { points: BTreeMap::new() }
    }

    /// record the outstanding principal at the end of a date
    pub fn record(&mut self, date: NaiveDate, outstanding: Money) {
        self.points.insert(date, outstanding);
    }

    /// opening principal for a date
    pub fn opening_on(&self, date: NaiveDate) -> Money {
        self.points.range(..date).next_back().map(|(_, m)| *m).unwrap_or(Money::ZERO)
    }
}

/// engine for accruing daily interest
pub struct AccrualEngine {
    pub convention: DayCountConvention,
}

impl AccrualEngine {
    pub fn new(convention: DayCountConvention) -> Self {
        Self { convention }
    }

    /// interest for a single day: `principal · rate · fraction(d, d+1)`
    pub fn daily_interest(&self, principal: Money, rate: Rate, date: NaiveDate) -> Money {
        let fraction = self.convention.year_fraction(date, date + Duration::days(1));
        Money::from_decimal(principal.as_decimal() * rate.as_decimal() * fraction)
    }

    /// accrue each date in `(from, to]`, resolving the effective rate and
    /// the opening principal per date
    pub fn accrue_range(
        &self,
        account_id: AccountId,
        principals: &PrincipalHistory,
        basis: &RateBasis,
        benchmarks: &BenchmarkSet,
        from_exclusive: NaiveDate,
        to_inclusive: NaiveDate,
        cumulative_start: Money,
    ) -> Result<Vec<InterestAccrual>> {
        let mut rows = Vec::new();
        let mut cumulative = cumulative_start;
        let mut date = from_exclusive + Duration::days(1);

        while date <= to_inclusive {
            let principal = principals.opening_on(date);
            let rate = benchmarks.resolve(basis, date)?;
            let accrued = self.daily_interest(principal, rate, date);
            cumulative += accrued;
            rows.push(InterestAccrual {
                account_id,
                accrual_date: date,
                opening_principal: principal,
                rate,
                day_count: self.convention,
                accrued,
                cumulative,
                status: AccrualStatus::Accrued,
            });
            date += Duration::days(1);
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn history(principal: i64, from: NaiveDate) -> PrincipalHistory {
        let mut history = PrincipalHistory::new();
        history.record(from, Money::from_major(principal));
        history
    }

    #[test]
    fn test_daily_interest_act365() {
        let engine = AccrualEngine::new(DayCountConvention::Act365);
        let interest = engine.daily_interest(
            Money::from_major(100_000),
            Rate::from_percentage(12),
            d(2025, 3, 1),
        );
        // 100000 * 0.12 / 365 = 32.876... -> 32.88
        assert_eq!(interest, Money::from_str_exact("32.88").unwrap());
    }

    #[test]
    fn test_daily_interest_leap_day_act_act() {
        let engine = AccrualEngine::new(DayCountConvention::ActActIsda);
        let interest = engine.daily_interest(
            Money::from_major(100_000),
            Rate::from_percentage(12),
            d(2024, 2, 29),
        );
        // 100000 * 0.12 / 366 = 32.786... -> 32.79
        assert_eq!(interest, Money::from_str_exact("32.79").unwrap());
    }

    #[test]
    fn test_principal_history_lookup() {
        let mut history = PrincipalHistory::new();
        history.record(d(2025, 3, 1), Money::from_major(100_000));
        history.record(d(2025, 3, 3), Money::from_major(60_000));

        assert_eq!(history.opening_on(d(2025, 3, 1)), Money::ZERO);
        assert_eq!(history.opening_on(d(2025, 3, 2)), Money::from_major(100_000));
        // the change on the 3rd applies from the following day
        assert_eq!(history.opening_on(d(2025, 3, 3)), Money::from_major(100_000));
        assert_eq!(history.opening_on(d(2025, 3, 4)), Money::from_major(60_000));
    }

    #[test]
    fn test_accrue_range_cumulative_chain() {
        let engine = AccrualEngine::new(DayCountConvention::Act365);
        let basis = RateBasis::Fixed(Rate::from_percentage(12));
        let rows = engine
            .accrue_range(
                Uuid::new_v4(),
                &history(100_000, d(2025, 3, 1)),
                &basis,
                &BenchmarkSet::new(),
                d(2025, 3, 1),
                d(2025, 3, 4),
                Money::ZERO,
            )
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].accrual_date, d(2025, 3, 2));
        assert_eq!(rows[2].accrual_date, d(2025, 3, 4));
        for pair in rows.windows(2) {
            assert_eq!(pair[1].cumulative, pair[0].cumulative + pair[1].accrued);
        }
    }

    #[test]
    fn test_accrue_range_empty_when_current() {
        let engine = AccrualEngine::new(DayCountConvention::Act365);
        let rows = engine
            .accrue_range(
                Uuid::new_v4(),
                &history(100_000, d(2025, 3, 1)),
                &RateBasis::Fixed(Rate::from_percentage(12)),
                &BenchmarkSet::new(),
                d(2025, 3, 4),
                d(2025, 3, 4),
                Money::ZERO,
            )
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_principal_change_mid_range() {
        // a payment on the 3rd drops the balance from 100000 to 60000
        let mut principals = history(100_000, d(2025, 3, 1));
        principals.record(d(2025, 3, 3), Money::from_major(60_000));

        let engine = AccrualEngine::new(DayCountConvention::Act365);
        let rows = engine
            .accrue_range(
                Uuid::new_v4(),
                &principals,
                &RateBasis::Fixed(Rate::from_percentage(12)),
                &BenchmarkSet::new(),
                d(2025, 3, 1),
                d(2025, 3, 4),
                Money::ZERO,
            )
            .unwrap();

        // the payment date itself still accrues on the opening balance
        assert_eq!(rows[0].opening_principal, Money::from_major(100_000));
        assert_eq!(rows[1].opening_principal, Money::from_major(100_000));
        assert_eq!(rows[1].accrued, Money::from_str_exact("32.88").unwrap());
        // 60000 * 0.12 / 365 = 19.726... -> 19.73
        assert_eq!(rows[2].opening_principal, Money::from_major(60_000));
        assert_eq!(rows[2].accrued, Money::from_str_exact("19.73").unwrap());
    }

    #[test]
    fn test_floating_reset_mid_range() {
        let mut benchmarks = BenchmarkSet::new();
        benchmarks.publish("REPO", d(2025, 3, 1), Rate::from_decimal(dec!(0.06)));
        benchmarks.publish("REPO", d(2025, 3, 3), Rate::from_decimal(dec!(0.05)));

        let engine = AccrualEngine::new(DayCountConvention::Act365);
        let basis = RateBasis::Floating {
            benchmark: "REPO".into(),
            spread: Rate::from_decimal(dec!(0.04)),
            floor: None,
            cap: None,
        };
        let rows = engine
            .accrue_range(
                Uuid::new_v4(),
                &history(100_000, d(2025, 3, 1)),
                &basis,
                &benchmarks,
                d(2025, 3, 1),
                d(2025, 3, 4),
                Money::ZERO,
            )
            .unwrap();

        assert_eq!(rows[0].rate, Rate::from_decimal(dec!(0.10)));
        assert_eq!(rows[1].rate, Rate::from_decimal(dec!(0.09)));
        assert_eq!(rows[2].rate, Rate::from_decimal(dec!(0.09)));
    }

    #[test]
    fn test_floating_without_benchmark_fails() {
        let engine = AccrualEngine::new(DayCountConvention::Act365);
        let basis = RateBasis::Floating {
            benchmark: "REPO".into(),
            spread: Rate::ZERO,
            floor: None,
            cap: None,
        };
        let result = engine.accrue_range(
            Uuid::new_v4(),
            &history(100_000, d(2025, 3, 1)),
            &basis,
            &BenchmarkSet::new(),
            d(2025, 3, 1),
            d(2025, 3, 2),
            Money::ZERO,
        );
        assert!(result.is_err());
    }
}
