use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{BusinessCalendar, BusinessDayMode};
use crate::daycount::is_leap_year;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::types::{InstallmentStatus, MoratoriumTreatment, PaymentFrequency, ScheduleType};

/// one repayment schedule row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub opening_balance: Money,
    pub principal_due: Money,
    pub interest_due: Money,
    pub fees_due: Money,
    pub total_due: Money,
    pub closing_balance: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fees_paid: Money,
    pub status: InstallmentStatus,
    /// late fee has been charged on this row
    pub late_fee_charged: bool,
}

impl Installment {
    fn new(
        number: u32,
        due_date: NaiveDate,
        opening: Money,
        principal: Money,
        interest: Money,
        fees: Money,
        closing: Money,
        status: InstallmentStatus,
    ) -> Self {
        Self {
            installment_number: number,
            due_date,
            opening_balance: opening,
            principal_due: principal,
            interest_due: interest,
            fees_due: fees,
            total_due: principal + interest + fees,
            closing_balance: closing,
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            fees_paid: Money::ZERO,
            status,
            late_fee_charged: false,
        }
    }

    pub fn total_paid(&self) -> Money {
        self.principal_paid + self.interest_paid + self.fees_paid
    }

    pub fn remaining_principal(&self) -> Money {
        self.principal_due - self.principal_paid
    }

    pub fn remaining_interest(&self) -> Money {
        self.interest_due - self.interest_paid
    }

    pub fn remaining_fees(&self) -> Money {
        self.fees_due - self.fees_paid
    }

    pub fn remaining_total(&self) -> Money {
        self.total_due - self.total_paid()
    }

    /// nothing left to collect on this row
    pub fn is_settled(&self) -> bool {
        self.total_paid() >= self.total_due
    }

    /// add a fee charge to this row (late fee, penal interest)
    pub fn charge_fee(&mut self, amount: Money) {
        self.fees_due += amount;
        self.total_due += amount;
        if self.status == InstallmentStatus::Paid {
            self.status = InstallmentStatus::PartiallyPaid;
        }
    }

    /// refresh status from paid amounts
    pub fn refresh_status(&mut self) {
        if self.status == InstallmentStatus::Skipped && self.total_due.is_zero() {
            return;
        }
        self.status = if self.is_settled() {
            InstallmentStatus::Paid
        } else if self.total_paid().is_positive() {
            InstallmentStatus::PartiallyPaid
        } else {
            InstallmentStatus::Pending
        };
    }
}

/// inputs to schedule generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_periods: u32,
    pub frequency: PaymentFrequency,
    pub schedule_type: ScheduleType,
    pub first_due: NaiveDate,
    pub business_day_mode: BusinessDayMode,
}

/// outcome of generation: the rows plus interest capitalized during a
/// moratorium window (zero for every other schedule type)
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSchedule {
    pub installments: Vec<Installment>,
    pub capitalized_interest: Money,
}

impl GeneratedSchedule {
    pub fn total_principal(&self) -> Money {
        self.installments.iter().map(|row| row.principal_due).sum()
    }

    pub fn total_interest(&self) -> Money {
        self.installments.iter().map(|row| row.interest_due).sum()
    }
}

/// generate the installment sequence for a spec; pure over its inputs
pub fn generate(spec: &ScheduleSpec, calendar: &BusinessCalendar) -> Result<GeneratedSchedule> {
    validate(spec)?;

    let ppy = spec.frequency.periods_per_year();
    let r = spec.annual_rate.periodic(ppy).as_decimal();
    let n = spec.tenure_periods;
    let due = |period: u32| {
        let raw = add_months(spec.first_due, (period - 1) * spec.frequency.months_per_period());
        calendar.adjust(raw, spec.business_day_mode)
    };

    let mut capitalized = Money::ZERO;
    let installments = match spec.schedule_type {
        ScheduleType::Emi => equated_rows(spec.principal, r, n, 1, &due),
        ScheduleType::InterestOnly => interest_only_rows(spec.principal, r, n, &due),
        ScheduleType::Bullet => bullet_rows(spec.principal, r, n, &due),
        ScheduleType::StepUp { step_percent, step_every } => {
            stepped_rows(spec.principal, r, n, step_percent, step_every, true, &due)
        }
        ScheduleType::StepDown { step_percent, step_every } => {
            stepped_rows(spec.principal, r, n, step_percent, step_every, false, &due)
        }
        ScheduleType::Balloon { final_fraction } => {
            balloon_rows(spec.principal, r, n, final_fraction, &due)
        }
        ScheduleType::Moratorium { periods, treatment } => {
            let (rows, cap) = moratorium_rows(spec.principal, r, n, periods, treatment, &due);
            capitalized = cap;
            rows
        }
    };

    Ok(GeneratedSchedule { installments, capitalized_interest: capitalized })
}

fn validate(spec: &ScheduleSpec) -> Result<()> {
    let fail = |message: &str| {
        Err(LoanError::InvalidScheduleInput { message: message.to_string() })
    };
    if !spec.principal.is_positive() {
        return fail("principal must be positive");
    }
    if spec.tenure_periods == 0 {
        return fail("tenure must be at least one period");
    }
    if spec.annual_rate.is_negative() {
        return fail("rate must be non-negative");
    }
    match spec.schedule_type {
        ScheduleType::Balloon { final_fraction } => {
            let f = final_fraction.as_decimal();
            if f <= Decimal::ZERO || f >= Decimal::ONE {
                return fail("balloon fraction must lie in (0, 1)");
            }
            if spec.tenure_periods < 2 {
                return fail("balloon schedule needs at least two periods");
            }
        }
        ScheduleType::StepUp { step_every, .. } | ScheduleType::StepDown { step_every, .. } => {
            if step_every == 0 {
                return fail("step boundary must be at least one period");
            }
        }
        ScheduleType::Moratorium { periods, .. } => {
            if periods == 0 || periods >= spec.tenure_periods {
                return fail("moratorium must cover at least one and fewer than all periods");
            }
        }
        _ => {}
    }
    Ok(())
}

/// equated installment: `P·r·(1+r)^n / ((1+r)^n − 1)`, or `P/n` at zero rate
pub fn emi_amount(principal: Money, periodic_rate: Decimal, periods: u32) -> Money {
    if periods == 0 {
        return principal;
    }
    if periodic_rate.is_zero() {
        return principal / Decimal::from(periods);
    }
    let compound = pow(Decimal::ONE + periodic_rate, periods);
    Money::from_decimal(principal.as_decimal() * periodic_rate * compound / (compound - Decimal::ONE))
}

fn pow(base: Decimal, exponent: u32) -> Decimal {
    let mut result = Decimal::ONE;
    for _ in 0..exponent {
        result *= base;
    }
    result
}

fn periodic_interest(balance: Money, r: Decimal) -> Money {
    Money::from_decimal(balance.as_decimal() * r)
}

/// amortize a balance with a fixed installment; the tenure falls out of the
/// walk and the last row carries whatever remains
pub(crate) fn fixed_installment_rows(
    principal: Money,
    periodic_rate: Decimal,
    installment: Money,
    first_number: u32,
    due: &impl Fn(u32) -> NaiveDate,
) -> Vec<Installment> {
    let mut rows = Vec::new();
    let mut balance = principal;
    let mut number = first_number;

    while balance.is_positive() && rows.len() < 1_200 {
        let interest = periodic_interest(balance, periodic_rate);
        if installment <= interest {
            break;
        }
        let principal_due = (installment - interest).min(balance);
        let closing = balance - principal_due;
        rows.push(Installment::new(
            number,
            due(number),
            balance,
            principal_due,
            interest,
            Money::ZERO,
            closing,
            InstallmentStatus::Pending,
        ));
        balance = closing;
        number += 1;
    }

    rows
}

pub(crate) fn equated_rows(
    principal: Money,
    r: Decimal,
    periods: u32,
    first_number: u32,
    due: &impl Fn(u32) -> NaiveDate,
) -> Vec<Installment> {
    let emi = emi_amount(principal, r, periods);
    let mut rows = Vec::with_capacity(periods as usize);
    let mut balance = principal;

    for i in 1..=periods {
        let number = first_number + i - 1;
        let interest = periodic_interest(balance, r);
        // the final installment carries the rounding residual
        let principal_due = if i == periods {
            balance
        } else {
            (emi - interest).min(balance).max(Money::ZERO)
        };
        let closing = balance - principal_due;
        rows.push(Installment::new(
            number,
            due(number),
            balance,
            principal_due,
            interest,
            Money::ZERO,
            closing,
            InstallmentStatus::Pending,
        ));
        balance = closing;
    }

    rows
}

fn interest_only_rows(
    principal: Money,
    r: Decimal,
    periods: u32,
    due: &impl Fn(u32) -> NaiveDate,
) -> Vec<Installment> {
    let mut rows = Vec::with_capacity(periods as usize);
    for i in 1..=periods {
        let interest = periodic_interest(principal, r);
        let principal_due = if i == periods { principal } else { Money::ZERO };
        let closing = principal - principal_due;
        rows.push(Installment::new(
            i,
            due(i),
            principal,
            principal_due,
            interest,
            Money::ZERO,
            closing,
            InstallmentStatus::Pending,
        ));
    }
    rows
}

fn bullet_rows(
    principal: Money,
    r: Decimal,
    periods: u32,
    due: &impl Fn(u32) -> NaiveDate,
) -> Vec<Installment> {
    // simple periodic interest accumulated to the terminal date
    let interest = Money::from_decimal(principal.as_decimal() * r * Decimal::from(periods));
    vec![Installment::new(
        1,
        due(periods),
        principal,
        principal,
        interest,
        Money::ZERO,
        Money::ZERO,
        InstallmentStatus::Pending,
    )]
}

fn stepped_rows(
    principal: Money,
    r: Decimal,
    periods: u32,
    step_percent: Rate,
    step_every: u32,
    upward: bool,
    due: &impl Fn(u32) -> NaiveDate,
) -> Vec<Installment> {
    let mut rows = Vec::with_capacity(periods as usize);
    let mut balance = principal;
    let mut emi = Money::ZERO;

    for i in 1..=periods {
        // recompute at each step boundary for the remaining balance and periods
        if (i - 1) % step_every == 0 {
            let segment = (i - 1) / step_every;
            let base = emi_amount(balance, r, periods - i + 1);
            let step = step_percent.as_decimal();
            let factor = if upward {
                pow(Decimal::ONE + step, segment)
            } else {
                pow(Decimal::ONE - step, segment)
            };
            emi = Money::from_decimal(base.as_decimal() * factor);
        }

        let interest = periodic_interest(balance, r);
        let principal_due = if i == periods {
            balance
        } else {
            (emi - interest).min(balance).max(Money::ZERO)
        };
        let closing = balance - principal_due;
        rows.push(Installment::new(
            i,
            due(i),
            balance,
            principal_due,
            interest,
            Money::ZERO,
            closing,
            InstallmentStatus::Pending,
        ));
        balance = closing;
        if balance.is_zero() && i < periods {
            break;
        }
    }

    rows
}

fn balloon_rows(
    principal: Money,
    r: Decimal,
    periods: u32,
    final_fraction: Rate,
    due: &impl Fn(u32) -> NaiveDate,
) -> Vec<Installment> {
    let balloon = Money::from_decimal(principal.as_decimal() * final_fraction.as_decimal());
    // amortize the non-balloon portion over n−1 periods; interest on the
    // balloon chunk rides on top of each installment
    let emi = emi_amount(principal - balloon, r, periods - 1) + periodic_interest(balloon, r);

    let mut rows = Vec::with_capacity(periods as usize);
    let mut balance = principal;
    for i in 1..periods {
        let interest = periodic_interest(balance, r);
        let principal_due = if i == periods - 1 {
            balance - balloon
        } else {
            (emi - interest).min(balance - balloon).max(Money::ZERO)
        };
        let closing = balance - principal_due;
        rows.push(Installment::new(
            i,
            due(i),
            balance,
            principal_due,
            interest,
            Money::ZERO,
            closing,
            InstallmentStatus::Pending,
        ));
        balance = closing;
    }

    let interest = periodic_interest(balloon, r);
    rows.push(Installment::new(
        periods,
        due(periods),
        balloon,
        balloon,
        interest,
        Money::ZERO,
        Money::ZERO,
        InstallmentStatus::Pending,
    ));
    rows
}

fn moratorium_rows(
    principal: Money,
    r: Decimal,
    periods: u32,
    holiday_periods: u32,
    treatment: MoratoriumTreatment,
    due: &impl Fn(u32) -> NaiveDate,
) -> (Vec<Installment>, Money) {
    let mut rows = Vec::with_capacity(periods as usize);
    let mut balance = principal;
    let mut capitalized = Money::ZERO;
    let mut deferred = Money::ZERO;

    for i in 1..=holiday_periods {
        let opening = balance;
        match treatment {
            MoratoriumTreatment::Capitalize => {
                let interest = periodic_interest(balance, r);
                capitalized += interest;
                balance += interest;
            }
            MoratoriumTreatment::CollectAfter => {
                deferred += periodic_interest(balance, r);
            }
            MoratoriumTreatment::Waive => {}
        }
        rows.push(Installment::new(
            i,
            due(i),
            opening,
            Money::ZERO,
            Money::ZERO,
            Money::ZERO,
            balance,
            InstallmentStatus::Skipped,
        ));
    }

    let remaining = periods - holiday_periods;
    let mut tail = equated_rows(balance, r, remaining, holiday_periods + 1, due);

    if deferred.is_positive() {
        // spread the deferred interest evenly, residual on the last row
        let per_row = deferred / Decimal::from(remaining);
        let mut spread = Money::ZERO;
        let last = tail.len() - 1;
        for (idx, row) in tail.iter_mut().enumerate() {
            let extra = if idx == last { deferred - spread } else { per_row };
            row.interest_due += extra;
            row.total_due += extra;
            spread += extra;
        }
    }

    rows.append(&mut tail);
    (rows, capitalized)
}

/// verify the schedule invariants; `Fatal` on breach
pub fn reconcile(schedule: &[Installment], expected_principal: Money, account_id: Uuid) -> Result<()> {
    let violation = |message: String| {
        Err(LoanError::InvariantViolation { account_id, message })
    };

    let total_principal: Money = schedule.iter().map(|row| row.principal_due).sum();
    if total_principal != expected_principal {
        return violation(format!(
            "schedule principal {} does not reconcile to {}",
            total_principal, expected_principal
        ));
    }

    for row in schedule {
        if row.total_due != row.principal_due + row.interest_due + row.fees_due {
            return violation(format!("installment {} total_due mismatch", row.installment_number));
        }
        if row.principal_paid > row.principal_due
            || row.interest_paid > row.interest_due
            || row.fees_paid > row.fees_due
        {
            return violation(format!("installment {} overpaid component", row.installment_number));
        }
    }

    for pair in schedule.windows(2) {
        if pair[0].closing_balance != pair[1].opening_balance {
            return violation(format!(
                "balance chain broken between installments {} and {}",
                pair[0].installment_number, pair[1].installment_number
            ));
        }
    }

    if let Some(last) = schedule.last() {
        if !last.closing_balance.is_zero() {
            return violation("last installment closing balance is not zero".to_string());
        }
    }

    Ok(())
}

/// add calendar months, clamping the day to the target month length
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = date.month0() as i32 + months as i32;
    let year = date.year() + zero_based.div_euclid(12);
    let month = (zero_based.rem_euclid(12) + 1) as u32;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("valid rolled date")
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn spec(principal: i64, rate_pct: u32, tenure: u32, schedule_type: ScheduleType) -> ScheduleSpec {
        ScheduleSpec {
            principal: Money::from_major(principal),
            annual_rate: Rate::from_percentage(rate_pct),
            tenure_periods: tenure,
            frequency: PaymentFrequency::Monthly,
            schedule_type,
            first_due: d(2025, 2, 1),
            business_day_mode: BusinessDayMode::Unadjusted,
        }
    }

    fn no_holidays() -> BusinessCalendar {
        BusinessCalendar::all_days("NONE")
    }

    #[test]
    fn test_emi_schedule_reference_numbers() {
        // 100000 at 12% over 12 months from 2025-01-01
        let mut spec = spec(100_000, 12, 12, ScheduleType::Emi);
        spec.first_due = d(2025, 2, 1);
        let schedule = generate(&spec, &no_holidays()).unwrap();
        let rows = &schedule.installments;

        assert_eq!(rows.len(), 12);

        let first = &rows[0];
        assert_eq!(first.opening_balance, Money::from_major(100_000));
        assert_eq!(first.interest_due, Money::from_str_exact("1000.00").unwrap());
        assert_eq!(first.principal_due, Money::from_str_exact("7884.88").unwrap());
        assert_eq!(first.closing_balance, Money::from_str_exact("92115.12").unwrap());
        assert_eq!(first.total_due, Money::from_str_exact("8884.88").unwrap());

        let last = &rows[11];
        assert_eq!(last.closing_balance, Money::ZERO);
        assert_eq!(last.total_due, Money::from_str_exact("8884.85").unwrap());

        let total_principal: Money = rows.iter().map(|r| r.principal_due).sum();
        assert_eq!(total_principal, Money::from_major(100_000));

        // all but the last row carry the equated amount
        for row in &rows[..11] {
            assert_eq!(row.total_due, Money::from_str_exact("8884.88").unwrap());
        }

        reconcile(rows, Money::from_major(100_000), Uuid::new_v4()).unwrap();
    }

    #[test]
    fn test_generation_is_referentially_transparent() {
        let spec = spec(250_000, 10, 24, ScheduleType::Emi);
        let a = generate(&spec, &no_holidays()).unwrap();
        let b = generate(&spec, &no_holidays()).unwrap();
        assert_eq!(a.installments, b.installments);
    }

    #[test]
    fn test_zero_rate_emi() {
        let schedule = generate(&spec(12_000, 0, 12, ScheduleType::Emi), &no_holidays()).unwrap();
        for row in &schedule.installments {
            assert_eq!(row.interest_due, Money::ZERO);
            assert_eq!(row.principal_due, Money::from_major(1_000));
        }
    }

    #[test]
    fn test_single_period_tenure() {
        let schedule = generate(&spec(10_000, 12, 1, ScheduleType::Emi), &no_holidays()).unwrap();
        let rows = &schedule.installments;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].principal_due, Money::from_major(10_000));
        assert_eq!(rows[0].interest_due, Money::from_major(100));
        assert_eq!(rows[0].total_due, Money::from_major(10_100));
        assert_eq!(rows[0].closing_balance, Money::ZERO);
    }

    #[test]
    fn test_interest_only_schedule() {
        let schedule = generate(&spec(50_000, 12, 6, ScheduleType::InterestOnly), &no_holidays()).unwrap();
        let rows = &schedule.installments;
        for row in &rows[..5] {
            assert_eq!(row.principal_due, Money::ZERO);
            assert_eq!(row.interest_due, Money::from_major(500));
            assert_eq!(row.closing_balance, Money::from_major(50_000));
        }
        let last = &rows[5];
        assert_eq!(last.principal_due, Money::from_major(50_000));
        assert_eq!(last.closing_balance, Money::ZERO);
    }

    #[test]
    fn test_bullet_schedule() {
        let schedule = generate(&spec(100_000, 12, 6, ScheduleType::Bullet), &no_holidays()).unwrap();
        let rows = &schedule.installments;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].due_date, d(2025, 7, 1));
        assert_eq!(rows[0].principal_due, Money::from_major(100_000));
        assert_eq!(rows[0].interest_due, Money::from_major(6_000));
    }

    #[test]
    fn test_balloon_schedule_leaves_final_fraction() {
        let schedule = generate(
            &spec(100_000, 12, 12, ScheduleType::Balloon { final_fraction: Rate::from_decimal(dec!(0.40)) }),
            &no_holidays(),
        )
        .unwrap();
        let rows = &schedule.installments;
        assert_eq!(rows.len(), 12);
        // 40% of principal remains for the terminal installment
        assert_eq!(rows[10].closing_balance, Money::from_major(40_000));
        let last = &rows[11];
        assert_eq!(last.principal_due, Money::from_major(40_000));
        assert_eq!(last.interest_due, Money::from_major(400));
        assert_eq!(last.closing_balance, Money::ZERO);
        let total_principal: Money = rows.iter().map(|r| r.principal_due).sum();
        assert_eq!(total_principal, Money::from_major(100_000));
    }

    #[test]
    fn test_balloon_fraction_bounds() {
        for f in [dec!(0), dec!(1), dec!(1.2)] {
            let result = generate(
                &spec(100_000, 12, 12, ScheduleType::Balloon { final_fraction: Rate::from_decimal(f) }),
                &no_holidays(),
            );
            assert!(matches!(result, Err(LoanError::InvalidScheduleInput { .. })));
        }
    }

    #[test]
    fn test_step_up_recomputes_at_boundaries() {
        let schedule = generate(
            &spec(
                120_000,
                12,
                12,
                ScheduleType::StepUp { step_percent: Rate::from_decimal(dec!(0.10)), step_every: 6 },
            ),
            &no_holidays(),
        )
        .unwrap();
        let rows = &schedule.installments;
        // second segment pays more than the first
        assert!(rows[6].total_due > rows[0].total_due);
        let total_principal: Money = rows.iter().map(|r| r.principal_due).sum();
        assert_eq!(total_principal, Money::from_major(120_000));
        assert_eq!(rows.last().unwrap().closing_balance, Money::ZERO);
    }

    #[test]
    fn test_step_down_never_negative_principal() {
        let schedule = generate(
            &spec(
                120_000,
                18,
                12,
                ScheduleType::StepDown { step_percent: Rate::from_decimal(dec!(0.20)), step_every: 3 },
            ),
            &no_holidays(),
        )
        .unwrap();
        for row in &schedule.installments {
            assert!(!row.principal_due.is_negative());
        }
        assert_eq!(schedule.installments.last().unwrap().closing_balance, Money::ZERO);
    }

    #[test]
    fn test_moratorium_capitalize() {
        let schedule = generate(
            &spec(
                100_000,
                12,
                12,
                ScheduleType::Moratorium { periods: 3, treatment: MoratoriumTreatment::Capitalize },
            ),
            &no_holidays(),
        )
        .unwrap();
        let rows = &schedule.installments;
        for row in &rows[..3] {
            assert_eq!(row.status, InstallmentStatus::Skipped);
            assert_eq!(row.total_due, Money::ZERO);
        }
        // 100000 -> 101000 -> 102010 -> 103030.10
        assert_eq!(schedule.capitalized_interest, Money::from_str_exact("3030.10").unwrap());
        assert_eq!(rows[3].opening_balance, Money::from_str_exact("103030.10").unwrap());
        let total_principal: Money = rows.iter().map(|r| r.principal_due).sum();
        assert_eq!(total_principal, Money::from_str_exact("103030.10").unwrap());
    }

    #[test]
    fn test_moratorium_collect_after() {
        let schedule = generate(
            &spec(
                100_000,
                12,
                12,
                ScheduleType::Moratorium { periods: 3, treatment: MoratoriumTreatment::CollectAfter },
            ),
            &no_holidays(),
        )
        .unwrap();
        let rows = &schedule.installments;
        // 3000 deferred across 9 rows
        let deferred: Money = rows[3..].iter().map(|r| r.interest_due).sum::<Money>()
            - equated_interest_total(Money::from_major(100_000), dec!(0.01), 9);
        assert_eq!(deferred, Money::from_major(3_000));
        let total_principal: Money = rows.iter().map(|r| r.principal_due).sum();
        assert_eq!(total_principal, Money::from_major(100_000));
    }

    fn equated_interest_total(principal: Money, r: Decimal, periods: u32) -> Money {
        equated_rows(principal, r, periods, 1, &|_| d(2025, 1, 1))
            .iter()
            .map(|row| row.interest_due)
            .sum()
    }

    #[test]
    fn test_moratorium_waive() {
        let schedule = generate(
            &spec(
                100_000,
                12,
                12,
                ScheduleType::Moratorium { periods: 3, treatment: MoratoriumTreatment::Waive },
            ),
            &no_holidays(),
        )
        .unwrap();
        assert_eq!(schedule.capitalized_interest, Money::ZERO);
        assert_eq!(schedule.installments[3].opening_balance, Money::from_major(100_000));
    }

    #[test]
    fn test_business_day_adjustment_applied() {
        // 2025-02-01 is a saturday
        let calendar = BusinessCalendar::new("IN", vec![]);
        let mut s = spec(100_000, 12, 3, ScheduleType::Emi);
        s.business_day_mode = BusinessDayMode::Following;
        let schedule = generate(&s, &calendar).unwrap();
        assert_eq!(schedule.installments[0].due_date, d(2025, 2, 3));
        // 2025-03-01 is also a saturday
        assert_eq!(schedule.installments[1].due_date, d(2025, 3, 3));
    }

    #[test]
    fn test_quarterly_frequency_steps_due_dates() {
        let mut s = spec(100_000, 12, 4, ScheduleType::Emi);
        s.frequency = PaymentFrequency::Quarterly;
        let schedule = generate(&s, &no_holidays()).unwrap();
        let dues: Vec<_> = schedule.installments.iter().map(|r| r.due_date).collect();
        assert_eq!(dues, vec![d(2025, 2, 1), d(2025, 5, 1), d(2025, 8, 1), d(2025, 11, 1)]);
        // quarterly periodic rate: 3% on the opening balance
        assert_eq!(schedule.installments[0].interest_due, Money::from_major(3_000));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(generate(&spec(0, 12, 12, ScheduleType::Emi), &no_holidays()).is_err());
        assert!(generate(&spec(100_000, 12, 0, ScheduleType::Emi), &no_holidays()).is_err());

        let mut negative = spec(100_000, 12, 12, ScheduleType::Emi);
        negative.annual_rate = Rate::from_decimal(dec!(-0.01));
        assert!(generate(&negative, &no_holidays()).is_err());
    }

    #[test]
    fn test_reconcile_detects_tampering() {
        let mut schedule = generate(&spec(100_000, 12, 12, ScheduleType::Emi), &no_holidays()).unwrap();
        schedule.installments[4].principal_due += Money::from_major(1);
        let err = reconcile(&schedule.installments, Money::from_major(100_000), Uuid::new_v4()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(add_months(d(2025, 1, 31), 1), d(2025, 2, 28));
        assert_eq!(add_months(d(2024, 1, 31), 1), d(2024, 2, 29));
        assert_eq!(add_months(d(2025, 11, 30), 3), d(2026, 2, 28));
        assert_eq!(add_months(d(2025, 1, 15), 12), d(2026, 1, 15));
    }
}
