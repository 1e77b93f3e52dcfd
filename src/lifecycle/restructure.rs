use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::BusinessCalendar;
use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::events::Event;
use crate::loan::Loan;
use crate::rates::RateBasis;
use crate::schedule::{add_months, equated_rows, fixed_installment_rows, Installment};
use crate::types::AccountId;

/// contractual modification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestructureType {
    RateReduction,
    TenureExtension,
    PrincipalHaircut,
    EmiRescheduling,
    Combination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestructureStatus {
    Approved,
    Applied,
}

/// restructure request; fields are read per the restructure type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestructureRequest {
    pub restructure_type: RestructureType,
    /// forward regeneration starts at this installment number
    pub effective_from_installment: u32,
    pub new_rate: Option<Rate>,
    pub new_total_tenure: Option<u32>,
    pub principal_haircut: Option<Money>,
    pub new_emi: Option<Money>,
    pub requested_by: String,
    pub approved_by: String,
}

/// immutable record of an applied restructure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestructureEvent {
    pub restructure_id: Uuid,
    pub account_id: AccountId,
    pub restructure_type: RestructureType,
    pub effective_date: NaiveDate,
    pub old_rate: Rate,
    pub new_rate: Rate,
    pub old_tenure: u32,
    pub new_tenure: u32,
    pub old_emi: Money,
    pub new_emi: Money,
    pub principal_waived: Money,
    pub outstanding_before: Money,
    pub outstanding_after: Money,
    pub requested_by: String,
    pub approved_by: String,
    pub status: RestructureStatus,
    pub timestamp: DateTime<Utc>,
}

/// apply a restructure to the forward portion of the schedule; already-paid
/// and partially-paid rows are preserved
pub fn apply(
    loan: &mut Loan,
    request: RestructureRequest,
    calendar: &BusinessCalendar,
    now: DateTime<Utc>,
) -> Result<RestructureEvent> {
    loan.account.assert_active()?;
    if loan.schedule.is_empty() {
        return Err(LoanError::ScheduleNotFound { account_id: loan.account.account_id });
    }
    validate(&request)?;

    // the boundary is the first untouched pending row at or after the
    // effective installment
    let split = loan
        .schedule
        .iter()
        .position(|row| {
            row.installment_number >= request.effective_from_installment
                && !row.is_settled()
                && row.total_paid().is_zero()
        })
        .ok_or_else(|| LoanError::ConflictingState {
            message: "no pending installments to restructure".to_string(),
        })?;

    let kept: Vec<Installment> = loan.schedule[..split].to_vec();
    let replaced = &loan.schedule[split..];
    let old_emi = replaced.first().map(|row| row.total_due).unwrap_or(Money::ZERO);
    let outstanding_before = loan.account.principal_outstanding;
    let old_tenure = loan.account.tenure_periods;
    let old_rate = loan.account.current_rate;

    let boundary_balance = kept
        .last()
        .map(|row| row.closing_balance)
        .unwrap_or_else(|| loan.schedule[0].opening_balance);

    let haircut = request.principal_haircut.unwrap_or(Money::ZERO);
    if haircut >= boundary_balance {
        return Err(LoanError::InvalidInput {
            message: "haircut must be less than the outstanding balance".to_string(),
        });
    }
    let new_balance = boundary_balance - haircut;

    let new_rate = request.new_rate.unwrap_or(old_rate);
    let kept_count = kept.len() as u32;
    let ppy = loan.account.frequency.periods_per_year();
    let r = new_rate.periodic(ppy).as_decimal();

    let first_number = kept.last().map(|row| row.installment_number + 1).unwrap_or(1);
    let anchor = kept
        .last()
        .map(|row| add_months(row.due_date, loan.account.frequency.months_per_period()))
        .unwrap_or(loan.account.first_due_date);
    let months = loan.account.frequency.months_per_period();
    let mode = loan.account.business_day_mode;
    let due = |number: u32| {
        let raw = add_months(anchor, (number - first_number) * months);
        calendar.adjust(raw, mode)
    };

    // a rescheduled installment is kept as given and the tenure falls out;
    // otherwise the tail is re-equated over the remaining periods
    let mut tail = if let Some(new_emi) = request.new_emi {
        fixed_installment_rows(new_balance, r, new_emi, first_number, &due)
    } else {
        let tail_periods = request
            .new_total_tenure
            .unwrap_or(old_tenure)
            .saturating_sub(kept_count);
        if tail_periods == 0 {
            return Err(LoanError::InvalidInput {
                message: "restructure leaves no forward installments".to_string(),
            });
        }
        equated_rows(new_balance, r, tail_periods, first_number, &due)
    };
    if tail.is_empty() {
        return Err(LoanError::InvalidInput {
            message: "rescheduled installment does not amortize the balance".to_string(),
        });
    }
    if haircut.is_positive() {
        if let Some(first) = tail.first_mut() {
            // the waived principal drops out of the balance at the boundary row
            first.opening_balance = boundary_balance;
        }
    }
    let new_emi = tail.first().map(|row| row.total_due).unwrap_or(Money::ZERO);
    let new_tenure = kept_count + tail.len() as u32;
    let effective_date = tail.first().map(|row| row.due_date).unwrap_or(now.date_naive());

    loan.schedule = kept;
    loan.schedule.extend(tail);

    loan.account.tenure_periods = new_tenure;
    if let Some(rate) = request.new_rate {
        loan.account.current_rate = rate;
        if matches!(loan.account.rate_basis, RateBasis::Fixed(_)) {
            loan.account.rate_basis = RateBasis::Fixed(rate);
        }
    }
    loan.account.is_restructured = true;
    loan.account.principal_waived += haircut;
    loan.account
        .recompute_outstanding(&loan.schedule, effective_date.min(now.date_naive()));
    loan.principal_history
        .record(now.date_naive(), loan.account.principal_outstanding);

    let event = RestructureEvent {
        restructure_id: Uuid::new_v4(),
        account_id: loan.account.account_id,
        restructure_type: request.restructure_type,
        effective_date,
        old_rate,
        new_rate,
        old_tenure,
        new_tenure,
        old_emi,
        new_emi,
        principal_waived: haircut,
        outstanding_before,
        outstanding_after: loan.account.principal_outstanding,
        requested_by: request.requested_by,
        approved_by: request.approved_by,
        status: RestructureStatus::Applied,
        timestamp: now,
    };

    loan.events.emit(Event::ScheduleRegenerated {
        account_id: loan.account.account_id,
        from_installment: first_number,
        installments: loan.schedule.len() as u32,
        reason: format!("restructure {:?}", request.restructure_type),
    });
    loan.events.emit(Event::Restructured {
        account_id: loan.account.account_id,
        restructure_id: event.restructure_id,
        effective_date,
        old_tenure,
        new_tenure,
        principal_waived: haircut,
    });

    loan.reconcile()?;
    loan.restructures.push(event.clone());
    Ok(event)
}

fn validate(request: &RestructureRequest) -> Result<()> {
    let missing = |message: &str| {
        Err(LoanError::InvalidInput { message: message.to_string() })
    };
    match request.restructure_type {
        RestructureType::RateReduction if request.new_rate.is_none() => {
            missing("rate reduction requires a new rate")
        }
        RestructureType::TenureExtension if request.new_total_tenure.is_none() => {
            missing("tenure extension requires a new total tenure")
        }
        RestructureType::PrincipalHaircut
            if !request.principal_haircut.map(|h| h.is_positive()).unwrap_or(false) =>
        {
            missing("principal haircut requires a positive amount")
        }
        RestructureType::EmiRescheduling
            if !request.new_emi.map(|e| e.is_positive()).unwrap_or(false) =>
        {
            missing("emi rescheduling requires a positive installment")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountOpening, LoanAccount};
    use crate::calendar::BusinessDayMode;
    use crate::config::{EngineConfig, ProductConfig};
    use crate::daycount::DayCountConvention;
    use crate::loan::PaymentRequest;
    use crate::types::{PaymentChannel, PaymentFrequency, ScheduleType};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
    }

    fn loan_with_tenure(tenure: u32) -> Loan {
        let opening = AccountOpening {
            product_id: Uuid::new_v4(),
            borrower_ref: "BRW-RST".into(),
            principal: Money::from_major(600_000),
            rate_basis: RateBasis::Fixed(Rate::from_percentage(12)),
            initial_rate: Rate::from_percentage(12),
            tenure_periods: tenure,
            frequency: PaymentFrequency::Monthly,
            schedule_type: ScheduleType::Emi,
            day_count: DayCountConvention::Act365,
            calendar_id: "NONE".into(),
            business_day_mode: BusinessDayMode::Unadjusted,
            disbursement_date: d(2025, 1, 1),
            first_due_date: d(2025, 2, 1),
        };
        let account = LoanAccount::open(Uuid::new_v4(), opening);
        let mut loan = Loan::new(account, ProductConfig::term_loan("TL"));
        loan.persist_schedule(&BusinessCalendar::all_days("NONE")).unwrap();
        loan
    }

    fn pay_installments(loan: &mut Loan, count: u32) {
        let total: Money = loan.schedule[..count as usize]
            .iter()
            .map(|row| row.total_due)
            .sum();
        loan.apply_payment(
            PaymentRequest {
                amount: total,
                paid_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                channel: PaymentChannel::Nach,
                external_ref: "UTR-PRIOR".into(),
            },
            &EngineConfig::default(),
        )
        .unwrap();
    }

    #[test]
    fn test_tenure_extension_regenerates_forward_only() {
        let mut loan = loan_with_tenure(60);
        pay_installments(&mut loan, 12);
        let frozen: Vec<_> = loan.schedule[..12].to_vec();

        let event = apply(
            &mut loan,
            RestructureRequest {
                restructure_type: RestructureType::TenureExtension,
                effective_from_installment: 13,
                new_rate: None,
                new_total_tenure: Some(84),
                principal_haircut: None,
                new_emi: None,
                requested_by: "ops".into(),
                approved_by: "credit-head".into(),
            },
            &BusinessCalendar::all_days("NONE"),
            now(),
        )
        .unwrap();

        assert_eq!(loan.schedule[..12], frozen[..]);
        assert_eq!(loan.schedule.len(), 84);
        assert_eq!(event.old_tenure, 60);
        assert_eq!(event.new_tenure, 84);
        assert!(event.new_emi < event.old_emi);
        assert!(loan.account.is_restructured);
        assert_eq!(loan.schedule.last().unwrap().closing_balance, Money::ZERO);
    }

    #[test]
    fn test_rate_reduction_lowers_installment() {
        let mut loan = loan_with_tenure(60);
        pay_installments(&mut loan, 6);

        let event = apply(
            &mut loan,
            RestructureRequest {
                restructure_type: RestructureType::RateReduction,
                effective_from_installment: 7,
                new_rate: Some(Rate::from_percentage(9)),
                new_total_tenure: None,
                principal_haircut: None,
                new_emi: None,
                requested_by: "ops".into(),
                approved_by: "credit-head".into(),
            },
            &BusinessCalendar::all_days("NONE"),
            now(),
        )
        .unwrap();

        assert_eq!(event.new_rate, Rate::from_percentage(9));
        assert!(event.new_emi < event.old_emi);
        assert_eq!(loan.account.current_rate, Rate::from_percentage(9));
        assert_eq!(loan.account.tenure_periods, 60);
    }

    #[test]
    fn test_principal_haircut_reduces_outstanding() {
        let mut loan = loan_with_tenure(60);
        pay_installments(&mut loan, 6);
        let before = loan.account.principal_outstanding;

        let event = apply(
            &mut loan,
            RestructureRequest {
                restructure_type: RestructureType::PrincipalHaircut,
                effective_from_installment: 7,
                new_rate: None,
                new_total_tenure: None,
                principal_haircut: Some(Money::from_major(50_000)),
                new_emi: None,
                requested_by: "ops".into(),
                approved_by: "credit-head".into(),
            },
            &BusinessCalendar::all_days("NONE"),
            now(),
        )
        .unwrap();

        assert_eq!(event.principal_waived, Money::from_major(50_000));
        assert_eq!(event.outstanding_before, before);
        assert_eq!(event.outstanding_after, before - Money::from_major(50_000));
        assert_eq!(loan.account.principal_outstanding, before - Money::from_major(50_000));
    }

    #[test]
    fn test_emi_rescheduling_derives_tenure() {
        let mut loan = loan_with_tenure(60);
        pay_installments(&mut loan, 6);
        let old_emi = loan.schedule[6].total_due;
        let new_emi = Money::from_decimal(old_emi.as_decimal() * dec!(1.5));

        let event = apply(
            &mut loan,
            RestructureRequest {
                restructure_type: RestructureType::EmiRescheduling,
                effective_from_installment: 7,
                new_rate: None,
                new_total_tenure: None,
                principal_haircut: None,
                new_emi: Some(new_emi),
                requested_by: "ops".into(),
                approved_by: "credit-head".into(),
            },
            &BusinessCalendar::all_days("NONE"),
            now(),
        )
        .unwrap();

        // a larger installment shortens the loan
        assert!(event.new_tenure < 60);
        assert_eq!(loan.schedule.last().unwrap().closing_balance, Money::ZERO);
    }

    #[test]
    fn test_missing_parameters_rejected() {
        let mut loan = loan_with_tenure(60);
        let request = RestructureRequest {
            restructure_type: RestructureType::TenureExtension,
            effective_from_installment: 1,
            new_rate: None,
            new_total_tenure: None,
            principal_haircut: None,
            new_emi: None,
            requested_by: "ops".into(),
            approved_by: "credit-head".into(),
        };
        let err = apply(&mut loan, request, &BusinessCalendar::all_days("NONE"), now()).unwrap_err();
        assert!(matches!(err, LoanError::InvalidInput { .. }));
    }

    #[test]
    fn test_restructure_after_write_off_rejected() {
        let mut loan = loan_with_tenure(60);
        loan.account.close(crate::types::ClosureType::WriteOff, d(2025, 6, 1));
        let request = RestructureRequest {
            restructure_type: RestructureType::TenureExtension,
            effective_from_installment: 1,
            new_rate: None,
            new_total_tenure: Some(72),
            principal_haircut: None,
            new_emi: None,
            requested_by: "ops".into(),
            approved_by: "credit-head".into(),
        };
        let err = apply(&mut loan, request, &BusinessCalendar::all_days("NONE"), now()).unwrap_err();
        assert!(matches!(err, LoanError::AccountNotOpen { .. }));
    }
}
