use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::BusinessDayMode;
use crate::daycount::DayCountConvention;
use crate::decimal::{Money, Rate};
use crate::delinquency::NpaState;
use crate::errors::{LoanError, Result};
use crate::rates::RateBasis;
use crate::schedule::Installment;
use crate::types::{
    AccountId, ClosureType, DelinquencyBucket, EclStage, LoanStatus, PaymentFrequency, ScheduleType,
};

/// parameters for opening a loan account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOpening {
    pub product_id: Uuid,
    pub borrower_ref: String,
    pub principal: Money,
    pub rate_basis: RateBasis,
    pub initial_rate: Rate,
    pub tenure_periods: u32,
    pub frequency: PaymentFrequency,
    pub schedule_type: ScheduleType,
    pub day_count: DayCountConvention,
    pub calendar_id: String,
    pub business_day_mode: BusinessDayMode,
    pub disbursement_date: NaiveDate,
    pub first_due_date: NaiveDate,
}

/// loan account aggregate state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAccount {
    pub account_id: AccountId,
    pub product_id: Uuid,
    pub borrower_ref: String,

    // balances
    pub principal_disbursed: Money,
    pub principal_outstanding: Money,
    pub interest_outstanding: Money,
    pub fees_outstanding: Money,
    /// cumulative principal discharged by haircuts, settlements and write-offs
    pub principal_waived: Money,
    /// cumulative principal retired by prepayments outside the schedule rows
    pub principal_prepaid: Money,

    // rate
    pub rate_basis: RateBasis,
    pub current_rate: Rate,

    // terms
    pub tenure_periods: u32,
    pub frequency: PaymentFrequency,
    pub schedule_type: ScheduleType,
    pub day_count: DayCountConvention,
    pub calendar_id: String,
    pub business_day_mode: BusinessDayMode,
    pub disbursement_date: NaiveDate,
    pub first_due_date: NaiveDate,

    // status
    pub status: LoanStatus,
    pub closure_type: Option<ClosureType>,
    pub closed_on: Option<NaiveDate>,

    // delinquency
    pub dpd: u32,
    pub bucket: DelinquencyBucket,
    pub npa: NpaState,

    // lifecycle flags
    pub is_restructured: bool,
    pub is_written_off: bool,
    /// significant increase in credit risk, set externally
    pub sicr_flag: bool,

    // ecl
    pub ecl_stage: EclStage,
    pub last_provision: Money,

    // accrual tracking
    pub accrued_interest: Money,
    pub last_accrual_date: Option<NaiveDate>,
    pub capitalized_interest: Money,
}

impl LoanAccount {
    pub fn open(account_id: AccountId, opening: AccountOpening) -> Self {
        Self {
            account_id,
            product_id: opening.product_id,
            borrower_ref: opening.borrower_ref,
            principal_disbursed: opening.principal,
            principal_outstanding: opening.principal,
            interest_outstanding: Money::ZERO,
            fees_outstanding: Money::ZERO,
            principal_waived: Money::ZERO,
            principal_prepaid: Money::ZERO,
            rate_basis: opening.rate_basis,
            current_rate: opening.initial_rate,
            tenure_periods: opening.tenure_periods,
            frequency: opening.frequency,
            schedule_type: opening.schedule_type,
            day_count: opening.day_count,
            calendar_id: opening.calendar_id,
            business_day_mode: opening.business_day_mode,
            disbursement_date: opening.disbursement_date,
            first_due_date: opening.first_due_date,
            status: LoanStatus::Active,
            closure_type: None,
            closed_on: None,
            dpd: 0,
            bucket: DelinquencyBucket::Current,
            npa: NpaState::default(),
            is_restructured: false,
            is_written_off: false,
            sicr_flag: false,
            ecl_stage: EclStage::Stage1,
            last_provision: Money::ZERO,
            accrued_interest: Money::ZERO,
            last_accrual_date: None,
            capitalized_interest: Money::ZERO,
        }
    }

    pub fn total_outstanding(&self) -> Money {
        self.principal_outstanding + self.interest_outstanding + self.fees_outstanding
    }

    /// principal the current schedule must amortize: disbursed plus
    /// capitalized interest, net of waivers and out-of-schedule prepayments
    pub fn expected_schedule_principal(&self) -> Money {
        self.principal_disbursed + self.capitalized_interest
            - self.principal_waived
            - self.principal_prepaid
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn assert_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LoanError::AccountNotOpen { status: self.status })
        }
    }

    /// recompute outstanding totals from the schedule: principal over all
    /// rows, billed interest and fees over rows already due
    pub fn recompute_outstanding(&mut self, schedule: &[Installment], as_of: NaiveDate) {
        self.principal_outstanding = schedule.iter().map(|row| row.remaining_principal()).sum();
        self.interest_outstanding = schedule
            .iter()
            .filter(|row| row.due_date <= as_of)
            .map(|row| row.remaining_interest())
            .sum();
        self.fees_outstanding = schedule
            .iter()
            .filter(|row| row.due_date <= as_of)
            .map(|row| row.remaining_fees())
            .sum();
    }

    pub fn close(&mut self, closure_type: ClosureType, on: NaiveDate) {
        self.status = match closure_type {
            ClosureType::WriteOff => LoanStatus::WrittenOff,
            _ => LoanStatus::Closed,
        };
        self.closure_type = Some(closure_type);
        self.closed_on = Some(on);
    }
}
