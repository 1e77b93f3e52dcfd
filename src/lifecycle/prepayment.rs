use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::BusinessCalendar;
use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::delinquency::{self, OverdueTotals};
use crate::errors::{LoanError, Result};
use crate::events::Event;
use crate::loan::Loan;
use crate::payments::allocate;
use crate::schedule::{add_months, equated_rows, fixed_installment_rows, Installment};
use crate::types::{AccountId, ClosureType, InstallmentStatus, PrepaymentAction};

/// pure what-if result for a prepayment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepaymentImpact {
    pub payoff_amount: Money,
    pub penalty: Money,
    pub principal_reduction: Money,
    pub old_emi: Money,
    pub new_emi: Money,
    pub old_tenure: u32,
    pub new_tenure: u32,
    pub interest_saved: Money,
}

/// immutable record of an applied prepayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prepayment {
    pub prepayment_id: Uuid,
    pub account_id: AccountId,
    pub amount: Money,
    pub action: PrepaymentAction,
    pub paid_at: DateTime<Utc>,
    pub penalty: Money,
    pub principal_reduced: Money,
    pub new_emi: Money,
    pub new_tenure: u32,
    pub unallocated: Money,
    pub closed_account: bool,
}

struct Computation {
    impact: PrepaymentImpact,
    split: usize,
    boundary_balance: Money,
    overdue: OverdueTotals,
    broken_interest: Money,
    reduction: Money,
    new_tail_periods: u32,
}

/// pure impact analysis: no state is touched
pub fn impact(loan: &Loan, amount: Money, action: PrepaymentAction, as_of: NaiveDate) -> Result<PrepaymentImpact> {
    compute(loan, amount, action, as_of).map(|c| c.impact)
}

/// apply a prepayment; foreclosure settles the payoff and closes the account
pub fn apply(
    loan: &mut Loan,
    amount: Money,
    action: PrepaymentAction,
    paid_at: DateTime<Utc>,
    calendar: &BusinessCalendar,
    cfg: &EngineConfig,
) -> Result<Prepayment> {
    let as_of = paid_at.date_naive();
    let c = compute(loan, amount, action, as_of)?;
    if action == PrepaymentAction::Foreclosure && amount < c.impact.payoff_amount {
        return Err(LoanError::InvalidInput {
            message: format!(
                "amount {} is below the payoff {}",
                amount, c.impact.payoff_amount
            ),
        });
    }
    let prepayment_id = Uuid::new_v4();
    let account_id = loan.account.account_id;

    // clear everything already due before touching the forward schedule
    if c.overdue.total().is_positive() {
        let outcome = allocate(
            &mut loan.schedule[..c.split],
            prepayment_id,
            c.overdue.total(),
            &loan.product.waterfall,
        );
        loan.allocations.extend(outcome.allocations);
    }
    if loan.schedule[..c.split].iter().any(|row| !row.is_settled()) {
        return Err(LoanError::ConflictingState {
            message: "partially paid installment blocks prepayment".to_string(),
        });
    }

    let first_number = c
        .split
        .checked_sub(1)
        .map(|idx| loan.schedule[idx].installment_number + 1)
        .unwrap_or(1);
    let kept_count = c.split as u32;
    let mut unallocated = Money::ZERO;
    let closed;

    match action {
        PrepaymentAction::Foreclosure => {
            let payoff_row = Installment {
                installment_number: first_number,
                due_date: as_of,
                opening_balance: c.boundary_balance,
                principal_due: c.boundary_balance,
                interest_due: c.broken_interest,
                fees_due: c.impact.penalty,
                total_due: c.boundary_balance + c.broken_interest + c.impact.penalty,
                closing_balance: Money::ZERO,
                principal_paid: Money::ZERO,
                interest_paid: Money::ZERO,
                fees_paid: Money::ZERO,
                status: InstallmentStatus::Pending,
                late_fee_charged: false,
            };
            let remainder = amount - c.overdue.total();
            loan.schedule.truncate(c.split);
            loan.schedule.push(payoff_row);
            let outcome = allocate(
                &mut loan.schedule[c.split..],
                prepayment_id,
                remainder,
                &loan.product.waterfall,
            );
            unallocated = outcome.unallocated;
            loan.allocations.extend(outcome.allocations);

            loan.account.tenure_periods = kept_count + 1;
            loan.account.close(ClosureType::Normal, as_of);
            closed = true;
            loan.events.emit(Event::AccountClosed {
                account_id,
                closure_type: ClosureType::Normal,
                waived: Money::ZERO,
                timestamp: paid_at,
            });
        }
        PrepaymentAction::ReduceEmi | PrepaymentAction::ReduceTenure => {
            let months = loan.account.frequency.months_per_period();
            let mode = loan.account.business_day_mode;
            let anchor = loan.schedule[c.split].due_date;
            let due = |number: u32| {
                let raw = add_months(anchor, (number - first_number) * months);
                calendar.adjust(raw, mode)
            };
            let r = loan
                .account
                .current_rate
                .periodic(loan.account.frequency.periods_per_year())
                .as_decimal();
            let new_balance = c.boundary_balance - c.reduction;
            let mut tail = match action {
                PrepaymentAction::ReduceEmi => {
                    equated_rows(new_balance, r, c.new_tail_periods, first_number, &due)
                }
                _ => fixed_installment_rows(new_balance, r, c.impact.new_emi, first_number, &due),
            };
            // the prepaid principal leaves the balance ahead of the new tail
            if let Some(head) = tail.first_mut() {
                head.opening_balance = c.boundary_balance;
            }
            loan.schedule.truncate(c.split);
            loan.schedule.extend(tail);
            loan.account.tenure_periods = kept_count + c.new_tail_periods;
            closed = false;

            loan.events.emit(Event::ScheduleRegenerated {
                account_id,
                from_installment: first_number,
                installments: loan.schedule.len() as u32,
                reason: format!("prepayment {:?}", action),
            });
        }
    }

    if action != PrepaymentAction::Foreclosure {
        loan.account.principal_prepaid += c.reduction;
    }
    loan.account.recompute_outstanding(&loan.schedule, as_of);
    loan.update_delinquency(as_of, cfg, false);
    loan.principal_history.record(as_of, loan.account.principal_outstanding);
    loan.events.emit(Event::PrepaymentApplied {
        account_id,
        prepayment_id,
        amount,
        principal_reduced: c.reduction,
        penalty: c.impact.penalty,
    });
    loan.reconcile()?;

    let record = Prepayment {
        prepayment_id,
        account_id,
        amount,
        action,
        paid_at,
        penalty: c.impact.penalty,
        principal_reduced: c.reduction,
        new_emi: c.impact.new_emi,
        new_tenure: c.impact.new_tenure,
        unallocated,
        closed_account: closed,
    };
    loan.prepayments.push(record.clone());
    Ok(record)
}

fn compute(loan: &Loan, amount: Money, action: PrepaymentAction, as_of: NaiveDate) -> Result<Computation> {
    loan.account.assert_active()?;
    if loan.schedule.is_empty() {
        return Err(LoanError::ScheduleNotFound { account_id: loan.account.account_id });
    }
    if action != PrepaymentAction::Foreclosure && !amount.is_positive() {
        return Err(LoanError::InvalidAmount { amount });
    }

    let overdue = delinquency::overdue_totals(&loan.schedule, as_of);
    let split = loan
        .schedule
        .iter()
        .position(|row| row.due_date > as_of && !row.is_settled() && row.total_paid().is_zero())
        .unwrap_or(loan.schedule.len());
    let boundary_balance = split
        .checked_sub(1)
        .map(|idx| loan.schedule[idx].closing_balance)
        .unwrap_or_else(|| loan.schedule[0].opening_balance);
    let tail = &loan.schedule[split..];

    // interest accrued since the last billed due date, not yet on a row
    let period_start = loan
        .schedule
        .iter()
        .filter(|row| row.due_date <= as_of)
        .map(|row| row.due_date)
        .max()
        .unwrap_or(loan.account.disbursement_date);
    let fraction = loan.account.day_count.year_fraction(period_start, as_of);
    let broken_interest = Money::from_decimal(
        boundary_balance.as_decimal() * loan.account.current_rate.as_decimal() * fraction,
    );

    let penalty_rate = loan.product.prepayment_penalty_rate.as_decimal();
    let old_emi = tail.first().map(|row| row.total_due).unwrap_or(Money::ZERO);
    let old_tenure = loan.account.tenure_periods;
    let tail_interest: Money = tail.iter().map(|row| row.interest_due).sum();
    let r = loan
        .account
        .current_rate
        .periodic(loan.account.frequency.periods_per_year())
        .as_decimal();

    let (payoff, penalty, reduction, new_emi, new_tail_periods, interest_saved) = match action {
        PrepaymentAction::Foreclosure => {
            let penalty = Money::from_decimal(loan.account.principal_outstanding.as_decimal() * penalty_rate);
            let payoff = loan.account.principal_outstanding
                + broken_interest
                + overdue.interest
                + overdue.fees
                + penalty;
            (payoff, penalty, boundary_balance, Money::ZERO, 0, tail_interest - broken_interest)
        }
        PrepaymentAction::ReduceEmi | PrepaymentAction::ReduceTenure => {
            let net = amount - overdue.total();
            if !net.is_positive() {
                return Err(LoanError::InvalidInput {
                    message: "amount does not exceed the overdue total".to_string(),
                });
            }
            let reduction = Money::from_decimal(
                net.as_decimal() / (rust_decimal::Decimal::ONE + penalty_rate),
            );
            let penalty = net - reduction;
            if reduction >= boundary_balance {
                return Err(LoanError::InvalidInput {
                    message: "prepayment would clear the balance; use foreclosure".to_string(),
                });
            }
            let new_balance = boundary_balance - reduction;
            let preview = match action {
                PrepaymentAction::ReduceEmi => {
                    equated_rows(new_balance, r, tail.len() as u32, 1, &|_| as_of)
                }
                _ => fixed_installment_rows(new_balance, r, old_emi, 1, &|_| as_of),
            };
            let periods = preview.len() as u32;
            if periods == 0 {
                return Err(LoanError::InvalidInput {
                    message: "no forward installments to reshape".to_string(),
                });
            }
            let new_emi = match action {
                PrepaymentAction::ReduceEmi => {
                    preview.first().map(|row| row.total_due).unwrap_or(Money::ZERO)
                }
                _ => old_emi,
            };
            let new_interest: Money = preview.iter().map(|row| row.interest_due).sum();
            let payoff = loan.account.principal_outstanding
                + broken_interest
                + overdue.interest
                + overdue.fees
                + Money::from_decimal(loan.account.principal_outstanding.as_decimal() * penalty_rate);
            (payoff, penalty, reduction, new_emi, periods, tail_interest - new_interest)
        }
    };

    let new_tenure = match action {
        PrepaymentAction::Foreclosure => split as u32 + 1,
        _ => split as u32 + new_tail_periods,
    };

    Ok(Computation {
        impact: PrepaymentImpact {
            payoff_amount: payoff,
            penalty,
            principal_reduction: reduction,
            old_emi,
            new_emi,
            old_tenure,
            new_tenure,
            interest_saved,
        },
        split,
        boundary_balance,
        overdue,
        broken_interest,
        reduction,
        new_tail_periods,
    })
}
