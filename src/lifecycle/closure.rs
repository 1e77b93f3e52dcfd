use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::events::Event;
use crate::loan::Loan;
use crate::payments::allocate;
use crate::types::{AccountId, ClosureType, EclStage, NpaCategory, RecoverySource};

/// component amounts of a write-off or recovery
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WriteOffComponents {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
}

impl WriteOffComponents {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees
    }
}

/// immutable write-off record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOff {
    pub write_off_id: Uuid,
    pub account_id: AccountId,
    pub components: WriteOffComponents,
    pub reason: String,
    pub dpd_at_write_off: u32,
    pub npa_category_at_write_off: Option<NpaCategory>,
    pub partial: bool,
    pub timestamp: DateTime<Utc>,
}

/// recovery against an earlier write-off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOffRecovery {
    pub recovery_id: Uuid,
    pub write_off_id: Uuid,
    pub account_id: AccountId,
    pub components: WriteOffComponents,
    pub source: RecoverySource,
    pub timestamp: DateTime<Utc>,
}

/// close an account; returns the amount waived (zero for normal closure)
pub fn close(
    loan: &mut Loan,
    closure_type: ClosureType,
    amount: Option<Money>,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Money> {
    loan.account.assert_active()?;

    match closure_type {
        ClosureType::Normal => {
            let remaining: Money = loan.schedule.iter().map(|row| row.remaining_total()).sum();
            if remaining.is_positive() {
                return Err(LoanError::ConflictingState {
                    message: format!("outstanding {} blocks normal closure", remaining),
                });
            }
            loan.account.close(ClosureType::Normal, as_of);
            loan.account.recompute_outstanding(&loan.schedule, as_of);
            loan.events.emit(Event::AccountClosed {
                account_id: loan.account.account_id,
                closure_type,
                waived: Money::ZERO,
                timestamp: now,
            });
            Ok(Money::ZERO)
        }
        ClosureType::Settlement => {
            let settled_amount = amount.filter(|a| a.is_positive()).ok_or_else(|| {
                LoanError::InvalidInput {
                    message: "settlement requires a positive negotiated amount".to_string(),
                }
            })?;
            let settlement_id = Uuid::new_v4();
            let outcome = allocate(
                &mut loan.schedule,
                settlement_id,
                settled_amount,
                &loan.product.waterfall,
            );
            loan.allocations.extend(outcome.allocations);

            // the residual is discharged in full
            let waived = waive_remaining(loan);
            loan.account.close(ClosureType::Settlement, as_of);
            loan.account.recompute_outstanding(&loan.schedule, as_of);
            loan.principal_history.record(as_of, loan.account.principal_outstanding);
            loan.events.emit(Event::AccountClosed {
                account_id: loan.account.account_id,
                closure_type,
                waived,
                timestamp: now,
            });
            loan.reconcile()?;
            Ok(waived)
        }
        ClosureType::WriteOff => {
            let write_off = apply_write_off(loan, None, "closure write-off".to_string(), as_of, now)?;
            Ok(write_off.components.total())
        }
    }
}

/// write off the account, fully (components = None) or partially
pub fn apply_write_off(
    loan: &mut Loan,
    components: Option<WriteOffComponents>,
    reason: String,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> Result<WriteOff> {
    loan.account.assert_active()?;

    let full_components = WriteOffComponents {
        principal: loan.account.principal_outstanding,
        interest: loan.account.interest_outstanding,
        fees: loan.account.fees_outstanding,
    };
    let components = components.unwrap_or(full_components);
    if !components.total().is_positive() {
        return Err(LoanError::InvalidInput {
            message: "write-off requires a positive amount".to_string(),
        });
    }
    if components.principal > full_components.principal
        || components.interest > full_components.interest
        || components.fees > full_components.fees
    {
        return Err(LoanError::InvalidInput {
            message: "write-off exceeds outstanding components".to_string(),
        });
    }
    let partial = components.principal < full_components.principal;

    if partial {
        waive_components(loan, components);
    } else {
        waive_remaining(loan);
        loan.account.close(ClosureType::WriteOff, as_of);
    }

    loan.account.is_written_off = true;
    loan.account.ecl_stage = EclStage::Stage3;
    loan.account.recompute_outstanding(&loan.schedule, as_of);
    loan.principal_history.record(as_of, loan.account.principal_outstanding);

    let write_off = WriteOff {
        write_off_id: Uuid::new_v4(),
        account_id: loan.account.account_id,
        components,
        reason,
        dpd_at_write_off: loan.account.dpd,
        npa_category_at_write_off: loan.account.npa.category,
        partial,
        timestamp: now,
    };
    loan.events.emit(Event::WrittenOff {
        account_id: loan.account.account_id,
        write_off_id: write_off.write_off_id,
        principal: components.principal,
        interest: components.interest,
        fees: components.fees,
    });
    loan.reconcile()?;
    loan.write_offs.push(write_off.clone());
    Ok(write_off)
}

/// log a recovery against an earlier write-off; cumulative recoveries are
/// capped at the written-off amount
pub fn record_recovery(
    loan: &mut Loan,
    write_off_id: Uuid,
    components: WriteOffComponents,
    source: RecoverySource,
    now: DateTime<Utc>,
) -> Result<WriteOffRecovery> {
    let write_off = loan
        .write_offs
        .iter()
        .find(|w| w.write_off_id == write_off_id)
        .cloned()
        .ok_or(LoanError::WriteOffNotFound { write_off_id })?;

    if !components.total().is_positive() {
        return Err(LoanError::InvalidInput {
            message: "recovery requires a positive amount".to_string(),
        });
    }
    let recovered_so_far: Money = loan
        .recoveries
        .iter()
        .filter(|r| r.write_off_id == write_off_id)
        .map(|r| r.components.total())
        .sum();
    if recovered_so_far + components.total() > write_off.components.total() {
        return Err(LoanError::InvalidInput {
            message: format!(
                "recovery exceeds written-off amount {}",
                write_off.components.total()
            ),
        });
    }

    let recovery = WriteOffRecovery {
        recovery_id: Uuid::new_v4(),
        write_off_id,
        account_id: loan.account.account_id,
        components,
        source,
        timestamp: now,
    };
    loan.events.emit(Event::RecoveryRecorded {
        account_id: loan.account.account_id,
        write_off_id,
        amount: components.total(),
    });
    loan.recoveries.push(recovery.clone());
    Ok(recovery)
}

/// discharge every remaining due; returns the waived total
fn waive_remaining(loan: &mut Loan) -> Money {
    let mut waived = Money::ZERO;
    let mut principal_waived = Money::ZERO;
    for row in loan.schedule.iter_mut() {
        if row.is_settled() {
            continue;
        }
        waived += row.remaining_total();
        principal_waived += row.remaining_principal();
        row.principal_due = row.principal_paid;
        row.interest_due = row.interest_paid;
        row.fees_due = row.fees_paid;
        row.total_due = row.principal_due + row.interest_due + row.fees_due;
        row.refresh_status();
    }
    loan.account.principal_waived += principal_waived;
    waived
}

/// reduce component dues oldest-first by the written-off amounts
fn waive_components(loan: &mut Loan, components: WriteOffComponents) {
    let mut principal = components.principal;
    let mut interest = components.interest;
    let mut fees = components.fees;
    let mut principal_waived = Money::ZERO;

    for row in loan.schedule.iter_mut() {
        if row.is_settled() {
            continue;
        }
        let p = principal.min(row.remaining_principal());
        let i = interest.min(row.remaining_interest());
        let f = fees.min(row.remaining_fees());
        row.principal_due -= p;
        row.interest_due -= i;
        row.fees_due -= f;
        row.total_due = row.principal_due + row.interest_due + row.fees_due;
        row.refresh_status();
        principal -= p;
        principal_waived += p;
        interest -= i;
        fees -= f;
        if principal.is_zero() && interest.is_zero() && fees.is_zero() {
            break;
        }
    }
    loan.account.principal_waived += principal_waived;
}
