use uuid::Uuid;

use crate::decimal::Money;
use crate::schedule::Installment;
use crate::types::InstallmentStatus;

use super::{Component, PaymentAllocation, WaterfallPolicy};

/// result of walking a payment down the schedule
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub allocations: Vec<PaymentAllocation>,
    pub unallocated: Money,
    /// installments fully settled by this payment
    pub settled: Vec<u32>,
}

/// apply a received amount to the schedule: oldest unpaid installment first,
/// components within each installment in the policy's order, capped at each
/// component's remaining due
pub fn allocate(
    schedule: &mut [Installment],
    payment_id: Uuid,
    amount: Money,
    policy: &dyn WaterfallPolicy,
) -> AllocationOutcome {
    let mut remaining = amount;
    let mut allocations = Vec::new();
    let mut settled = Vec::new();

    for row in schedule.iter_mut() {
        if remaining.is_zero() {
            break;
        }
        if row.is_settled() {
            continue;
        }

        let mut allocation = PaymentAllocation {
            allocation_id: Uuid::new_v4(),
            payment_id,
            installment_number: row.installment_number,
            principal: Money::ZERO,
            interest: Money::ZERO,
            fees: Money::ZERO,
        };

        for component in policy.component_order(row) {
            if remaining.is_zero() {
                break;
            }
            let (due, paid, applied) = match component {
                Component::Fees => (row.fees_due, &mut row.fees_paid, &mut allocation.fees),
                Component::Interest => {
                    (row.interest_due, &mut row.interest_paid, &mut allocation.interest)
                }
                Component::Principal => {
                    (row.principal_due, &mut row.principal_paid, &mut allocation.principal)
                }
            };
            let portion = remaining.min(due - *paid);
            if portion.is_positive() {
                *paid += portion;
                *applied += portion;
                remaining -= portion;
            }
        }

        if allocation.total().is_positive() {
            row.refresh_status();
            if row.status == InstallmentStatus::Paid {
                settled.push(row.installment_number);
            }
            allocations.push(allocation);
        }
    }

    AllocationOutcome { allocations, unallocated: remaining, settled }
}
