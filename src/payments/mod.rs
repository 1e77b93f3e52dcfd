pub mod allocator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::schedule::Installment;
use crate::types::{AccountId, PaymentChannel};

pub use allocator::{allocate, AllocationOutcome};

/// inbound payment with its unallocated remainder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub account_id: AccountId,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub channel: PaymentChannel,
    pub external_ref: String,
    pub unallocated: Money,
}

/// attachment of a payment to exactly one schedule row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub allocation_id: Uuid,
    pub payment_id: Uuid,
    pub installment_number: u32,
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
}

impl PaymentAllocation {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees
    }
}

/// installment component addressed by the waterfall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Fees,
    Interest,
    Principal,
}

/// waterfall priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WaterfallPriority {
    First = 1,
    Second = 2,
    Third = 3,
}

/// component allocation order for a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWaterfall {
    pub fees_priority: WaterfallPriority,
    pub interest_priority: WaterfallPriority,
    pub principal_priority: WaterfallPriority,
}

impl PaymentWaterfall {
    /// standard waterfall: fees -> interest -> principal
    pub fn standard() -> Self {
        Self {
            fees_priority: WaterfallPriority::First,
            interest_priority: WaterfallPriority::Second,
            principal_priority: WaterfallPriority::Third,
        }
    }

    /// interest-first waterfall for certain products
    pub fn interest_first() -> Self {
        Self {
            fees_priority: WaterfallPriority::Second,
            interest_priority: WaterfallPriority::First,
            principal_priority: WaterfallPriority::Third,
        }
    }
}

/// capability yielding component priorities for an installment
pub trait WaterfallPolicy {
    fn component_order(&self, installment: &Installment) -> [Component; 3];
}

impl WaterfallPolicy for PaymentWaterfall {
    fn component_order(&self, _installment: &Installment) -> [Component; 3] {
        let mut priorities = [
            (self.fees_priority, Component::Fees),
            (self.interest_priority, Component::Interest),
            (self.principal_priority, Component::Principal),
        ];
        priorities.sort_by_key(|&(priority, _)| priority);
        [priorities[0].1, priorities[1].1, priorities[2].1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstallmentStatus;
    use chrono::NaiveDate;

    fn installment() -> Installment {
        Installment {
            installment_number: 1,
            due_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            opening_balance: Money::from_major(1_000),
            principal_due: Money::from_major(100),
            interest_due: Money::from_major(10),
            fees_due: Money::ZERO,
            total_due: Money::from_major(110),
            closing_balance: Money::from_major(900),
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            fees_paid: Money::ZERO,
            status: InstallmentStatus::Pending,
            late_fee_charged: false,
        }
    }

    #[test]
    fn test_standard_order() {
        let order = PaymentWaterfall::standard().component_order(&installment());
        assert_eq!(order, [Component::Fees, Component::Interest, Component::Principal]);
    }

    #[test]
    fn test_interest_first_order() {
        let order = PaymentWaterfall::interest_first().component_order(&installment());
        assert_eq!(order, [Component::Interest, Component::Fees, Component::Principal]);
    }
}
