use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{AccountId, ClosureType, DelinquencyBucket, EclStage, NpaCategory};

/// all events emitted by loan operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // schedule events
    ScheduleGenerated {
        account_id: AccountId,
        installments: u32,
        total_principal: Money,
        total_interest: Money,
    },
    ScheduleRegenerated {
        account_id: AccountId,
        from_installment: u32,
        installments: u32,
        reason: String,
    },

    // payment events
    PaymentReceived {
        account_id: AccountId,
        payment_id: Uuid,
        amount: Money,
        external_ref: String,
        timestamp: DateTime<Utc>,
    },
    PaymentAllocated {
        account_id: AccountId,
        payment_id: Uuid,
        to_fees: Money,
        to_interest: Money,
        to_principal: Money,
        unallocated: Money,
    },
    InstallmentSettled {
        account_id: AccountId,
        installment_number: u32,
        due_date: NaiveDate,
    },

    // accrual events
    InterestAccrued {
        account_id: AccountId,
        accrual_date: NaiveDate,
        amount: Money,
        cumulative: Money,
    },
    AccrualsReversed {
        account_id: AccountId,
        from_date: NaiveDate,
        rows: u32,
    },
    RateReset {
        account_id: AccountId,
        as_of: NaiveDate,
        old_rate: Rate,
        new_rate: Rate,
    },

    // delinquency events
    BucketChanged {
        account_id: AccountId,
        as_of: NaiveDate,
        old_bucket: DelinquencyBucket,
        new_bucket: DelinquencyBucket,
        dpd: u32,
    },
    NpaMarked {
        account_id: AccountId,
        as_of: NaiveDate,
        category: NpaCategory,
        dpd: u32,
    },
    NpaCured {
        account_id: AccountId,
        as_of: NaiveDate,
    },
    LateFeeCharged {
        account_id: AccountId,
        installment_number: u32,
        amount: Money,
    },
    PenalInterestCharged {
        account_id: AccountId,
        installment_number: u32,
        amount: Money,
        overdue_base: Money,
    },

    // lifecycle events
    Restructured {
        account_id: AccountId,
        restructure_id: Uuid,
        effective_date: NaiveDate,
        old_tenure: u32,
        new_tenure: u32,
        principal_waived: Money,
    },
    PrepaymentApplied {
        account_id: AccountId,
        prepayment_id: Uuid,
        amount: Money,
        principal_reduced: Money,
        penalty: Money,
    },
    AccountClosed {
        account_id: AccountId,
        closure_type: ClosureType,
        waived: Money,
        timestamp: DateTime<Utc>,
    },
    WrittenOff {
        account_id: AccountId,
        write_off_id: Uuid,
        principal: Money,
        interest: Money,
        fees: Money,
    },
    RecoveryRecorded {
        account_id: AccountId,
        write_off_id: Uuid,
        amount: Money,
    },

    // ecl events
    EclRestaged {
        account_id: AccountId,
        as_of: NaiveDate,
        old_stage: EclStage,
        new_stage: EclStage,
        reason: String,
    },
    ProvisionPosted {
        account_id: AccountId,
        as_of: NaiveDate,
        stage: EclStage,
        ecl_amount: Money,
        charge: Money,
    },
}

/// event store collecting events during a unit of work
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_store_drain() {
        let mut store = EventStore::new();
        store.emit(Event::NpaCured {
            account_id: Uuid::new_v4(),
            as_of: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        });
        assert_eq!(store.events().len(), 1);

        let drained = store.take_events();
        assert_eq!(drained.len(), 1);
        assert!(store.events().is_empty());
    }
}
