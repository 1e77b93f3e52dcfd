use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::LoanAccount;
use crate::calendar::BusinessCalendar;
use crate::config::{EngineConfig, ProductConfig};
use crate::decimal::Money;
use crate::delinquency::{self, DelinquencySnapshot, NpaTransition};
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::interest::{AccrualEngine, AccrualStatus, InterestAccrual, PenaltyEngine, PrincipalHistory};
use crate::lifecycle::{Prepayment, RestructureEvent, WriteOff, WriteOffRecovery};
use crate::payments::{allocate, Payment, PaymentAllocation};
use crate::rates::BenchmarkSet;
use crate::schedule::{self, GeneratedSchedule, ScheduleSpec};
use crate::types::PaymentChannel;

/// inbound payment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
    pub channel: PaymentChannel,
    pub external_ref: String,
}

/// result of applying a payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub payment_id: Uuid,
    pub allocations: Vec<PaymentAllocation>,
    pub unallocated: Money,
    pub new_dpd: u32,
    /// true when the external reference had already been applied and the
    /// prior result is being returned
    pub replayed: bool,
}

/// loan aggregate: account state plus its schedule, ledgers and events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub account: LoanAccount,
    pub product: ProductConfig,
    pub schedule: Vec<crate::schedule::Installment>,
    pub payments: Vec<Payment>,
    pub allocations: Vec<PaymentAllocation>,
    pub accruals: Vec<InterestAccrual>,
    pub principal_history: PrincipalHistory,
    pub snapshots: Vec<DelinquencySnapshot>,
    pub restructures: Vec<RestructureEvent>,
    pub prepayments: Vec<Prepayment>,
    pub write_offs: Vec<WriteOff>,
    pub recoveries: Vec<WriteOffRecovery>,
    #[serde(skip)]
    pub events: EventStore,
}

impl Loan {
    pub fn new(account: LoanAccount, product: ProductConfig) -> Self {
        let mut principal_history = PrincipalHistory::new();
        principal_history.record(account.disbursement_date, account.principal_outstanding);
        Self {
            account,
            product,
            schedule: Vec::new(),
            payments: Vec::new(),
            allocations: Vec::new(),
            accruals: Vec::new(),
            principal_history,
            snapshots: Vec::new(),
            restructures: Vec::new(),
            prepayments: Vec::new(),
            write_offs: Vec::new(),
            recoveries: Vec::new(),
            events: EventStore::new(),
        }
    }

    /// generation inputs derived from account configuration
    pub fn schedule_spec(&self) -> ScheduleSpec {
        ScheduleSpec {
            principal: self.account.principal_disbursed,
            annual_rate: self.account.current_rate,
            tenure_periods: self.account.tenure_periods,
            frequency: self.account.frequency,
            schedule_type: self.account.schedule_type,
            first_due: self.account.first_due_date,
            business_day_mode: self.account.business_day_mode,
        }
    }

    /// generate without persisting; pure over account config and calendar
    pub fn generate_schedule(&self, calendar: &BusinessCalendar) -> Result<GeneratedSchedule> {
        schedule::generate(&self.schedule_spec(), calendar)
    }

    /// generate and persist; fails if a schedule already exists
    pub fn persist_schedule(&mut self, calendar: &BusinessCalendar) -> Result<()> {
        if !self.schedule.is_empty() {
            return Err(LoanError::ScheduleAlreadyExists { account_id: self.account.account_id });
        }
        let generated = self.generate_schedule(calendar)?;
        self.account.capitalized_interest = generated.capitalized_interest;
        self.account.principal_outstanding = generated.total_principal();
        self.principal_history
            .record(self.account.disbursement_date, self.account.principal_outstanding);
        self.events.emit(Event::ScheduleGenerated {
            account_id: self.account.account_id,
            installments: generated.installments.len() as u32,
            total_principal: generated.total_principal(),
            total_interest: generated.total_interest(),
        });
        self.schedule = generated.installments;
        Ok(())
    }

    /// apply a received amount through the waterfall; idempotent by
    /// external reference
    pub fn apply_payment(&mut self, request: PaymentRequest, cfg: &EngineConfig) -> Result<PaymentOutcome> {
        self.account.assert_active()?;
        if !request.amount.is_positive() {
            return Err(LoanError::InvalidAmount { amount: request.amount });
        }
        if self.schedule.is_empty() {
            return Err(LoanError::ScheduleNotFound { account_id: self.account.account_id });
        }

        if let Some(prior) = self.payments.iter().find(|p| p.external_ref == request.external_ref) {
            if prior.amount != request.amount {
                return Err(LoanError::IdempotencyMismatch {
                    external_ref: request.external_ref,
                    prior: prior.amount,
                    submitted: request.amount,
                });
            }
            let allocations = self
                .allocations
                .iter()
                .filter(|a| a.payment_id == prior.payment_id)
                .cloned()
                .collect();
            return Ok(PaymentOutcome {
                payment_id: prior.payment_id,
                allocations,
                unallocated: prior.unallocated,
                new_dpd: self.account.dpd,
                replayed: true,
            });
        }

        let payment_id = Uuid::new_v4();
        let outcome = allocate(&mut self.schedule, payment_id, request.amount, &self.product.waterfall);

        self.events.emit(Event::PaymentReceived {
            account_id: self.account.account_id,
            payment_id,
            amount: request.amount,
            external_ref: request.external_ref.clone(),
            timestamp: request.paid_at,
        });
        self.events.emit(Event::PaymentAllocated {
            account_id: self.account.account_id,
            payment_id,
            to_fees: outcome.allocations.iter().map(|a| a.fees).sum(),
            to_interest: outcome.allocations.iter().map(|a| a.interest).sum(),
            to_principal: outcome.allocations.iter().map(|a| a.principal).sum(),
            unallocated: outcome.unallocated,
        });
        for number in &outcome.settled {
            if let Some(row) = self.schedule.iter().find(|r| r.installment_number == *number) {
                self.events.emit(Event::InstallmentSettled {
                    account_id: self.account.account_id,
                    installment_number: *number,
                    due_date: row.due_date,
                });
            }
        }

        self.payments.push(Payment {
            payment_id,
            account_id: self.account.account_id,
            amount: request.amount,
            paid_at: request.paid_at,
            channel: request.channel,
            external_ref: request.external_ref,
            unallocated: outcome.unallocated,
        });
        self.allocations.extend(outcome.allocations.iter().cloned());

        let paid_on = request.paid_at.date_naive();
        self.update_delinquency(paid_on, cfg, false);
        self.principal_history.record(paid_on, self.account.principal_outstanding);
        self.reconcile()?;

        Ok(PaymentOutcome {
            payment_id,
            allocations: outcome.allocations,
            unallocated: outcome.unallocated,
            new_dpd: self.account.dpd,
            replayed: false,
        })
    }

    /// accrue daily interest up to the as-of date; a no-op returning the
    /// latest row when already current
    pub fn accrue(&mut self, as_of: NaiveDate, benchmarks: &BenchmarkSet) -> Result<InterestAccrual> {
        self.account.assert_active()?;
        let start = self.account.last_accrual_date.unwrap_or(self.account.disbursement_date);
        if as_of <= start {
            return self
                .accruals
                .iter()
                .rev()
                .find(|row| row.status != AccrualStatus::Reversed)
                .cloned()
                .ok_or_else(|| LoanError::ConflictingState {
                    message: format!("nothing to accrue on or before {}", as_of),
                });
        }

        let engine = AccrualEngine::new(self.account.day_count);
        let basis = self.account.rate_basis.clone();
        let rows = engine.accrue_range(
            self.account.account_id,
            &self.principal_history,
            &basis,
            benchmarks,
            start,
            as_of,
            self.account.accrued_interest,
        )?;

        let accrued_now: Money = rows.iter().map(|row| row.accrued).sum();
        let last = rows.last().expect("range is non-empty");
        if last.rate != self.account.current_rate {
            self.events.emit(Event::RateReset {
                account_id: self.account.account_id,
                as_of,
                old_rate: self.account.current_rate,
                new_rate: last.rate,
            });
            self.account.current_rate = last.rate;
        }
        self.account.accrued_interest = last.cumulative;
        self.account.last_accrual_date = Some(as_of);
        self.events.emit(Event::InterestAccrued {
            account_id: self.account.account_id,
            accrual_date: as_of,
            amount: accrued_now,
            cumulative: last.cumulative,
        });

        self.accruals.extend(rows);
        Ok(self.accruals.last().expect("just appended").clone())
    }

    /// mark the accrual suffix from a date as reversed and rewind the
    /// cumulative position
    pub fn reverse_accruals_from(&mut self, from: NaiveDate) -> u32 {
        let mut reversed = 0;
        for row in self.accruals.iter_mut() {
            if row.accrual_date >= from && row.status != AccrualStatus::Reversed {
                row.status = AccrualStatus::Reversed;
                reversed += 1;
            }
        }
        if reversed > 0 {
            let live = self.accruals.iter().rev().find(|row| row.status != AccrualStatus::Reversed);
            self.account.accrued_interest = live.map(|row| row.cumulative).unwrap_or(Money::ZERO);
            self.account.last_accrual_date = live.map(|row| row.accrual_date);
            self.events.emit(Event::AccrualsReversed {
                account_id: self.account.account_id,
                from_date: from,
                rows: reversed,
            });
        }
        reversed
    }

    /// refresh DPD, bucket, sticky NPA and penal charges; writes the daily
    /// snapshot
    pub fn refresh_delinquency(&mut self, as_of: NaiveDate, cfg: &EngineConfig) -> Result<DelinquencySnapshot> {
        self.account.assert_active()?;
        let snapshot = self.update_delinquency(as_of, cfg, true);
        self.reconcile()?;
        Ok(snapshot)
    }

    pub(crate) fn update_delinquency(
        &mut self,
        as_of: NaiveDate,
        cfg: &EngineConfig,
        charge_penalties: bool,
    ) -> DelinquencySnapshot {
        if charge_penalties {
            self.charge_penalties(as_of);
        }

        let totals = delinquency::overdue_totals(&self.schedule, as_of);
        let dpd = totals
            .oldest_due_date
            .map(|due| (as_of - due).num_days().max(0) as u32)
            .unwrap_or(0);
        let bucket = delinquency::bucket_for(dpd, &cfg.sma_boundaries);

        if bucket != self.account.bucket {
            self.events.emit(Event::BucketChanged {
                account_id: self.account.account_id,
                as_of,
                old_bucket: self.account.bucket,
                new_bucket: bucket,
                dpd,
            });
        }
        match self.account.npa.observe(dpd, as_of, cfg.npa_trigger_dpd) {
            NpaTransition::Marked(category) => self.events.emit(Event::NpaMarked {
                account_id: self.account.account_id,
                as_of,
                category,
                dpd,
            }),
            NpaTransition::Cured => self.events.emit(Event::NpaCured {
                account_id: self.account.account_id,
                as_of,
            }),
            NpaTransition::None => {}
        }

        self.account.dpd = dpd;
        self.account.bucket = bucket;
        self.account.recompute_outstanding(&self.schedule, as_of);

        let snapshot = DelinquencySnapshot {
            account_id: self.account.account_id,
            as_of,
            dpd,
            bucket,
            is_npa: self.account.npa.is_npa,
            npa_category: self.account.npa.category,
            overdue_principal: totals.principal,
            overdue_interest: totals.interest,
            overdue_fees: totals.fees,
            oldest_due_date: totals.oldest_due_date,
            missed_installments: totals.missed_installments,
        };
        // at most one snapshot per (account, date)
        match self.snapshots.last_mut() {
            Some(last) if last.as_of == as_of => *last = snapshot.clone(),
            _ => self.snapshots.push(snapshot.clone()),
        }
        snapshot
    }

    fn charge_penalties(&mut self, as_of: NaiveDate) {
        let engine = PenaltyEngine::for_product(&self.product);
        let account_id = self.account.account_id;

        let mut fee_events = Vec::new();
        for row in self.schedule.iter_mut() {
            if row.due_date > as_of || row.is_settled() {
                continue;
            }
            let days_overdue = (as_of - row.due_date).num_days().max(0) as u32;
            let fee = engine.late_fee(days_overdue, row.late_fee_charged);
            if fee.is_positive() {
                row.charge_fee(fee);
                row.late_fee_charged = true;
                fee_events.push((row.installment_number, fee));
            }
        }
        for (number, fee) in fee_events {
            self.events.emit(Event::LateFeeCharged {
                account_id,
                installment_number: number,
                amount: fee,
            });
        }

        let days_observed = self
            .snapshots
            .last()
            .map(|s| (as_of - s.as_of).num_days().max(0) as u32)
            .unwrap_or(0);
        let totals = delinquency::overdue_totals(&self.schedule, as_of);
        let penal = engine.penal_interest(totals.total(), days_observed);
        if penal.is_positive() {
            if let Some(row) = self
                .schedule
                .iter_mut()
                .find(|row| row.due_date <= as_of && !row.is_settled())
            {
                row.charge_fee(penal);
                let number = row.installment_number;
                self.events.emit(Event::PenalInterestCharged {
                    account_id,
                    installment_number: number,
                    amount: penal,
                    overdue_base: totals.total(),
                });
            }
        }
    }

    /// verify aggregate invariants; `Fatal` on breach
    pub fn reconcile(&self) -> Result<()> {
        let account_id = self.account.account_id;
        if self.schedule.is_empty() {
            return Ok(());
        }

        // the schedule must conserve against the account's own principal
        // arithmetic, not against itself
        schedule::reconcile(&self.schedule, self.account.expected_schedule_principal(), account_id)?;

        let remaining: Money = self.schedule.iter().map(|row| row.remaining_principal()).sum();
        if remaining != self.account.principal_outstanding {
            return Err(LoanError::InvariantViolation {
                account_id,
                message: format!(
                    "principal outstanding {} does not match schedule remainder {}",
                    self.account.principal_outstanding, remaining
                ),
            });
        }

        for payment in &self.payments {
            let allocated: Money = self
                .allocations
                .iter()
                .filter(|a| a.payment_id == payment.payment_id)
                .map(|a| a.total())
                .sum();
            if allocated + payment.unallocated != payment.amount {
                return Err(LoanError::InvariantViolation {
                    account_id,
                    message: format!("payment {} does not conserve amount", payment.payment_id),
                });
            }
        }

        Ok(())
    }
}
