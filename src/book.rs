use chrono::NaiveDate;
use dashmap::DashMap;
use hourglass_rs::SafeTimeProvider;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::account::{AccountOpening, LoanAccount};
use crate::batch::CancelToken;
use crate::calendar::BusinessCalendar;
use crate::colending::{
    self, CollectedComponents, LoanParticipation, PartnerLedger, PartnerLedgerEntry,
    ServicerArrangement, SplitContext,
};
use crate::config::{EngineConfig, ProductConfig};
use crate::decimal::Money;
use crate::delinquency::DelinquencySnapshot;
use crate::ecl::{EclProvision, EclStaging};
use crate::errors::{LoanError, Result};
use crate::events::Event;
use crate::fldg::{
    self, ClaimComponents, FldgArrangement, FldgRecovery, FldgTrigger, FldgUtilization,
};
use crate::interest::InterestAccrual;
use crate::lifecycle::{
    closure, prepayment, restructure, Prepayment, PrepaymentImpact, RestructureEvent,
    RestructureRequest, WriteOff, WriteOffComponents, WriteOffRecovery,
};
use crate::loan::{Loan, PaymentOutcome, PaymentRequest};
use crate::rates::BenchmarkSet;
use crate::schedule::GeneratedSchedule;
use crate::types::{AccountId, ClosureType, LoanStatus, PartnerRole, PrepaymentAction, RecoverySource};

/// the active book: account registry, per-account locks, shared read-mostly
/// reference data, and the derived ledgers
pub struct LoanBook {
    pub config: EngineConfig,
    time: SafeTimeProvider,
    accounts: DashMap<AccountId, Arc<Mutex<Loan>>>,
    calendars: RwLock<HashMap<String, BusinessCalendar>>,
    benchmarks: RwLock<BenchmarkSet>,
    participations: DashMap<AccountId, Vec<LoanParticipation>>,
    servicers: DashMap<AccountId, ServicerArrangement>,
    split_history: DashMap<Uuid, AccountId>,
    last_split_date: DashMap<AccountId, NaiveDate>,
    fldg_arrangements: DashMap<Uuid, Arc<Mutex<FldgArrangement>>>,
    fldg_links: DashMap<AccountId, Uuid>,
    utilizations: Mutex<Vec<FldgUtilization>>,
    fldg_recoveries: Mutex<Vec<FldgRecovery>>,
    write_off_index: DashMap<Uuid, AccountId>,
    ledger: Mutex<PartnerLedger>,
    provisions: Mutex<Vec<EclProvision>>,
    stagings: Mutex<Vec<EclStaging>>,
}

impl LoanBook {
    pub fn new(config: EngineConfig, time: SafeTimeProvider) -> Self {
        Self {
            config,
            time,
            accounts: DashMap::new(),
            calendars: RwLock::new(HashMap::new()),
            benchmarks: RwLock::new(BenchmarkSet::new()),
            participations: DashMap::new(),
            servicers: DashMap::new(),
            split_history: DashMap::new(),
            last_split_date: DashMap::new(),
            fldg_arrangements: DashMap::new(),
            fldg_links: DashMap::new(),
            utilizations: Mutex::new(Vec::new()),
            fldg_recoveries: Mutex::new(Vec::new()),
            write_off_index: DashMap::new(),
            ledger: Mutex::new(PartnerLedger::new()),
            provisions: Mutex::new(Vec::new()),
            stagings: Mutex::new(Vec::new()),
        }
    }

    // ---- reference data ------------------------------------------------

    pub fn register_calendar(&self, calendar: BusinessCalendar) {
        self.calendars.write().insert(calendar.calendar_id.clone(), calendar);
    }

    pub fn publish_benchmark(&self, benchmark: impl Into<String>, date: NaiveDate, rate: crate::decimal::Rate) {
        self.benchmarks.write().publish(benchmark, date, rate);
    }

    fn calendar_for(&self, calendar_id: &str) -> Result<BusinessCalendar> {
        self.calendars
            .read()
            .get(calendar_id)
            .cloned()
            .ok_or_else(|| LoanError::CalendarNotFound { calendar_id: calendar_id.to_string() })
    }

    // ---- registration --------------------------------------------------

    pub fn open_account(&self, opening: AccountOpening, product: ProductConfig) -> Result<AccountId> {
        self.calendar_for(&opening.calendar_id)?;
        let account_id = Uuid::new_v4();
        let account = LoanAccount::open(account_id, opening);
        self.accounts.insert(account_id, Arc::new(Mutex::new(Loan::new(account, product))));
        Ok(account_id)
    }

    pub fn register_participations(
        &self,
        account_id: AccountId,
        mut participations: Vec<LoanParticipation>,
        servicer: Option<ServicerArrangement>,
    ) -> Result<()> {
        colending::validate_shares(&participations)?;
        let principal = self.read_account(account_id, |loan| loan.account.principal_disbursed)?;
        for participation in participations.iter_mut() {
            participation.disbursed_total = principal.share(participation.share_percent);
        }
        self.participations.insert(account_id, participations);
        if let Some(servicer) = servicer {
            self.servicers.insert(account_id, servicer);
        }
        Ok(())
    }

    pub fn register_fldg(&self, arrangement: FldgArrangement, covered_accounts: Vec<AccountId>) {
        let arrangement_id = arrangement.arrangement_id;
        self.fldg_arrangements.insert(arrangement_id, Arc::new(Mutex::new(arrangement)));
        for account_id in covered_accounts {
            self.fldg_links.insert(account_id, arrangement_id);
        }
    }

    // ---- unit of work --------------------------------------------------

    /// run one operation under the per-account lock: the closure works on a
    /// copy, which replaces the stored aggregate only on success
    pub fn with_account<T>(
        &self,
        account_id: AccountId,
        cancel: Option<&CancelToken>,
        f: impl FnOnce(&mut Loan) -> Result<T>,
    ) -> Result<(T, Vec<Event>)> {
        if let Some(token) = cancel {
            token.check(self.time.now())?;
        }
        let cell = self
            .accounts
            .get(&account_id)
            .map(|entry| entry.value().clone())
            .ok_or(LoanError::AccountNotFound { account_id })?;
        let mut guard = cell.lock();
        let mut working = guard.clone();
        working.events.clear();

        let value = f(&mut working)?;
        if let Some(token) = cancel {
            // a cancelled unit of work must not commit
            token.check(self.time.now())?;
        }
        let events = working.events.take_events();
        *guard = working;
        tracing::debug!(%account_id, events = events.len(), "unit of work committed");
        Ok((value, events))
    }

    /// read-only access under the per-account lock
    pub fn read_account<T>(&self, account_id: AccountId, f: impl FnOnce(&Loan) -> T) -> Result<T> {
        let cell = self
            .accounts
            .get(&account_id)
            .map(|entry| entry.value().clone())
            .ok_or(LoanError::AccountNotFound { account_id })?;
        let guard = cell.lock();
        Ok(f(&guard))
    }

    pub fn active_account_ids(&self) -> Vec<AccountId> {
        self.accounts
            .iter()
            .filter(|entry| entry.value().lock().account.is_active())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn account_status(&self, account_id: AccountId) -> Result<LoanStatus> {
        self.read_account(account_id, |loan| loan.account.status)
    }

    // ---- service surface ----------------------------------------------

    /// pure: generate without persisting
    pub fn generate_schedule(&self, account_id: AccountId) -> Result<GeneratedSchedule> {
        let calendar_id = self.read_account(account_id, |loan| loan.account.calendar_id.clone())?;
        let calendar = self.calendar_for(&calendar_id)?;
        self.read_account(account_id, |loan| loan.generate_schedule(&calendar))?
    }

    pub fn persist_schedule(&self, account_id: AccountId) -> Result<()> {
        let calendar_id = self.read_account(account_id, |loan| loan.account.calendar_id.clone())?;
        let calendar = self.calendar_for(&calendar_id)?;
        self.with_account(account_id, None, |loan| loan.persist_schedule(&calendar))
            .map(|(value, _)| value)
    }

    pub fn apply_payment(&self, account_id: AccountId, request: PaymentRequest) -> Result<PaymentOutcome> {
        let cfg = self.config.clone();
        self.with_account(account_id, None, |loan| loan.apply_payment(request, &cfg))
            .map(|(value, _)| value)
    }

    pub fn accrue(&self, account_id: AccountId, as_of: NaiveDate) -> Result<InterestAccrual> {
        self.accrue_with_cancel(account_id, as_of, None)
    }

    pub(crate) fn accrue_with_cancel(
        &self,
        account_id: AccountId,
        as_of: NaiveDate,
        cancel: Option<&CancelToken>,
    ) -> Result<InterestAccrual> {
        let benchmarks = self.benchmarks.read().clone();
        self.with_account(account_id, cancel, |loan| loan.accrue(as_of, &benchmarks))
            .map(|(value, _)| value)
    }

    pub fn refresh_delinquency(&self, account_id: AccountId, as_of: NaiveDate) -> Result<DelinquencySnapshot> {
        self.refresh_delinquency_with_cancel(account_id, as_of, None)
    }

    pub(crate) fn refresh_delinquency_with_cancel(
        &self,
        account_id: AccountId,
        as_of: NaiveDate,
        cancel: Option<&CancelToken>,
    ) -> Result<DelinquencySnapshot> {
        let cfg = self.config.clone();
        self.with_account(account_id, cancel, |loan| loan.refresh_delinquency(as_of, &cfg))
            .map(|(value, _)| value)
    }

    pub fn restructure(&self, account_id: AccountId, request: RestructureRequest) -> Result<RestructureEvent> {
        let calendar_id = self.read_account(account_id, |loan| loan.account.calendar_id.clone())?;
        let calendar = self.calendar_for(&calendar_id)?;
        let now = self.time.now();
        self.with_account(account_id, None, |loan| restructure::apply(loan, request, &calendar, now))
            .map(|(value, _)| value)
    }

    /// pure what-if; repeated calls return identical values
    pub fn prepayment_impact(
        &self,
        account_id: AccountId,
        amount: Money,
        action: PrepaymentAction,
        as_of: NaiveDate,
    ) -> Result<PrepaymentImpact> {
        self.read_account(account_id, |loan| prepayment::impact(loan, amount, action, as_of))?
    }

    pub fn apply_prepayment(
        &self,
        account_id: AccountId,
        amount: Money,
        action: PrepaymentAction,
        paid_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Prepayment> {
        let calendar_id = self.read_account(account_id, |loan| loan.account.calendar_id.clone())?;
        let calendar = self.calendar_for(&calendar_id)?;
        let cfg = self.config.clone();
        self.with_account(account_id, None, |loan| {
            prepayment::apply(loan, amount, action, paid_at, &calendar, &cfg)
        })
        .map(|(value, _)| value)
    }

    pub fn close_account(
        &self,
        account_id: AccountId,
        closure_type: ClosureType,
        amount: Option<Money>,
        as_of: NaiveDate,
    ) -> Result<LoanStatus> {
        let now = self.time.now();
        self.with_account(account_id, None, |loan| {
            closure::close(loan, closure_type, amount, as_of, now)?;
            Ok(loan.account.status)
        })
        .map(|(value, _)| value)
    }

    pub fn write_off(
        &self,
        account_id: AccountId,
        components: Option<WriteOffComponents>,
        reason: String,
        as_of: NaiveDate,
    ) -> Result<WriteOff> {
        let now = self.time.now();
        let (write_off, _) = self.with_account(account_id, None, |loan| {
            closure::apply_write_off(loan, components, reason, as_of, now)
        })?;
        self.write_off_index.insert(write_off.write_off_id, account_id);
        Ok(write_off)
    }

    /// log a recovery; on a covered co-lent account the cash replenishes the
    /// FLDG pool first
    pub fn record_write_off_recovery(
        &self,
        write_off_id: Uuid,
        components: WriteOffComponents,
        source: RecoverySource,
    ) -> Result<WriteOffRecovery> {
        let account_id = self
            .write_off_index
            .get(&write_off_id)
            .map(|entry| *entry.value())
            .ok_or(LoanError::WriteOffNotFound { write_off_id })?;
        let now = self.time.now();
        let (recovery, _) = self.with_account(account_id, None, |loan| {
            closure::record_recovery(loan, write_off_id, components, source, now)
        })?;

        if let Some(utilization_id) = self.open_utilization_for(account_id) {
            self.fldg_recovery(utilization_id, components.total(), source)?;
        }
        Ok(recovery)
    }

    /// split an applied payment's collected components across partners
    pub fn split_collection(&self, account_id: AccountId, payment_id: Uuid) -> Result<Vec<PartnerLedgerEntry>> {
        if self.split_history.contains_key(&payment_id) {
            return Err(LoanError::ConflictingState {
                message: format!("payment {} already split", payment_id),
            });
        }
        let mut participations = self
            .participations
            .get(&account_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LoanError::ConflictingState {
                message: "account has no participations".to_string(),
            })?;
        let servicer = self.servicers.get(&account_id).map(|entry| entry.value().clone());

        let (components, ctx, posted_at) = self.read_account(account_id, |loan| {
            let payment = loan
                .payments
                .iter()
                .find(|p| p.payment_id == payment_id)
                .ok_or(LoanError::PaymentNotFound { payment_id })?;
            let components = CollectedComponents {
                principal: loan
                    .allocations
                    .iter()
                    .filter(|a| a.payment_id == payment_id)
                    .map(|a| a.principal)
                    .sum(),
                interest: loan
                    .allocations
                    .iter()
                    .filter(|a| a.payment_id == payment_id)
                    .map(|a| a.interest)
                    .sum(),
                fees: loan
                    .allocations
                    .iter()
                    .filter(|a| a.payment_id == payment_id)
                    .map(|a| a.fees)
                    .sum(),
            };
            let paid_on = payment.paid_at.date_naive();
            let since = self
                .last_split_date
                .get(&account_id)
                .map(|entry| *entry.value())
                .unwrap_or(loan.account.disbursement_date);
            let ctx = SplitContext {
                outstanding_principal: loan.account.principal_outstanding,
                borrower_rate: loan.account.current_rate,
                accrual_days: (paid_on - since).num_days().max(0) as u32,
            };
            Ok::<_, LoanError>((components, ctx, payment.paid_at))
        })??;

        let entries = {
            let mut ledger = self.ledger.lock();
            colending::split_collection(
                &mut participations,
                servicer.as_ref(),
                components,
                ctx,
                account_id,
                payment_id,
                posted_at,
                &mut ledger,
            )?
        };

        self.participations.insert(account_id, participations);
        self.split_history.insert(payment_id, account_id);
        self.last_split_date.insert(account_id, posted_at.date_naive());
        Ok(entries)
    }

    pub fn partner_balance(&self, partner_id: Uuid) -> Money {
        self.ledger.lock().balance(partner_id)
    }

    /// claim against the FLDG pool covering this account
    pub fn fldg_claim(&self, account_id: AccountId, arrangement_id: Uuid) -> Result<FldgUtilization> {
        let covering = self
            .fldg_links
            .get(&account_id)
            .map(|entry| *entry.value());
        if covering != Some(arrangement_id) {
            return Err(LoanError::ConflictingState {
                message: "account is not covered by this arrangement".to_string(),
            });
        }
        let cell = self
            .fldg_arrangements
            .get(&arrangement_id)
            .map(|entry| entry.value().clone())
            .ok_or(LoanError::ArrangementNotFound { arrangement_id })?;

        let (components, trigger) = self.read_account(account_id, |loan| {
            let trigger = if loan.account.is_written_off {
                Some(FldgTrigger::WriteOff)
            } else if loan.account.npa.is_npa {
                Some(FldgTrigger::NpaMarked)
            } else if loan.account.dpd >= cell.lock().trigger_dpd {
                Some(FldgTrigger::DpdBreach)
            } else {
                None
            };
            let components = match loan.write_offs.last() {
                Some(write_off) => ClaimComponents {
                    principal: write_off.components.principal,
                    interest: write_off.components.interest,
                    fees: write_off.components.fees,
                },
                None => ClaimComponents {
                    principal: loan.account.principal_outstanding,
                    interest: loan.account.interest_outstanding,
                    fees: loan.account.fees_outstanding,
                },
            };
            (components, trigger)
        })?;
        let trigger = trigger.ok_or_else(|| LoanError::ConflictingState {
            message: "account has not breached the fldg trigger".to_string(),
        })?;

        let lender_share = self.lender_share_percent(account_id, &cell);
        let now = self.time.now();
        let utilization = {
            let mut arrangement = cell.lock();
            fldg::claim(&mut arrangement, account_id, components, lender_share, trigger, now)?
        };
        self.utilizations.lock().push(utilization.clone());
        Ok(utilization)
    }

    /// recovery on a utilization; replenishes the pool per the arrangement
    pub fn fldg_recovery(
        &self,
        utilization_id: Uuid,
        amount: Money,
        source: RecoverySource,
    ) -> Result<FldgRecovery> {
        let mut utilizations = self.utilizations.lock();
        let utilization = utilizations
            .iter_mut()
            .find(|u| u.utilization_id == utilization_id)
            .ok_or(LoanError::UtilizationNotFound { utilization_id })?;
        let cell = self
            .fldg_arrangements
            .get(&utilization.arrangement_id)
            .map(|entry| entry.value().clone())
            .ok_or(LoanError::ArrangementNotFound { arrangement_id: utilization.arrangement_id })?;

        let lender_share = self.lender_share_percent(utilization.account_id, &cell);
        let now = self.time.now();
        let recovery = {
            let mut arrangement = cell.lock();
            fldg::recover(&mut arrangement, utilization, amount, lender_share, source, now)?
        };
        self.fldg_recoveries.lock().push(recovery.clone());
        Ok(recovery)
    }

    pub fn fldg_balance(&self, arrangement_id: Uuid) -> Result<Money> {
        self.fldg_arrangements
            .get(&arrangement_id)
            .map(|entry| entry.value().lock().current_balance)
            .ok_or(LoanError::ArrangementNotFound { arrangement_id })
    }

    fn open_utilization_for(&self, account_id: AccountId) -> Option<Uuid> {
        self.utilizations
            .lock()
            .iter()
            .find(|u| u.account_id == account_id && u.recovered < u.approved)
            .map(|u| u.utilization_id)
    }

    fn lender_share_percent(&self, account_id: AccountId, cell: &Arc<Mutex<FldgArrangement>>) -> Decimal {
        let lender_id = cell.lock().lender_id;
        self.participations
            .get(&account_id)
            .and_then(|entry| {
                entry
                    .value()
                    .iter()
                    .find(|p| p.partner_id == lender_id && p.role == PartnerRole::Lender)
                    .map(|p| p.share_percent)
            })
            .unwrap_or(dec!(100.00))
    }

    pub(crate) fn record_provision(&self, provision: EclProvision, staging: Option<EclStaging>) {
        self.provisions.lock().push(provision);
        if let Some(staging) = staging {
            self.stagings.lock().push(staging);
        }
    }

    pub fn provisions(&self) -> Vec<EclProvision> {
        self.provisions.lock().clone()
    }

    pub fn stagings(&self) -> Vec<EclStaging> {
        self.stagings.lock().clone()
    }

    pub fn time(&self) -> &SafeTimeProvider {
        &self.time
    }
}
