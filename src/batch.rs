use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::book::LoanBook;
use crate::ecl::{self, StageSummary};
use crate::errors::{LoanError, Result};
use crate::types::AccountId;

/// cancellation signal with an optional deadline; checked between accounts
/// and before every commit
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<DateTime<Utc>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: DateTime<Utc>) -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), deadline: Some(deadline) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, now: DateTime<Utc>) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map(|deadline| now >= deadline).unwrap_or(false)
    }

    pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
        if self.is_cancelled(now) {
            Err(LoanError::Cancelled { message: "unit of work cancelled".to_string() })
        } else {
            Ok(())
        }
    }
}

/// one account's failure inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub account_id: AccountId,
    pub kind: String,
    pub message: String,
}

/// aggregate outcome of a batch orchestration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub processed: u32,
    pub succeeded: u32,
    pub failed: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn failed_count(&self) -> u32 {
        self.failed.len() as u32
    }
}

/// end-of-day orchestration outcome
#[derive(Debug, Clone)]
pub struct EodResult {
    pub as_of: NaiveDate,
    pub accrual: BatchResult,
    pub delinquency: BatchResult,
    /// present only on a month-end run
    pub ecl: Option<BatchResult>,
    pub portfolio: Option<Vec<StageSummary>>,
}

enum AccountOutcome {
    Succeeded,
    Failed(BatchFailure),
    Skipped,
}

impl LoanBook {
    fn fan_out(
        &self,
        label: &str,
        cancel: Option<&CancelToken>,
        op: impl Fn(AccountId) -> Result<()> + Sync,
    ) -> Result<BatchResult> {
        let ids = self.active_account_ids();
        let fatal: parking_lot::Mutex<Option<LoanError>> = parking_lot::Mutex::new(None);
        let stop = AtomicBool::new(false);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_pool_size)
            .build()
            .map_err(|e| LoanError::Transient { message: format!("worker pool: {}", e) })?;

        let outcomes: Vec<AccountOutcome> = pool.install(|| {
            use rayon::prelude::*;
            ids.par_iter()
                .map(|&account_id| {
                    if stop.load(Ordering::SeqCst) {
                        return AccountOutcome::Skipped;
                    }
                    if let Some(token) = cancel {
                        if token.is_cancelled(self.time().now()) {
                            stop.store(true, Ordering::SeqCst);
                            return AccountOutcome::Skipped;
                        }
                    }
                    match op(account_id) {
                        Ok(()) => AccountOutcome::Succeeded,
                        Err(err) if err.is_fatal() => {
                            stop.store(true, Ordering::SeqCst);
                            *fatal.lock() = Some(err);
                            AccountOutcome::Skipped
                        }
                        Err(err) => {
                            tracing::warn!(%account_id, batch = label, error = %err, "account failed in batch");
                            AccountOutcome::Failed(BatchFailure {
                                account_id,
                                kind: format!("{:?}", err.kind()),
                                message: err.to_string(),
                            })
                        }
                    }
                })
                .collect()
        });

        if let Some(err) = fatal.into_inner() {
            return Err(err);
        }

        let mut result = BatchResult::default();
        for outcome in outcomes {
            match outcome {
                AccountOutcome::Succeeded => {
                    result.processed += 1;
                    result.succeeded += 1;
                }
                AccountOutcome::Failed(failure) => {
                    result.processed += 1;
                    result.failed.push(failure);
                }
                AccountOutcome::Skipped => {}
            }
        }
        tracing::info!(
            batch = label,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed_count(),
            "batch complete"
        );
        Ok(result)
    }

    /// accrue every active account to the as-of date
    pub fn run_accrual_batch(&self, as_of: NaiveDate, cancel: Option<&CancelToken>) -> Result<BatchResult> {
        self.fan_out("accrual", cancel, |account_id| {
            self.accrue_with_cancel(account_id, as_of, cancel).map(|_| ())
        })
    }

    /// refresh delinquency for every active account
    pub fn run_delinquency_batch(&self, as_of: NaiveDate, cancel: Option<&CancelToken>) -> Result<BatchResult> {
        self.fan_out("delinquency", cancel, |account_id| {
            self.refresh_delinquency_with_cancel(account_id, as_of, cancel).map(|_| ())
        })
    }

    /// month-end ECL staging and provisioning over the active book
    pub fn run_monthly_ecl(
        &self,
        as_of: NaiveDate,
        cancel: Option<&CancelToken>,
    ) -> Result<(BatchResult, Vec<StageSummary>)> {
        let run_provisions: parking_lot::Mutex<Vec<crate::ecl::EclProvision>> =
            parking_lot::Mutex::new(Vec::new());
        let cfg = self.config.clone();

        let result = self.fan_out("monthly-ecl", cancel, |account_id| {
            let now = self.time().now();
            let (row, staging) = self
                .with_account(account_id, cancel, |loan| Ok(ecl::provision(loan, as_of, now, &cfg)))
                .map(|(value, _)| value)?;
            run_provisions.lock().push(row.clone());
            self.record_provision(row, staging);
            Ok(())
        })?;

        let summary = ecl::summarize(&run_provisions.into_inner());
        Ok((result, summary))
    }

    /// end-of-day orchestration: accrual, delinquency, and on month-end the
    /// ECL batch; each account failure is recorded, not propagated
    pub fn run_eod(&self, as_of: NaiveDate, cancel: Option<&CancelToken>) -> Result<EodResult> {
        let accrual = self.run_accrual_batch(as_of, cancel)?;
        let delinquency = self.run_delinquency_batch(as_of, cancel)?;

        let (ecl_result, portfolio) = if is_month_end(as_of) {
            let (result, summary) = self.run_monthly_ecl(as_of, cancel)?;
            (Some(result), Some(summary))
        } else {
            (None, None)
        };

        Ok(EodResult {
            as_of,
            accrual,
            delinquency,
            ecl: ecl_result,
            portfolio,
        })
    }
}

pub fn is_month_end(date: NaiveDate) -> bool {
    (date + Duration::days(1)).month() != date.month()
}
