use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::LoanStatus;

/// error classification surfaced to callers and batch orchestrators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    ConflictingState,
    IdempotencyReplay,
    BenchmarkUnavailable,
    FldgExhausted,
    Transient,
    Fatal,
}

#[derive(Error, Debug)]
pub enum LoanError {
    #[error("invalid schedule input: {message}")]
    InvalidScheduleInput { message: String },

    #[error("invalid payment amount: {amount}")]
    InvalidAmount { amount: Money },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("participation shares sum to {total}, expected 100.00")]
    ParticipationSharesMismatch { total: Decimal },

    #[error("account not found: {account_id}")]
    AccountNotFound { account_id: Uuid },

    #[error("arrangement not found: {arrangement_id}")]
    ArrangementNotFound { arrangement_id: Uuid },

    #[error("utilization not found: {utilization_id}")]
    UtilizationNotFound { utilization_id: Uuid },

    #[error("write-off not found: {write_off_id}")]
    WriteOffNotFound { write_off_id: Uuid },

    #[error("payment not found: {payment_id}")]
    PaymentNotFound { payment_id: Uuid },

    #[error("calendar not found: {calendar_id}")]
    CalendarNotFound { calendar_id: String },

    #[error("no schedule exists for account {account_id}")]
    ScheduleNotFound { account_id: Uuid },

    #[error("schedule already exists for account {account_id}")]
    ScheduleAlreadyExists { account_id: Uuid },

    #[error("account not open: status is {status:?}")]
    AccountNotOpen { status: LoanStatus },

    #[error("conflicting state: {message}")]
    ConflictingState { message: String },

    #[error("payment reference {external_ref} already applied with amount {prior}, resubmitted with {submitted}")]
    IdempotencyMismatch {
        external_ref: String,
        prior: Money,
        submitted: Money,
    },

    #[error("benchmark {benchmark} has no publication on or before {as_of}")]
    BenchmarkUnavailable { benchmark: String, as_of: NaiveDate },

    #[error("fldg balance exhausted for arrangement {arrangement_id}")]
    FldgExhausted { arrangement_id: Uuid },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("operation cancelled: {message}")]
    Cancelled { message: String },

    #[error("invariant violation on account {account_id}: {message}")]
    InvariantViolation { account_id: Uuid, message: String },
}

impl LoanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoanError::InvalidScheduleInput { .. }
            | LoanError::InvalidAmount { .. }
            | LoanError::InvalidInput { .. }
            | LoanError::ParticipationSharesMismatch { .. } => ErrorKind::InvalidInput,
            LoanError::AccountNotFound { .. }
            | LoanError::ArrangementNotFound { .. }
            | LoanError::UtilizationNotFound { .. }
            | LoanError::WriteOffNotFound { .. }
            | LoanError::PaymentNotFound { .. }
            | LoanError::CalendarNotFound { .. }
            | LoanError::ScheduleNotFound { .. } => ErrorKind::NotFound,
            LoanError::ScheduleAlreadyExists { .. }
            | LoanError::AccountNotOpen { .. }
            | LoanError::ConflictingState { .. } => ErrorKind::ConflictingState,
            LoanError::IdempotencyMismatch { .. } => ErrorKind::IdempotencyReplay,
            LoanError::BenchmarkUnavailable { .. } => ErrorKind::BenchmarkUnavailable,
            LoanError::FldgExhausted { .. } => ErrorKind::FldgExhausted,
            LoanError::Transient { .. } | LoanError::Cancelled { .. } => ErrorKind::Transient,
            LoanError::InvariantViolation { .. } => ErrorKind::Fatal,
        }
    }

    /// fatal errors abort batch orchestration; everything else is recorded
    /// per account and the batch continues
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = LoanError::InvalidAmount { amount: Money::ZERO };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = LoanError::AccountNotOpen { status: LoanStatus::Closed };
        assert_eq!(err.kind(), ErrorKind::ConflictingState);

        let err = LoanError::InvariantViolation {
            account_id: Uuid::nil(),
            message: "schedule sums mismatch".into(),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display_carries_context() {
        let err = LoanError::BenchmarkUnavailable {
            benchmark: "MCLR-1Y".into(),
            as_of: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        };
        assert!(err.to_string().contains("MCLR-1Y"));
        assert!(err.to_string().contains("2025-04-01"));
    }
}
