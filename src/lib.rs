pub mod account;
pub mod batch;
pub mod book;
pub mod calendar;
pub mod colending;
pub mod config;
pub mod daycount;
pub mod decimal;
pub mod delinquency;
pub mod ecl;
pub mod errors;
pub mod events;
pub mod fldg;
pub mod interest;
pub mod lifecycle;
pub mod loan;
pub mod payments;
pub mod rates;
pub mod schedule;
pub mod types;

// re-export key types
pub use account::{AccountOpening, LoanAccount};
pub use batch::{BatchFailure, BatchResult, CancelToken, EodResult};
pub use book::LoanBook;
pub use calendar::{BusinessCalendar, BusinessDayMode};
pub use colending::{
    CollectedComponents, LoanParticipation, PartnerLedger, PartnerLedgerEntry, ServicerArrangement,
    ServicerFeeBase,
};
pub use config::{EngineConfig, ProductConfig, SmaBoundaries};
pub use daycount::DayCountConvention;
pub use decimal::{Money, Rate};
pub use delinquency::{DelinquencySnapshot, NpaState};
pub use ecl::{EclProvision, EclStaging, StageSummary};
pub use errors::{ErrorKind, LoanError, Result};
pub use events::{Event, EventStore};
pub use fldg::{FldgArrangement, FldgRecovery, FldgType, FldgUtilization, RecoveryRouting};
pub use interest::{AccrualEngine, InterestAccrual, PrincipalHistory};
pub use lifecycle::{
    Prepayment, PrepaymentImpact, RestructureEvent, RestructureRequest, RestructureType, WriteOff,
    WriteOffComponents, WriteOffRecovery,
};
pub use loan::{Loan, PaymentOutcome, PaymentRequest};
pub use payments::{Payment, PaymentAllocation, PaymentWaterfall, WaterfallPolicy};
pub use rates::{BenchmarkCurve, BenchmarkSet, RateBasis};
pub use schedule::{GeneratedSchedule, Installment, ScheduleSpec};
pub use types::{
    AccountId, ClosureType, DelinquencyBucket, EclStage, InstallmentStatus, LoanStatus,
    MoratoriumTreatment, NpaCategory, PaymentChannel, PaymentFrequency, PrepaymentAction,
    ScheduleType,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
