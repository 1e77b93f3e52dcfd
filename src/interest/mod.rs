pub mod accrual;
pub mod penalty;

pub use accrual::{AccrualEngine, AccrualStatus, InterestAccrual, PrincipalHistory};
pub use penalty::PenaltyEngine;
