pub mod closure;
pub mod prepayment;
pub mod restructure;

pub use closure::{WriteOff, WriteOffComponents, WriteOffRecovery};
pub use prepayment::{Prepayment, PrepaymentImpact};
pub use restructure::{RestructureEvent, RestructureRequest, RestructureStatus, RestructureType};
