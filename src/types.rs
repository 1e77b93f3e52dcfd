use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Rate;

/// unique identifier for a loan account
pub type AccountId = Uuid;

/// loan account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    Active,
    Closed,
    WrittenOff,
}

/// repayment schedule row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pending,
    PartiallyPaid,
    Paid,
    /// nothing falls due on this row (moratorium)
    Skipped,
}

/// payment frequency; the variant set is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFrequency {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl PaymentFrequency {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            PaymentFrequency::Monthly => 12,
            PaymentFrequency::Quarterly => 4,
            PaymentFrequency::SemiAnnual => 2,
            PaymentFrequency::Annual => 1,
        }
    }

    pub fn months_per_period(&self) -> u32 {
        12 / self.periods_per_year()
    }
}

/// treatment of interest over a moratorium window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoratoriumTreatment {
    /// capitalize accrued interest into principal before amortization resumes
    Capitalize,
    /// accrue during the window and collect it over the remaining installments
    CollectAfter,
    /// waive interest for the window
    Waive,
}

/// schedule shape; a closed set of tagged variants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScheduleType {
    /// equated installments covering interest and principal
    Emi,
    /// interest every period, full principal with the last installment
    InterestOnly,
    /// everything collected at the terminal period
    Bullet,
    /// installment stepped up by a fixed percentage at each boundary
    StepUp { step_percent: Rate, step_every: u32 },
    /// installment stepped down by a fixed percentage at each boundary
    StepDown { step_percent: Rate, step_every: u32 },
    /// regular installments sized so a final fraction of principal remains
    Balloon { final_fraction: Rate },
    /// leading principal holiday, then equated installments
    Moratorium {
        periods: u32,
        treatment: MoratoriumTreatment,
    },
}

/// delinquency bucket derived from DPD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelinquencyBucket {
    Current,
    Sma0,
    Sma1,
    Sma2,
    NpaSubstandard,
    NpaDoubtful,
    NpaLoss,
}

impl DelinquencyBucket {
    pub fn is_npa(&self) -> bool {
        matches!(
            self,
            DelinquencyBucket::NpaSubstandard | DelinquencyBucket::NpaDoubtful | DelinquencyBucket::NpaLoss
        )
    }
}

/// NPA sub-classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NpaCategory {
    Substandard,
    Doubtful,
    Loss,
}

/// IFRS-9 expected credit loss stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EclStage {
    Stage1,
    Stage2,
    Stage3,
}

/// closure type for a loan account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureType {
    /// outstanding reached zero through contractual collections
    Normal,
    /// negotiated one-time settlement accepted as full discharge
    Settlement,
    /// balance written off to loss
    WriteOff,
}

/// prepayment handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepaymentAction {
    /// keep the remaining tenure, lower the installment
    ReduceEmi,
    /// keep the installment, shorten the tenure
    ReduceTenure,
    /// pay off in full and close
    Foreclosure,
}

/// inbound payment channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentChannel {
    Neft,
    Rtgs,
    Imps,
    Upi,
    Nach,
    Cheque,
    Cash,
}

/// source of a post-write-off or FLDG recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoverySource {
    Collection,
    Legal,
    Settlement,
    AssetSale,
}

/// role a partner plays on a co-lent account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerRole {
    Lender,
    Originator,
}
