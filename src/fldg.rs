use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::types::{AccountId, RecoverySource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FldgType {
    FirstLoss,
    SecondLoss,
}

/// what happens to recoveries on a utilized arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryRouting {
    /// lender-share recoveries replenish the pool first, remainder to lender
    ReplenishFirst,
    /// everything flows to the lender
    DirectToLender,
}

/// what pushed the account into a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FldgTrigger {
    DpdBreach,
    NpaMarked,
    WriteOff,
}

/// first-loss default guarantee pool between an originator and a lender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FldgArrangement {
    pub arrangement_id: Uuid,
    pub originator_id: Uuid,
    pub lender_id: Uuid,
    pub fldg_type: FldgType,
    /// guaranteed portfolio principal the percentage applies to
    pub portfolio_base: Money,
    pub cover_percent: Rate,
    pub absolute_cap: Money,
    pub covers_principal: bool,
    pub covers_interest: bool,
    pub covers_fees: bool,
    pub trigger_dpd: u32,
    /// first-loss tranche absorbed before a second-loss pool pays
    pub first_loss_threshold: Option<Money>,
    pub routing: RecoveryRouting,
    pub current_balance: Money,
    pub total_utilized: Money,
    pub total_recovered: Money,
}

impl FldgArrangement {
    pub fn new(
        originator_id: Uuid,
        lender_id: Uuid,
        fldg_type: FldgType,
        portfolio_base: Money,
        cover_percent: Rate,
        absolute_cap: Money,
    ) -> Self {
        let mut arrangement = Self {
            arrangement_id: Uuid::new_v4(),
            originator_id,
            lender_id,
            fldg_type,
            portfolio_base,
            cover_percent,
            absolute_cap,
            covers_principal: true,
            covers_interest: true,
            covers_fees: false,
            trigger_dpd: 90,
            first_loss_threshold: None,
            routing: RecoveryRouting::ReplenishFirst,
            current_balance: Money::ZERO,
            total_utilized: Money::ZERO,
            total_recovered: Money::ZERO,
        };
        arrangement.current_balance = arrangement.effective_limit();
        arrangement
    }

    /// `min(portfolio × percent, absolute cap)`
    pub fn effective_limit(&self) -> Money {
        Money::from_decimal(self.portfolio_base.as_decimal() * self.cover_percent.as_decimal())
            .min(self.absolute_cap)
    }

    /// `current_balance = effective_limit − total_utilized + total_recovered`
    pub fn check_balance_invariant(&self) -> Result<()> {
        let expected = self.effective_limit() - self.total_utilized + self.total_recovered;
        if self.current_balance != expected
            || self.current_balance.is_negative()
            || self.current_balance > self.effective_limit()
        {
            return Err(LoanError::InvariantViolation {
                account_id: self.arrangement_id,
                message: format!(
                    "fldg balance {} breaks invariant (expected {})",
                    self.current_balance, expected
                ),
            });
        }
        Ok(())
    }
}

/// covered loss components for a claim
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClaimComponents {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
}

/// immutable utilization record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FldgUtilization {
    pub utilization_id: Uuid,
    pub arrangement_id: Uuid,
    pub account_id: AccountId,
    pub trigger: FldgTrigger,
    pub claimed: Money,
    pub approved: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub recovered: Money,
    pub timestamp: DateTime<Utc>,
}

/// immutable recovery record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FldgRecovery {
    pub recovery_id: Uuid,
    pub utilization_id: Uuid,
    pub amount: Money,
    pub replenished: Money,
    pub to_lender: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub source: RecoverySource,
    pub timestamp: DateTime<Utc>,
}

/// claim against the pool; partial approval when the balance cannot cover
/// the full claim, `FldgExhausted` when nothing is left
pub fn claim(
    arrangement: &mut FldgArrangement,
    account_id: AccountId,
    components: ClaimComponents,
    lender_share_percent: Decimal,
    trigger: FldgTrigger,
    now: DateTime<Utc>,
) -> Result<FldgUtilization> {
    let mut covered = Money::ZERO;
    if arrangement.covers_principal {
        covered += components.principal;
    }
    if arrangement.covers_interest {
        covered += components.interest;
    }
    if arrangement.covers_fees {
        covered += components.fees;
    }
    // a second-loss pool pays only above the first-loss tranche
    if arrangement.fldg_type == FldgType::SecondLoss {
        if let Some(threshold) = arrangement.first_loss_threshold {
            covered = (covered - threshold).max(Money::ZERO);
        }
    }
    let claimed = covered.share(lender_share_percent);
    if !claimed.is_positive() {
        return Err(LoanError::InvalidInput {
            message: "claim has no covered components".to_string(),
        });
    }
    if arrangement.current_balance.is_zero() {
        return Err(LoanError::FldgExhausted { arrangement_id: arrangement.arrangement_id });
    }

    let balance_before = arrangement.current_balance;
    let approved = claimed.min(balance_before);
    arrangement.current_balance -= approved;
    arrangement.total_utilized += approved;
    arrangement.check_balance_invariant()?;

    Ok(FldgUtilization {
        utilization_id: Uuid::new_v4(),
        arrangement_id: arrangement.arrangement_id,
        account_id,
        trigger,
        claimed,
        approved,
        balance_before,
        balance_after: arrangement.current_balance,
        recovered: Money::ZERO,
        timestamp: now,
    })
}

/// route a recovery on a utilized account: under `ReplenishFirst` the
/// lender-share portion refills the pool up to the approved amount, the
/// remainder flows to the lender
pub fn recover(
    arrangement: &mut FldgArrangement,
    utilization: &mut FldgUtilization,
    amount: Money,
    lender_share_percent: Decimal,
    source: RecoverySource,
    now: DateTime<Utc>,
) -> Result<FldgRecovery> {
    if utilization.arrangement_id != arrangement.arrangement_id {
        return Err(LoanError::ConflictingState {
            message: "utilization does not belong to this arrangement".to_string(),
        });
    }
    if !amount.is_positive() {
        return Err(LoanError::InvalidInput {
            message: "recovery requires a positive amount".to_string(),
        });
    }

    let balance_before = arrangement.current_balance;
    let (replenished, to_lender) = match arrangement.routing {
        RecoveryRouting::DirectToLender => (Money::ZERO, amount),
        RecoveryRouting::ReplenishFirst => {
            let headroom = utilization.approved - utilization.recovered;
            let replenished = amount.share(lender_share_percent).min(headroom);
            (replenished, amount - replenished)
        }
    };

    arrangement.current_balance += replenished;
    arrangement.total_recovered += replenished;
    utilization.recovered += replenished;
    arrangement.check_balance_invariant()?;

    Ok(FldgRecovery {
        recovery_id: Uuid::new_v4(),
        utilization_id: utilization.utilization_id,
        amount,
        replenished,
        to_lender,
        balance_before,
        balance_after: arrangement.current_balance,
        source,
        timestamp: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap()
    }

    fn arrangement() -> FldgArrangement {
        // 10% of a 50 lakh portfolio, capped at 5 lakh
        FldgArrangement::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            FldgType::FirstLoss,
            Money::from_major(5_000_000),
            Rate::from_decimal(dec!(0.10)),
            Money::from_major(500_000),
        )
    }

    #[test]
    fn test_effective_limit_and_opening_balance() {
        let a = arrangement();
        assert_eq!(a.effective_limit(), Money::from_major(500_000));
        assert_eq!(a.current_balance, Money::from_major(500_000));
        a.check_balance_invariant().unwrap();
    }

    #[test]
    fn test_claim_covers_principal_and_interest_only() {
        let mut a = arrangement();
        let utilization = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(100_000),
                interest: Money::from_major(5_000),
                fees: Money::from_major(200),
            },
            dec!(80.00),
            FldgTrigger::WriteOff,
            now(),
        )
        .unwrap();

        // 0.8 * (100000 + 5000) = 84000; fees are not covered
        assert_eq!(utilization.claimed, Money::from_major(84_000));
        assert_eq!(utilization.approved, Money::from_major(84_000));
        assert_eq!(utilization.balance_after, Money::from_major(416_000));
        assert_eq!(a.total_utilized, Money::from_major(84_000));
        a.check_balance_invariant().unwrap();
    }

    #[test]
    fn test_recovery_replenishes_then_overflows_to_lender() {
        let mut a = arrangement();
        let mut utilization = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(100_000),
                interest: Money::from_major(5_000),
                fees: Money::from_major(200),
            },
            dec!(80.00),
            FldgTrigger::WriteOff,
            now(),
        )
        .unwrap();

        let recovery = recover(
            &mut a,
            &mut utilization,
            Money::from_major(50_000),
            dec!(80.00),
            RecoverySource::Collection,
            now(),
        )
        .unwrap();

        // lender share 40000 replenishes; the remaining 10000 goes to the lender
        assert_eq!(recovery.replenished, Money::from_major(40_000));
        assert_eq!(recovery.to_lender, Money::from_major(10_000));
        assert_eq!(a.current_balance, Money::from_major(456_000));
        assert_eq!(utilization.recovered, Money::from_major(40_000));
        a.check_balance_invariant().unwrap();
    }

    #[test]
    fn test_recovery_caps_at_approved_amount() {
        let mut a = arrangement();
        let mut utilization = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(10_000),
                interest: Money::ZERO,
                fees: Money::ZERO,
            },
            dec!(100.00),
            FldgTrigger::DpdBreach,
            now(),
        )
        .unwrap();
        assert_eq!(utilization.approved, Money::from_major(10_000));

        let recovery = recover(
            &mut a,
            &mut utilization,
            Money::from_major(25_000),
            dec!(100.00),
            RecoverySource::Legal,
            now(),
        )
        .unwrap();
        assert_eq!(recovery.replenished, Money::from_major(10_000));
        assert_eq!(recovery.to_lender, Money::from_major(15_000));
        assert_eq!(a.current_balance, a.effective_limit());
    }

    #[test]
    fn test_partial_approval_and_exhaustion() {
        let mut a = arrangement();
        a.current_balance = Money::from_major(50_000);
        a.total_utilized = Money::from_major(450_000);

        let utilization = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(100_000),
                interest: Money::ZERO,
                fees: Money::ZERO,
            },
            dec!(100.00),
            FldgTrigger::NpaMarked,
            now(),
        )
        .unwrap();
        assert_eq!(utilization.claimed, Money::from_major(100_000));
        assert_eq!(utilization.approved, Money::from_major(50_000));
        assert_eq!(a.current_balance, Money::ZERO);

        let err = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(1_000),
                interest: Money::ZERO,
                fees: Money::ZERO,
            },
            dec!(100.00),
            FldgTrigger::NpaMarked,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, LoanError::FldgExhausted { .. }));
    }

    #[test]
    fn test_second_loss_absorbs_first_tranche() {
        let mut a = arrangement();
        a.fldg_type = FldgType::SecondLoss;
        a.first_loss_threshold = Some(Money::from_major(60_000));

        let utilization = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(100_000),
                interest: Money::ZERO,
                fees: Money::ZERO,
            },
            dec!(100.00),
            FldgTrigger::WriteOff,
            now(),
        )
        .unwrap();
        assert_eq!(utilization.claimed, Money::from_major(40_000));

        // a loss inside the first tranche yields nothing to claim
        let err = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(50_000),
                interest: Money::ZERO,
                fees: Money::ZERO,
            },
            dec!(100.00),
            FldgTrigger::WriteOff,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, LoanError::InvalidInput { .. }));
    }

    #[test]
    fn test_direct_to_lender_routing() {
        let mut a = arrangement();
        a.routing = RecoveryRouting::DirectToLender;
        let mut utilization = claim(
            &mut a,
            Uuid::new_v4(),
            ClaimComponents {
                principal: Money::from_major(10_000),
                interest: Money::ZERO,
                fees: Money::ZERO,
            },
            dec!(100.00),
            FldgTrigger::DpdBreach,
            now(),
        )
        .unwrap();

        let recovery = recover(
            &mut a,
            &mut utilization,
            Money::from_major(5_000),
            dec!(100.00),
            RecoverySource::Collection,
            now(),
        )
        .unwrap();
        assert_eq!(recovery.replenished, Money::ZERO);
        assert_eq!(recovery.to_lender, Money::from_major(5_000));
    }
}
