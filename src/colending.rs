use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LoanError, Result};
use crate::types::{AccountId, PartnerRole};

/// pro-rata ownership of an account's cash flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanParticipation {
    pub participation_id: Uuid,
    pub account_id: AccountId,
    pub partner_id: Uuid,
    pub partner_name: String,
    pub role: PartnerRole,
    /// percentage points, e.g. 80.00
    pub share_percent: Decimal,
    /// partner-level yield; excess spread over it is withheld for the servicer
    pub lender_yield: Option<Rate>,
    pub disbursed_total: Money,
    pub collected_total: Money,
}

impl LoanParticipation {
    pub fn new(
        account_id: AccountId,
        partner_id: Uuid,
        partner_name: impl Into<String>,
        role: PartnerRole,
        share_percent: Decimal,
    ) -> Self {
        Self {
            participation_id: Uuid::new_v4(),
            account_id,
            partner_id,
            partner_name: partner_name.into(),
            role,
            share_percent,
            lender_yield: None,
            disbursed_total: Money::ZERO,
            collected_total: Money::ZERO,
        }
    }

    pub fn with_lender_yield(mut self, lender_yield: Rate) -> Self {
        self.lender_yield = Some(lender_yield);
        self
    }
}

/// shares must sum to 100.00 within a tolerance of 0.01
pub fn validate_shares(participations: &[LoanParticipation]) -> Result<()> {
    let total: Decimal = participations.iter().map(|p| p.share_percent).sum();
    if (total - dec!(100)).abs() > dec!(0.01) {
        return Err(LoanError::ParticipationSharesMismatch { total });
    }
    Ok(())
}

/// base on which the servicer fee accrues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServicerFeeBase {
    OutstandingPrincipal,
    LenderShareOutstanding,
}

/// servicer fee terms for a co-lent account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicerArrangement {
    pub servicer_partner_id: Uuid,
    pub fee_rate: Rate,
    pub fee_base: ServicerFeeBase,
}

/// ledger entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryType {
    PrincipalShare,
    InterestShare,
    FeesShare,
    ServicerFee,
    ExcessSpread,
}

/// partner ledger posting; running balance satisfies
/// `entry_n = entry_{n-1} + signed_amount`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerLedgerEntry {
    pub entry_id: Uuid,
    pub account_id: AccountId,
    pub partner_id: Uuid,
    pub payment_id: Uuid,
    pub entry_type: LedgerEntryType,
    pub signed_amount: Money,
    pub running_balance: Money,
    pub posted_at: DateTime<Utc>,
}

/// per-partner running balances plus the posting history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerLedger {
    balances: HashMap<Uuid, Money>,
    entries: Vec<PartnerLedgerEntry>,
}

impl PartnerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, partner_id: Uuid) -> Money {
        self.balances.get(&partner_id).copied().unwrap_or(Money::ZERO)
    }

    pub fn entries(&self) -> &[PartnerLedgerEntry] {
        &self.entries
    }

    fn post(
        &mut self,
        account_id: AccountId,
        partner_id: Uuid,
        payment_id: Uuid,
        entry_type: LedgerEntryType,
        signed_amount: Money,
        posted_at: DateTime<Utc>,
    ) -> PartnerLedgerEntry {
        let balance = self.balance(partner_id) + signed_amount;
        self.balances.insert(partner_id, balance);
        let entry = PartnerLedgerEntry {
            entry_id: Uuid::new_v4(),
            account_id,
            partner_id,
            payment_id,
            entry_type,
            signed_amount,
            running_balance: balance,
            posted_at,
        };
        self.entries.push(entry.clone());
        entry
    }
}

/// collected component amounts being split
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectedComponents {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
}

impl CollectedComponents {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees
    }
}

/// context for servicer withholdings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitContext {
    pub outstanding_principal: Money,
    pub borrower_rate: Rate,
    /// days the servicer fee accrues over for this collection
    pub accrual_days: u32,
}

/// split a collection across participations, withholding the servicer fee
/// and excess spread from lender interest
pub fn split_collection(
    participations: &mut [LoanParticipation],
    servicer: Option<&ServicerArrangement>,
    components: CollectedComponents,
    ctx: SplitContext,
    account_id: AccountId,
    payment_id: Uuid,
    posted_at: DateTime<Utc>,
    ledger: &mut PartnerLedger,
) -> Result<Vec<PartnerLedgerEntry>> {
    validate_shares(participations)?;
    if !components.total().is_positive() {
        return Err(LoanError::InvalidInput {
            message: "nothing collected to split".to_string(),
        });
    }

    let principal_shares = apportion(components.principal, participations);
    let interest_shares = apportion(components.interest, participations);
    let fees_shares = apportion(components.fees, participations);

    // servicer withholdings come out of lender interest
    let lender_share_total: Decimal = participations
        .iter()
        .filter(|p| p.role == PartnerRole::Lender)
        .map(|p| p.share_percent)
        .sum();
    let servicer_fee_total = servicer
        .map(|arrangement| {
            let base = match arrangement.fee_base {
                ServicerFeeBase::OutstandingPrincipal => ctx.outstanding_principal,
                ServicerFeeBase::LenderShareOutstanding => {
                    ctx.outstanding_principal.share(lender_share_total)
                }
            };
            Money::from_decimal(
                base.as_decimal() * arrangement.fee_rate.as_decimal()
                    * Decimal::from(ctx.accrual_days)
                    / dec!(365),
            )
        })
        .unwrap_or(Money::ZERO);

    let mut entries = Vec::new();
    let mut servicer_income = Money::ZERO;
    let mut excess_spread_total = Money::ZERO;

    for (idx, participation) in participations.iter_mut().enumerate() {
        let principal = principal_shares[idx];
        let mut interest = interest_shares[idx];
        let fees = fees_shares[idx];

        if participation.role == PartnerRole::Lender {
            // fee withheld pro rata across lenders
            let fee_portion = if lender_share_total.is_zero() {
                Money::ZERO
            } else {
                Money::from_decimal(
                    servicer_fee_total.as_decimal() * participation.share_percent / lender_share_total,
                )
            };
            let excess = match participation.lender_yield {
                Some(lender_yield) if !ctx.borrower_rate.is_zero() => Money::from_decimal(
                    interest.as_decimal()
                        * (ctx.borrower_rate - lender_yield).as_decimal()
                        / ctx.borrower_rate.as_decimal(),
                ),
                _ => Money::ZERO,
            };
            servicer_income += fee_portion;
            excess_spread_total += excess;
            interest = interest - fee_portion - excess;
        }

        if principal.is_positive() {
            entries.push(ledger.post(
                account_id,
                participation.partner_id,
                payment_id,
                LedgerEntryType::PrincipalShare,
                principal,
                posted_at,
            ));
        }
        if !interest.is_zero() {
            entries.push(ledger.post(
                account_id,
                participation.partner_id,
                payment_id,
                LedgerEntryType::InterestShare,
                interest,
                posted_at,
            ));
        }
        if fees.is_positive() {
            entries.push(ledger.post(
                account_id,
                participation.partner_id,
                payment_id,
                LedgerEntryType::FeesShare,
                fees,
                posted_at,
            ));
        }
        participation.collected_total += principal + interest + fees;
    }

    if let Some(arrangement) = servicer {
        if servicer_income.is_positive() {
            entries.push(ledger.post(
                account_id,
                arrangement.servicer_partner_id,
                payment_id,
                LedgerEntryType::ServicerFee,
                servicer_income,
                posted_at,
            ));
        }
        if excess_spread_total.is_positive() {
            entries.push(ledger.post(
                account_id,
                arrangement.servicer_partner_id,
                payment_id,
                LedgerEntryType::ExcessSpread,
                excess_spread_total,
                posted_at,
            ));
        }
    }

    // conservation of collected cash across all postings
    let posted: Money = entries.iter().map(|e| e.signed_amount).sum();
    if posted != components.total() {
        return Err(LoanError::InvariantViolation {
            account_id,
            message: format!(
                "partner postings {} do not conserve collection {}",
                posted,
                components.total()
            ),
        });
    }

    Ok(entries)
}

/// split an amount by share percent, assigning the rounding residual to the
/// largest share
fn apportion(amount: Money, participations: &[LoanParticipation]) -> Vec<Money> {
    if participations.is_empty() {
        return Vec::new();
    }
    let mut shares: Vec<Money> = participations
        .iter()
        .map(|p| amount.share(p.share_percent))
        .collect();
    let assigned: Money = shares.iter().copied().sum();
    let residual = amount - assigned;
    if !residual.is_zero() {
        let largest = participations
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.share_percent)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        shares[largest] += residual;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn posted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn participants(account_id: AccountId) -> (Vec<LoanParticipation>, Uuid, Uuid) {
        let lender_id = Uuid::new_v4();
        let originator_id = Uuid::new_v4();
        let parts = vec![
            LoanParticipation::new(account_id, lender_id, "Bank", PartnerRole::Lender, dec!(80.00)),
            LoanParticipation::new(account_id, originator_id, "NBFC", PartnerRole::Originator, dec!(20.00)),
        ];
        (parts, lender_id, originator_id)
    }

    #[test]
    fn test_share_validation() {
        let account_id = Uuid::new_v4();
        let (mut parts, _, _) = participants(account_id);
        assert!(validate_shares(&parts).is_ok());

        parts[0].share_percent = dec!(70.00);
        let err = validate_shares(&parts).unwrap_err();
        assert!(matches!(err, LoanError::ParticipationSharesMismatch { .. }));
    }

    #[test]
    fn test_eighty_twenty_split_with_servicer_fee() {
        let account_id = Uuid::new_v4();
        let (mut parts, lender_id, originator_id) = participants(account_id);
        let servicer = ServicerArrangement {
            servicer_partner_id: originator_id,
            fee_rate: Rate::from_decimal(dec!(0.005)),
            fee_base: ServicerFeeBase::OutstandingPrincipal,
        };
        let mut ledger = PartnerLedger::new();

        let entries = split_collection(
            &mut parts,
            Some(&servicer),
            CollectedComponents {
                principal: Money::from_major(10_000),
                interest: Money::from_major(1_200),
                fees: Money::ZERO,
            },
            SplitContext {
                outstanding_principal: Money::from_major(100_000),
                borrower_rate: Rate::from_percentage(12),
                accrual_days: 30,
            },
            account_id,
            Uuid::new_v4(),
            posted_at(),
            &mut ledger,
        )
        .unwrap();

        let amount_for = |partner: Uuid, entry_type: LedgerEntryType| -> Money {
            entries
                .iter()
                .filter(|e| e.partner_id == partner && e.entry_type == entry_type)
                .map(|e| e.signed_amount)
                .sum()
        };

        assert_eq!(amount_for(lender_id, LedgerEntryType::PrincipalShare), Money::from_major(8_000));
        assert_eq!(amount_for(originator_id, LedgerEntryType::PrincipalShare), Money::from_major(2_000));
        // servicer fee 100000 * 0.005 * 30/365 = 41.10, withheld from lender interest
        assert_eq!(
            amount_for(lender_id, LedgerEntryType::InterestShare),
            Money::from_str_exact("918.90").unwrap()
        );
        assert_eq!(amount_for(originator_id, LedgerEntryType::InterestShare), Money::from_major(240));
        assert_eq!(
            amount_for(originator_id, LedgerEntryType::ServicerFee),
            Money::from_str_exact("41.10").unwrap()
        );

        // conservation: 8000 + 2000 + 918.90 + 240 + 41.10 = 11200
        let total: Money = entries.iter().map(|e| e.signed_amount).sum();
        assert_eq!(total, Money::from_major(11_200));
    }

    #[test]
    fn test_excess_spread_withholding() {
        let account_id = Uuid::new_v4();
        let (mut parts, lender_id, originator_id) = participants(account_id);
        parts[0] = parts[0].clone().with_lender_yield(Rate::from_percentage(9));
        let servicer = ServicerArrangement {
            servicer_partner_id: originator_id,
            fee_rate: Rate::ZERO,
            fee_base: ServicerFeeBase::OutstandingPrincipal,
        };
        let mut ledger = PartnerLedger::new();

        let entries = split_collection(
            &mut parts,
            Some(&servicer),
            CollectedComponents {
                principal: Money::ZERO,
                interest: Money::from_major(1_200),
                fees: Money::ZERO,
            },
            SplitContext {
                outstanding_principal: Money::from_major(100_000),
                borrower_rate: Rate::from_percentage(12),
                accrual_days: 30,
            },
            account_id,
            Uuid::new_v4(),
            posted_at(),
            &mut ledger,
        )
        .unwrap();

        // lender share 960; excess = 960 * (12 - 9)/12 = 240
        let lender_interest: Money = entries
            .iter()
            .filter(|e| e.partner_id == lender_id)
            .map(|e| e.signed_amount)
            .sum();
        assert_eq!(lender_interest, Money::from_major(720));
        let excess: Money = entries
            .iter()
            .filter(|e| e.entry_type == LedgerEntryType::ExcessSpread)
            .map(|e| e.signed_amount)
            .sum();
        assert_eq!(excess, Money::from_major(240));
    }

    #[test]
    fn test_running_balance_chain() {
        let account_id = Uuid::new_v4();
        let (mut parts, lender_id, _) = participants(account_id);
        let mut ledger = PartnerLedger::new();

        for _ in 0..3 {
            split_collection(
                &mut parts,
                None,
                CollectedComponents {
                    principal: Money::from_major(1_000),
                    interest: Money::from_major(100),
                    fees: Money::ZERO,
                },
                SplitContext {
                    outstanding_principal: Money::from_major(50_000),
                    borrower_rate: Rate::from_percentage(12),
                    accrual_days: 30,
                },
                account_id,
                Uuid::new_v4(),
                posted_at(),
                &mut ledger,
            )
            .unwrap();
        }

        let lender_entries: Vec<_> = ledger
            .entries()
            .iter()
            .filter(|e| e.partner_id == lender_id)
            .collect();
        let mut expected = Money::ZERO;
        for entry in &lender_entries {
            expected += entry.signed_amount;
            assert_eq!(entry.running_balance, expected);
        }
        assert_eq!(ledger.balance(lender_id), Money::from_major(2_640));
    }

    #[test]
    fn test_residual_lands_on_largest_share() {
        let account_id = Uuid::new_v4();
        let lender_id = Uuid::new_v4();
        let originator_id = Uuid::new_v4();
        let mut parts = vec![
            LoanParticipation::new(account_id, lender_id, "Bank", PartnerRole::Lender, dec!(66.67)),
            LoanParticipation::new(account_id, originator_id, "NBFC", PartnerRole::Originator, dec!(33.33)),
        ];
        let mut ledger = PartnerLedger::new();

        let entries = split_collection(
            &mut parts,
            None,
            CollectedComponents {
                principal: Money::from_str_exact("100.01").unwrap(),
                interest: Money::ZERO,
                fees: Money::ZERO,
            },
            SplitContext {
                outstanding_principal: Money::from_major(10_000),
                borrower_rate: Rate::from_percentage(12),
                accrual_days: 0,
            },
            account_id,
            Uuid::new_v4(),
            posted_at(),
            &mut ledger,
        )
        .unwrap();

        let total: Money = entries.iter().map(|e| e.signed_amount).sum();
        assert_eq!(total, Money::from_str_exact("100.01").unwrap());
    }
}
