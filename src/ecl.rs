use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::LoanAccount;
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::events::Event;
use crate::loan::Loan;
use crate::types::{AccountId, EclStage};

/// month-end provision row: `ECL = EAD × PD × LGD`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclProvision {
    pub provision_id: Uuid,
    pub account_id: AccountId,
    pub as_of: NaiveDate,
    pub stage: EclStage,
    pub ead: Money,
    pub pd: Rate,
    pub lgd: Rate,
    pub ecl_amount: Money,
    pub opening_provision: Money,
    /// positive charge, negative release
    pub charge: Money,
    pub closing_provision: Money,
    pub timestamp: DateTime<Utc>,
}

/// stage transition record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EclStaging {
    pub staging_id: Uuid,
    pub account_id: AccountId,
    pub as_of: NaiveDate,
    pub previous_stage: EclStage,
    pub new_stage: EclStage,
    pub reason: String,
}

/// portfolio roll-up by stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: EclStage,
    pub accounts: u32,
    pub total_ead: Money,
    pub total_provision: Money,
}

/// stage assignment; first matching rule wins
pub fn assign_stage(account: &LoanAccount, cfg: &EngineConfig) -> (EclStage, &'static str) {
    if account.is_written_off {
        (EclStage::Stage3, "written off")
    } else if account.npa.is_npa {
        (EclStage::Stage3, "npa")
    } else if account.dpd > cfg.npa_trigger_dpd {
        (EclStage::Stage3, "dpd beyond npa trigger")
    } else if account.is_restructured {
        (EclStage::Stage2, "restructured")
    } else if account.dpd > cfg.sma_boundaries.sma0 {
        (EclStage::Stage2, "dpd beyond sma-0")
    } else if account.sicr_flag {
        (EclStage::Stage2, "sicr flag")
    } else {
        (EclStage::Stage1, "performing")
    }
}

/// stage and provision one account; writes the provision row and a staging
/// row when the stage moved
pub fn provision(loan: &mut Loan, as_of: NaiveDate, now: DateTime<Utc>, cfg: &EngineConfig) -> (EclProvision, Option<EclStaging>) {
    let (stage, reason) = assign_stage(&loan.account, cfg);

    let staging = if stage != loan.account.ecl_stage {
        let staging = EclStaging {
            staging_id: Uuid::new_v4(),
            account_id: loan.account.account_id,
            as_of,
            previous_stage: loan.account.ecl_stage,
            new_stage: stage,
            reason: reason.to_string(),
        };
        loan.events.emit(Event::EclRestaged {
            account_id: loan.account.account_id,
            as_of,
            old_stage: loan.account.ecl_stage,
            new_stage: stage,
            reason: reason.to_string(),
        });
        Some(staging)
    } else {
        None
    };

    let ead = loan.account.principal_outstanding;
    let pd = match stage {
        EclStage::Stage1 => loan.product.pd_lgd.pd_12m,
        EclStage::Stage2 => loan.product.pd_lgd.pd_lifetime,
        EclStage::Stage3 => Rate::ONE,
    };
    let lgd = loan.product.lgd();
    let ecl_amount = Money::from_decimal(ead.as_decimal() * pd.as_decimal() * lgd.as_decimal());

    let opening = loan.account.last_provision;
    let charge = ecl_amount - opening;
    loan.account.ecl_stage = stage;
    loan.account.last_provision = ecl_amount;

    loan.events.emit(Event::ProvisionPosted {
        account_id: loan.account.account_id,
        as_of,
        stage,
        ecl_amount,
        charge,
    });

    let row = EclProvision {
        provision_id: Uuid::new_v4(),
        account_id: loan.account.account_id,
        as_of,
        stage,
        ead,
        pd,
        lgd,
        ecl_amount,
        opening_provision: opening,
        charge,
        closing_provision: ecl_amount,
        timestamp: now,
    };
    (row, staging)
}

/// roll provisions up by stage
pub fn summarize(provisions: &[EclProvision]) -> Vec<StageSummary> {
    let mut summaries: Vec<StageSummary> = [EclStage::Stage1, EclStage::Stage2, EclStage::Stage3]
        .into_iter()
        .map(|stage| StageSummary {
            stage,
            accounts: 0,
            total_ead: Money::ZERO,
            total_provision: Money::ZERO,
        })
        .collect();

    for row in provisions {
        let summary = summaries
            .iter_mut()
            .find(|s| s.stage == row.stage)
            .expect("all stages present");
        summary.accounts += 1;
        summary.total_ead += row.ead;
        summary.total_provision += row.closing_provision;
    }
    summaries
}
