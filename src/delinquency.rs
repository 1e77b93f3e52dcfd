use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::SmaBoundaries;
use crate::decimal::Money;
use crate::schedule::Installment;
use crate::types::{AccountId, DelinquencyBucket, NpaCategory};

/// daily delinquency snapshot for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelinquencySnapshot {
    pub account_id: AccountId,
    pub as_of: NaiveDate,
    pub dpd: u32,
    pub bucket: DelinquencyBucket,
    pub is_npa: bool,
    pub npa_category: Option<NpaCategory>,
    pub overdue_principal: Money,
    pub overdue_interest: Money,
    pub overdue_fees: Money,
    pub oldest_due_date: Option<NaiveDate>,
    pub missed_installments: u32,
}

/// overdue component totals across the schedule as of a date
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OverdueTotals {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
    pub oldest_due_date: Option<NaiveDate>,
    pub missed_installments: u32,
}

impl OverdueTotals {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.fees
    }
}

/// whole-day count from the oldest unpaid due date to the as-of date
pub fn days_past_due(schedule: &[Installment], as_of: NaiveDate) -> u32 {
    overdue_totals(schedule, as_of)
        .oldest_due_date
        .map(|due| (as_of - due).num_days().max(0) as u32)
        .unwrap_or(0)
}

/// walk the schedule for overdue rows (due on or before as-of, not settled)
pub fn overdue_totals(schedule: &[Installment], as_of: NaiveDate) -> OverdueTotals {
    let mut totals = OverdueTotals::default();
    for row in schedule {
        if row.due_date > as_of || row.is_settled() {
            continue;
        }
        totals.principal += row.remaining_principal();
        totals.interest += row.remaining_interest();
        totals.fees += row.remaining_fees();
        totals.missed_installments += 1;
        if totals.oldest_due_date.is_none() {
            totals.oldest_due_date = Some(row.due_date);
        }
    }
    totals
}

/// bucket classification from DPD and the configured boundaries
pub fn bucket_for(dpd: u32, boundaries: &SmaBoundaries) -> DelinquencyBucket {
    if dpd == 0 {
        DelinquencyBucket::Current
    } else if dpd <= boundaries.sma0 {
        DelinquencyBucket::Sma0
    } else if dpd <= boundaries.sma1 {
        DelinquencyBucket::Sma1
    } else if dpd <= boundaries.sma2 {
        DelinquencyBucket::Sma2
    } else {
        match npa_category_for(dpd) {
            NpaCategory::Substandard => DelinquencyBucket::NpaSubstandard,
            NpaCategory::Doubtful => DelinquencyBucket::NpaDoubtful,
            NpaCategory::Loss => DelinquencyBucket::NpaLoss,
        }
    }
}

/// NPA sub-classification by asset age
pub fn npa_category_for(dpd: u32) -> NpaCategory {
    if dpd <= 365 {
        NpaCategory::Substandard
    } else if dpd <= 1095 {
        NpaCategory::Doubtful
    } else {
        NpaCategory::Loss
    }
}

/// sticky NPA state: the flag set on breach stays up until full cure
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NpaState {
    pub is_npa: bool,
    pub npa_date: Option<NaiveDate>,
    pub category: Option<NpaCategory>,
}

/// transition produced by one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpaTransition {
    None,
    Marked(NpaCategory),
    Cured,
}

impl NpaState {
    /// observe the DPD as of a date; partial cures never clear the flag
    pub fn observe(&mut self, dpd: u32, as_of: NaiveDate, trigger_dpd: u32) -> NpaTransition {
        if self.is_npa {
            if dpd == 0 {
                self.is_npa = false;
                self.npa_date = None;
                self.category = None;
                return NpaTransition::Cured;
            }
            // the category may only worsen while the flag is up
            if dpd > trigger_dpd {
                let observed = npa_category_for(dpd);
                if self.category.map(|current| observed > current).unwrap_or(true) {
                    self.category = Some(observed);
                }
            }
            return NpaTransition::None;
        }

        if dpd > trigger_dpd {
            let category = npa_category_for(dpd);
            self.is_npa = true;
            self.npa_date = Some(as_of);
            self.category = Some(category);
            return NpaTransition::Marked(category);
        }

        NpaTransition::None
    }
}
