use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::BusinessDayMode;
use crate::daycount::DayCountConvention;
use crate::decimal::{Money, Rate, MONEY_SCALE, RATE_SCALE};
use crate::payments::PaymentWaterfall;

/// SMA bucket boundaries in days past due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmaBoundaries {
    pub sma0: u32,
    pub sma1: u32,
    pub sma2: u32,
}

impl Default for SmaBoundaries {
    fn default() -> Self {
        Self { sma0: 30, sma1: 60, sma2: 90 }
    }
}

/// process-wide engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub day_count_default: DayCountConvention,
    pub business_day_mode: BusinessDayMode,
    pub rate_precision: u32,
    pub money_precision: u32,
    pub worker_pool_size: usize,
    pub npa_trigger_dpd: u32,
    pub sma_boundaries: SmaBoundaries,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            day_count_default: DayCountConvention::Act365,
            business_day_mode: BusinessDayMode::ModifiedFollowing,
            rate_precision: RATE_SCALE,
            money_precision: MONEY_SCALE,
            worker_pool_size: 8,
            npa_trigger_dpd: 90,
            sma_boundaries: SmaBoundaries::default(),
        }
    }
}

/// PD/LGD parameters for ECL provisioning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdLgdConfig {
    pub pd_12m: Rate,
    pub pd_lifetime: Rate,
    pub lgd_secured: Rate,
    pub lgd_unsecured: Rate,
}

/// product-level servicing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub product_id: Uuid,
    pub name: String,
    pub waterfall: PaymentWaterfall,
    /// charged once when an installment first turns overdue
    pub late_fee: Option<Money>,
    /// annual penal rate accrued daily on the overdue total
    pub penal_rate: Option<Rate>,
    pub penal_grace_days: u32,
    /// applied to prepaid principal unless waived
    pub prepayment_penalty_rate: Rate,
    pub secured: bool,
    pub pd_lgd: PdLgdConfig,
}

impl ProductConfig {
    /// unsecured term loan with the standard waterfall and no penal charges
    pub fn term_loan(name: impl Into<String>) -> Self {
        use rust_decimal_macros::dec;
        Self {
            product_id: Uuid::new_v4(),
            name: name.into(),
            waterfall: PaymentWaterfall::standard(),
            late_fee: None,
            penal_rate: None,
            penal_grace_days: 0,
            prepayment_penalty_rate: Rate::ZERO,
            secured: false,
            pd_lgd: PdLgdConfig {
                pd_12m: Rate::from_decimal(dec!(0.02)),
                pd_lifetime: Rate::from_decimal(dec!(0.08)),
                lgd_secured: Rate::from_decimal(dec!(0.35)),
                lgd_unsecured: Rate::from_decimal(dec!(0.65)),
            },
        }
    }

    /// secured term loan with late fees and a foreclosure penalty
    pub fn secured_term_loan(name: impl Into<String>) -> Self {
        use rust_decimal_macros::dec;
        Self {
            late_fee: Some(Money::from_major(500)),
            penal_grace_days: 3,
            prepayment_penalty_rate: Rate::from_decimal(dec!(0.02)),
            secured: true,
            ..Self::term_loan(name)
        }
    }

    /// lgd applicable under this product
    pub fn lgd(&self) -> Rate {
        if self.secured {
            self.pd_lgd.lgd_secured
        } else {
            self.pd_lgd.lgd_unsecured
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.worker_pool_size, 8);
        assert_eq!(cfg.npa_trigger_dpd, 90);
        assert_eq!(cfg.sma_boundaries, SmaBoundaries { sma0: 30, sma1: 60, sma2: 90 });
        assert_eq!(cfg.money_precision, 2);
        assert_eq!(cfg.rate_precision, 10);
    }

    #[test]
    fn test_product_lgd_selection() {
        let unsecured = ProductConfig::term_loan("PL");
        let secured = ProductConfig::secured_term_loan("LAP");
        assert_eq!(unsecured.lgd(), unsecured.pd_lgd.lgd_unsecured);
        assert_eq!(secured.lgd(), secured.pd_lgd.lgd_secured);
        assert!(secured.late_fee.is_some());
    }
}
