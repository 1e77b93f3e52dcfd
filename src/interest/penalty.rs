use rust_decimal::Decimal;

use crate::config::ProductConfig;
use crate::decimal::{Money, Rate};

/// engine for penal charges on overdue installments
pub struct PenaltyEngine {
    late_fee: Option<Money>,
    penal_rate: Option<Rate>,
    grace_days: u32,
}

impl PenaltyEngine {
    pub fn for_product(product: &ProductConfig) -> Self {
        Self {
            late_fee: product.late_fee,
            penal_rate: product.penal_rate,
            grace_days: product.penal_grace_days,
        }
    }

    /// one-time late fee, charged when a row first turns overdue past grace
    pub fn late_fee(&self, days_overdue: u32, already_charged: bool) -> Money {
        if already_charged || days_overdue <= self.grace_days {
            return Money::ZERO;
        }
        self.late_fee.unwrap_or(Money::ZERO)
    }

    /// penal interest on the overdue total for the days being observed
    pub fn penal_interest(&self, overdue_total: Money, days: u32) -> Money {
        let Some(rate) = self.penal_rate else {
            return Money::ZERO;
        };
        if days == 0 || !overdue_total.is_positive() {
            return Money::ZERO;
        }
        let daily = rate.as_decimal() / Decimal::from(365);
        Money::from_decimal(overdue_total.as_decimal() * daily * Decimal::from(days))
    }
}
