use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::decimal::Rate;
use crate::errors::{LoanError, Result};

/// provenance of an account's effective rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RateBasis {
    Fixed(Rate),
    Floating {
        benchmark: String,
        spread: Rate,
        floor: Option<Rate>,
        cap: Option<Rate>,
    },
}

impl RateBasis {
    pub fn is_floating(&self) -> bool {
        matches!(self, RateBasis::Floating { .. })
    }
}

/// dated publication history for one benchmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkCurve {
    points: BTreeMap<NaiveDate, Rate>,
}

impl BenchmarkCurve {
    pub fn new() -> Self {
        Self { points: BTreeMap::new() }
    }

    pub fn publish(&mut self, date: NaiveDate, rate: Rate) {
        self.points.insert(date, rate);
    }

    /// value published on the date, falling back to the latest strictly
    /// earlier publication
    pub fn value_on_or_before(&self, as_of: NaiveDate) -> Option<Rate> {
        self.points.range(..=as_of).next_back().map(|(_, r)| *r)
    }
}

/// read-mostly set of benchmark curves, cached per process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkSet {
    curves: HashMap<String, BenchmarkCurve>,
}

impl BenchmarkSet {
    pub fn new() -> Self {
        Self { curves: HashMap::new() }
    }

    pub fn publish(&mut self, benchmark: impl Into<String>, date: NaiveDate, rate: Rate) {
        self.curves.entry(benchmark.into()).or_default().publish(date, rate);
    }

    /// resolve the effective rate for a basis as of a date:
    /// `max(floor, min(cap, benchmark + spread))`
    pub fn resolve(&self, basis: &RateBasis, as_of: NaiveDate) -> Result<Rate> {
        match basis {
            RateBasis::Fixed(rate) => Ok(*rate),
            RateBasis::Floating { benchmark, spread, floor, cap } => {
                let base = self
                    .curves
                    .get(benchmark)
                    .and_then(|curve| curve.value_on_or_before(as_of))
                    .ok_or_else(|| LoanError::BenchmarkUnavailable {
                        benchmark: benchmark.clone(),
                        as_of,
                    })?;
                let mut effective = base + *spread;
                if let Some(cap) = cap {
                    effective = effective.min(*cap);
                }
                if let Some(floor) = floor {
                    effective = effective.max(*floor);
                }
                Ok(effective)
            }
        }
    }
}
