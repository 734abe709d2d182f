use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use educe::Educe;
use parse_display::Display;
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, RngCore};
use rand_distr::{Exp, LogNormal, Normal, Poisson};
use rand_seeder::{Seeder, SipRng};

use crate::types::Duration;
use crate::utils::prelude::*;

/// Seed used when the configuration does not provide one
pub const DEFAULT_SEED: &str = "stripy zebra";

/// A cloneable handle on the single generator of a run.
///
/// Every stage of a run draws from the same generator, in call order.
#[derive(Debug, Clone)]
pub struct SharedRng(Rc<RefCell<SipRng>>);

impl SharedRng {
    pub fn new(rng: SipRng) -> Self {
        Self(Rc::new(RefCell::new(rng)))
    }

    pub fn from_seed(seed: &str) -> Self {
        Self::new(Seeder::from(seed).make_rng())
    }
}

impl RngCore for SharedRng {
    fn next_u32(&mut self) -> u32 {
        self.0.borrow_mut().next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.borrow_mut().next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.borrow_mut().fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.0.borrow_mut().try_fill_bytes(dest)
    }
}

#[derive(Debug, Clone, PartialEq, Display, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
pub enum RandomVariable {
    #[display("Constant({value})")]
    Constant { value: f64 },
    /// Cycles through a fixed list of values
    #[display("Sequence({values:?})")]
    Sequence { values: Vec<f64> },
    #[display("Uniform({low}, {high})")]
    Uniform { low: f64, high: f64 },
    #[display("Normal({mean}, {std_dev})")]
    Normal { mean: f64, std_dev: f64 },
    #[display("LogNormal({mean}, {std_dev})")]
    LogNormal { mean: f64, std_dev: f64 },
    #[display("Poisson({lambda})")]
    Poisson { lambda: f64 },
    /// `shift + scale * Exp(lambda)`
    #[display("Exp({lambda})")]
    Exp {
        lambda: f64,
        #[serde(default)]
        shift: f64,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
}

fn unit_scale() -> f64 {
    1.0
}

fn invalid(dist: &RandomVariable, reason: impl fmt::Display) -> Error {
    Error::InvalidDistribution(format!("{}: {}", dist, reason))
}

impl RandomVariable {
    /// exponential with the given rate, the usual M/M/c building block
    pub fn exp(lambda: f64) -> Self {
        RandomVariable::Exp {
            lambda,
            shift: 0.0,
            scale: 1.0,
        }
    }

    pub fn constant(value: f64) -> Self {
        RandomVariable::Constant { value }
    }

    pub fn sequence(values: impl IntoIterator<Item = f64>) -> Self {
        RandomVariable::Sequence {
            values: values.into_iter().collect(),
        }
    }

    /// Reject parameters that can not produce non-negative durations
    pub fn validate(&self) -> Result<()> {
        let finite = |v: &f64| v.is_finite();
        match self {
            RandomVariable::Constant { value } => {
                if !finite(value) || *value < 0.0 {
                    return Err(invalid(self, "value must be finite and non-negative"));
                }
            }
            RandomVariable::Sequence { values } => {
                if values.is_empty() {
                    return Err(invalid(self, "sequence is empty"));
                }
                if values.iter().any(|v| !finite(v) || *v < 0.0) {
                    return Err(invalid(self, "values must be finite and non-negative"));
                }
            }
            RandomVariable::Uniform { low, high } => {
                if !finite(low) || !finite(high) || low >= high {
                    return Err(invalid(self, "requires finite low < high"));
                }
            }
            RandomVariable::Normal { mean, std_dev } | RandomVariable::LogNormal { mean, std_dev } => {
                if !finite(mean) || !finite(std_dev) || *std_dev < 0.0 {
                    return Err(invalid(self, "requires finite mean and std_dev >= 0"));
                }
            }
            RandomVariable::Poisson { lambda } => {
                if !finite(lambda) || *lambda <= 0.0 {
                    return Err(invalid(self, "lambda must be positive"));
                }
            }
            RandomVariable::Exp { lambda, shift, scale } => {
                if !finite(lambda) || *lambda <= 0.0 {
                    return Err(invalid(self, "lambda must be positive"));
                }
                if !finite(shift) || !finite(scale) || *scale < 0.0 {
                    return Err(invalid(self, "shift and scale must be finite, scale >= 0"));
                }
            }
        }
        Ok(())
    }

    /// An endless stream of durations, negative samples are clamped to zero
    pub fn sample_iter(&self, rng: impl Rng + 'static) -> Result<Sampler> {
        self.validate()?;
        let iter: Sampler = match self {
            RandomVariable::Constant { value } => Box::new(std::iter::repeat(*value).map(Duration)),
            RandomVariable::Sequence { values } => Box::new(values.clone().into_iter().cycle().map(Duration)),
            RandomVariable::Uniform { low, high } => Box::new(
                Uniform::new(*low, *high)
                    .sample_iter(rng)
                    .map(|v: f64| Duration(v)),
            ),
            RandomVariable::Normal { mean, std_dev } => Box::new(
                Normal::new(*mean, *std_dev)
                    .map_err(|e| invalid(self, e))?
                    .sample_iter(rng)
                    .map(|v: f64| Duration(v.max(0.0))),
            ),
            RandomVariable::LogNormal { mean, std_dev } => Box::new(
                LogNormal::new(*mean, *std_dev)
                    .map_err(|e| invalid(self, e))?
                    .sample_iter(rng)
                    .map(|v: f64| Duration(v)),
            ),
            RandomVariable::Poisson { lambda } => Box::new(
                Poisson::new(*lambda)
                    .map_err(|e| invalid(self, e))?
                    .sample_iter(rng)
                    .map(|v: f64| Duration(v)),
            ),
            RandomVariable::Exp { lambda, shift, scale } => {
                let shift = *shift;
                let scale = *scale;
                Box::new(
                    Exp::new(*lambda)
                        .map_err(|e| invalid(self, e))?
                        .sample_iter(rng)
                        .map(move |s: f64| Duration((s * scale + shift).max(0.0))),
                )
            }
        };
        Ok(iter)
    }
}

pub type Sampler = Box<dyn Iterator<Item = Duration>>;

/// Interarrival and service durations of one stage
#[derive(Educe)]
#[educe(Debug)]
pub struct VariateSource {
    arrival_dist: Option<RandomVariable>,
    service_dist: RandomVariable,
    #[educe(Debug(ignore))]
    arrival: Option<Sampler>,
    #[educe(Debug(ignore))]
    service: Sampler,
}

impl VariateSource {
    pub fn new(arrival: Option<&RandomVariable>, service: &RandomVariable, rng: &SharedRng) -> Result<Self> {
        Ok(Self {
            arrival_dist: arrival.cloned(),
            service_dist: service.clone(),
            arrival: arrival.map(|d| d.sample_iter(rng.clone())).transpose()?,
            service: service.sample_iter(rng.clone())?,
        })
    }

    pub fn has_arrivals(&self) -> bool {
        self.arrival.is_some()
    }

    /// `count` interarrival gaps, drawn in one go
    pub fn arrivals(&mut self, count: usize) -> Result<Vec<Duration>> {
        let arrival = self
            .arrival
            .as_mut()
            .ok_or_else(|| Error::invalid_parameter("arrival", "no arrival distribution configured"))?;
        Ok(arrival.take(count).collect())
    }

    /// one service duration
    pub fn service(&mut self) -> Duration {
        self.service.next().unwrap_or_default()
    }
}
