//! The differential-privacy budget accountant.
//!
//! Each election carries one (epsilon, delta) budget. Every released
//! statistic spends epsilon under basic composition: deductions are additive
//! across queries and never reset, delta is fixed per election and not
//! consumed. A query that would overdraw the budget is rejected outright,
//! never truncated. The check-then-deduct sequence is atomic, so two
//! concurrent queries can never both pass a check that only one can honor.

use crate::*;
use indexmap::IndexMap;
use log::debug;
use rand_distr::{Distribution, Normal};
use std::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_EPSILON_BUDGET: f64 = 2.0;
pub const DEFAULT_DELTA: f64 = 2e-6;
pub const DEFAULT_QUERY_EPSILON: f64 = 0.5;
pub const DEFAULT_QUERY_DELTA: f64 = 1e-6;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RemainingBudget {
    pub epsilon: f64,
    pub delta: f64,
}

/// A noised analytics answer together with its privacy accounting
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DpAnswer {
    pub answer: IndexMap<String, u64>,
    pub noise_mechanism: String,
    pub epsilon_spent: f64,
    pub delta: f64,
    pub remaining_budget: RemainingBudget,
    pub composition_method: String,
}

/// Per-election privacy budget accountant
pub struct PrivacyAccountant {
    election_id: Uuid,
    delta: f64,
    epsilon_remaining: Mutex<f64>,
}

impl PrivacyAccountant {
    pub fn new(election_id: Uuid, epsilon_budget: f64, delta: f64) -> Result<Self, Error> {
        if !epsilon_budget.is_finite() || epsilon_budget <= 0.0 {
            return Err(Error::ParameterOutOfRange("epsilon budget must be positive"));
        }
        if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
            return Err(Error::ParameterOutOfRange("delta must be in (0, 1)"));
        }

        Ok(PrivacyAccountant {
            election_id,
            delta,
            epsilon_remaining: Mutex::new(epsilon_budget),
        })
    }

    pub fn with_defaults(election_id: Uuid) -> Self {
        PrivacyAccountant {
            election_id,
            delta: DEFAULT_DELTA,
            epsilon_remaining: Mutex::new(DEFAULT_EPSILON_BUDGET),
        }
    }

    pub fn election_id(&self) -> Uuid {
        self.election_id
    }

    pub fn remaining(&self) -> f64 {
        *self
            .epsilon_remaining
            .lock()
            .expect("privacy budget lock poisoned")
    }

    /// Release bucketed counts under the Gaussian mechanism.
    ///
    /// Rejects with `BudgetExceeded` if `epsilon` exceeds the remaining
    /// budget; otherwise deducts it, noises each bucket independently with
    /// `sigma = sqrt(2 * ln(1.25 / delta)) / epsilon`, and floors results at
    /// zero.
    pub fn query(
        &self,
        buckets: &IndexMap<String, u64>,
        epsilon: f64,
        delta: f64,
    ) -> Result<DpAnswer, Error> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(Error::ParameterOutOfRange("query epsilon must be positive"));
        }
        if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
            return Err(Error::ParameterOutOfRange("query delta must be in (0, 1)"));
        }

        let sigma = (2.0 * (1.25 / delta).ln()).sqrt() / epsilon;
        let gaussian = Normal::new(0.0, sigma)
            .map_err(|_| Error::ParameterOutOfRange("noise calibration failed"))?;

        // Atomic check-then-deduct
        let remaining_after = {
            let mut remaining = self
                .epsilon_remaining
                .lock()
                .expect("privacy budget lock poisoned");
            if epsilon > *remaining {
                return Err(Error::BudgetExceeded {
                    requested: epsilon,
                    remaining: *remaining,
                });
            }
            *remaining -= epsilon;
            *remaining
        };

        let mut rng = rand::thread_rng();
        let mut answer = IndexMap::with_capacity(buckets.len());
        for (bucket, count) in buckets {
            let noise = gaussian.sample(&mut rng);
            let noised = (*count as f64 + noise).round().max(0.0) as u64;
            answer.insert(bucket.clone(), noised);
        }

        debug!(
            "released {} buckets for election {} (epsilon {} spent, {} remaining)",
            answer.len(),
            self.election_id,
            epsilon,
            remaining_after
        );

        Ok(DpAnswer {
            answer,
            noise_mechanism: "gaussian".to_string(),
            epsilon_spent: epsilon,
            delta,
            remaining_budget: RemainingBudget {
                epsilon: remaining_after,
                delta: self.delta,
            },
            composition_method: "basic".to_string(),
        })
    }
}
