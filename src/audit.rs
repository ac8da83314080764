//! Risk-limiting audit planning and the Kaplan-Markov sequential test.
//!
//! An audit is planned from the reported per-candidate tallies: the diluted
//! margin determines the initial ballot-comparison sample size, and a seeded
//! sampling plan makes the draw reproducible by outside observers. Audit
//! rounds feed per-ballot taints into the Kaplan-Markov statistic until the
//! audit either concludes at the risk limit or escalates to a full hand
//! count.

use crate::*;
use chrono::{DateTime, Utc};
use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_RISK_LIMIT: f64 = 0.05;
pub const DEFAULT_MAX_SAMPLE: u64 = 1200;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Planned,
    InProgress,
    Concluded,
    Escalated,
}

/// One reported contest line, as certified before the audit
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportedTally {
    pub candidate_id: CandidateId,
    pub votes: u64,
}

/// A population stratum and its share of the sample
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Stratum {
    pub name: String,
    pub proportion: f64,
}

/// Seeded, reproducible ballot-sampling plan
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    pub strata: Vec<Stratum>,
    pub seed: u64,
}

impl SamplingPlan {
    pub fn single_stratum(seed: u64) -> Self {
        SamplingPlan {
            strata: vec![Stratum {
                name: "all".to_string(),
                proportion: 1.0,
            }],
            seed,
        }
    }

    /// Draw `count` ballot indices from `[0, universe)`. The draw is a pure
    /// function of the seed, so anyone holding the plan can replay it.
    pub fn draw_indices(&self, universe: u64, count: usize) -> Result<Vec<u64>, Error> {
        if universe == 0 {
            return Err(Error::ParameterOutOfRange("sampling universe is empty"));
        }
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        Ok((0..count).map(|_| rng.gen_range(0, universe)).collect())
    }

    fn validate(&self) -> Result<(), Error> {
        if self.strata.is_empty() {
            return Err(Error::ParameterOutOfRange("sampling plan has no strata"));
        }
        let total: f64 = self.strata.iter().map(|s| s.proportion).sum();
        if self.strata.iter().any(|s| s.proportion <= 0.0) || (total - 1.0).abs() > 1e-9 {
            return Err(Error::ParameterOutOfRange("stratum proportions must sum to 1"));
        }
        Ok(())
    }
}

/// A ballot-comparison risk-limiting audit and its running test state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Audit {
    pub audit_id: Uuid,
    pub election_id: Uuid,
    pub audit_type: String,
    pub reported: Vec<ReportedTally>,
    pub diluted_margin: f64,
    pub initial_sample_size: u64,
    pub sampling_plan: SamplingPlan,
    pub risk_limit_alpha: f64,
    pub test: String,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,

    /// Kaplan-Markov error inflation bound, `2 / diluted_margin`
    pub error_bound: f64,

    /// Running test statistic; the audit concludes when it reaches alpha
    pub statistic: f64,

    /// Ballots examined across all rounds so far
    pub examined: u64,
}

impl Audit {
    fn plan(
        election_id: Uuid,
        audit_type: &str,
        reported: Vec<ReportedTally>,
        risk_limit_alpha: f64,
        sampling_plan: SamplingPlan,
    ) -> Result<Audit, Error> {
        if !risk_limit_alpha.is_finite() || risk_limit_alpha <= 0.0 || risk_limit_alpha >= 1.0 {
            return Err(Error::ParameterOutOfRange("risk limit must be in (0, 1)"));
        }
        if reported.len() < 2 {
            return Err(Error::ParameterOutOfRange("audit needs at least two candidates"));
        }
        sampling_plan.validate()?;

        let total: u64 = reported.iter().map(|t| t.votes).sum();
        if total == 0 {
            return Err(Error::ParameterOutOfRange("reported tallies are all zero"));
        }

        let mut votes: Vec<u64> = reported.iter().map(|t| t.votes).collect();
        votes.sort_unstable_by(|a, b| b.cmp(a));
        let margin_votes = votes[0] - votes[1];
        if margin_votes == 0 {
            return Err(Error::ParameterOutOfRange(
                "reported contest is an exact tie; audit by full hand count",
            ));
        }

        let diluted_margin = margin_votes as f64 / total as f64;
        let raw = (-2.0 * risk_limit_alpha.ln() / (diluted_margin * diluted_margin)).ceil() as u64;
        let initial_sample_size = raw.min(DEFAULT_MAX_SAMPLE);

        Ok(Audit {
            audit_id: Uuid::new_v4(),
            election_id,
            audit_type: audit_type.to_string(),
            reported,
            diluted_margin,
            initial_sample_size,
            sampling_plan,
            risk_limit_alpha,
            test: "kaplan-markov".to_string(),
            status: AuditStatus::Planned,
            created_at: Utc::now(),
            error_bound: 2.0 / diluted_margin,
            statistic: 1.0,
            examined: 0,
        })
    }
}

/// Registry of audits, at most one per election
pub struct AuditPlanner {
    audits: Mutex<HashMap<Uuid, Audit>>,
}

impl Default for AuditPlanner {
    fn default() -> Self {
        AuditPlanner::new()
    }
}

impl AuditPlanner {
    pub fn new() -> Self {
        AuditPlanner {
            audits: Mutex::new(HashMap::new()),
        }
    }

    pub fn plan_audit(
        &self,
        election_id: Uuid,
        audit_type: &str,
        reported: Vec<ReportedTally>,
        risk_limit_alpha: f64,
        sampling_plan: SamplingPlan,
    ) -> Result<Audit, Error> {
        let audit = Audit::plan(election_id, audit_type, reported, risk_limit_alpha, sampling_plan)?;

        let mut audits = self.audits.lock().expect("audit registry lock poisoned");
        if audits.values().any(|a| a.election_id == election_id) {
            return Err(Error::DuplicateAudit(election_id));
        }
        info!(
            "planned {} audit {} for election {}: margin {:.4}, initial sample {}",
            audit.audit_type, audit.audit_id, election_id, audit.diluted_margin, audit.initial_sample_size
        );
        audits.insert(audit.audit_id, audit.clone());
        Ok(audit)
    }

    pub fn get(&self, audit_id: Uuid) -> Result<Audit, Error> {
        self.audits
            .lock()
            .expect("audit registry lock poisoned")
            .get(&audit_id)
            .cloned()
            .ok_or(Error::AuditNotFound(audit_id))
    }

    /// Feed one round of per-ballot taints into the sequential test.
    ///
    /// Each taint is the discrepancy found on an examined ballot divided by
    /// the error bound, so clean ballots carry taint zero. Returns the
    /// updated audit; once `Concluded` or `Escalated`, further rounds are
    /// rejected.
    pub fn record_round(&self, audit_id: Uuid, taints: &[f64]) -> Result<Audit, Error> {
        if taints.iter().any(|t| !t.is_finite() || *t < 0.0 || *t >= 1.0) {
            return Err(Error::ParameterOutOfRange("taint must be in [0, 1)"));
        }

        let mut audits = self.audits.lock().expect("audit registry lock poisoned");
        let audit = audits
            .get_mut(&audit_id)
            .ok_or(Error::AuditNotFound(audit_id))?;

        match audit.status {
            AuditStatus::Concluded | AuditStatus::Escalated => {
                return Err(Error::InvalidState("audit has already terminated"));
            }
            AuditStatus::Planned => audit.status = AuditStatus::InProgress,
            AuditStatus::InProgress => {}
        }

        let shrink = 1.0 - 1.0 / audit.error_bound;
        for taint in taints {
            audit.statistic *= shrink / (1.0 - taint);
        }
        audit.examined += taints.len() as u64;

        if audit.statistic <= audit.risk_limit_alpha {
            audit.status = AuditStatus::Concluded;
            info!(
                "audit {} concluded after {} ballots (statistic {:.6})",
                audit_id, audit.examined, audit.statistic
            );
        } else if audit.examined >= audit.initial_sample_size {
            audit.status = AuditStatus::Escalated;
            info!(
                "audit {} escalated to full hand count after {} ballots (statistic {:.6})",
                audit_id, audit.examined, audit.statistic
            );
        }

        Ok(audit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(top: u64, second: u64) -> Vec<ReportedTally> {
        vec![
            ReportedTally {
                candidate_id: 1,
                votes: top,
            },
            ReportedTally {
                candidate_id: 2,
                votes: second,
            },
        ]
    }

    #[test]
    fn tight_margin_sample_clamps_to_cap() {
        let planner = AuditPlanner::new();
        let audit = planner
            .plan_audit(
                Uuid::new_v4(),
                "ballot_comparison",
                reported(40_321, 39_997),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(7),
            )
            .unwrap();

        assert_eq!(audit.initial_sample_size, DEFAULT_MAX_SAMPLE);
        assert_eq!(audit.status, AuditStatus::Planned);
        assert!((audit.diluted_margin - 324.0 / 80_318.0).abs() < 1e-12);
    }

    #[test]
    fn wide_margin_needs_small_sample() {
        let planner = AuditPlanner::new();
        let audit = planner
            .plan_audit(
                Uuid::new_v4(),
                "ballot_comparison",
                reported(700, 300),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(7),
            )
            .unwrap();

        // margin 0.4: ceil(-2 ln 0.05 / 0.16) = 38
        assert_eq!(audit.initial_sample_size, 38);
    }

    #[test]
    fn clean_samples_conclude_the_audit() {
        let planner = AuditPlanner::new();
        let audit = planner
            .plan_audit(
                Uuid::new_v4(),
                "ballot_comparison",
                reported(700, 300),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(7),
            )
            .unwrap();

        // u = 5, so each clean ballot multiplies the statistic by 0.8;
        // 0.8^14 ~ 0.044 crosses the 0.05 limit
        let first = planner.record_round(audit.audit_id, &[0.0; 10]).unwrap();
        assert_eq!(first.status, AuditStatus::InProgress);

        let second = planner.record_round(audit.audit_id, &[0.0; 4]).unwrap();
        assert_eq!(second.status, AuditStatus::Concluded);
        assert_eq!(second.examined, 14);
        assert!(second.statistic <= DEFAULT_RISK_LIMIT);
    }

    #[test]
    fn sample_exhaustion_escalates() {
        let planner = AuditPlanner::new();
        let audit = planner
            .plan_audit(
                Uuid::new_v4(),
                "ballot_comparison",
                reported(700, 300),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(7),
            )
            .unwrap();

        // Taint 0.3 inflates the statistic each ballot, so the sample runs
        // out before the limit is reached
        let taints = vec![0.3; audit.initial_sample_size as usize];
        let updated = planner.record_round(audit.audit_id, &taints).unwrap();
        assert_eq!(updated.status, AuditStatus::Escalated);
    }

    #[test]
    fn terminated_audits_reject_further_rounds() {
        let planner = AuditPlanner::new();
        let audit = planner
            .plan_audit(
                Uuid::new_v4(),
                "ballot_comparison",
                reported(700, 300),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(7),
            )
            .unwrap();

        planner.record_round(audit.audit_id, &[0.0; 20]).unwrap();
        assert!(matches!(
            planner.record_round(audit.audit_id, &[0.0]),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn one_audit_per_election() {
        let planner = AuditPlanner::new();
        let election_id = Uuid::new_v4();
        planner
            .plan_audit(
                election_id,
                "ballot_comparison",
                reported(700, 300),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(7),
            )
            .unwrap();

        assert!(matches!(
            planner.plan_audit(
                election_id,
                "ballot_comparison",
                reported(700, 300),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(8),
            ),
            Err(Error::DuplicateAudit(_))
        ));
    }

    #[test]
    fn invalid_plans_rejected() {
        let planner = AuditPlanner::new();
        let plan = || SamplingPlan::single_stratum(7);

        // Risk limit outside (0, 1)
        assert!(planner
            .plan_audit(Uuid::new_v4(), "bc", reported(7, 3), 0.0, plan())
            .is_err());
        assert!(planner
            .plan_audit(Uuid::new_v4(), "bc", reported(7, 3), 1.0, plan())
            .is_err());

        // Exact tie, all-zero tallies, single candidate
        assert!(planner
            .plan_audit(Uuid::new_v4(), "bc", reported(5, 5), 0.05, plan())
            .is_err());
        assert!(planner
            .plan_audit(Uuid::new_v4(), "bc", reported(0, 0), 0.05, plan())
            .is_err());
        assert!(planner
            .plan_audit(
                Uuid::new_v4(),
                "bc",
                vec![ReportedTally {
                    candidate_id: 1,
                    votes: 10
                }],
                0.05,
                plan()
            )
            .is_err());
    }

    #[test]
    fn invalid_taints_rejected_without_state_change() {
        let planner = AuditPlanner::new();
        let audit = planner
            .plan_audit(
                Uuid::new_v4(),
                "ballot_comparison",
                reported(700, 300),
                DEFAULT_RISK_LIMIT,
                SamplingPlan::single_stratum(7),
            )
            .unwrap();

        assert!(planner.record_round(audit.audit_id, &[1.0]).is_err());
        assert!(planner.record_round(audit.audit_id, &[-0.1]).is_err());
        assert_eq!(planner.get(audit.audit_id).unwrap().status, AuditStatus::Planned);
    }

    #[test]
    fn sampling_draw_is_reproducible() {
        let plan = SamplingPlan::single_stratum(42);
        let first = plan.draw_indices(10_000, 25).unwrap();
        let second = plan.draw_indices(10_000, 25).unwrap();
        assert_eq!(first, second);
        assert!(first.iter().all(|i| *i < 10_000));

        assert!(plan.draw_indices(0, 5).is_err());
    }

    #[test]
    fn unknown_audit_id() {
        let planner = AuditPlanner::new();
        assert!(matches!(
            planner.record_round(Uuid::new_v4(), &[0.0]),
            Err(Error::AuditNotFound(_))
        ));
    }
}
