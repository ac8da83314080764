use crate::*;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Mutex;

/// Voter registry collaborator interface
///
/// The registry service owns voter records; the engine only reads eligibility
/// and flips the voted flag alongside vote recording. Implementations must be
/// safe to share across request-handling threads.
pub trait VoterRegistry: Send + Sync {
    fn exists(&self, voter_id: VoterId) -> bool;

    fn has_voted(&self, voter_id: VoterId) -> bool;

    fn mark_voted(&self, voter_id: VoterId);

    /// Explicit vote weight attribute, always >= 1
    fn weight(&self, voter_id: VoterId) -> u64;
}

/// Candidate registry collaborator interface
pub trait CandidateRegistry: Send + Sync {
    fn exists(&self, candidate_id: CandidateId) -> bool;

    fn increment_votes(&self, candidate_id: CandidateId, weight: u64);
}

#[derive(Debug, Clone)]
struct VoterRecord {
    has_voted: bool,
    weight: u64,
}

#[derive(Debug, Clone)]
struct CandidateRecord {
    party: String,
    votes: u64,
}

/// Per-candidate standing in the first-past-the-post count
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CandidateStanding {
    pub candidate_id: CandidateId,
    pub party: String,
    pub votes: u64,
}

/// A simple in-memory registry backing both collaborator interfaces
///
/// Also serves the leaderboard and winner reads that the plain
/// first-past-the-post collaborator exposes.
#[derive(Default)]
pub struct MemRegistry {
    voters: Mutex<HashMap<VoterId, VoterRecord>>,
    candidates: Mutex<IndexMap<CandidateId, CandidateRecord>>,
}

impl MemRegistry {
    pub fn add_voter(&self, voter_id: VoterId, weight: u64) {
        let mut voters = self.voters.lock().expect("voter registry lock poisoned");
        voters.insert(
            voter_id,
            VoterRecord {
                has_voted: false,
                weight: weight.max(1),
            },
        );
    }

    pub fn add_candidate(&self, candidate_id: CandidateId, party: &str) {
        let mut candidates = self
            .candidates
            .lock()
            .expect("candidate registry lock poisoned");
        candidates.insert(
            candidate_id,
            CandidateRecord {
                party: party.to_string(),
                votes: 0,
            },
        );
    }

    pub fn votes(&self, candidate_id: CandidateId) -> Option<u64> {
        let candidates = self
            .candidates
            .lock()
            .expect("candidate registry lock poisoned");
        candidates.get(&candidate_id).map(|c| c.votes)
    }

    /// All candidates ordered by vote count, descending
    pub fn results(&self) -> Vec<CandidateStanding> {
        let candidates = self
            .candidates
            .lock()
            .expect("candidate registry lock poisoned");
        let mut results: Vec<CandidateStanding> = candidates
            .iter()
            .map(|(id, c)| CandidateStanding {
                candidate_id: *id,
                party: c.party.clone(),
                votes: c.votes,
            })
            .collect();
        results.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.candidate_id.cmp(&b.candidate_id)));
        results
    }

    /// Candidates holding the current maximum vote count (empty if no candidates)
    pub fn winners(&self) -> Vec<CandidateStanding> {
        let results = self.results();
        match results.first() {
            Some(top) => {
                let max = top.votes;
                results.into_iter().take_while(|c| c.votes == max).collect()
            }
            None => vec![],
        }
    }
}

impl VoterRegistry for MemRegistry {
    fn exists(&self, voter_id: VoterId) -> bool {
        let voters = self.voters.lock().expect("voter registry lock poisoned");
        voters.contains_key(&voter_id)
    }

    fn has_voted(&self, voter_id: VoterId) -> bool {
        let voters = self.voters.lock().expect("voter registry lock poisoned");
        voters.get(&voter_id).map(|v| v.has_voted).unwrap_or(false)
    }

    fn mark_voted(&self, voter_id: VoterId) {
        let mut voters = self.voters.lock().expect("voter registry lock poisoned");
        if let Some(voter) = voters.get_mut(&voter_id) {
            voter.has_voted = true;
        }
    }

    fn weight(&self, voter_id: VoterId) -> u64 {
        let voters = self.voters.lock().expect("voter registry lock poisoned");
        voters.get(&voter_id).map(|v| v.weight).unwrap_or(1)
    }
}

impl CandidateRegistry for MemRegistry {
    fn exists(&self, candidate_id: CandidateId) -> bool {
        let candidates = self
            .candidates
            .lock()
            .expect("candidate registry lock poisoned");
        candidates.contains_key(&candidate_id)
    }

    fn increment_votes(&self, candidate_id: CandidateId, weight: u64) {
        let mut candidates = self
            .candidates
            .lock()
            .expect("candidate registry lock poisoned");
        if let Some(candidate) = candidates.get_mut(&candidate_id) {
            candidate.votes += weight;
        }
    }
}
