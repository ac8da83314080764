//! The ballot store: an append-only, in-memory record of every ballot cast,
//! guarded by the nullifier and has-voted checks.
//!
//! All submissions take the store's write lock, so every check-then-mutate
//! sequence (the has-voted gate, the nullifier uniqueness insert) is atomic
//! with respect to concurrent submissions. Tally computation reads a
//! consistent snapshot under the read lock and never observes a
//! partially-written ballot.

use crate::*;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

/// One entry in a candidate's vote timeline, ordered by acceptance time
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub vote_id: Uuid,
    pub weight: u64,
    pub cast_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
    plain: Vec<PlainVote>,
    timelines: HashMap<CandidateId, Vec<TimelineEntry>>,
    ranked: HashMap<Uuid, Vec<RankedBallot>>,
    ranked_voters: HashSet<(Uuid, VoterId)>,
    encrypted: HashMap<Uuid, Vec<EncryptedBallot>>,
    nullifiers: HashSet<(Uuid, String)>,
}

/// Append-only ballot ledger shared across request-handling threads
#[derive(Default)]
pub struct BallotStore {
    inner: RwLock<StoreInner>,
}

impl BallotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a plain single-choice vote.
    ///
    /// Checks voter and candidate existence and the already-voted flag, then
    /// flips the flag, increments the candidate count by `weight`, and
    /// appends to the candidate's timeline.
    pub fn submit_plain_vote<V: VoterRegistry, C: CandidateRegistry>(
        &self,
        voters: &V,
        candidates: &C,
        voter_id: VoterId,
        candidate_id: CandidateId,
        weight: u64,
    ) -> Result<PlainVote, Error> {
        if !voters.exists(voter_id) {
            return Err(Error::VoterNotFound(voter_id));
        }
        if !candidates.exists(candidate_id) {
            return Err(Error::CandidateNotFound(candidate_id));
        }
        if weight == 0 {
            return Err(Error::ParameterOutOfRange("vote weight must be at least 1"));
        }

        let mut inner = self.inner.write().expect("ballot store lock poisoned");
        if voters.has_voted(voter_id) {
            return Err(Error::DuplicateVote(voter_id));
        }

        let vote = PlainVote {
            vote_id: Uuid::new_v4(),
            voter_id,
            candidate_id,
            weight,
            cast_at: Utc::now(),
        };

        voters.mark_voted(voter_id);
        candidates.increment_votes(candidate_id, weight);
        inner
            .timelines
            .entry(candidate_id)
            .or_insert_with(Vec::new)
            .push(TimelineEntry {
                vote_id: vote.vote_id,
                weight,
                cast_at: vote.cast_at,
            });
        inner.plain.push(vote.clone());

        debug!("accepted plain vote {} for candidate {}", vote.vote_id, candidate_id);
        Ok(vote)
    }

    /// Record a ranked-choice ballot, at most one per voter per election
    pub fn submit_ranked_ballot<V: VoterRegistry, C: CandidateRegistry>(
        &self,
        voters: &V,
        candidates: &C,
        election_id: Uuid,
        voter_id: VoterId,
        ranking: Vec<Vec<CandidateId>>,
        cast_at: DateTime<Utc>,
    ) -> Result<RankedBallot, Error> {
        if !voters.exists(voter_id) {
            return Err(Error::VoterNotFound(voter_id));
        }
        validate_ranking(candidates, &ranking)?;

        let mut inner = self.inner.write().expect("ballot store lock poisoned");
        if !inner.ranked_voters.insert((election_id, voter_id)) {
            return Err(Error::DuplicateVote(voter_id));
        }

        let ballot = RankedBallot {
            ballot_id: Uuid::new_v4(),
            election_id,
            voter_id,
            ranking,
            cast_at,
            status: BallotStatus::Accepted,
        };
        inner
            .ranked
            .entry(election_id)
            .or_insert_with(Vec::new)
            .push(ballot.clone());

        debug!("accepted ranked ballot {} in election {}", ballot.ballot_id, election_id);
        Ok(ballot)
    }

    /// Admit an encrypted ballot.
    ///
    /// Acceptance requires the zero-knowledge proof to verify, the voter
    /// signature to check out, and the `(election, nullifier)` pair to be
    /// unused. The nullifier check and insert happen under the same write
    /// lock, so two racing submissions can never both pass.
    pub fn submit_encrypted_ballot(
        &self,
        verifier: &dyn ProofVerifier,
        submission: EncryptedBallotSubmission,
    ) -> Result<EncryptedBallot, Error> {
        let payload = submission.signing_payload()?;
        if !verifier.verify(&submission.proof, &payload) {
            return Err(Error::InvalidProof);
        }
        submission.verify_signature()?;

        let mut inner = self.inner.write().expect("ballot store lock poisoned");
        let guard_key = (submission.election_id, submission.nullifier.clone());
        if !inner.nullifiers.insert(guard_key) {
            return Err(Error::DuplicateNullifier(submission.nullifier));
        }

        let ballot = EncryptedBallot {
            ballot_id: Uuid::new_v4(),
            election_id: submission.election_id,
            ciphertexts: submission.ciphertexts,
            proof: submission.proof,
            voter_pubkey: submission.voter_pubkey,
            nullifier: submission.nullifier,
            signature: submission.signature,
            status: BallotStatus::Accepted,
            anchored_at: Utc::now(),
        };
        inner
            .encrypted
            .entry(ballot.election_id)
            .or_insert_with(Vec::new)
            .push(ballot.clone());

        debug!(
            "anchored encrypted ballot {} in election {}",
            ballot.ballot_id, ballot.election_id
        );
        Ok(ballot)
    }

    /// Snapshot of the accepted ranked ballots for an election
    pub fn ranked_ballots(&self, election_id: Uuid) -> Vec<RankedBallot> {
        let inner = self.inner.read().expect("ballot store lock poisoned");
        inner
            .ranked
            .get(&election_id)
            .map(|ballots| {
                ballots
                    .iter()
                    .filter(|b| b.status == BallotStatus::Accepted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the accepted encrypted ballots for an election
    pub fn encrypted_ballots(&self, election_id: Uuid) -> Vec<EncryptedBallot> {
        let inner = self.inner.read().expect("ballot store lock poisoned");
        inner
            .encrypted
            .get(&election_id)
            .map(|ballots| {
                ballots
                    .iter()
                    .filter(|b| b.status == BallotStatus::Accepted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A candidate's vote timeline, ordered by acceptance time
    pub fn timeline<C: CandidateRegistry>(
        &self,
        candidates: &C,
        candidate_id: CandidateId,
    ) -> Result<Vec<TimelineEntry>, Error> {
        if !candidates.exists(candidate_id) {
            return Err(Error::CandidateNotFound(candidate_id));
        }
        let inner = self.inner.read().expect("ballot store lock poisoned");
        Ok(inner
            .timelines
            .get(&candidate_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Weighted votes gained by a candidate inside `[from, to]`
    pub fn votes_in_range<C: CandidateRegistry>(
        &self,
        candidates: &C,
        candidate_id: CandidateId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, Error> {
        if !candidates.exists(candidate_id) {
            return Err(Error::CandidateNotFound(candidate_id));
        }
        if from > to {
            return Err(Error::InvalidInterval);
        }

        let inner = self.inner.read().expect("ballot store lock poisoned");
        let gained = inner
            .timelines
            .get(&candidate_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.cast_at >= from && e.cast_at <= to)
                    .map(|e| e.weight)
                    .sum()
            })
            .unwrap_or(0);
        Ok(gained)
    }
}
