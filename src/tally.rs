//! The encrypted tally engine.
//!
//! Aggregation folds every accepted encrypted ballot into one additive
//! accumulator per candidate; no individual ballot is ever decrypted.
//! Decryption happens inside a session that collects partial-decryption
//! shares from trustees, verifies each against the trustee's share public
//! key, and combines a quorum by Lagrange interpolation. The published
//! result carries a decryption transcript and Merkle anchors over the
//! aggregated ballot set.

use crate::*;
use indexmap::IndexMap;
use log::warn;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const TALLY_METHOD: &str = "threshold_elgamal";

/// The encrypted aggregate of an election's ballot set
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedTally {
    pub election_id: Uuid,

    /// One additive accumulator per candidate, ordered as the engine's
    /// candidate list
    pub accumulators: Vec<Ciphertext>,

    pub ballot_count: usize,

    /// Commitment to the aggregated ballot set (transparency log root)
    pub ballot_merkle_root: String,

    /// Commitment to the encrypted accumulators themselves
    pub encrypted_tally_root: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub candidate_id: CandidateId,
    pub votes: u64,
}

/// Transparency anchors published with a decrypted tally
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transparency {
    pub ballot_merkle_root: String,
    pub tally_method: String,
    pub threshold: String,
}

/// A decrypted homomorphic tally with its verification material
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HomomorphicTallyResult {
    pub election_id: Uuid,
    pub encrypted_tally_root: String,
    pub candidate_tallies: Vec<CandidateTally>,

    /// Hex-encoded CBOR transcript of the decryption shares (with their
    /// Chaum-Pedersen proofs) that produced this result
    pub decryption_proof: String,

    pub transparency: Transparency,
}

/// Homomorphic aggregation and threshold decryption for one election
pub struct EncryptedTallyEngine {
    election_id: Uuid,
    candidates: Vec<CandidateId>,
    encryption_key: ElectionPublicKey,
    trustees: Vec<Trustee>,
    threshold: usize,
}

impl EncryptedTallyEngine {
    pub fn new(
        election_id: Uuid,
        candidates: Vec<CandidateId>,
        encryption_key: ElectionPublicKey,
        trustees: Vec<Trustee>,
        threshold: usize,
    ) -> Result<Self, Error> {
        if threshold == 0 || threshold > trustees.len() {
            return Err(Error::ParameterOutOfRange(
                "threshold must be between 1 and the number of trustees",
            ));
        }
        if candidates.is_empty() {
            return Err(Error::ParameterOutOfRange(
                "an election needs at least one candidate",
            ));
        }

        Ok(EncryptedTallyEngine {
            election_id,
            candidates,
            encryption_key,
            trustees,
            threshold,
        })
    }

    pub fn election_id(&self) -> Uuid {
        self.election_id
    }

    pub fn candidates(&self) -> &[CandidateId] {
        &self.candidates
    }

    /// Voter-side helper: encrypt a choice as one ciphertext per candidate
    /// (1 for the chosen candidate, 0 for every other)
    pub fn encrypt_ballot<R: rand::RngCore + rand::CryptoRng>(
        &self,
        choice: CandidateId,
        rng: &mut R,
    ) -> Result<Vec<Ciphertext>, Error> {
        if !self.candidates.contains(&choice) {
            return Err(Error::CandidateNotFound(choice));
        }
        Ok(self
            .candidates
            .iter()
            .map(|candidate| {
                let count = if *candidate == choice { 1 } else { 0 };
                encrypt(&self.encryption_key, count, rng)
            })
            .collect())
    }

    /// Fold the accepted ballots into per-candidate accumulators.
    ///
    /// Deterministic in the ballot-set content: re-aggregating an unchanged
    /// set yields identical accumulators and roots.
    pub fn aggregate(&self, ballots: &[EncryptedBallot]) -> Result<EncryptedTally, Error> {
        let mut accumulators = vec![Ciphertext::zero(); self.candidates.len()];
        let mut leaves = Vec::new();

        for ballot in ballots {
            if ballot.status != BallotStatus::Accepted || ballot.election_id != self.election_id {
                continue;
            }
            if ballot.ciphertexts.len() != self.candidates.len() {
                warn!(
                    "skipping ballot {}: expected {} ciphertexts, got {}",
                    ballot.ballot_id,
                    self.candidates.len(),
                    ballot.ciphertexts.len()
                );
                continue;
            }

            for (accumulator, ciphertext) in accumulators.iter_mut().zip(&ballot.ciphertexts) {
                *accumulator += *ciphertext;
            }
            leaves.push(serde_cbor::to_vec(ballot)?);
        }

        let ballot_count = leaves.len();
        let ballot_merkle_root = hex::encode(MerkleTree::from_leaves(leaves).root());

        let mut hasher = Sha256::new();
        hasher.update(serde_cbor::to_vec(&accumulators)?);
        let encrypted_tally_root = hex::encode(hasher.finalize());

        Ok(EncryptedTally {
            election_id: self.election_id,
            accumulators,
            ballot_count,
            ballot_merkle_root,
            encrypted_tally_root,
        })
    }

    /// Open a decryption session over an aggregated tally. With a deadline
    /// set, the session reports `ThresholdNotMet` once time runs out instead
    /// of waiting for shares indefinitely.
    pub fn begin_decryption(
        &self,
        tally: EncryptedTally,
        deadline: Option<Duration>,
    ) -> DecryptionSession {
        DecryptionSession {
            candidates: self.candidates.clone(),
            trustees: self.trustees.clone(),
            threshold: self.threshold,
            tally,
            shares: HashMap::new(),
            opened_at: Instant::now(),
            deadline,
        }
    }
}

/// Collects trustee decryption shares for one aggregated tally
pub struct DecryptionSession {
    candidates: Vec<CandidateId>,
    trustees: Vec<Trustee>,
    threshold: usize,
    tally: EncryptedTally,
    // trustee index -> one verified share per candidate
    shares: HashMap<usize, Vec<DecryptShare>>,
    opened_at: Instant,
    deadline: Option<Duration>,
}

impl DecryptionSession {
    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => self.opened_at.elapsed() > deadline,
            None => false,
        }
    }

    /// Number of trustees with verified shares on record
    pub fn quorum_size(&self) -> usize {
        self.shares.len()
    }

    /// Submit one trustee's shares, one per candidate accumulator.
    ///
    /// Returns `Ok(true)` if the shares verified and were recorded. Shares
    /// failing proof verification are discarded and logged (`Ok(false)`),
    /// never fatal.
    pub fn submit_shares(
        &mut self,
        trustee_id: Uuid,
        shares: Vec<DecryptShare>,
    ) -> Result<bool, Error> {
        if self.is_expired() {
            return Err(Error::InvalidState("decryption session deadline passed"));
        }

        let trustee = self
            .trustees
            .iter()
            .find(|t| t.id == trustee_id)
            .ok_or(Error::TrusteeNotFound(trustee_id))?;

        if shares.len() != self.candidates.len() {
            return Err(Error::ParameterOutOfRange(
                "one decryption share per candidate is required",
            ));
        }

        for (share, accumulator) in shares.iter().zip(&self.tally.accumulators) {
            if share.index != trustee.index
                || !share.verify(&trustee.share_public, accumulator)
            {
                warn!(
                    "discarding decryption shares from trustee {}: proof verification failed",
                    trustee_id
                );
                return Ok(false);
            }
        }

        self.shares.insert(trustee.index, shares);
        Ok(true)
    }

    /// Combine a quorum of verified shares into the plaintext tallies.
    ///
    /// Recoverable with more shares on `ThresholdNotMet`.
    pub fn finalize(&self) -> Result<HomomorphicTallyResult, Error> {
        if self.shares.len() < self.threshold {
            return Err(Error::ThresholdNotMet {
                required: self.threshold,
                available: self.shares.len(),
            });
        }

        // Deterministic quorum selection: lowest trustee indexes first
        let mut quorum: Vec<usize> = self.shares.keys().copied().collect();
        quorum.sort_unstable();
        quorum.truncate(self.threshold);

        let mut candidate_tallies = Vec::with_capacity(self.candidates.len());
        let mut transcript: IndexMap<CandidateId, Vec<&DecryptShare>> = IndexMap::new();
        for (position, candidate_id) in self.candidates.iter().enumerate() {
            let shares: Vec<DecryptShare> = quorum
                .iter()
                .map(|index| self.shares[index][position].clone())
                .collect();

            let plaintext =
                combine_shares(self.threshold, &shares, &self.tally.accumulators[position])?;
            let votes = decode_count(&plaintext, self.tally.ballot_count as u64)?;
            candidate_tallies.push(CandidateTally {
                candidate_id: *candidate_id,
                votes,
            });
            transcript.insert(
                *candidate_id,
                quorum.iter().map(|index| &self.shares[index][position]).collect(),
            );
        }

        let decryption_proof = hex::encode(serde_cbor::to_vec(&transcript)?);

        Ok(HomomorphicTallyResult {
            election_id: self.tally.election_id,
            encrypted_tally_root: self.tally.encrypted_tally_root.clone(),
            candidate_tallies,
            decryption_proof,
            transparency: Transparency {
                ballot_merkle_root: self.tally.ballot_merkle_root.clone(),
                tally_method: TALLY_METHOD.to_string(),
                threshold: format!("{}-of-{}", self.threshold, self.trustees.len()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Setup {
        engine: EncryptedTallyEngine,
        dealt: DealtKeys,
        election_id: Uuid,
    }

    fn setup(threshold: usize, num_trustees: usize) -> Setup {
        let mut rng = rand::rngs::OsRng {};
        let election_id = Uuid::new_v4();
        let dealt = deal_key_shares(threshold, num_trustees, &mut rng).unwrap();
        let engine = EncryptedTallyEngine::new(
            election_id,
            vec![1, 2],
            dealt.public_key,
            dealt.trustees.clone(),
            threshold,
        )
        .unwrap();
        Setup {
            engine,
            dealt,
            election_id,
        }
    }

    fn cast(setup: &Setup, choice: CandidateId, nullifier: &str) -> EncryptedBallot {
        let mut rng = rand::rngs::OsRng {};
        let (secret, _) = generate_keypair();
        let ciphertexts = setup.engine.encrypt_ballot(choice, &mut rng).unwrap();
        let submission = EncryptedBallotSubmission::new(
            setup.election_id,
            ciphertexts,
            b"proof-bytes-long-enough".to_vec(),
            nullifier.to_string(),
            &secret,
        )
        .unwrap();
        EncryptedBallot {
            ballot_id: Uuid::new_v4(),
            election_id: submission.election_id,
            ciphertexts: submission.ciphertexts,
            proof: submission.proof,
            voter_pubkey: submission.voter_pubkey,
            nullifier: submission.nullifier,
            signature: submission.signature,
            status: BallotStatus::Accepted,
            anchored_at: Utc::now(),
        }
    }

    #[test]
    fn aggregate_and_threshold_decrypt() {
        let setup = setup(2, 3);
        let mut rng = rand::rngs::OsRng {};

        let ballots: Vec<EncryptedBallot> = vec![
            cast(&setup, 1, "n1"),
            cast(&setup, 1, "n2"),
            cast(&setup, 2, "n3"),
        ];

        let tally = setup.engine.aggregate(&ballots).unwrap();
        assert_eq!(tally.ballot_count, 3);

        let mut session = setup.engine.begin_decryption(tally.clone(), None);

        // Not enough shares yet
        assert!(matches!(
            session.finalize(),
            Err(Error::ThresholdNotMet {
                required: 2,
                available: 0,
            })
        ));

        for key_share in &setup.dealt.shares[..2] {
            let shares: Vec<DecryptShare> = tally
                .accumulators
                .iter()
                .map(|accumulator| key_share.decrypt_share(accumulator, &mut rng))
                .collect();
            assert!(session.submit_shares(key_share.trustee_id, shares).unwrap());
        }

        let result = session.finalize().unwrap();
        assert_eq!(
            result.candidate_tallies,
            vec![
                CandidateTally {
                    candidate_id: 1,
                    votes: 2,
                },
                CandidateTally {
                    candidate_id: 2,
                    votes: 1,
                },
            ]
        );
        assert_eq!(result.transparency.threshold, "2-of-3");
        assert_eq!(result.transparency.tally_method, TALLY_METHOD);
        assert!(!result.decryption_proof.is_empty());
    }

    #[test]
    fn aggregation_is_idempotent() {
        let setup = setup(2, 3);
        let ballots = vec![cast(&setup, 1, "n1"), cast(&setup, 2, "n2")];

        let first = setup.engine.aggregate(&ballots).unwrap();
        let second = setup.engine.aggregate(&ballots).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_shares_are_discarded_not_fatal() {
        let setup = setup(2, 3);
        let mut rng = rand::rngs::OsRng {};

        let ballots = vec![cast(&setup, 1, "n1")];
        let tally = setup.engine.aggregate(&ballots).unwrap();
        let mut session = setup.engine.begin_decryption(tally.clone(), None);

        // Shares computed against a different ciphertext fail verification
        let unrelated = encrypt(&setup.dealt.public_key, 5, &mut rng);
        let bogus: Vec<DecryptShare> = tally
            .accumulators
            .iter()
            .map(|_| setup.dealt.shares[0].decrypt_share(&unrelated, &mut rng))
            .collect();
        assert!(!session
            .submit_shares(setup.dealt.shares[0].trustee_id, bogus)
            .unwrap());
        assert_eq!(session.quorum_size(), 0);

        // An unknown trustee is an error, not a discard
        assert!(matches!(
            session.submit_shares(Uuid::new_v4(), vec![]),
            Err(Error::TrusteeNotFound(_))
        ));
    }

    #[test]
    fn expired_session_rejects_shares() {
        let setup = setup(1, 1);
        let mut rng = rand::rngs::OsRng {};

        let ballots = vec![cast(&setup, 1, "n1")];
        let tally = setup.engine.aggregate(&ballots).unwrap();
        let mut session = setup
            .engine
            .begin_decryption(tally.clone(), Some(Duration::from_secs(0)));
        std::thread::sleep(Duration::from_millis(5));

        let shares: Vec<DecryptShare> = tally
            .accumulators
            .iter()
            .map(|accumulator| setup.dealt.shares[0].decrypt_share(accumulator, &mut rng))
            .collect();
        assert!(matches!(
            session.submit_shares(setup.dealt.shares[0].trustee_id, shares),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            session.finalize(),
            Err(Error::ThresholdNotMet { .. })
        ));
    }

    #[test]
    fn ballots_from_other_elections_are_excluded() {
        let setup = setup(1, 1);
        let mut foreign = cast(&setup, 1, "n1");
        foreign.election_id = Uuid::new_v4();

        let tally = setup.engine.aggregate(&[foreign]).unwrap();
        assert_eq!(tally.ballot_count, 0);
    }
}
