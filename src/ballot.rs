use crate::*;
use chrono::{DateTime, Utc};
use ed25519_dalek::{ExpandedSecretKey, Keypair, PublicKey, SecretKey, Signature, Verifier};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Voter identifier, owned by the registry collaborator
pub type VoterId = u32;

/// Candidate identifier, owned by the registry collaborator
pub type CandidateId = u32;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BallotStatus {
    Accepted,
    Rejected,
}

/// A plain single-choice vote. Immutable once created; weight defaults to 1.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlainVote {
    pub vote_id: Uuid,
    pub voter_id: VoterId,
    pub candidate_id: CandidateId,
    pub weight: u64,
    pub cast_at: DateTime<Utc>,
}

/// A ranked-choice ballot.
///
/// `ranking` is an ordered sequence of equal-rank groups: candidates in
/// earlier groups are preferred to candidates in later groups, candidates
/// within a group are tied, and candidates omitted entirely rank last. A
/// strict ranking is the special case of singleton groups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RankedBallot {
    pub ballot_id: Uuid,
    pub election_id: Uuid,
    pub voter_id: VoterId,
    pub ranking: Vec<Vec<CandidateId>>,
    pub cast_at: DateTime<Utc>,
    pub status: BallotStatus,
}

/// An encrypted ballot as submitted by a voter (or a privacy-preserving
/// relay). The ballot content is opaque; the nullifier is the sole
/// duplicate-vote defense.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EncryptedBallotSubmission {
    pub election_id: Uuid,

    /// One ciphertext per candidate, encrypting 1 for the chosen candidate
    /// and 0 for every other
    pub ciphertexts: Vec<Ciphertext>,

    #[serde(with = "BytesHex")]
    pub proof: Vec<u8>,

    #[serde(with = "EdPublicKeyHex")]
    pub voter_pubkey: PublicKey,

    /// One-time opaque tag derived from the voter's credential; unique per
    /// election
    pub nullifier: String,

    #[serde(with = "EdSignatureHex")]
    pub signature: Signature,
}

impl EncryptedBallotSubmission {
    /// Build and sign a submission with the voter's secret key
    pub fn new(
        election_id: Uuid,
        ciphertexts: Vec<Ciphertext>,
        proof: Vec<u8>,
        nullifier: String,
        secret: &SecretKey,
    ) -> Result<Self, Error> {
        let voter_pubkey = PublicKey::from(secret);
        let payload = signing_payload(&election_id, &ciphertexts, &nullifier)?;

        let expanded: ExpandedSecretKey = secret.into();
        let signature = expanded.sign(&payload, &voter_pubkey);

        Ok(EncryptedBallotSubmission {
            election_id,
            ciphertexts,
            proof,
            voter_pubkey,
            nullifier,
            signature,
        })
    }

    /// The canonical bytes covered by the voter signature
    pub fn signing_payload(&self) -> Result<Vec<u8>, Error> {
        signing_payload(&self.election_id, &self.ciphertexts, &self.nullifier)
    }

    pub fn verify_signature(&self) -> Result<(), Error> {
        let payload = self.signing_payload()?;
        self.voter_pubkey.verify(&payload, &self.signature)?;
        Ok(())
    }
}

/// An encrypted ballot anchored in the ledger
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EncryptedBallot {
    pub ballot_id: Uuid,
    pub election_id: Uuid,
    pub ciphertexts: Vec<Ciphertext>,

    #[serde(with = "BytesHex")]
    pub proof: Vec<u8>,

    #[serde(with = "EdPublicKeyHex")]
    pub voter_pubkey: PublicKey,

    pub nullifier: String,

    #[serde(with = "EdSignatureHex")]
    pub signature: Signature,

    pub status: BallotStatus,
    pub anchored_at: DateTime<Utc>,
}

fn signing_payload(
    election_id: &Uuid,
    ciphertexts: &[Ciphertext],
    nullifier: &str,
) -> Result<Vec<u8>, Error> {
    #[derive(Serialize)]
    struct Payload<'a> {
        election_id: &'a Uuid,
        ciphertexts: &'a [Ciphertext],
        nullifier: &'a str,
    }

    let payload = Payload {
        election_id,
        ciphertexts,
        nullifier,
    };
    Ok(serde_cbor::to_vec(&payload)?)
}

/// Generate a voter signing keypair
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let mut csprng = rand::rngs::OsRng {};
    let Keypair { public, secret } = Keypair::generate(&mut csprng);
    (secret, public)
}

/// Derive a one-time nullifier from a voter credential, scoped to an election
pub fn derive_nullifier(credential: &[u8], election_id: &Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"veritally-nullifier");
    hasher.update(credential);
    hasher.update(election_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate a ranking: non-empty, no duplicate candidates, all candidates
/// known to the registry
pub fn validate_ranking<C: CandidateRegistry>(
    candidates: &C,
    ranking: &[Vec<CandidateId>],
) -> Result<(), Error> {
    if ranking.iter().all(|group| group.is_empty()) {
        return Err(Error::MalformedRanking("ranking is empty".to_string()));
    }

    let mut seen = std::collections::HashSet::new();
    for group in ranking {
        for candidate_id in group {
            if !seen.insert(*candidate_id) {
                return Err(Error::MalformedRanking(format!(
                    "candidate {} appears more than once",
                    candidate_id
                )));
            }
            if !candidates.exists(*candidate_id) {
                return Err(Error::CandidateNotFound(*candidate_id));
            }
        }
    }

    Ok(())
}
