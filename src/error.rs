use crate::*;

use thiserror::Error;

/// Error types
///
/// Every rejection carries enough context for the caller to correct the
/// request. Budget and threshold errors are recoverable by retrying later or
/// with adjusted parameters.
#[derive(Debug, Error)]
pub enum Error {
    #[error("veritally: voter {0} not found")]
    VoterNotFound(VoterId),

    #[error("veritally: candidate {0} not found")]
    CandidateNotFound(CandidateId),

    #[error("veritally: audit {0} not found")]
    AuditNotFound(uuid::Uuid),

    #[error("veritally: voter {0} has already voted")]
    DuplicateVote(VoterId),

    #[error("veritally: double voting detected for nullifier {0}")]
    DuplicateNullifier(String),

    #[error("veritally: an audit already exists for election {0}")]
    DuplicateAudit(uuid::Uuid),

    #[error("veritally: trustee {0} not found in roster")]
    TrusteeNotFound(uuid::Uuid),

    #[error("veritally: malformed ranking: {0}")]
    MalformedRanking(String),

    #[error("veritally: invalid ballot proof")]
    InvalidProof,

    #[error("veritally: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),

    #[error("veritally: parameter out of range: {0}")]
    ParameterOutOfRange(&'static str),

    #[error("veritally: invalid interval: from > to")]
    InvalidInterval,

    #[error("veritally: privacy budget exceeded: requested {requested}, remaining {remaining}")]
    BudgetExceeded { requested: f64, remaining: f64 },

    #[error("veritally: decryption threshold not met: need {required}, have {available}")]
    ThresholdNotMet { required: usize, available: usize },

    #[error("veritally: operation invalid for current state: {0}")]
    InvalidState(&'static str),

    #[error("veritally: CBOR encoding error: {0}")]
    CBOREncoding(#[from] serde_cbor::Error),

    #[error("veritally: tally decode failed: accumulator exceeds ballot count")]
    TallyDecodeFailed,

    #[error("veritally: malformed curve point")]
    MalformedPoint,
}
