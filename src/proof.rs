/// Minimum byte length for a structurally well-formed ballot proof
pub const MIN_PROOF_LEN: usize = 10;

/// Pluggable verification of zero-knowledge ballot proofs.
///
/// The engine treats proof verification as a capability: production
/// deployments plug in a real SNARK verifier, tests use a permissive double.
/// The verification outcome gates ballot acceptance and is never bypassed.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &[u8], public_inputs: &[u8]) -> bool;
}

/// A permissive verifier that accepts any structurally well-formed proof.
///
/// Suitable for tests and staging environments only.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveVerifier;

impl ProofVerifier for PermissiveVerifier {
    fn verify(&self, proof: &[u8], _public_inputs: &[u8]) -> bool {
        proof.len() >= MIN_PROOF_LEN
    }
}

/// A verifier that rejects everything, for exercising rejection paths
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectingVerifier;

impl ProofVerifier for RejectingVerifier {
    fn verify(&self, _proof: &[u8], _public_inputs: &[u8]) -> bool {
        false
    }
}
