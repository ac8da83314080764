//! Threshold decryption for homomorphic tallies.
//!
//! The election secret is Shamir-shared over the Ristretto scalar field by a
//! trusted dealer. Any quorum of trustees can decrypt an aggregate tally by
//! each publishing a partial decryption of the accumulator, accompanied by a
//! Chaum-Pedersen proof that the share was computed with the trustee's dealt
//! key. Shares are combined by Lagrange interpolation at zero; individual
//! ballots are never decrypted.
//!
//! Most elections will have a handful of trustees (between 3 and 30), with
//! the threshold set to about 2/3 the total number of trustees.

use crate::*;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use sha2::Sha512;
use uuid::Uuid;

/// A trustee's public identity in the election roster
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Trustee {
    pub id: Uuid,

    /// Shamir evaluation point, starts at 1
    pub index: usize,

    /// `G * s_i`, the public commitment to this trustee's key share
    #[serde(with = "RistrettoHex")]
    pub share_public: RistrettoPoint,
}

/// A trustee's secret key share, held only by that trustee
#[derive(Serialize, Deserialize, Clone)]
pub struct TrusteeKeyShare {
    pub trustee_id: Uuid,
    pub index: usize,

    #[serde(with = "ScalarHex")]
    secret: Scalar,
}

/// The output of dealing: the election key plus the trustee roster and their
/// secret shares (to be distributed and then discarded by the dealer)
pub struct DealtKeys {
    pub public_key: ElectionPublicKey,
    pub trustees: Vec<Trustee>,
    pub shares: Vec<TrusteeKeyShare>,
}

/// Shamir-share a fresh election secret among `num_trustees` trustees with
/// the given decryption threshold
pub fn deal_key_shares<R: RngCore + CryptoRng>(
    threshold: usize,
    num_trustees: usize,
    rng: &mut R,
) -> Result<DealtKeys, Error> {
    if threshold == 0 || threshold > num_trustees {
        return Err(Error::ParameterOutOfRange(
            "threshold must be between 1 and the number of trustees",
        ));
    }

    // f(x) = a_0 + a_1*x + ... with a_0 the election secret
    let coefficients: Vec<Scalar> = (0..threshold).map(|_| random_scalar(rng)).collect();
    let public_key = ElectionPublicKey(&coefficients[0] * &RISTRETTO_BASEPOINT_TABLE);

    let mut trustees = Vec::with_capacity(num_trustees);
    let mut shares = Vec::with_capacity(num_trustees);
    for index in 1..=num_trustees {
        let x = Scalar::from(index as u64);
        let mut secret = Scalar::zero();
        let mut x_power = Scalar::one();
        for coefficient in &coefficients {
            secret += coefficient * x_power;
            x_power *= x;
        }

        let trustee_id = Uuid::new_v4();
        trustees.push(Trustee {
            id: trustee_id,
            index,
            share_public: &secret * &RISTRETTO_BASEPOINT_TABLE,
        });
        shares.push(TrusteeKeyShare {
            trustee_id,
            index,
            secret,
        });
    }

    Ok(DealtKeys {
        public_key,
        trustees,
        shares,
    })
}

impl TrusteeKeyShare {
    /// Produce a partial decryption of `ciphertext` with a proof of correctness
    pub fn decrypt_share<R: RngCore + CryptoRng>(
        &self,
        ciphertext: &Ciphertext,
        rng: &mut R,
    ) -> DecryptShare {
        let share = self.secret * ciphertext.c1;
        let share_public = &self.secret * &RISTRETTO_BASEPOINT_TABLE;

        // Chaum-Pedersen: prove log_G(share_public) == log_C1(share)
        let w = random_scalar(rng);
        let commit_g = &w * &RISTRETTO_BASEPOINT_TABLE;
        let commit_c1 = w * ciphertext.c1;
        let challenge = dleq_challenge(&share_public, &ciphertext.c1, &share, &commit_g, &commit_c1);
        let response = w + challenge * self.secret;

        DecryptShare {
            trustee_id: self.trustee_id,
            index: self.index,
            share,
            challenge,
            response,
        }
    }
}

/// A partial decryption of a tally accumulator, bound to the trustee's dealt
/// key share by a Chaum-Pedersen DLEQ proof
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DecryptShare {
    pub trustee_id: Uuid,
    pub index: usize,

    #[serde(with = "RistrettoHex")]
    pub share: RistrettoPoint,

    #[serde(with = "ScalarHex")]
    challenge: Scalar,

    #[serde(with = "ScalarHex")]
    response: Scalar,
}

impl DecryptShare {
    /// Verify this share against the trustee's published share public key
    pub fn verify(&self, share_public: &RistrettoPoint, ciphertext: &Ciphertext) -> bool {
        let commit_g = &self.response * &RISTRETTO_BASEPOINT_TABLE - self.challenge * share_public;
        let commit_c1 = self.response * ciphertext.c1 - self.challenge * self.share;
        let expected = dleq_challenge(
            share_public,
            &ciphertext.c1,
            &self.share,
            &commit_g,
            &commit_c1,
        );
        expected == self.challenge
    }
}

fn dleq_challenge(
    share_public: &RistrettoPoint,
    c1: &RistrettoPoint,
    share: &RistrettoPoint,
    commit_g: &RistrettoPoint,
    commit_c1: &RistrettoPoint,
) -> Scalar {
    use digest::Digest;

    let mut hasher = Sha512::new();
    hasher.update(b"veritally-dleq");
    hasher.update(share_public.compress().as_bytes());
    hasher.update(c1.compress().as_bytes());
    hasher.update(share.compress().as_bytes());
    hasher.update(commit_g.compress().as_bytes());
    hasher.update(commit_c1.compress().as_bytes());
    Scalar::from_hash(hasher)
}

/// Combine any `threshold` verified shares into the plaintext point of the
/// ciphertext via Lagrange interpolation at zero
pub fn combine_shares(
    threshold: usize,
    shares: &[DecryptShare],
    ciphertext: &Ciphertext,
) -> Result<RistrettoPoint, Error> {
    let mut quorum: Vec<&DecryptShare> = Vec::with_capacity(threshold);
    for share in shares {
        if !quorum.iter().any(|s| s.index == share.index) {
            quorum.push(share);
        }
    }
    if quorum.len() < threshold {
        return Err(Error::ThresholdNotMet {
            required: threshold,
            available: quorum.len(),
        });
    }
    quorum.truncate(threshold);

    let mut combined = RistrettoPoint::identity();
    for share in &quorum {
        let x_i = Scalar::from(share.index as u64);
        let mut coefficient = Scalar::one();
        for other in &quorum {
            if other.index == share.index {
                continue;
            }
            let x_j = Scalar::from(other.index as u64);
            coefficient *= x_j * (x_j - x_i).invert();
        }
        combined += coefficient * share.share;
    }

    Ok(ciphertext.c2 - combined)
}
