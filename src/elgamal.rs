//! Exponential ElGamal over the Ristretto group.
//!
//! Counters are encrypted in the exponent, which makes ciphertexts additively
//! homomorphic: the sum of two ciphertexts decrypts to the sum of their
//! counters. Decryption recovers `count * G` and decodes the counter with a
//! bounded discrete-log walk, which is fine because a tally accumulator can
//! never exceed the number of ballots aggregated into it.

use crate::*;
use curve25519_dalek::constants::{RISTRETTO_BASEPOINT_POINT, RISTRETTO_BASEPOINT_TABLE};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use std::ops::{Add, AddAssign};

/// The election-wide encryption public key, `G * s`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionPublicKey(#[serde(with = "RistrettoHex")] pub RistrettoPoint);

/// The election secret. In a threshold deployment no single party ever holds
/// this; it exists only inside the dealer and in non-threshold tests.
#[derive(Clone)]
pub struct ElectionSecretKey(pub(crate) Scalar);

impl ElectionSecretKey {
    pub fn public_key(&self) -> ElectionPublicKey {
        ElectionPublicKey(&self.0 * &RISTRETTO_BASEPOINT_TABLE)
    }
}

/// An ElGamal ciphertext `(r*G, m*G + r*pk)`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext {
    #[serde(with = "RistrettoHex")]
    pub c1: RistrettoPoint,

    #[serde(with = "RistrettoHex")]
    pub c2: RistrettoPoint,
}

impl Ciphertext {
    /// The additive identity: an encryption of zero with zero randomness
    pub fn zero() -> Self {
        Ciphertext {
            c1: RistrettoPoint::identity(),
            c2: RistrettoPoint::identity(),
        }
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, other: Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: self.c1 + other.c1,
            c2: self.c2 + other.c2,
        }
    }
}

impl AddAssign for Ciphertext {
    fn add_assign(&mut self, other: Ciphertext) {
        self.c1 += other.c1;
        self.c2 += other.c2;
    }
}

/// Generate a non-threshold keypair (tests and single-authority deployments)
pub fn generate_encryption_keypair<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> (ElectionSecretKey, ElectionPublicKey) {
    let secret = ElectionSecretKey(random_scalar(rng));
    let public = secret.public_key();
    (secret, public)
}

/// Encrypt a small counter under the election public key
pub fn encrypt<R: RngCore + CryptoRng>(
    key: &ElectionPublicKey,
    count: u64,
    rng: &mut R,
) -> Ciphertext {
    let r = random_scalar(rng);
    Ciphertext {
        c1: &r * &RISTRETTO_BASEPOINT_TABLE,
        c2: &Scalar::from(count) * &RISTRETTO_BASEPOINT_TABLE + r * key.0,
    }
}

/// Decrypt with the full secret key, decoding counters up to `max_count`
pub fn decrypt(
    secret: &ElectionSecretKey,
    ciphertext: &Ciphertext,
    max_count: u64,
) -> Result<u64, Error> {
    let plaintext_point = ciphertext.c2 - secret.0 * ciphertext.c1;
    decode_count(&plaintext_point, max_count)
}

/// Recover a counter from `count * G` by walking the exponent up to `max_count`
pub fn decode_count(point: &RistrettoPoint, max_count: u64) -> Result<u64, Error> {
    let mut accumulator = RistrettoPoint::identity();
    for count in 0..=max_count {
        if accumulator == *point {
            return Ok(count);
        }
        accumulator += RISTRETTO_BASEPOINT_POINT;
    }
    Err(Error::TallyDecodeFailed)
}

/// Draw a uniform scalar from the given CSPRNG
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order_wide(&bytes)
}
