// Hex adapters for use in `#[serde(with)]`
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::PublicKey;
use ed25519_dalek::Signature;
use std::borrow::Cow;
use std::convert::TryInto;

pub use hex_buffer_serde::Hex;

// a single-purpose type for use in `#[serde(with)]`
pub enum EdPublicKeyHex {}

impl Hex<PublicKey> for EdPublicKeyHex {
    type Error = String;

    fn create_bytes(public_key: &PublicKey) -> Cow<[u8]> {
        public_key.as_ref().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<PublicKey, String> {
        PublicKey::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum EdSignatureHex {}

impl Hex<Signature> for EdSignatureHex {
    type Error = String;

    fn create_bytes(sig: &Signature) -> Cow<[u8]> {
        let bytes = sig.to_bytes().to_vec();
        Cow::from(bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Signature, String> {
        Signature::from_bytes(bytes).map_err(|e| format!("{}", e))
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum RistrettoHex {}

impl Hex<RistrettoPoint> for RistrettoHex {
    type Error = String;

    fn create_bytes(point: &RistrettoPoint) -> Cow<[u8]> {
        Cow::from(point.compress().to_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<RistrettoPoint, String> {
        if bytes.len() != 32 {
            return Err("ristretto point must be 32 bytes".to_string());
        }
        CompressedRistretto::from_slice(bytes)
            .decompress()
            .ok_or_else(|| "malformed ristretto point".to_string())
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum ScalarHex {}

impl Hex<Scalar> for ScalarHex {
    type Error = String;

    fn create_bytes(scalar: &Scalar) -> Cow<[u8]> {
        Cow::from(scalar.to_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Scalar, String> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "scalar must be 32 bytes".to_string())?;
        Scalar::from_canonical_bytes(bytes).ok_or_else(|| "non-canonical scalar".to_string())
    }
}

// a single-purpose type for use in `#[serde(with)]`
pub enum BytesHex {}

impl Hex<Vec<u8>> for BytesHex {
    type Error = String;

    fn create_bytes(bytes: &Vec<u8>) -> Cow<[u8]> {
        Cow::from(bytes.as_slice())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Vec<u8>, String> {
        Ok(bytes.to_vec())
    }
}
