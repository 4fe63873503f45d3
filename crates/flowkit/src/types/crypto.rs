//! Cryptographic key types for Flow accounts.
//!
//! Flow accounts are controlled by ECDSA keys on either the NIST P-256 or
//! the secp256k1 curve, each paired with the hash algorithm used to digest
//! messages before signing.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use hmac::{Hmac, Mac};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::error::{ParseKeyError, SignerError};

/// Minimum seed length accepted for deterministic key generation.
pub const MIN_SEED_LENGTH: usize = 32;

/// Maximum seed length accepted for deterministic key generation.
pub const MAX_SEED_LENGTH: usize = 256;

// ============================================================================
// Algorithms
// ============================================================================

/// Signature algorithm of an account key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SignatureAlgorithm {
    #[default]
    EcdsaP256,
    EcdsaSecp256k1,
}

impl SignatureAlgorithm {
    /// Canonical name used in configuration and the access API.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaP256 => "ECDSA_P256",
            SignatureAlgorithm::EcdsaSecp256k1 => "ECDSA_secp256k1",
        }
    }

    /// Raw value of the Cadence `SignatureAlgorithm` enum case.
    pub const fn cadence_raw_value(&self) -> u8 {
        match self {
            SignatureAlgorithm::EcdsaP256 => 1,
            SignatureAlgorithm::EcdsaSecp256k1 => 2,
        }
    }

    /// Length of a raw private key scalar.
    pub const fn private_key_len(&self) -> usize {
        32
    }

    /// Length of a raw public key (uncompressed, without the SEC1 tag).
    pub const fn public_key_len(&self) -> usize {
        64
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ECDSA_P256" | "P256" | "P-256" => Ok(SignatureAlgorithm::EcdsaP256),
            "ECDSA_SECP256K1" | "SECP256K1" => Ok(SignatureAlgorithm::EcdsaSecp256k1),
            _ => Err(ParseKeyError::UnknownSignatureAlgorithm(s.to_string())),
        }
    }
}

impl Serialize for SignatureAlgorithm {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignatureAlgorithm {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash algorithm paired with an account key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha3_256,
    Sha2_256,
}

impl HashAlgorithm {
    /// Canonical name used in configuration and the access API.
    pub const fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha2_256 => "SHA2_256",
            HashAlgorithm::Sha3_256 => "SHA3_256",
        }
    }

    /// Raw value of the Cadence `HashAlgorithm` enum case.
    pub const fn cadence_raw_value(&self) -> u8 {
        match self {
            HashAlgorithm::Sha2_256 => 1,
            HashAlgorithm::Sha3_256 => 3,
        }
    }

    /// Digest `message`.
    pub fn digest(&self, message: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        match self {
            HashAlgorithm::Sha2_256 => out.copy_from_slice(&Sha256::digest(message)),
            HashAlgorithm::Sha3_256 => out.copy_from_slice(&Sha3_256::digest(message)),
        }
        out
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHA2_256" | "SHA256" => Ok(HashAlgorithm::Sha2_256),
            "SHA3_256" => Ok(HashAlgorithm::Sha3_256),
            _ => Err(ParseKeyError::UnknownHashAlgorithm(s.to_string())),
        }
    }
}

impl Serialize for HashAlgorithm {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HashAlgorithm {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ParseKeyError> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| ParseKeyError::InvalidHex(e.to_string()))
}

// ============================================================================
// PublicKey
// ============================================================================

/// An ECDSA public key in raw `x || y` form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    algorithm: SignatureAlgorithm,
    bytes: [u8; 64],
}

impl PublicKey {
    /// Decode raw key bytes, accepting `x || y` or the SEC1 uncompressed form.
    ///
    /// The point is validated against the curve.
    pub fn from_bytes(algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Self, ParseKeyError> {
        let raw = match data.len() {
            64 => data,
            65 if data[0] == 0x04 => &data[1..],
            len => {
                return Err(ParseKeyError::InvalidLength {
                    expected: 64,
                    actual: len,
                });
            }
        };

        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(raw);
        let on_curve = match algorithm {
            SignatureAlgorithm::EcdsaP256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1).is_ok(),
            SignatureAlgorithm::EcdsaSecp256k1 => {
                k256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1).is_ok()
            }
        };
        if !on_curve {
            return Err(ParseKeyError::InvalidCurvePoint);
        }

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(raw);
        Ok(Self { algorithm, bytes })
    }

    /// Decode a hex-encoded key, with or without `0x`.
    pub fn from_hex(algorithm: SignatureAlgorithm, s: &str) -> Result<Self, ParseKeyError> {
        Self::from_bytes(algorithm, &decode_hex(s)?)
    }

    /// Signature algorithm of this key.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Raw `x || y` bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Hex encoding of the raw bytes, as stored on chain.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Verify `signature` over `message` digested with `hash`.
    pub fn verify(&self, signature: &Signature, message: &[u8], hash: HashAlgorithm) -> bool {
        let digest = hash.digest(message);
        let mut sec1 = [0u8; 65];
        sec1[0] = 0x04;
        sec1[1..].copy_from_slice(&self.bytes);

        match self.algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                let Ok(key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1) else {
                    return false;
                };
                let Ok(sig) = p256::ecdsa::Signature::from_slice(signature.as_bytes()) else {
                    return false;
                };
                key.verify_prehash(&digest, &sig).is_ok()
            }
            SignatureAlgorithm::EcdsaSecp256k1 => {
                let Ok(key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1) else {
                    return false;
                };
                let Ok(sig) = k256::ecdsa::Signature::from_slice(signature.as_bytes()) else {
                    return false;
                };
                key.verify_prehash(&digest, &sig).is_ok()
            }
        }
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}, {})", self.algorithm, self)
    }
}

// ============================================================================
// PrivateKey
// ============================================================================

#[derive(Clone)]
enum SigningKey {
    P256(p256::ecdsa::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
}

/// An ECDSA private key.
///
/// The `Debug` implementation never prints key material.
#[derive(Clone)]
pub struct PrivateKey {
    algorithm: SignatureAlgorithm,
    key: SigningKey,
}

impl PrivateKey {
    /// Generate a random key.
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        let key = match algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                SigningKey::P256(p256::ecdsa::SigningKey::random(&mut OsRng))
            }
            SignatureAlgorithm::EcdsaSecp256k1 => {
                SigningKey::Secp256k1(k256::ecdsa::SigningKey::random(&mut OsRng))
            }
        };
        Self { algorithm, key }
    }

    /// Deterministically derive a key from `seed`.
    ///
    /// The seed must be between [`MIN_SEED_LENGTH`] and [`MAX_SEED_LENGTH`]
    /// bytes. The seed is stretched with HKDF-SHA256; candidates that are not
    /// valid scalars are skipped by bumping the expansion counter.
    pub fn from_seed(algorithm: SignatureAlgorithm, seed: &[u8]) -> Result<Self, SignerError> {
        if seed.len() < MIN_SEED_LENGTH {
            return Err(SignerError::SeedTooShort {
                min: MIN_SEED_LENGTH,
                actual: seed.len(),
            });
        }
        if seed.len() > MAX_SEED_LENGTH {
            return Err(SignerError::InvalidKey(format!(
                "seed must be at most {} bytes, got {}",
                MAX_SEED_LENGTH,
                seed.len()
            )));
        }

        let prk = hkdf_extract(algorithm.as_str().as_bytes(), seed)?;
        for counter in 1..=u8::MAX {
            let candidate = hkdf_expand_block(&prk, counter)?;
            if let Ok(key) = Self::from_bytes(algorithm, &candidate) {
                return Ok(key);
            }
        }
        Err(SignerError::KeyDerivationFailed(
            "no valid scalar could be derived from the seed".to_string(),
        ))
    }

    /// Decode a raw 32-byte scalar.
    pub fn from_bytes(algorithm: SignatureAlgorithm, bytes: &[u8]) -> Result<Self, ParseKeyError> {
        if bytes.len() != algorithm.private_key_len() {
            return Err(ParseKeyError::InvalidLength {
                expected: algorithm.private_key_len(),
                actual: bytes.len(),
            });
        }
        let key = match algorithm {
            SignatureAlgorithm::EcdsaP256 => SigningKey::P256(
                p256::ecdsa::SigningKey::from_slice(bytes)
                    .map_err(|_| ParseKeyError::InvalidScalar(algorithm))?,
            ),
            SignatureAlgorithm::EcdsaSecp256k1 => SigningKey::Secp256k1(
                k256::ecdsa::SigningKey::from_slice(bytes)
                    .map_err(|_| ParseKeyError::InvalidScalar(algorithm))?,
            ),
        };
        Ok(Self { algorithm, key })
    }

    /// Decode a hex-encoded scalar, with or without `0x`.
    pub fn from_hex(algorithm: SignatureAlgorithm, s: &str) -> Result<Self, ParseKeyError> {
        Self::from_bytes(algorithm, &decode_hex(s)?)
    }

    /// Signature algorithm of this key.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Raw scalar bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        match &self.key {
            SigningKey::P256(k) => out.copy_from_slice(&k.to_bytes()),
            SigningKey::Secp256k1(k) => out.copy_from_slice(&k.to_bytes()),
        }
        out
    }

    /// Hex encoding of the scalar, without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Derive the public key.
    pub fn public_key(&self) -> PublicKey {
        let point = match &self.key {
            SigningKey::P256(k) => k.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            SigningKey::Secp256k1(k) => {
                k.verifying_key().to_encoded_point(false).as_bytes().to_vec()
            }
        };
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&point[1..]);
        PublicKey {
            algorithm: self.algorithm,
            bytes,
        }
    }

    /// Sign `message` digested with `hash`, returning raw `r || s`.
    pub fn sign(&self, message: &[u8], hash: HashAlgorithm) -> Result<Signature, SignerError> {
        let digest = hash.digest(message);
        let bytes = match &self.key {
            SigningKey::P256(k) => {
                let sig: p256::ecdsa::Signature = k
                    .sign_prehash(&digest)
                    .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
                sig.to_bytes().to_vec()
            }
            SigningKey::Secp256k1(k) => {
                let sig: k256::ecdsa::Signature = k
                    .sign_prehash(&digest)
                    .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
                sig.to_bytes().to_vec()
            }
        };
        Ok(Signature(bytes))
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PrivateKey {}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({}, ***)", self.algorithm)
    }
}

type HmacSha256 = Hmac<Sha256>;

fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Result<[u8; 32], SignerError> {
    let mut mac = HmacSha256::new_from_slice(salt)
        .map_err(|e| SignerError::KeyDerivationFailed(e.to_string()))?;
    mac.update(ikm);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn hkdf_expand_block(prk: &[u8; 32], counter: u8) -> Result<[u8; 32], SignerError> {
    let mut mac = HmacSha256::new_from_slice(prk)
        .map_err(|e| SignerError::KeyDerivationFailed(e.to_string()))?;
    mac.update(&[counter]);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

// ============================================================================
// Signature
// ============================================================================

/// A raw ECDSA signature (`r || s`).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding of the signature.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl FromStr for Signature {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_hex(s)?))
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P256_SCALAR: &str = "21c4f269ef0a5fd1badf47eeacebeeaa3de22eb8e5b0adcd0f27dd99d34d0119";

    #[test]
    fn test_algorithm_names() {
        assert_eq!(
            "ECDSA_P256".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::EcdsaP256
        );
        assert_eq!(
            "ECDSA_secp256k1".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::EcdsaSecp256k1
        );
        assert_eq!("SHA3_256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha3_256);
        assert!("BLS_BLS12_381".parse::<SignatureAlgorithm>().is_err());
        assert!("KECCAK".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_sign_and_verify_all_combinations() {
        for algo in [SignatureAlgorithm::EcdsaP256, SignatureAlgorithm::EcdsaSecp256k1] {
            for hash in [HashAlgorithm::Sha2_256, HashAlgorithm::Sha3_256] {
                let key = PrivateKey::generate(algo);
                let sig = key.sign(b"hello flow", hash).unwrap();
                assert_eq!(sig.as_bytes().len(), 64);
                let public = key.public_key();
                assert!(public.verify(&sig, b"hello flow", hash));
                assert!(!public.verify(&sig, b"hello flaw", hash));
            }
        }
    }

    #[test]
    fn test_private_key_hex_roundtrip() {
        let key = PrivateKey::from_hex(SignatureAlgorithm::EcdsaP256, P256_SCALAR).unwrap();
        assert_eq!(key.to_hex(), P256_SCALAR);
        let prefixed = format!("0x{}", P256_SCALAR);
        assert_eq!(
            PrivateKey::from_hex(SignatureAlgorithm::EcdsaP256, &prefixed).unwrap(),
            key
        );
    }

    #[test]
    fn test_private_key_rejects_zero_and_bad_length() {
        assert!(matches!(
            PrivateKey::from_bytes(SignatureAlgorithm::EcdsaP256, &[0u8; 32]),
            Err(ParseKeyError::InvalidScalar(_))
        ));
        assert!(matches!(
            PrivateKey::from_bytes(SignatureAlgorithm::EcdsaSecp256k1, &[1u8; 31]),
            Err(ParseKeyError::InvalidLength { expected: 32, actual: 31 })
        ));
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let key = PrivateKey::generate(SignatureAlgorithm::EcdsaSecp256k1);
        let public = key.public_key();
        let parsed = PublicKey::from_hex(SignatureAlgorithm::EcdsaSecp256k1, &public.to_hex()).unwrap();
        assert_eq!(parsed, public);

        let tagged = format!("04{}", public.to_hex());
        let parsed = PublicKey::from_hex(SignatureAlgorithm::EcdsaSecp256k1, &tagged).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn test_public_key_rejects_off_curve_point() {
        let result = PublicKey::from_bytes(SignatureAlgorithm::EcdsaP256, &[1u8; 64]);
        assert_eq!(result, Err(ParseKeyError::InvalidCurvePoint));
    }

    #[test]
    fn test_from_seed_is_deterministic() {
        let seed = [7u8; 32];
        let a = PrivateKey::from_seed(SignatureAlgorithm::EcdsaP256, &seed).unwrap();
        let b = PrivateKey::from_seed(SignatureAlgorithm::EcdsaP256, &seed).unwrap();
        assert_eq!(a, b);

        let c = PrivateKey::from_seed(SignatureAlgorithm::EcdsaSecp256k1, &seed).unwrap();
        assert_ne!(a.to_bytes(), c.to_bytes());
    }

    #[test]
    fn test_from_seed_rejects_short_seed() {
        let err = PrivateKey::from_seed(SignatureAlgorithm::EcdsaP256, &[1u8; 16]).unwrap_err();
        assert_eq!(err, SignerError::SeedTooShort { min: 32, actual: 16 });
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = PrivateKey::from_hex(SignatureAlgorithm::EcdsaP256, P256_SCALAR).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains(P256_SCALAR));
        assert!(debug.contains("***"));
    }
}
