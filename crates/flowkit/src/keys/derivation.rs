//! Mnemonic keys and SLIP-0010 derivation for ECDSA curves.

use std::fmt::{self, Display};
use std::str::FromStr;

use bip39::Mnemonic;
use hmac::{Hmac, Mac};
use p256::elliptic_curve::ff::{Field, PrimeField};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha512;

use crate::config::DEFAULT_DERIVATION_PATH;
use crate::error::SignerError;
use crate::types::{PrivateKey, SignatureAlgorithm};

/// Entropy for generated mnemonics, giving 12 words.
const MNEMONIC_ENTROPY_BYTES: usize = 16;

const HARDENED_OFFSET: u32 = 0x8000_0000;

type HmacSha512 = Hmac<Sha512>;

/// A BIP-32 derivation path such as `m/44'/539'/0'/0/0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    /// Child indexes, hardened ones offset by 2^31.
    pub fn indexes(&self) -> &[u32] {
        &self.0
    }
}

impl Default for DerivationPath {
    fn default() -> Self {
        // 44'/539'/0'/0/0
        Self(vec![
            44 + HARDENED_OFFSET,
            539 + HARDENED_OFFSET,
            HARDENED_OFFSET,
            0,
            0,
        ])
    }
}

impl FromStr for DerivationPath {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SignerError::InvalidDerivationPath(s.to_string());
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(invalid());
        }

        let mut indexes = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits.parse().map_err(|_| invalid())?;
            if index >= HARDENED_OFFSET {
                return Err(invalid());
            }
            indexes.push(if hardened { index + HARDENED_OFFSET } else { index });
        }
        Ok(Self(indexes))
    }
}

impl Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in &self.0 {
            if *index >= HARDENED_OFFSET {
                write!(f, "/{}'", index - HARDENED_OFFSET)?;
            } else {
                write!(f, "/{}", index)?;
            }
        }
        Ok(())
    }
}

/// Generate a fresh 12-word mnemonic.
pub fn generate_mnemonic() -> Result<String, SignerError> {
    let mut entropy = [0u8; MNEMONIC_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| SignerError::KeyDerivationFailed(format!("Failed to generate mnemonic: {}", e)))?;
    Ok(mnemonic.to_string())
}

/// Derive a key from a BIP-39 mnemonic along `path`
/// (default `m/44'/539'/0'/0/0`).
///
/// Whitespace and case in the phrase are normalized first.
pub fn derive_private_key_from_mnemonic(
    mnemonic: &str,
    algorithm: SignatureAlgorithm,
    path: Option<&str>,
) -> Result<PrivateKey, SignerError> {
    let normalized = mnemonic
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mnemonic: Mnemonic = normalized
        .parse()
        .map_err(|e: bip39::Error| SignerError::InvalidMnemonic(e.to_string()))?;
    let seed = mnemonic.to_seed("");
    derive_private_key_from_seed(&seed, algorithm, path)
}

/// Derive a key from a BIP-39 seed along `path` with SLIP-0010.
pub fn derive_private_key_from_seed(
    seed: &[u8],
    algorithm: SignatureAlgorithm,
    path: Option<&str>,
) -> Result<PrivateKey, SignerError> {
    let path: DerivationPath = path.unwrap_or(DEFAULT_DERIVATION_PATH).parse()?;

    let (mut key, mut chain_code) = master_key(algorithm, seed)?;
    for index in path.indexes() {
        (key, chain_code) = derive_child(algorithm, &key, &chain_code, *index)?;
    }

    PrivateKey::from_bytes(algorithm, &key)
        .map_err(|e| SignerError::KeyDerivationFailed(e.to_string()))
}

fn curve_seed(algorithm: SignatureAlgorithm) -> &'static [u8] {
    match algorithm {
        SignatureAlgorithm::EcdsaP256 => b"Nist256p1 seed",
        SignatureAlgorithm::EcdsaSecp256k1 => b"Bitcoin seed",
    }
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<([u8; 32], [u8; 32]), SignerError> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| SignerError::KeyDerivationFailed(e.to_string()))?;
    mac.update(data);
    let out = mac.finalize().into_bytes();
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&out[..32]);
    right.copy_from_slice(&out[32..]);
    Ok((left, right))
}

fn master_key(algorithm: SignatureAlgorithm, seed: &[u8]) -> Result<([u8; 32], [u8; 32]), SignerError> {
    let mut data = seed.to_vec();
    loop {
        let (il, ir) = hmac_sha512(curve_seed(algorithm), &data)?;
        if is_valid_scalar(algorithm, &il) {
            return Ok((il, ir));
        }
        data = [il, ir].concat();
    }
}

fn derive_child(
    algorithm: SignatureAlgorithm,
    key: &[u8; 32],
    chain_code: &[u8; 32],
    index: u32,
) -> Result<([u8; 32], [u8; 32]), SignerError> {
    let mut data = Vec::with_capacity(37);
    if index >= HARDENED_OFFSET {
        data.push(0);
        data.extend_from_slice(key);
    } else {
        data.extend_from_slice(&compressed_public_key(algorithm, key)?);
    }
    data.extend_from_slice(&index.to_be_bytes());

    loop {
        let (il, ir) = hmac_sha512(chain_code, &data)?;
        if let Some(child) = add_scalars(algorithm, &il, key) {
            return Ok((child, ir));
        }
        data.clear();
        data.push(1);
        data.extend_from_slice(&ir);
        data.extend_from_slice(&index.to_be_bytes());
    }
}

fn is_valid_scalar(algorithm: SignatureAlgorithm, bytes: &[u8; 32]) -> bool {
    match algorithm {
        SignatureAlgorithm::EcdsaP256 => Option::<p256::Scalar>::from(p256::Scalar::from_repr((*bytes).into()))
            .is_some_and(|s| !bool::from(s.is_zero())),
        SignatureAlgorithm::EcdsaSecp256k1 => {
            Option::<k256::Scalar>::from(k256::Scalar::from_repr((*bytes).into()))
                .is_some_and(|s| !bool::from(s.is_zero()))
        }
    }
}

/// `(il + key) mod n`, or `None` if `il` is out of range or the sum is zero.
fn add_scalars(algorithm: SignatureAlgorithm, il: &[u8; 32], key: &[u8; 32]) -> Option<[u8; 32]> {
    let mut out = [0u8; 32];
    match algorithm {
        SignatureAlgorithm::EcdsaP256 => {
            let a = Option::<p256::Scalar>::from(p256::Scalar::from_repr((*il).into()))?;
            let b = Option::<p256::Scalar>::from(p256::Scalar::from_repr((*key).into()))?;
            let sum = a + b;
            if bool::from(sum.is_zero()) {
                return None;
            }
            out.copy_from_slice(&sum.to_repr());
        }
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let a = Option::<k256::Scalar>::from(k256::Scalar::from_repr((*il).into()))?;
            let b = Option::<k256::Scalar>::from(k256::Scalar::from_repr((*key).into()))?;
            let sum = a + b;
            if bool::from(sum.is_zero()) {
                return None;
            }
            out.copy_from_slice(&sum.to_repr());
        }
    }
    Some(out)
}

fn compressed_public_key(algorithm: SignatureAlgorithm, key: &[u8; 32]) -> Result<Vec<u8>, SignerError> {
    let invalid = |e: p256::ecdsa::Error| SignerError::KeyDerivationFailed(e.to_string());
    let point = match algorithm {
        SignatureAlgorithm::EcdsaP256 => p256::ecdsa::SigningKey::from_slice(key)
            .map_err(invalid)?
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec(),
        SignatureAlgorithm::EcdsaSecp256k1 => k256::ecdsa::SigningKey::from_slice(key)
            .map_err(invalid)?
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec(),
    };
    Ok(point)
}
