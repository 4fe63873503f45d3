//! Account keys.
//!
//! An [`AccountKey`] describes where the private half of an account key
//! lives (inline hex, a key file, Google Cloud KMS or a BIP-44 mnemonic) and
//! turns it into a [`Signer`] on demand.

mod derivation;
mod kms;

pub use derivation::{
    DerivationPath, derive_private_key_from_mnemonic, derive_private_key_from_seed,
    generate_mnemonic,
};
pub use kms::{ACCESS_TOKEN_ENV, CREDENTIALS_ENV, KmsResourceId, KmsSigner, validate_credentials};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::{DEFAULT_DERIVATION_PATH, KeyConfig, KeyType};
use crate::error::{Error, SignerError};
use crate::rw::{PRIVATE_FILE_MODE, SharedReaderWriter};
use crate::signer::{InMemorySigner, Signer};
use crate::types::{HashAlgorithm, PrivateKey, SignatureAlgorithm};

/// Where a key's private half is kept.
#[derive(Clone)]
pub enum KeySource {
    Hex(PrivateKey),
    File {
        location: PathBuf,
        rw: SharedReaderWriter,
    },
    GoogleKms(KmsResourceId),
    Bip44 {
        mnemonic: String,
        derivation_path: String,
    },
}

/// An account key: its index on the account, its algorithms and its source.
#[derive(Clone)]
pub struct AccountKey {
    index: u32,
    sig_algo: SignatureAlgorithm,
    hash_algo: HashAlgorithm,
    source: KeySource,
}

impl AccountKey {
    /// An inline key at index 0.
    pub fn hex(private_key: PrivateKey, hash_algo: HashAlgorithm) -> Self {
        Self {
            index: 0,
            sig_algo: private_key.algorithm(),
            hash_algo,
            source: KeySource::Hex(private_key),
        }
    }

    /// A key read from `location` through `rw` when needed.
    pub fn file(
        location: impl Into<PathBuf>,
        sig_algo: SignatureAlgorithm,
        hash_algo: HashAlgorithm,
        rw: SharedReaderWriter,
    ) -> Self {
        Self {
            index: 0,
            sig_algo,
            hash_algo,
            source: KeySource::File {
                location: location.into(),
                rw,
            },
        }
    }

    /// A key held in Google Cloud KMS.
    pub fn kms(resource_id: KmsResourceId, sig_algo: SignatureAlgorithm, hash_algo: HashAlgorithm) -> Self {
        Self {
            index: 0,
            sig_algo,
            hash_algo,
            source: KeySource::GoogleKms(resource_id),
        }
    }

    /// A key derived from a mnemonic; `None` uses `m/44'/539'/0'/0/0`.
    pub fn bip44(
        mnemonic: impl Into<String>,
        derivation_path: Option<String>,
        sig_algo: SignatureAlgorithm,
        hash_algo: HashAlgorithm,
    ) -> Self {
        Self {
            index: 0,
            sig_algo,
            hash_algo,
            source: KeySource::Bip44 {
                mnemonic: mnemonic.into(),
                derivation_path: derivation_path.unwrap_or_else(|| DEFAULT_DERIVATION_PATH.to_string()),
            },
        }
    }

    /// Set the key index on the account.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Build from the stored form. File keys read through `rw`.
    pub fn from_config(config: &KeyConfig, rw: SharedReaderWriter) -> Result<Self, Error> {
        let missing = |field: &str| {
            Error::InvalidArgument(format!("{} key is missing {}", config.key_type, field))
        };

        let source = match config.key_type {
            KeyType::Hex => KeySource::Hex(
                config
                    .private_key
                    .clone()
                    .ok_or_else(|| missing("privateKey"))?,
            ),
            KeyType::File => KeySource::File {
                location: PathBuf::from(config.location.as_ref().ok_or_else(|| missing("location"))?),
                rw,
            },
            KeyType::GoogleKms => KeySource::GoogleKms(
                config
                    .resource_id
                    .as_ref()
                    .ok_or_else(|| missing("resourceID"))?
                    .parse()?,
            ),
            KeyType::Bip44 => KeySource::Bip44 {
                mnemonic: config.mnemonic.clone().ok_or_else(|| missing("mnemonic"))?,
                derivation_path: config
                    .derivation_path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DERIVATION_PATH.to_string()),
            },
        };

        Ok(Self {
            index: config.index,
            sig_algo: config.sig_algo,
            hash_algo: config.hash_algo,
            source,
        })
    }

    /// The stored form of this key.
    pub fn to_config(&self) -> KeyConfig {
        let mut config = KeyConfig {
            key_type: self.key_type(),
            index: self.index,
            sig_algo: self.sig_algo,
            hash_algo: self.hash_algo,
            private_key: None,
            location: None,
            resource_id: None,
            mnemonic: None,
            derivation_path: None,
        };
        match &self.source {
            KeySource::Hex(key) => config.private_key = Some(key.clone()),
            KeySource::File { location, .. } => {
                config.location = Some(location.to_string_lossy().into_owned())
            }
            KeySource::GoogleKms(id) => config.resource_id = Some(id.to_string()),
            KeySource::Bip44 {
                mnemonic,
                derivation_path,
            } => {
                config.mnemonic = Some(mnemonic.clone());
                if derivation_path != DEFAULT_DERIVATION_PATH {
                    config.derivation_path = Some(derivation_path.clone());
                }
            }
        }
        config
    }

    pub fn key_type(&self) -> KeyType {
        match self.source {
            KeySource::Hex(_) => KeyType::Hex,
            KeySource::File { .. } => KeyType::File,
            KeySource::GoogleKms(_) => KeyType::GoogleKms,
            KeySource::Bip44 { .. } => KeyType::Bip44,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn sig_algo(&self) -> SignatureAlgorithm {
        self.sig_algo
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    pub fn source(&self) -> &KeySource {
        &self.source
    }

    /// The private key, if it is available locally.
    ///
    /// KMS keys never expose their private half and return `None`.
    pub fn private_key(&self) -> Result<Option<PrivateKey>, Error> {
        match &self.source {
            KeySource::Hex(key) => Ok(Some(key.clone())),
            KeySource::File { location, rw } => read_key_file(rw, location, self.sig_algo).map(Some),
            KeySource::GoogleKms(_) => Ok(None),
            KeySource::Bip44 {
                mnemonic,
                derivation_path,
            } => Ok(Some(derive_private_key_from_mnemonic(
                mnemonic,
                self.sig_algo,
                Some(derivation_path.as_str()),
            )?)),
        }
    }

    /// Build a signer for this key. KMS keys contact the KMS service.
    pub async fn signer(&self) -> Result<Arc<dyn Signer>, Error> {
        if let KeySource::GoogleKms(id) = &self.source {
            let signer = KmsSigner::connect(id.clone(), self.sig_algo, self.hash_algo).await?;
            return Ok(Arc::new(signer));
        }
        let private_key = self
            .private_key()?
            .ok_or_else(|| SignerError::InvalidKey("key has no local private key".to_string()))?;
        Ok(Arc::new(InMemorySigner::new(private_key, self.hash_algo)))
    }

    /// Check the key can be used without signing anything.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.source {
            KeySource::GoogleKms(_) => Ok(validate_credentials()?),
            _ => self.private_key().map(|_| ()),
        }
    }

    /// Write the private key to `location` (mode 0600) and return the
    /// equivalent file key.
    pub fn extract_to_file(&self, location: impl AsRef<Path>, rw: SharedReaderWriter) -> Result<Self, Error> {
        let private_key = self.private_key()?.ok_or_else(|| {
            SignerError::InvalidKey("a KMS key cannot be written to a file".to_string())
        })?;
        let location = location.as_ref();
        rw.write_file(location, private_key.to_hex().as_bytes(), PRIVATE_FILE_MODE)
            .map_err(|e| Error::InvalidArgument(format!("writing {}: {}", location.display(), e)))?;
        debug!(path = %location.display(), "extracted private key to file");

        Ok(Self {
            index: self.index,
            sig_algo: self.sig_algo,
            hash_algo: self.hash_algo,
            source: KeySource::File {
                location: location.to_path_buf(),
                rw,
            },
        })
    }
}

fn read_key_file(
    rw: &SharedReaderWriter,
    location: &Path,
    sig_algo: SignatureAlgorithm,
) -> Result<PrivateKey, Error> {
    let raw = rw.read_file(location).map_err(|e| {
        SignerError::InvalidKey(format!(
            "could not read key file {}: {}",
            location.display(),
            e
        ))
    })?;
    let hex = String::from_utf8_lossy(&raw);
    Ok(PrivateKey::from_hex(sig_algo, hex.trim())?)
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            KeySource::Hex(_) => "hex".to_string(),
            KeySource::File { location, .. } => format!("file({})", location.display()),
            KeySource::GoogleKms(id) => format!("google-kms({})", id),
            KeySource::Bip44 {
                derivation_path, ..
            } => format!("bip44({})", derivation_path),
        };
        f.debug_struct("AccountKey")
            .field("index", &self.index)
            .field("sig_algo", &self.sig_algo)
            .field("hash_algo", &self.hash_algo)
            .field("source", &source)
            .finish()
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Generate a key, randomly or deterministically from `seed`.
pub fn generate_key(sig_algo: SignatureAlgorithm, seed: Option<&[u8]>) -> Result<PrivateKey, Error> {
    match seed {
        Some(seed) => Ok(PrivateKey::from_seed(sig_algo, seed)?),
        None => Ok(PrivateKey::generate(sig_algo)),
    }
}

/// Generate a mnemonic and the key it derives along `path`.
pub fn generate_mnemonic_key(
    sig_algo: SignatureAlgorithm,
    path: Option<&str>,
) -> Result<(PrivateKey, String), Error> {
    let mnemonic = generate_mnemonic()?;
    let key = derive_private_key_from_mnemonic(&mnemonic, sig_algo, path)?;
    Ok((key, mnemonic))
}
