//! Signer trait and the in-memory implementation.
//!
//! A [`Signer`] produces raw ECDSA signatures over transaction messages.
//! Signing is asynchronous so remote backends such as Google Cloud KMS fit
//! the same interface as keys held in memory.
//!
//! # Example
//!
//! ```rust
//! use flowkit::{HashAlgorithm, InMemorySigner, PrivateKey, SignatureAlgorithm, Signer};
//!
//! # async fn example() -> Result<(), flowkit::Error> {
//! let key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
//! let signer = InMemorySigner::new(key, HashAlgorithm::Sha3_256);
//!
//! let signature = signer.sign(b"message").await?;
//! assert!(signer.public_key().verify(&signature, b"message", HashAlgorithm::Sha3_256));
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::SignerError;
use crate::types::{HashAlgorithm, PrivateKey, PublicKey, Signature};

/// Future returned by [`Signer::sign`].
pub type SignFuture<'a> = Pin<Box<dyn Future<Output = Result<Signature, SignerError>> + Send + 'a>>;

/// Something that can sign with one account key.
pub trait Signer: Send + Sync {
    /// Public half of the signing key.
    fn public_key(&self) -> &PublicKey;

    /// Hash algorithm applied to messages before signing.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Sign `message`, returning raw `r || s`.
    fn sign<'a>(&'a self, message: &'a [u8]) -> SignFuture<'a>;
}

impl Signer for Arc<dyn Signer> {
    fn public_key(&self) -> &PublicKey {
        (**self).public_key()
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        (**self).hash_algorithm()
    }

    fn sign<'a>(&'a self, message: &'a [u8]) -> SignFuture<'a> {
        (**self).sign(message)
    }
}

// ============================================================================
// InMemorySigner
// ============================================================================

/// A signer holding its private key in memory.
#[derive(Clone)]
pub struct InMemorySigner {
    private_key: PrivateKey,
    public_key: PublicKey,
    hash_algo: HashAlgorithm,
}

impl InMemorySigner {
    pub fn new(private_key: PrivateKey, hash_algo: HashAlgorithm) -> Self {
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
            hash_algo,
        }
    }
}

impl std::fmt::Debug for InMemorySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySigner")
            .field("public_key", &self.public_key)
            .field("hash_algo", &self.hash_algo)
            .finish()
    }
}

impl Signer for InMemorySigner {
    fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algo
    }

    fn sign<'a>(&'a self, message: &'a [u8]) -> SignFuture<'a> {
        let result = self.private_key.sign(message, self.hash_algo);
        Box::pin(async move { result })
    }
}
