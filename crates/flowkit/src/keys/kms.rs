//! Google Cloud KMS keys.
//!
//! Signing goes through the Cloud KMS REST API. Credentials come from an
//! explicit access token in `GOOGLE_OAUTH_ACCESS_TOKEN`, or from the
//! application default credentials written by `gcloud auth
//! application-default login`.

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use p256::pkcs8::DecodePublicKey;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SignerError;
use crate::signer::{SignFuture, Signer};
use crate::types::{HashAlgorithm, PublicKey, Signature, SignatureAlgorithm};

const KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com/v1";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Environment variable holding a ready-to-use OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Environment variable pointing at a credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Environment variables naming a project explicitly.
const PROJECT_ENVS: [&str; 2] = ["GOOGLE_CLOUD_PROJECT", "CLOUDSDK_CORE_PROJECT"];

/// Fully qualified KMS key version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KmsResourceId {
    pub project_id: String,
    pub location: String,
    pub key_ring: String,
    pub key: String,
    pub version: String,
}

impl FromStr for KmsResourceId {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().trim_start_matches('/').split('/').collect();
        match parts.as_slice() {
            [
                "projects",
                project,
                "locations",
                location,
                "keyRings",
                ring,
                "cryptoKeys",
                key,
                "cryptoKeyVersions",
                version,
            ] if [project, location, ring, key, version].iter().all(|p| !p.is_empty()) => {
                Ok(Self {
                    project_id: project.to_string(),
                    location: location.to_string(),
                    key_ring: ring.to_string(),
                    key: key.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(SignerError::InvalidKey(format!(
                "'{}' is not a KMS key version, expected projects/<p>/locations/<l>/keyRings/<r>/cryptoKeys/<k>/cryptoKeyVersions/<v>",
                s
            ))),
        }
    }
}

impl Display for KmsResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}/cryptoKeyVersions/{}",
            self.project_id, self.location, self.key_ring, self.key, self.version
        )
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Where an access token comes from.
#[derive(Clone)]
enum Credentials {
    AccessToken(String),
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(rename = "type")]
    kind: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
}

fn adc_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CREDENTIALS_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("gcloud").join("application_default_credentials.json"))
}

/// Check that KMS credentials or an explicit project can be found locally.
pub fn validate_credentials() -> Result<(), SignerError> {
    if std::env::var(ACCESS_TOKEN_ENV).is_ok() {
        return Ok(());
    }
    if PROJECT_ENVS.iter().any(|name| std::env::var(name).is_ok()) {
        return Ok(());
    }
    match adc_path() {
        Some(path) if path.is_file() => Ok(()),
        Some(path) => Err(SignerError::KmsCredentials(format!(
            "no application default credentials at {}, run 'gcloud auth application-default login'",
            path.display()
        ))),
        None => Err(SignerError::KmsCredentials(
            "cannot locate the gcloud configuration directory".to_string(),
        )),
    }
}

fn discover_credentials() -> Result<Credentials, SignerError> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        return Ok(Credentials::AccessToken(token));
    }

    let path = adc_path().ok_or_else(|| {
        SignerError::KmsCredentials("cannot locate application default credentials".to_string())
    })?;
    let raw = std::fs::read(&path)
        .map_err(|e| SignerError::KmsCredentials(format!("{}: {}", path.display(), e)))?;
    let file: CredentialsFile = serde_json::from_slice(&raw)
        .map_err(|e| SignerError::KmsCredentials(format!("{}: {}", path.display(), e)))?;

    match (file.kind.as_str(), file.client_id, file.client_secret, file.refresh_token) {
        ("authorized_user", Some(client_id), Some(client_secret), Some(refresh_token)) => {
            Ok(Credentials::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            })
        }
        (kind, ..) => Err(SignerError::KmsCredentials(format!(
            "credentials of type '{}' are not supported, set {} or use user credentials",
            kind, ACCESS_TOKEN_ENV
        ))),
    }
}

// ============================================================================
// KmsSigner
// ============================================================================

/// Signs with a key held in Google Cloud KMS.
pub struct KmsSigner {
    resource_id: KmsResourceId,
    public_key: PublicKey,
    hash_algo: HashAlgorithm,
    http: reqwest::Client,
    credentials: Credentials,
    token: Mutex<Option<String>>,
}

impl KmsSigner {
    /// Resolve credentials and fetch the key's public half.
    pub async fn connect(
        resource_id: KmsResourceId,
        sig_algo: SignatureAlgorithm,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, SignerError> {
        let http = reqwest::Client::new();
        let credentials = discover_credentials()?;
        let token = fetch_access_token(&http, &credentials).await?;
        let public_key = fetch_public_key(&http, &token, &resource_id, sig_algo).await?;
        debug!(key = %resource_id, "connected KMS signer");

        Ok(Self {
            resource_id,
            public_key,
            hash_algo,
            http,
            credentials,
            token: Mutex::new(Some(token)),
        })
    }

    pub fn resource_id(&self) -> &KmsResourceId {
        &self.resource_id
    }

    async fn access_token(&self) -> Result<String, SignerError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = fetch_access_token(&self.http, &self.credentials).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next request refreshes it.
    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }
}

async fn fetch_access_token(
    http: &reqwest::Client,
    credentials: &Credentials,
) -> Result<String, SignerError> {
    request_access_token(http, TOKEN_ENDPOINT, credentials).await
}

async fn request_access_token(
    http: &reqwest::Client,
    endpoint: &str,
    credentials: &Credentials,
) -> Result<String, SignerError> {
    #[derive(Deserialize)]
    struct TokenResponse {
        access_token: String,
    }

    let (client_id, client_secret, refresh_token) = match credentials {
        Credentials::AccessToken(token) => return Ok(token.clone()),
        Credentials::AuthorizedUser {
            client_id,
            client_secret,
            refresh_token,
        } => (client_id, client_secret, refresh_token),
    };

    let form = [
        ("grant_type", "refresh_token"),
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
        ("refresh_token", refresh_token.as_str()),
    ];
    let response = http
        .post(endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| SignerError::KmsCredentials(e.to_string()))?;
    if !response.status().is_success() {
        return Err(SignerError::KmsCredentials(format!(
            "token refresh failed with status {}",
            response.status()
        )));
    }
    Ok(response
        .json::<TokenResponse>()
        .await
        .map_err(|e| SignerError::KmsCredentials(e.to_string()))?
        .access_token)
}

async fn fetch_public_key(
    http: &reqwest::Client,
    token: &str,
    resource_id: &KmsResourceId,
    sig_algo: SignatureAlgorithm,
) -> Result<PublicKey, SignerError> {
    #[derive(Deserialize)]
    struct PublicKeyResponse {
        pem: String,
    }

    let url = format!("{}/{}/publicKey", KMS_ENDPOINT, resource_id);
    let response = http
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| SignerError::Kms(e.to_string()))?;
    if !response.status().is_success() {
        return Err(SignerError::Kms(format!(
            "fetching public key failed with status {}",
            response.status()
        )));
    }
    let pem = response
        .json::<PublicKeyResponse>()
        .await
        .map_err(|e| SignerError::Kms(e.to_string()))?
        .pem;
    public_key_from_pem(sig_algo, &pem)
}

fn public_key_from_pem(sig_algo: SignatureAlgorithm, pem: &str) -> Result<PublicKey, SignerError> {
    let point = match sig_algo {
        SignatureAlgorithm::EcdsaP256 => p256::PublicKey::from_public_key_pem(pem)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?
            .to_sec1_bytes()
            .to_vec(),
        SignatureAlgorithm::EcdsaSecp256k1 => k256::PublicKey::from_public_key_pem(pem)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?
            .to_sec1_bytes()
            .to_vec(),
    };
    PublicKey::from_bytes(sig_algo, &point).map_err(|e| SignerError::InvalidKey(e.to_string()))
}

/// Convert a DER signature to raw `r || s` for `sig_algo`.
fn der_to_raw(sig_algo: SignatureAlgorithm, der: &[u8]) -> Result<Signature, SignerError> {
    let raw = match sig_algo {
        SignatureAlgorithm::EcdsaP256 => p256::ecdsa::Signature::from_der(der)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?
            .to_bytes()
            .to_vec(),
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let sig = k256::ecdsa::Signature::from_der(der)
                .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
            sig.normalize_s().unwrap_or(sig).to_bytes().to_vec()
        }
    };
    Ok(Signature::from_bytes(raw))
}

impl fmt::Debug for KmsSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsSigner")
            .field("resource_id", &self.resource_id.to_string())
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl Signer for KmsSigner {
    fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algo
    }

    fn sign<'a>(&'a self, message: &'a [u8]) -> SignFuture<'a> {
        Box::pin(async move {
            #[derive(Deserialize)]
            struct SignResponse {
                signature: String,
            }

            let digest = self.hash_algo.digest(message);
            let digest_field = match self.hash_algo {
                HashAlgorithm::Sha2_256 => "sha256",
                HashAlgorithm::Sha3_256 => {
                    return Err(SignerError::Kms(
                        "KMS keys only sign SHA2_256 digests".to_string(),
                    ));
                }
            };

            let token = self.access_token().await?;
            let url = format!("{}/{}:asymmetricSign", KMS_ENDPOINT, self.resource_id);
            let response = self
                .http
                .post(&url)
                .bearer_auth(token)
                .json(&json!({ "digest": { digest_field: BASE64.encode(digest) } }))
                .send()
                .await
                .map_err(|e| SignerError::Kms(e.to_string()))?;
            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            if !response.status().is_success() {
                return Err(SignerError::Kms(format!(
                    "asymmetricSign failed with status {}",
                    response.status()
                )));
            }
            let body: SignResponse = response
                .json()
                .await
                .map_err(|e| SignerError::Kms(e.to_string()))?;
            let der = BASE64
                .decode(body.signature)
                .map_err(|e| SignerError::Kms(e.to_string()))?;
            der_to_raw(self.public_key.algorithm(), &der)
        })
    }
}
