//! Error types for flowkit.
//!
//! # Error Hierarchy
//!
//! - [`Error`](enum@Error) - Main error type, returned by most operations
//!   - [`ConfigError`] - Loading, saving and validating project configuration
//!   - [`GatewayError`] - Access node transport and API failures
//!   - [`ParseAddressError`] - Invalid account address literal
//!   - [`ParseIdentifierError`] - Invalid transaction/block/collection ID
//!   - [`ParseKeyError`] - Invalid key or algorithm
//!   - [`SignerError`] - Signing, key derivation and KMS failures
//!   - [`ProgramError`] - Cadence source that cannot be analyzed
//!   - [`ImportError`] - Imports that cannot be resolved to an address
//!   - [`CyclicImportError`] - Contracts that import each other
//!
//! # Skipping unchanged contracts
//!
//! ```rust,no_run
//! # use flowkit::*;
//! # async fn example(kit: &Flowkit, account: &Account, script: Script) -> Result<(), Error> {
//! match kit.add_contract(account, script, UpdateContract::Update).await {
//!     Ok((id, _)) => println!("deployed in {}", id),
//!     Err(Error::UpdateNoDiff { contract }) => println!("{} unchanged, skipping", contract),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Address, Identifier, SignatureAlgorithm};

/// Error parsing an account address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseAddressError {
    #[error("Address '{0}' is not valid hex")]
    InvalidHex(String),

    #[error("Address '{0}' is too long (max 16 hex characters)")]
    TooLong(String),

    #[error("Address is empty")]
    Empty,
}

/// Error parsing a 32-byte identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseIdentifierError {
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("Invalid identifier length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Error parsing a key, signature or algorithm name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseKeyError {
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid private key: value is not a valid scalar for {0}")]
    InvalidScalar(SignatureAlgorithm),

    #[error("Invalid curve point: key bytes do not represent a valid point on the curve")]
    InvalidCurvePoint,

    #[error("Unknown signature algorithm: '{0}'")]
    UnknownSignatureAlgorithm(String),

    #[error("Unknown hash algorithm: '{0}'")]
    UnknownHashAlgorithm(String),

    #[error("Unknown key type: '{0}'")]
    UnknownKeyType(String),
}

/// Error during signing and key derivation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Unsupported curve for key derivation: {0}")]
    UnsupportedCurve(SignatureAlgorithm),

    #[error("Invalid derivation path '{0}'")]
    InvalidDerivationPath(String),

    #[error("Seed too short: at least {min} bytes required, got {actual}")]
    SeedTooShort { min: usize, actual: usize },

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Could not find Google Cloud credentials: {0}")]
    KmsCredentials(String),

    #[error("KMS request failed: {0}")]
    Kms(String),
}

/// Error loading, saving or validating a project configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file does not exist, searched: {}", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("Configuration file {0} uses an outdated format. Run 'flow config migrate' to upgrade it to the current format")]
    OutdatedFormat(PathBuf),

    #[error("Failed to parse configuration {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No configuration parser found for '{0}'")]
    UnsupportedFormat(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Account '{0}' could not be found")]
    AccountNotFound(String),

    #[error("Contract '{0}' could not be found")]
    ContractNotFound(String),

    #[error("Network '{0}' could not be found")]
    NetworkNotFound(String),

    #[error("Emulator '{0}' could not be found")]
    EmulatorNotFound(String),

    #[error("Deployment of account '{account}' on network '{network}' could not be found")]
    DeploymentNotFound { network: String, account: String },

    #[error("Alias for contract '{contract}' on network '{network}' could not be found")]
    AliasNotFound { contract: String, network: String },

    #[error("Alias {address} for contract '{contract}' is not a valid address on network '{network}'")]
    InvalidAlias {
        contract: String,
        network: String,
        address: Address,
    },

    #[error("Deployment on network '{network}' references unknown {kind} '{name}'")]
    InvalidDeployment {
        network: String,
        kind: &'static str,
        name: String,
    },

    #[error("Contract '{contract}' is deployed to more than one account on network '{network}': {}", .accounts.join(", "))]
    ContractConflict {
        contract: String,
        network: String,
        accounts: Vec<String>,
    },

    #[error("Network fork chain contains a cycle: {}", .0.join(" -> "))]
    ForkCycle(Vec<String>),

    #[error("Network '{network}' forks unknown network '{source_network}'")]
    UnknownFork {
        network: String,
        source_network: String,
    },

    #[error("Cannot save configuration edits to more than one file, specify a single config path")]
    MultipleSavePaths,

    #[error("Refusing to save to the global configuration {0} without a local flow.json; pass the global path explicitly to edit it")]
    GlobalSaveWithoutLocal(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Gateway Errors
// ============================================================================

/// Access node errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    // ─── Network/Transport ───
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {message}")]
    Network {
        message: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("Timeout after {0} attempts")]
    Timeout(u32),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // ─── API ───
    #[error("Access API error: {message} (code: {code})")]
    Api { code: u16, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(Address),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transaction {0} expired before it was sealed")]
    TransactionExpired(Identifier),

    #[error("{0} is not supported by this gateway")]
    Unsupported(&'static str),
}

impl GatewayError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Http(e) => e.is_timeout() || e.is_connect(),
            GatewayError::Timeout(_) => true,
            GatewayError::Network { retryable, .. } => *retryable,
            GatewayError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>, status_code: Option<u16>, retryable: bool) -> Self {
        GatewayError::Network {
            message: message.into(),
            status_code,
            retryable,
        }
    }
}

// ============================================================================
// Program and Import Errors
// ============================================================================

/// Cadence source that cannot be analyzed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("Failed to parse program at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Program must declare exactly one contract or contract interface, found {0}")]
    ContractCount(usize),

    #[error("Program must declare exactly one transaction, found {0}")]
    TransactionCount(usize),

    #[error("Invalid UTF-8 in program source")]
    InvalidUtf8,
}

/// An import that could not be mapped to an address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("Import {token} could not be resolved from the configuration, make sure the contract or account is defined")]
    Unresolved { token: String },

    #[error("Resolving import {token} requires the location of the importing program")]
    MissingLocation { token: String },
}

/// Contracts whose imports form at least one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicImportError {
    /// Every strongly connected component of two or more contracts,
    /// by contract name.
    pub cycles: Vec<Vec<String>>,
}

impl CyclicImportError {
    /// All contracts taking part in any cycle.
    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.cycles.iter().flatten().map(String::as_str)
    }
}

impl fmt::Display for CyclicImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contracts import each other in a cycle: ")?;
        let rendered: Vec<String> = self
            .cycles
            .iter()
            .map(|cycle| format!("[{}]", cycle.join(", ")))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

impl std::error::Error for CyclicImportError {}

/// Per-contract failures collected while deploying a project.
#[derive(Debug, Default)]
pub struct DeployErrors(pub Vec<(String, Error)>);

impl DeployErrors {
    /// Returns true if no contract failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the contracts that failed.
    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Display for DeployErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "failed deploying {} contract(s):", self.0.len())?;
        for (name, err) in &self.0 {
            writeln!(f, "  {}: {}", name, err)?;
        }
        Ok(())
    }
}

impl std::error::Error for DeployErrors {}

// ============================================================================
// Main Error Type
// ============================================================================

/// Main error type for flowkit operations.
#[derive(Debug, Error)]
pub enum Error {
    // ─── Configuration ───
    #[error(transparent)]
    Config(#[from] ConfigError),

    // ─── Parsing ───
    #[error(transparent)]
    ParseAddress(#[from] ParseAddressError),

    #[error(transparent)]
    ParseIdentifier(#[from] ParseIdentifierError),

    #[error(transparent)]
    ParseKey(#[from] ParseKeyError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Address {address} is not valid on network '{network}'")]
    InvalidAddress { address: Address, network: String },

    // ─── Gateway ───
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Failed to {operation}: {source}")]
    GatewayOperation {
        operation: String,
        #[source]
        source: GatewayError,
    },

    // ─── Signing ───
    #[error(transparent)]
    Signer(#[from] SignerError),

    // ─── Programs ───
    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Import from {contract} could not be found: {token}, make sure import path is correct")]
    DeploymentImportNotFound { contract: String, token: String },

    #[error(transparent)]
    CyclicImport(#[from] CyclicImportError),

    // ─── Transactions ───
    #[error("Provided authorizers length mismatch, required {required}, but provided {provided}")]
    AuthorizersMismatch { required: usize, provided: usize },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Transaction {tx_id} failed: {message}")]
    TransactionExecution { tx_id: Identifier, message: String },

    // ─── Contracts ───
    #[error("Contract {contract} is unchanged, no update needed")]
    UpdateNoDiff { contract: String },

    #[error("Contract {contract} already exists on account {account}, use the update option to overwrite it")]
    ExistingContract { contract: String, account: Address },

    #[error("Contract {contract} does not exist on account {account}, available contracts: [{}]", .available.join(", "))]
    MissingContract {
        contract: String,
        account: Address,
        available: Vec<String>,
    },

    #[error("{0}")]
    Deploy(DeployErrors),

    // ─── Events ───
    #[error("Event worker failed: {0}")]
    EventWorker(String),

    // ─── Serialization ───
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RLP error: {0}")]
    Rlp(String),
}

impl Error {
    /// Wrap a gateway failure with the operation that was attempted.
    pub(crate) fn gateway(operation: impl Into<String>, source: GatewayError) -> Self {
        Error::GatewayOperation {
            operation: operation.into(),
            source,
        }
    }

    /// Returns true for the unchanged-contract sentinel.
    pub fn is_update_no_diff(&self) -> bool {
        matches!(self, Error::UpdateNoDiff { .. })
    }
}

impl From<alloy_rlp::Error> for Error {
    fn from(e: alloy_rlp::Error) -> Self {
        Error::Rlp(e.to_string())
    }
}
