//! Views of on-chain state returned by the access API.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::types::{Address, CadenceValue, HashAlgorithm, Identifier, PublicKey, SignatureAlgorithm};

/// Weight a single key needs to authorize a transaction alone.
pub const FULL_KEY_WEIGHT: u32 = 1000;

/// An account as stored on chain.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainAccount {
    pub address: Address,
    /// Balance in the smallest FLOW unit (10^-8 FLOW).
    pub balance: u64,
    pub keys: Vec<AccountPublicKey>,
    /// Deployed contracts by name.
    pub contracts: BTreeMap<String, Vec<u8>>,
}

impl ChainAccount {
    /// Names of the deployed contracts.
    pub fn contract_names(&self) -> Vec<String> {
        self.contracts.keys().cloned().collect()
    }

    /// Key at `index`, if present.
    pub fn key(&self, index: u32) -> Option<&AccountPublicKey> {
        self.keys.iter().find(|k| k.index == index)
    }
}

/// A public key registered on an account.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountPublicKey {
    pub index: u32,
    pub public_key: PublicKey,
    pub sig_algo: SignatureAlgorithm,
    pub hash_algo: HashAlgorithm,
    pub weight: u32,
    pub sequence_number: u64,
    pub revoked: bool,
}

/// A key to register on a new account.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountKeySpec {
    pub public_key: PublicKey,
    pub hash_algo: HashAlgorithm,
    /// Defaults to [`FULL_KEY_WEIGHT`].
    pub weight: Option<u32>,
}

impl AccountKeySpec {
    /// A full-weight key.
    pub fn new(public_key: PublicKey, hash_algo: HashAlgorithm) -> Self {
        Self {
            public_key,
            hash_algo,
            weight: None,
        }
    }

    /// Effective weight.
    pub fn weight(&self) -> u32 {
        self.weight.unwrap_or(FULL_KEY_WEIGHT)
    }
}

/// A block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: Identifier,
    pub parent_id: Identifier,
    pub height: u64,
    /// RFC 3339 timestamp as reported by the node.
    pub timestamp: String,
}

/// A block and the collections it guarantees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub collection_ids: Vec<Identifier>,
}

impl Block {
    pub fn id(&self) -> Identifier {
        self.header.id
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}

/// Which block a query targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlockQuery {
    /// The latest sealed block.
    #[default]
    Latest,
    Height(u64),
    Id(Identifier),
}

/// A collection of transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Identifier,
    pub transaction_ids: Vec<Identifier>,
}

/// An emitted event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Fully qualified type, e.g. `A.0ae53cb6e3f42a79.FlowToken.TokensDeposited`.
    pub event_type: String,
    pub transaction_id: Identifier,
    pub transaction_index: u32,
    pub event_index: u32,
    pub payload: CadenceValue,
}

/// Events of one type (or several) emitted within a single block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockEvents {
    pub block_id: Identifier,
    pub height: u64,
    pub block_timestamp: String,
    pub events: Vec<Event>,
}

/// Execution status of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[default]
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

impl TransactionStatus {
    /// Terminal statuses stop seal polling.
    pub fn is_final(&self) -> bool {
        matches!(self, TransactionStatus::Sealed | TransactionStatus::Expired)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Unknown => "UNKNOWN",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Finalized => "FINALIZED",
            TransactionStatus::Executed => "EXECUTED",
            TransactionStatus::Sealed => "SEALED",
            TransactionStatus::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Outcome of a transaction.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    /// Execution error message, if the transaction reverted.
    pub error: Option<String>,
    pub events: Vec<Event>,
    pub block_id: Identifier,
    pub block_height: u64,
    pub computation_used: u64,
}

impl TransactionResult {
    /// Events of the given type, in emission order.
    pub fn events_of_type<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a Event> {
        self.events.iter().filter(move |e| e.event_type == event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_spec_default_weight() {
        let key = crate::types::PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
        let spec = AccountKeySpec::new(key.public_key(), HashAlgorithm::Sha3_256);
        assert_eq!(spec.weight(), FULL_KEY_WEIGHT);
        let spec = AccountKeySpec {
            weight: Some(500),
            ..spec
        };
        assert_eq!(spec.weight(), 500);
    }

    #[test]
    fn test_status_final() {
        assert!(TransactionStatus::Sealed.is_final());
        assert!(TransactionStatus::Expired.is_final());
        assert!(!TransactionStatus::Executed.is_final());
        assert_eq!(TransactionStatus::Sealed.to_string(), "SEALED");
    }
}
