//! Core types for Flow.
//!
//! Addresses, identifiers, keys, Cadence values, transactions and the chain
//! views returned by the access API.

mod address;
mod cadence;
mod chain;
mod crypto;
mod identifier;
mod transaction;

pub use address::{Address, ChainId};
pub use cadence::{CadenceValue, parse_json_arguments, parse_shorthand_argument};
pub use chain::{
    AccountKeySpec, AccountPublicKey, Block, BlockEvents, BlockHeader, BlockQuery, ChainAccount,
    Collection, Event, FULL_KEY_WEIGHT, TransactionResult, TransactionStatus,
};
pub use crypto::{
    HashAlgorithm, MAX_SEED_LENGTH, MIN_SEED_LENGTH, PrivateKey, PublicKey, Signature,
    SignatureAlgorithm,
};
pub use identifier::Identifier;
pub use transaction::{ProposalKey, TRANSACTION_DOMAIN_TAG, Transaction, TransactionSignature};
