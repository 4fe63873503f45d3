//! Building and signing transactions.
//!
//! A transaction names three roles: the proposer (whose key sequence number
//! advances), the payer and the authorizers. One account may hold several
//! roles. Every distinct address signs exactly once: the payer signs the
//! envelope, everyone else signs the payload, and the payer signs last.
//!
//! # Example
//!
//! ```rust,no_run
//! # use flowkit::*;
//! # async fn example(alice: Account, bob: Account, block: Identifier) -> Result<(), flowkit::Error> {
//! let roles = TransactionAccountRoles {
//!     proposer: alice.clone(),
//!     payer: bob.clone(),
//!     authorizers: vec![alice],
//! };
//!
//! let mut tx = TransactionBuilder::new()
//!     .script(Script::new("transaction { prepare(a: &Account) {} }", vec![]))?
//!     .proposer(roles.proposer.address, 0, 7)
//!     .payer(roles.payer.address)
//!     .authorizers(roles.address_roles().authorizers)
//!     .reference_block(block)
//!     .build();
//!
//! roles.sign(&mut tx).await?;
//! # Ok(())
//! # }
//! ```

use tracing::debug;

use crate::accounts::Account;
use crate::error::Error;
use crate::templates::DEFAULT_GAS_LIMIT;
use crate::types::{Address, CadenceValue, Identifier, ProposalKey, Transaction};

// ============================================================================
// Script
// ============================================================================

/// Cadence source with its arguments and, for resolving file imports, the
/// path it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct Script {
    pub code: Vec<u8>,
    pub args: Vec<CadenceValue>,
    pub location: Option<String>,
}

impl Script {
    pub fn new(code: impl Into<Vec<u8>>, args: Vec<CadenceValue>) -> Self {
        Self {
            code: code.into(),
            args,
            location: None,
        }
    }

    /// Set the path file imports resolve against.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Role addresses of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionAddressRoles {
    pub proposer: Address,
    pub payer: Address,
    pub authorizers: Vec<Address>,
}

impl TransactionAddressRoles {
    /// Distinct signing addresses, payer last.
    pub fn signer_addresses(&self) -> Vec<Address> {
        let mut signers: Vec<Address> = Vec::new();
        for address in std::iter::once(&self.proposer).chain(&self.authorizers) {
            if *address != self.payer && !signers.contains(address) {
                signers.push(*address);
            }
        }
        signers.push(self.payer);
        signers
    }
}

/// Accounts filling each role of a transaction.
#[derive(Clone, Debug)]
pub struct TransactionAccountRoles {
    pub proposer: Account,
    pub payer: Account,
    pub authorizers: Vec<Account>,
}

impl TransactionAccountRoles {
    /// One account as proposer, payer and sole authorizer.
    pub fn single(account: Account) -> Self {
        Self {
            proposer: account.clone(),
            payer: account.clone(),
            authorizers: vec![account],
        }
    }

    pub fn address_roles(&self) -> TransactionAddressRoles {
        TransactionAddressRoles {
            proposer: self.proposer.address,
            payer: self.payer.address,
            authorizers: self.authorizers.iter().map(|a| a.address).collect(),
        }
    }

    /// Distinct signing accounts, deduplicated by address, payer last.
    pub fn unique_signers(&self) -> Vec<&Account> {
        let mut signers: Vec<&Account> = Vec::new();
        for account in std::iter::once(&self.proposer).chain(&self.authorizers) {
            if account.address != self.payer.address
                && !signers.iter().any(|s| s.address == account.address)
            {
                signers.push(account);
            }
        }
        signers.push(&self.payer);
        signers
    }

    /// Sign `tx` with every distinct signer, payload signers first.
    pub async fn sign(&self, tx: &mut Transaction) -> Result<(), Error> {
        for account in self.unique_signers() {
            sign_transaction(tx, account).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent builder for a [`Transaction`].
#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    tx: Transaction,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    /// An empty transaction with the default gas limit.
    pub fn new() -> Self {
        Self {
            tx: Transaction {
                gas_limit: DEFAULT_GAS_LIMIT,
                ..Transaction::new()
            },
        }
    }

    /// Continue from a previously encoded transaction.
    pub fn from_payload_hex(payload: &str) -> Result<Self, Error> {
        Ok(Self {
            tx: Transaction::from_hex(payload)?,
        })
    }

    /// Set the script and JSON-encode its arguments.
    pub fn script(mut self, script: Script) -> Result<Self, Error> {
        self.tx.arguments = script
            .args
            .iter()
            .map(CadenceValue::to_json_bytes)
            .collect::<Result<_, _>>()?;
        self.tx.script = script.code;
        Ok(self)
    }

    pub fn proposer(mut self, address: Address, key_index: u32, sequence_number: u64) -> Self {
        self.tx.proposal_key = ProposalKey {
            address,
            key_index,
            sequence_number,
        };
        self
    }

    pub fn payer(mut self, address: Address) -> Self {
        self.tx.payer = address;
        self
    }

    pub fn authorizers(mut self, authorizers: Vec<Address>) -> Self {
        self.tx.authorizers = authorizers;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.tx.gas_limit = gas_limit;
        self
    }

    pub fn reference_block(mut self, id: Identifier) -> Self {
        self.tx.reference_block_id = id;
        self
    }

    pub fn build(self) -> Transaction {
        self.tx
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Add `account`'s signature to `tx`: over the envelope when it is the
/// payer, otherwise over the payload.
///
/// Fails if the account holds no role in the transaction, has already
/// signed it, or is not the payer and the envelope is already signed.
pub async fn sign_transaction(tx: &mut Transaction, account: &Account) -> Result<(), Error> {
    if !tx.signer_list().contains(&account.address) {
        return Err(Error::InvalidTransaction(format!(
            "account {} ({}) is not a proposer, payer or authorizer of this transaction",
            account.name, account.address
        )));
    }
    if tx.is_signed_by(account.address) {
        return Err(Error::InvalidTransaction(format!(
            "account {} ({}) has already signed this transaction",
            account.name, account.address
        )));
    }
    if account.address != tx.payer && !tx.envelope_signatures.is_empty() {
        return Err(Error::InvalidTransaction(format!(
            "account {} ({}) cannot sign the payload after the payer signed the envelope",
            account.name, account.address
        )));
    }

    let signer = account.key.signer().await?;
    let key_index = account.key.index();

    if account.address == tx.payer {
        let signature = signer.sign(&tx.envelope_message()).await?;
        tx.add_envelope_signature(account.address, key_index, signature)?;
        debug!(account = %account.name, "signed transaction envelope");
    } else {
        let signature = signer.sign(&tx.payload_message()).await?;
        tx.add_payload_signature(account.address, key_index, signature)?;
        debug!(account = %account.name, "signed transaction payload");
    }
    Ok(())
}
