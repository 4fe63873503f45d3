//! A project execution engine for the Flow blockchain.
//!
//! **flowkit** loads a project's `flow.json`, manages its accounts and keys,
//! deploys its Cadence contracts in dependency order and builds, signs and
//! sends transactions through an access node.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowkit::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), flowkit::Error> {
//!     let state = State::load(Arc::new(FileSystem), &[])?;
//!     let kit = Flowkit::from_flags(state, &Flags::default())?;
//!
//!     let service = kit.state().emulator_service_account()?.clone();
//!     let account = kit.get_account(service.address).await?;
//!     println!("{} holds {} contracts", account.address, account.contracts.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Components
//!
//! - [`config`] - Layered `flow.json` files and the configuration model
//! - [`State`] - Loaded configuration, accounts and file access
//! - [`AccountKey`] - Hex, file, mnemonic and Google KMS keys behind one [`Signer`]
//! - [`Program`] - Import and declaration analysis of Cadence source
//! - [`ImportReplacer`] - Rewrites symbolic imports to addresses
//! - [`DeploymentPlanner`] - Orders contracts so dependencies deploy first
//! - [`TransactionBuilder`] - Three-role transactions and their signatures
//! - [`Gateway`] - Access node port, with [`HttpGateway`] over REST
//! - [`Flowkit`] - The engine tying these together
//!
//! # Address Parsing
//!
//! ```
//! use flowkit::{Address, ChainId};
//!
//! let a: Address = "0xf8d6e0586b0a20c7".parse().unwrap();
//! let b: Address = "f8d6e0586b0a20c7".parse().unwrap();
//! assert_eq!(a, b);
//! assert!(a.is_valid(ChainId::Emulator));
//! ```

pub mod accounts;
pub mod config;
pub mod deploy;
pub mod error;
pub mod events;
pub mod flags;
pub mod gateway;
pub mod imports;
pub mod keys;
pub mod program;
pub mod project;
pub mod rw;
pub mod signer;
pub mod state;
pub mod templates;
pub mod transactions;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    ConfigError, CyclicImportError, DeployErrors, Error, GatewayError, ImportError,
    ParseAddressError, ParseIdentifierError, ParseKeyError, ProgramError, SignerError,
};
pub use types::*;

pub use accounts::{Account, Accounts};
pub use config::Config;
pub use deploy::{Contract, DeploymentPlanner};
pub use events::{EventRangeQuery, EventWorker};
pub use flags::Flags;
pub use gateway::{Gateway, HttpGateway, RetryConfig};
pub use imports::{ContractLocation, ImportReplacer};
pub use keys::{AccountKey, KeySource};
pub use program::{Import, ImportKind, Program};
pub use project::{Flowkit, UpdateContract};
pub use rw::{FileSystem, MemoryFs, ReaderWriter, SharedReaderWriter};
pub use signer::{InMemorySigner, Signer};
pub use state::State;
pub use transactions::{
    Script, TransactionAccountRoles, TransactionAddressRoles, TransactionBuilder,
};
