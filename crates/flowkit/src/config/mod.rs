//! Project configuration.
//!
//! A project is described by one or more `flow.json` files. The in-memory
//! [`Config`] is format-independent; [`json`] maps it to and from the file
//! format and [`Loader`] layers several files into one view.

mod json;
mod loader;
mod processor;

pub use json::JsonParser;
pub use loader::{DEFAULT_CONFIG_FILE, Loader, Parser, global_config_path};
pub use processor::{EnvLookup, Substitutions, substitute_env};

use std::collections::HashSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{ConfigError, ParseKeyError};
use crate::types::{Address, CadenceValue, ChainId, HashAlgorithm, PrivateKey, SignatureAlgorithm};

/// Default derivation path for mnemonic keys.
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/539'/0'/0/0";

/// Name of the emulator network.
pub const EMULATOR_NETWORK: &str = "emulator";

/// Name of the default emulator account.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "emulator-account";

/// Complete project configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub emulators: Vec<Emulator>,
    pub contracts: Vec<Contract>,
    pub networks: Vec<Network>,
    pub accounts: Vec<AccountConfig>,
    pub deployments: Vec<Deployment>,
}

/// Emulator settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Emulator {
    pub name: String,
    pub port: u16,
    pub service_account: String,
}

/// A contract source and its per-network aliases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contract {
    pub name: String,
    pub location: String,
    pub aliases: Vec<Alias>,
}

impl Contract {
    /// Alias on `network`, if any.
    pub fn alias(&self, network: &str) -> Option<Address> {
        self.aliases
            .iter()
            .find(|a| a.network == network)
            .map(|a| a.address)
    }
}

/// An already-deployed instance of a contract on a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alias {
    pub network: String,
    pub address: Address,
}

/// An access node endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub host: String,
    /// Access node public key for secure connections.
    pub key: Option<String>,
    /// Network whose aliases and chain this one inherits.
    pub fork: Option<String>,
}

impl Network {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            key: None,
            fork: None,
        }
    }
}

/// How an account key is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum KeyType {
    #[default]
    Hex,
    File,
    GoogleKms,
    Bip44,
}

impl KeyType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            KeyType::Hex => "hex",
            KeyType::File => "file",
            KeyType::GoogleKms => "google-kms",
            KeyType::Bip44 => "bip44",
        }
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(KeyType::Hex),
            "file" => Ok(KeyType::File),
            "google-kms" => Ok(KeyType::GoogleKms),
            "bip44" => Ok(KeyType::Bip44),
            other => Err(ParseKeyError::UnknownKeyType(other.to_string())),
        }
    }
}

/// Stored description of an account key.
///
/// Only the fields matching `key_type` are meaningful.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyConfig {
    pub key_type: KeyType,
    pub index: u32,
    pub sig_algo: SignatureAlgorithm,
    pub hash_algo: HashAlgorithm,
    pub private_key: Option<PrivateKey>,
    pub location: Option<String>,
    pub resource_id: Option<String>,
    pub mnemonic: Option<String>,
    pub derivation_path: Option<String>,
}

impl KeyConfig {
    /// A hex key with default index and algorithms.
    pub fn hex(private_key: PrivateKey, hash_algo: HashAlgorithm) -> Self {
        Self {
            key_type: KeyType::Hex,
            index: 0,
            sig_algo: private_key.algorithm(),
            hash_algo,
            private_key: Some(private_key),
            location: None,
            resource_id: None,
            mnemonic: None,
            derivation_path: None,
        }
    }

    /// A key stored in a separate file.
    pub fn file(location: impl Into<String>, sig_algo: SignatureAlgorithm, hash_algo: HashAlgorithm) -> Self {
        Self {
            key_type: KeyType::File,
            index: 0,
            sig_algo,
            hash_algo,
            private_key: None,
            location: Some(location.into()),
            resource_id: None,
            mnemonic: None,
            derivation_path: None,
        }
    }
}

/// A named account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountConfig {
    pub name: String,
    pub address: Address,
    pub key: KeyConfig,
}

/// Contracts one account deploys on one network.
#[derive(Clone, Debug, PartialEq)]
pub struct Deployment {
    pub network: String,
    pub account: String,
    pub contracts: Vec<ContractDeployment>,
}

/// A contract in a deployment, with its initializer arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractDeployment {
    pub name: String,
    pub args: Vec<CadenceValue>,
}

impl ContractDeployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

impl Config {
    /// Default networks and emulator for a fresh project.
    pub fn default_with_networks() -> Self {
        Self {
            emulators: vec![Emulator {
                name: "default".to_string(),
                port: 3569,
                service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            }],
            networks: default_networks(),
            ..Self::default()
        }
    }
}

/// Emulator, testnet and mainnet access nodes.
pub fn default_networks() -> Vec<Network> {
    vec![
        Network::new(EMULATOR_NETWORK, "127.0.0.1:3569"),
        Network::new("testnet", "access.devnet.nodes.onflow.org:9000"),
        Network::new("mainnet", "access.mainnet.nodes.onflow.org:9000"),
    ]
}

// ============================================================================
// Lookups and Edits
// ============================================================================

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T, &T) -> bool) {
    match items.iter_mut().find(|existing| same(existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

impl Config {
    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn contract(&self, name: &str) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.name == name)
    }

    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn emulator(&self, name: &str) -> Option<&Emulator> {
        self.emulators.iter().find(|e| e.name == name)
    }

    /// Emulator named `default`, else the first one.
    pub fn default_emulator(&self) -> Option<&Emulator> {
        self.emulator("default").or_else(|| self.emulators.first())
    }

    pub fn deployment(&self, network: &str, account: &str) -> Option<&Deployment> {
        self.deployments
            .iter()
            .find(|d| d.network == network && d.account == account)
    }

    /// Deployments on `network`, in file order.
    pub fn deployments_for_network<'a>(&'a self, network: &'a str) -> impl Iterator<Item = &'a Deployment> {
        self.deployments.iter().filter(move |d| d.network == network)
    }

    pub fn add_or_update_account(&mut self, account: AccountConfig) {
        upsert(&mut self.accounts, account, |a, b| a.name == b.name);
    }

    pub fn add_or_update_contract(&mut self, contract: Contract) {
        upsert(&mut self.contracts, contract, |a, b| a.name == b.name);
    }

    pub fn add_or_update_network(&mut self, network: Network) {
        upsert(&mut self.networks, network, |a, b| a.name == b.name);
    }

    pub fn add_or_update_emulator(&mut self, emulator: Emulator) {
        upsert(&mut self.emulators, emulator, |a, b| a.name == b.name);
    }

    pub fn add_or_update_deployment(&mut self, deployment: Deployment) {
        upsert(&mut self.deployments, deployment, |a, b| {
            a.network == b.network && a.account == b.account
        });
    }

    pub fn remove_account(&mut self, name: &str) -> Result<(), ConfigError> {
        let before = self.accounts.len();
        self.accounts.retain(|a| a.name != name);
        if self.accounts.len() == before {
            return Err(ConfigError::AccountNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn remove_contract(&mut self, name: &str) -> Result<(), ConfigError> {
        let before = self.contracts.len();
        self.contracts.retain(|c| c.name != name);
        if self.contracts.len() == before {
            return Err(ConfigError::ContractNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn remove_network(&mut self, name: &str) -> Result<(), ConfigError> {
        let before = self.networks.len();
        self.networks.retain(|n| n.name != name);
        if self.networks.len() == before {
            return Err(ConfigError::NetworkNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn remove_deployment(&mut self, network: &str, account: &str) -> Result<(), ConfigError> {
        let before = self.deployments.len();
        self.deployments
            .retain(|d| !(d.network == network && d.account == account));
        if self.deployments.len() == before {
            return Err(ConfigError::DeploymentNotFound {
                network: network.to_string(),
                account: account.to_string(),
            });
        }
        Ok(())
    }

    /// Overlay `other` on top of this configuration; entries with the same
    /// name are replaced.
    pub fn merge(&mut self, other: Config) {
        for e in other.emulators {
            self.add_or_update_emulator(e);
        }
        for c in other.contracts {
            self.add_or_update_contract(c);
        }
        for n in other.networks {
            self.add_or_update_network(n);
        }
        for a in other.accounts {
            self.add_or_update_account(a);
        }
        for d in other.deployments {
            self.add_or_update_deployment(d);
        }
    }
}

// ============================================================================
// Forks and Aliases
// ============================================================================

impl Config {
    /// Network names from `name` through its fork sources.
    ///
    /// Fails when a fork points to an unknown network or the chain loops.
    pub fn fork_chain(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        let mut chain = vec![name.to_string()];
        let mut current = self
            .network(name)
            .ok_or_else(|| ConfigError::NetworkNotFound(name.to_string()))?;

        while let Some(source) = &current.fork {
            if chain.contains(source) {
                chain.push(source.clone());
                return Err(ConfigError::ForkCycle(chain));
            }
            let next = self.network(source).ok_or_else(|| ConfigError::UnknownFork {
                network: current.name.clone(),
                source_network: source.clone(),
            })?;
            chain.push(source.clone());
            current = next;
        }
        Ok(chain)
    }

    /// Chain the network runs on, following forks to a well-known network.
    pub fn chain_id(&self, network: &str) -> Result<Option<ChainId>, ConfigError> {
        Ok(self
            .fork_chain(network)?
            .iter()
            .rev()
            .find_map(|n| ChainId::from_network_name(n)))
    }

    /// Alias of `contract` on `network`, falling back to fork sources.
    pub fn alias(&self, contract: &Contract, network: &str) -> Result<Option<Address>, ConfigError> {
        if let Some(address) = contract.alias(network) {
            return Ok(Some(address));
        }
        if self.network(network).is_none() {
            return Ok(None);
        }
        for source in self.fork_chain(network)?.iter().skip(1) {
            if let Some(address) = contract.alias(source) {
                return Ok(Some(address));
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl Config {
    /// Check cross references, alias addresses and deployment conflicts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for network in &self.networks {
            self.fork_chain(&network.name)?;
        }

        for emulator in &self.emulators {
            if self.account(&emulator.service_account).is_none() {
                return Err(ConfigError::AccountNotFound(
                    emulator.service_account.clone(),
                ));
            }
        }

        for contract in &self.contracts {
            for alias in &contract.aliases {
                if let Some(chain) = ChainId::from_network_name(&alias.network) {
                    if !alias.address.is_valid(chain) {
                        return Err(ConfigError::InvalidAlias {
                            contract: contract.name.clone(),
                            network: alias.network.clone(),
                            address: alias.address,
                        });
                    }
                }
            }
        }

        for deployment in &self.deployments {
            if self.network(&deployment.network).is_none() {
                return Err(ConfigError::InvalidDeployment {
                    network: deployment.network.clone(),
                    kind: "network",
                    name: deployment.network.clone(),
                });
            }
            if self.account(&deployment.account).is_none() {
                return Err(ConfigError::InvalidDeployment {
                    network: deployment.network.clone(),
                    kind: "account",
                    name: deployment.account.clone(),
                });
            }
            for c in &deployment.contracts {
                if self.contract(&c.name).is_none() {
                    return Err(ConfigError::InvalidDeployment {
                        network: deployment.network.clone(),
                        kind: "contract",
                        name: c.name.clone(),
                    });
                }
            }
        }

        self.check_contract_conflicts()
    }

    /// A contract may be deployed by at most one account per network.
    pub fn check_contract_conflicts(&self) -> Result<(), ConfigError> {
        let networks: Vec<&str> = {
            let mut seen = HashSet::new();
            self.deployments
                .iter()
                .map(|d| d.network.as_str())
                .filter(|n| seen.insert(*n))
                .collect()
        };

        for network in networks {
            for contract in &self.contracts {
                let accounts: Vec<String> = self
                    .deployments_for_network(network)
                    .filter(|d| d.contracts.iter().any(|c| c.name == contract.name))
                    .map(|d| d.account.clone())
                    .collect();
                if accounts.len() > 1 {
                    return Err(ConfigError::ContractConflict {
                        contract: contract.name.clone(),
                        network: network.to_string(),
                        accounts,
                    });
                }
            }
        }
        Ok(())
    }
}
