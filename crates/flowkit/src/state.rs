//! Loaded project state.
//!
//! [`State`] pairs the layered configuration with the accounts built from
//! it and the file access used to read contract sources and key files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::accounts::{Account, Accounts};
use crate::config::{
    AccountConfig, Config, DEFAULT_SERVICE_ACCOUNT, KeyConfig, Loader, Network,
};
use crate::deploy;
use crate::error::{ConfigError, Error};
use crate::imports::{ContractLocation, ImportReplacer, clean_path};
use crate::keys::generate_key;
use crate::rw::SharedReaderWriter;
use crate::types::{Address, ChainId, HashAlgorithm, PrivateKey, SignatureAlgorithm};

/// Configuration, accounts and file access of one project.
pub struct State {
    rw: SharedReaderWriter,
    loader: Loader,
    config: Config,
    accounts: Accounts,
}

impl State {
    /// Load and validate the configuration at `paths`, or at the default
    /// locations when `paths` is empty.
    pub fn load(rw: SharedReaderWriter, paths: &[PathBuf]) -> Result<Self, Error> {
        let mut loader = if paths.is_empty() {
            Loader::new(rw.clone())
        } else {
            Loader::with_paths(rw.clone(), paths.to_vec())
        };
        let config = loader.load()?;
        Self::from_config(rw, loader, config)
    }

    /// A fresh project with default networks and an emulator service account
    /// holding a newly generated key.
    pub fn init(
        rw: SharedReaderWriter,
        sig_algo: SignatureAlgorithm,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, Error> {
        let private_key = generate_key(sig_algo, None)?;
        let mut config = Config::default_with_networks();
        config.add_or_update_account(AccountConfig {
            name: DEFAULT_SERVICE_ACCOUNT.to_string(),
            address: ChainId::Emulator.service_address(),
            key: KeyConfig::hex(private_key, hash_algo),
        });

        let loader = Loader::new(rw.clone());
        Self::from_config(rw, loader, config)
    }

    /// Build state over an already loaded configuration.
    pub fn from_config(rw: SharedReaderWriter, loader: Loader, config: Config) -> Result<Self, Error> {
        config.validate()?;
        let accounts = Accounts::from_config(&config.accounts, rw.clone())?;
        Ok(Self {
            rw,
            loader,
            config,
            accounts,
        })
    }

    pub fn rw(&self) -> &SharedReaderWriter {
        &self.rw
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    pub fn accounts_mut(&mut self) -> &mut Accounts {
        &mut self.accounts
    }

    /// Read a project file, such as a contract source.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, Error> {
        let path = path.as_ref();
        self.rw.read_file(path).map_err(|source| {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Write the configuration, with current accounts, to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.config.accounts = self.accounts.to_config();
        self.loader.save(&self.config, path.as_ref())?;
        Ok(())
    }

    /// Write the configuration to the file edits go to by default.
    pub fn save_default(&mut self) -> Result<(), Error> {
        let path = self.loader.save_path()?;
        self.save(path)
    }

    // ========================================================================
    // Networks and Emulator
    // ========================================================================

    /// Network `name`, with its host inherited from fork sources when unset.
    pub fn network(&self, name: &str) -> Result<Network, ConfigError> {
        let chain = self.config.fork_chain(name)?;
        let mut network = self
            .config
            .network(name)
            .cloned()
            .ok_or_else(|| ConfigError::NetworkNotFound(name.to_string()))?;

        if network.host.is_empty() {
            let inherited = chain
                .iter()
                .skip(1)
                .filter_map(|source| self.config.network(source))
                .find(|source| !source.host.is_empty());
            if let Some(source) = inherited {
                debug!(network = %name, source = %source.name, "inheriting fork host");
                network.host = source.host.clone();
            }
        }
        Ok(network)
    }

    /// Account named as the default emulator's service account.
    pub fn emulator_service_account(&self) -> Result<&Account, ConfigError> {
        let emulator = self
            .config
            .default_emulator()
            .ok_or_else(|| ConfigError::EmulatorNotFound("default".to_string()))?;
        self.accounts.by_name(&emulator.service_account)
    }

    /// Rotate the emulator service account to `private_key`.
    pub fn set_emulator_key(&mut self, private_key: PrivateKey) -> Result<(), ConfigError> {
        let name = self
            .config
            .default_emulator()
            .map(|e| e.service_account.clone())
            .ok_or_else(|| ConfigError::EmulatorNotFound("default".to_string()))?;
        self.accounts.set_emulator_key(&name, private_key)
    }

    // ========================================================================
    // Contracts
    // ========================================================================

    /// Aliases on `network`, each keyed by both contract location and name.
    pub fn aliases_for_network(&self, network: &str) -> Result<HashMap<String, Address>, ConfigError> {
        let mut aliases = HashMap::new();
        for contract in &self.config.contracts {
            if let Some(address) = self.config.alias(contract, network)? {
                aliases.insert(clean_path(&contract.location), address);
                aliases.insert(contract.name.clone(), address);
            }
        }
        Ok(aliases)
    }

    /// Contracts deployed on `network` with their target accounts, in
    /// deployment order. Aliased contracts are already on chain and skipped.
    pub fn deployment_contracts(&self, network: &str) -> Result<Vec<deploy::Contract>, Error> {
        let mut contracts = Vec::new();
        for deployment in self.config.deployments_for_network(network) {
            let account = self.accounts.by_name(&deployment.account)?;
            for entry in &deployment.contracts {
                let contract = self
                    .config
                    .contract(&entry.name)
                    .ok_or_else(|| ConfigError::ContractNotFound(entry.name.clone()))?;
                if self.config.alias(contract, network)?.is_some() {
                    debug!(contract = %contract.name, network, "skipping aliased contract");
                    continue;
                }

                let code = self.read_file(&contract.location)?;
                contracts.push(deploy::Contract::new(
                    &contract.name,
                    &contract.location,
                    code,
                    account.address,
                    &account.name,
                    entry.args.clone(),
                )?);
            }
        }
        Ok(contracts)
    }

    /// Deployable contract locations on `network`, without reading sources.
    pub fn contract_locations(&self, network: &str) -> Result<Vec<ContractLocation>, Error> {
        let mut locations = Vec::new();
        for deployment in self.config.deployments_for_network(network) {
            let account = self.accounts.by_name(&deployment.account)?;
            for entry in &deployment.contracts {
                let contract = self
                    .config
                    .contract(&entry.name)
                    .ok_or_else(|| ConfigError::ContractNotFound(entry.name.clone()))?;
                locations.push(ContractLocation {
                    name: contract.name.clone(),
                    location: contract.location.clone(),
                    address: account.address,
                });
            }
        }
        Ok(locations)
    }

    /// Import replacer for scripts and transactions on `network`.
    pub fn import_replacer(&self, network: &str) -> Result<ImportReplacer, Error> {
        let locations = self.contract_locations(network)?;
        let aliases = self.aliases_for_network(network)?;
        Ok(ImportReplacer::new(&locations, &aliases, &self.accounts))
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("loader", &self.loader)
            .field("accounts", &self.accounts.names())
            .finish()
    }
}
