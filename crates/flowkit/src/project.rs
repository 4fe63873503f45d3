//! The project engine.
//!
//! [`Flowkit`] ties a loaded [`State`] to one network and its access node.
//! It creates accounts, manages contracts, deploys whole projects in
//! dependency order, runs scripts and builds, signs and sends transactions.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowkit::*;
//!
//! # async fn example() -> Result<(), flowkit::Error> {
//! let state = State::load(Arc::new(FileSystem), &[])?;
//! let kit = Flowkit::from_flags(state, &Flags::default())?;
//!
//! let deployed = kit.deploy_project(UpdateContract::Update).await?;
//! for contract in &deployed {
//!     println!("{} -> {}", contract.name, contract.account_address);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::accounts::Account;
use crate::config::{EMULATOR_NETWORK, Network};
use crate::deploy::{self, DeploymentPlanner};
use crate::error::{DeployErrors, Error};
use crate::events::{self, EventWorker};
use crate::flags::Flags;
use crate::gateway::{Gateway, HttpGateway};
use crate::keys;
use crate::program::Program;
use crate::state::State;
use crate::templates::{self, MAX_GAS_LIMIT};
use crate::transactions::{
    Script, TransactionAccountRoles, TransactionAddressRoles, TransactionBuilder, sign_transaction,
};
use crate::types::{
    AccountKeySpec, Address, Block, BlockEvents, BlockQuery, CadenceValue, ChainAccount,
    Collection, FULL_KEY_WEIGHT, Identifier, PrivateKey, SignatureAlgorithm, Transaction,
    TransactionResult,
};

/// Event emitted when an account is created.
const ACCOUNT_CREATED_EVENT: &str = "flow.AccountCreated";

/// Whether [`Flowkit::add_contract`] may replace an existing contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateContract {
    /// Fail with [`Error::ExistingContract`] if the contract exists.
    #[default]
    AddOnly,
    /// Replace the contract if its code differs.
    Update,
}

impl From<bool> for UpdateContract {
    fn from(update: bool) -> Self {
        if update {
            UpdateContract::Update
        } else {
            UpdateContract::AddOnly
        }
    }
}

/// Project engine bound to one network.
pub struct Flowkit {
    state: State,
    network: Network,
    gateway: Arc<dyn Gateway>,
}

impl Flowkit {
    pub fn new(state: State, network: Network, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            state,
            network,
            gateway,
        }
    }

    /// Engine for the network named in `flags`, talking to its access node
    /// over REST. A host in `flags` overrides the configured one.
    pub fn from_flags(state: State, flags: &Flags) -> Result<Self, Error> {
        let mut network = state.network(&flags.network)?;
        if let Some(host) = &flags.host {
            network.host = host.clone();
            network.key = flags.network_key.clone();
        }
        let gateway = HttpGateway::for_host(&network.host);
        info!(network = %network.name, url = %gateway.url(), "connecting to access node");
        Ok(Self::new(state, network, Arc::new(gateway)))
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    fn is_emulator(&self) -> bool {
        self.network.name == EMULATOR_NETWORK
    }

    /// Rewrite the imports of `program` for the current network.
    fn resolve_imports(&self, program: Program) -> Result<Program, Error> {
        if !program.has_imports() {
            return Ok(program);
        }
        if self.network.name.is_empty() {
            return Err(Error::InvalidArgument(
                "missing network, specify which network to use to resolve imports in the code"
                    .to_string(),
            ));
        }
        self.state.import_replacer(&self.network.name)?.replace(program)
    }

    // ========================================================================
    // Chain Reads
    // ========================================================================

    pub async fn ping(&self) -> Result<(), Error> {
        self.gateway
            .ping()
            .await
            .map_err(|e| Error::gateway("ping access node", e))
    }

    pub async fn get_account(&self, address: Address) -> Result<ChainAccount, Error> {
        self.gateway
            .get_account(address)
            .await
            .map_err(|e| Error::gateway("get account", e))
    }

    pub async fn get_block(&self, query: BlockQuery) -> Result<Block, Error> {
        let block = match query {
            BlockQuery::Latest => self.gateway.get_latest_block().await,
            BlockQuery::Height(height) => self.gateway.get_block_by_height(height).await,
            BlockQuery::Id(id) => self.gateway.get_block_by_id(id).await,
        };
        block.map_err(|e| Error::gateway("get block", e))
    }

    pub async fn get_collection(&self, id: Identifier) -> Result<Collection, Error> {
        self.gateway
            .get_collection(id)
            .await
            .map_err(|e| Error::gateway("get collection", e))
    }

    /// Events of every type in `names` between two heights, inclusive.
    ///
    /// Results are in no particular order.
    pub async fn get_events(
        &self,
        names: &[String],
        start_height: u64,
        end_height: u64,
        worker: Option<EventWorker>,
    ) -> Result<Vec<BlockEvents>, Error> {
        events::get_events(
            Arc::clone(&self.gateway),
            names,
            start_height,
            end_height,
            worker.unwrap_or_default(),
        )
        .await
    }

    /// A transaction and its result, optionally waiting for it to seal.
    pub async fn get_transaction_by_id(
        &self,
        id: Identifier,
        wait_seal: bool,
    ) -> Result<(Transaction, TransactionResult), Error> {
        let tx = self
            .gateway
            .get_transaction(id)
            .await
            .map_err(|e| Error::gateway("get transaction", e))?;
        let result = self
            .gateway
            .get_transaction_result(id, wait_seal)
            .await
            .map_err(|e| Error::gateway("get transaction result", e))?;
        Ok((tx, result))
    }

    pub async fn get_transactions_by_block_id(
        &self,
        block_id: Identifier,
    ) -> Result<(Vec<Transaction>, Vec<TransactionResult>), Error> {
        let transactions = async {
            self.gateway
                .get_transactions_by_block_id(block_id)
                .await
                .map_err(|e| Error::gateway("get transactions by block id", e))
        };
        let results = async {
            self.gateway
                .get_transaction_results_by_block_id(block_id)
                .await
                .map_err(|e| Error::gateway("get transaction results by block id", e))
        };
        futures::try_join!(transactions, results)
    }

    /// The system chunk transaction of a block, with its result.
    pub async fn get_system_transaction(
        &self,
        block_id: Identifier,
    ) -> Result<(Transaction, TransactionResult), Error> {
        let tx = async {
            self.gateway
                .get_system_transaction(block_id)
                .await
                .map_err(|e| Error::gateway("get system transaction", e))
        };
        let result = async {
            self.gateway
                .get_system_transaction_result(block_id)
                .await
                .map_err(|e| Error::gateway("get system transaction result", e))
        };
        futures::try_join!(tx, result)
    }

    /// Run a read-only script with its imports resolved.
    pub async fn execute_script(&self, script: Script) -> Result<CadenceValue, Error> {
        let program = self.resolve_imports(Program::new(script.code, script.location)?)?;
        self.gateway
            .execute_script(program.code().as_bytes(), &script.args)
            .await
            .map_err(|e| Error::gateway("execute script", e))
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Build an unsigned transaction.
    ///
    /// The script must declare one transaction whose `prepare` block takes
    /// one parameter per authorizer. The reference block is the latest
    /// sealed block and the proposal key's sequence number is read from
    /// chain.
    pub async fn build_transaction(
        &self,
        roles: &TransactionAddressRoles,
        proposer_key_index: u32,
        script: Script,
        gas_limit: u64,
    ) -> Result<Transaction, Error> {
        let program = Program::new(script.code, script.location.clone())?;
        let required = program.prepare_param_count()?;
        if required != roles.authorizers.len() {
            return Err(Error::AuthorizersMismatch {
                required,
                provided: roles.authorizers.len(),
            });
        }
        let program = self.resolve_imports(program)?;

        let block = self.get_block(BlockQuery::Latest).await?;
        let proposer = self.get_account(roles.proposer).await?;
        let sequence_number = proposer
            .key(proposer_key_index)
            .map(|k| k.sequence_number)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "proposer account {} has no key at index {}",
                    roles.proposer, proposer_key_index
                ))
            })?;

        let tx = TransactionBuilder::new()
            .script(Script {
                code: program.into_code(),
                args: script.args,
                location: script.location,
            })?
            .proposer(roles.proposer, proposer_key_index, sequence_number)
            .payer(roles.payer)
            .authorizers(roles.authorizers.clone())
            .gas_limit(gas_limit)
            .reference_block(block.id())
            .build();
        debug!(tx_id = %tx.id(), reference_block = %block.id(), "built transaction");
        Ok(tx)
    }

    /// Add `signer`'s signature to a hex-encoded transaction.
    pub async fn sign_transaction_payload(&self, signer: &Account, payload: &str) -> Result<Transaction, Error> {
        let mut tx = TransactionBuilder::from_payload_hex(payload)?.build();
        sign_transaction(&mut tx, signer).await?;
        Ok(tx)
    }

    /// Submit a signed transaction and wait for it to seal.
    ///
    /// A transaction that seals with an execution error is returned with
    /// the error in its result.
    pub async fn send_signed_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<(Transaction, TransactionResult), Error> {
        let id = self
            .gateway
            .send_signed_transaction(tx)
            .await
            .map_err(|e| Error::gateway("send transaction", e))?;
        info!(tx_id = %id, "transaction sent, waiting for seal");

        let result = self
            .gateway
            .get_transaction_result(id, true)
            .await
            .map_err(|e| Error::gateway("get transaction result", e))?;
        if let Some(error) = &result.error {
            warn!(tx_id = %id, %error, "transaction failed");
        }
        Ok((tx.clone(), result))
    }

    /// Build, sign with every role account and send a transaction.
    pub async fn send_transaction(
        &self,
        roles: &TransactionAccountRoles,
        script: Script,
        gas_limit: u64,
    ) -> Result<(Transaction, TransactionResult), Error> {
        let mut tx = self
            .build_transaction(&roles.address_roles(), roles.proposer.key.index(), script, gas_limit)
            .await?;
        roles.sign(&mut tx).await?;
        self.send_signed_transaction(&tx).await
    }

    /// Send a template transaction signed by `account` alone and fail if it
    /// does not execute.
    async fn send_as(&self, account: &Account, script: Script) -> Result<(Identifier, TransactionResult), Error> {
        let (tx, result) = self
            .send_transaction(&TransactionAccountRoles::single(account.clone()), script, MAX_GAS_LIMIT)
            .await?;
        let id = tx.id();
        match result.error {
            Some(message) => Err(Error::TransactionExecution { tx_id: id, message }),
            None => Ok((id, result)),
        }
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Create an account holding `keys`, paid and proposed by `signer`.
    pub async fn create_account(
        &self,
        signer: &Account,
        keys: &[AccountKeySpec],
    ) -> Result<(ChainAccount, Identifier), Error> {
        if keys.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one key is required to create an account".to_string(),
            ));
        }
        for key in keys {
            if key.weight() > FULL_KEY_WEIGHT {
                return Err(Error::InvalidArgument(format!(
                    "key weight {} exceeds the maximum of {}",
                    key.weight(),
                    FULL_KEY_WEIGHT
                )));
            }
        }

        let (id, result) = self
            .send_as(signer, templates::create_account(keys, &[]))
            .await?;

        let address = result
            .events_of_type(ACCOUNT_CREATED_EVENT)
            .next()
            .and_then(|event| event.payload.field("address"))
            .and_then(|field| field.as_str().map(str::parse::<Address>))
            .transpose()?
            .ok_or_else(|| {
                Error::InvalidTransaction(format!("transaction {} did not create an account", id))
            })?;
        info!(%address, tx_id = %id, "created account");

        Ok((self.get_account(address).await?, id))
    }

    // ========================================================================
    // Contracts
    // ========================================================================

    /// Deploy the contract in `script` to `account`.
    ///
    /// Returns the transaction id and whether an existing contract was
    /// replaced. Unchanged code fails with [`Error::UpdateNoDiff`], which
    /// callers treat as a skip.
    pub async fn add_contract(
        &self,
        account: &Account,
        script: Script,
        update: UpdateContract,
    ) -> Result<(Identifier, bool), Error> {
        let program = self.resolve_imports(Program::new(script.code, script.location)?)?;
        let name = program.name()?.to_string();
        let code = program.into_code();

        let on_chain = self.get_account(account.address).await?;
        let existing = on_chain.contracts.get(&name);

        let template = match existing {
            None => templates::add_account_contract(&name, &code, &script.args)?,
            Some(deployed) if *deployed == code => {
                return Err(Error::UpdateNoDiff { contract: name });
            }
            Some(_) if update == UpdateContract::AddOnly => {
                return Err(Error::ExistingContract {
                    contract: name,
                    account: account.address,
                });
            }
            // The emulator accepts any code after a removal, where an update
            // would be held to the upgrade rules.
            Some(_) if self.is_emulator() => match self.remove_contract(account, &name).await {
                Ok(_) => templates::add_account_contract(&name, &code, &script.args)?,
                Err(e) => {
                    warn!(contract = %name, error = %e, "removing contract before redeploy failed, updating instead");
                    templates::update_account_contract(&name, &code)
                }
            },
            Some(_) => templates::update_account_contract(&name, &code),
        };

        let (id, _) = self.send_as(account, template).await?;
        let updated = existing.is_some();
        info!(contract = %name, account = %account.name, tx_id = %id, updated, "deployed contract");
        Ok((id, updated))
    }

    /// Remove contract `name` from `account`.
    pub async fn remove_contract(&self, account: &Account, name: &str) -> Result<Identifier, Error> {
        let on_chain = self.get_account(account.address).await?;
        if !on_chain.contracts.contains_key(name) {
            return Err(Error::MissingContract {
                contract: name.to_string(),
                account: account.address,
                available: on_chain.contract_names(),
            });
        }

        let (id, _) = self
            .send_as(account, templates::remove_account_contract(name))
            .await?;
        info!(contract = %name, account = %account.name, tx_id = %id, "removed contract");
        Ok(id)
    }

    /// Deploy every contract configured for the network, dependencies first.
    ///
    /// Unchanged contracts are skipped. Failures do not stop the remaining
    /// deployments; they are collected into [`Error::Deploy`].
    pub async fn deploy_project(&self, update: UpdateContract) -> Result<Vec<deploy::Contract>, Error> {
        let contracts = self.state.deployment_contracts(&self.network.name)?;
        let aliases = self.state.aliases_for_network(&self.network.name)?;
        let sorted = DeploymentPlanner::new(contracts, &aliases)?.sort()?;

        let order: Vec<&str> = sorted.iter().map(|c| c.name.as_str()).collect();
        info!(network = %self.network.name, order = %order.join(", "), "deploying contracts");

        let mut failures = Vec::new();
        for contract in &sorted {
            let account = match self.state.accounts().by_name(&contract.account_name) {
                Ok(account) => account,
                Err(e) => {
                    failures.push((contract.name.clone(), Error::from(e)));
                    continue;
                }
            };
            let script = Script::new(contract.code(), contract.args.clone()).with_location(&contract.location);

            match self.add_contract(account, script, update).await {
                Ok(_) => {}
                Err(e) if e.is_update_no_diff() => {
                    info!(contract = %contract.name, "contract unchanged, skipping");
                }
                Err(e) => {
                    warn!(contract = %contract.name, error = %e, "contract deployment failed");
                    failures.push((contract.name.clone(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(sorted)
        } else {
            Err(Error::Deploy(DeployErrors(failures)))
        }
    }

    // ========================================================================
    // Keys
    // ========================================================================

    /// Generate a key, randomly or from a seed of at least 32 bytes.
    pub fn generate_key(&self, sig_algo: SignatureAlgorithm, seed: Option<&[u8]>) -> Result<PrivateKey, Error> {
        keys::generate_key(sig_algo, seed)
    }

    /// Generate a mnemonic and the key derived from it.
    pub fn generate_mnemonic_key(
        &self,
        sig_algo: SignatureAlgorithm,
        derivation_path: Option<&str>,
    ) -> Result<(PrivateKey, String), Error> {
        keys::generate_mnemonic_key(sig_algo, derivation_path)
    }

    pub fn derive_private_key_from_mnemonic(
        &self,
        mnemonic: &str,
        sig_algo: SignatureAlgorithm,
        derivation_path: Option<&str>,
    ) -> Result<PrivateKey, Error> {
        Ok(keys::derive_private_key_from_mnemonic(mnemonic, sig_algo, derivation_path)?)
    }
}

impl std::fmt::Debug for Flowkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flowkit")
            .field("network", &self.network)
            .field("state", &self.state)
            .finish()
    }
}
