//! In-process stand-in for an emulator access node.
//!
//! Checks proposal sequence numbers and every signature against the keys
//! stored on its accounts, then interprets the contract and account
//! templates well enough to keep contract code and accounts up to date.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowkit::*;
use serde_json::{Value, json};

/// Addresses handed out to new accounts, in emulator order.
const NEW_ACCOUNT_ADDRESSES: [u64; 4] = [
    0x01cf0e2f2f715450,
    0x179b6b1cb6755e31,
    0xf3fcd2c1a78f5eee,
    0xe03daebed8ca0615,
];

#[derive(Default)]
struct Chain {
    accounts: HashMap<Address, ChainAccount>,
    transactions: HashMap<Identifier, (Transaction, TransactionResult)>,
    events: Vec<BlockEvents>,
    scripts: Vec<String>,
    height: u64,
    created: usize,
    failing_event_type: Option<String>,
}

#[derive(Default)]
pub struct Emulator {
    chain: Mutex<Chain>,
}

fn api_error(message: impl Into<String>) -> GatewayError {
    GatewayError::Api {
        code: 400,
        message: message.into(),
    }
}

fn block_id(height: u64) -> Identifier {
    Identifier::hash(&height.to_be_bytes())
}

impl Emulator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an account holding one full-weight key at index 0.
    pub fn add_account(&self, address: Address, key: &PrivateKey, hash_algo: HashAlgorithm) {
        let mut chain = self.chain.lock().unwrap();
        chain.accounts.insert(
            address,
            ChainAccount {
                address,
                balance: 100_000_000,
                keys: vec![AccountPublicKey {
                    index: 0,
                    public_key: key.public_key(),
                    sig_algo: key.algorithm(),
                    hash_algo,
                    weight: FULL_KEY_WEIGHT,
                    sequence_number: 0,
                    revoked: false,
                }],
                contracts: BTreeMap::new(),
            },
        );
    }

    /// Register `account`, which must hold a hex key.
    pub fn add_project_account(&self, account: &Account) {
        let key = account.key.private_key().unwrap().unwrap();
        self.add_account(account.address, &key, account.key.hash_algo());
    }

    pub fn contract(&self, address: Address, name: &str) -> Option<String> {
        let chain = self.chain.lock().unwrap();
        chain
            .accounts
            .get(&address)?
            .contracts
            .get(name)
            .map(|code| String::from_utf8_lossy(code).into_owned())
    }

    pub fn sequence_number(&self, address: Address) -> u64 {
        let chain = self.chain.lock().unwrap();
        chain.accounts[&address].keys[0].sequence_number
    }

    /// Transaction scripts received so far, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.chain.lock().unwrap().scripts.clone()
    }

    pub fn add_event(&self, height: u64, event_type: &str) {
        let mut chain = self.chain.lock().unwrap();
        chain.events.push(BlockEvents {
            block_id: block_id(height),
            height,
            block_timestamp: "2024-01-01T00:00:00Z".to_string(),
            events: vec![Event {
                event_type: event_type.to_string(),
                transaction_id: Identifier::ZERO,
                transaction_index: 0,
                event_index: 0,
                payload: CadenceValue::new("Event", json!({ "id": event_type, "fields": [] })),
            }],
        });
    }

    /// Make every event query for `event_type` fail.
    pub fn fail_events_of(&self, event_type: &str) {
        self.chain.lock().unwrap().failing_event_type = Some(event_type.to_string());
    }

    fn verify(chain: &Chain, signature: &TransactionSignature, message: &[u8]) -> Result<(), GatewayError> {
        let key = chain
            .accounts
            .get(&signature.address)
            .and_then(|a| a.key(signature.key_index))
            .ok_or_else(|| api_error(format!("unknown key {} of {}", signature.key_index, signature.address)))?;
        if key.public_key.verify(&signature.signature, message, key.hash_algo) {
            Ok(())
        } else {
            Err(api_error(format!("invalid signature from {}", signature.address)))
        }
    }

    fn check_signatures(chain: &Chain, tx: &Transaction) -> Result<(), GatewayError> {
        if tx.envelope_signatures.len() != 1 || tx.envelope_signatures[0].address != tx.payer {
            return Err(api_error("envelope must be signed by the payer alone"));
        }
        for signature in &tx.payload_signatures {
            Self::verify(chain, signature, &tx.payload_message())?;
        }
        Self::verify(chain, &tx.envelope_signatures[0], &tx.envelope_message())?;

        for signer in tx.signer_list() {
            let signed = signer == tx.payer
                || tx.payload_signatures.iter().any(|s| s.address == signer);
            if !signed {
                return Err(api_error(format!("missing signature from {}", signer)));
            }
        }
        Ok(())
    }

    /// Apply a transaction, returning its events or an execution error.
    fn execute(chain: &mut Chain, tx: &Transaction, id: Identifier) -> Result<Vec<Event>, String> {
        let script = String::from_utf8_lossy(&tx.script).into_owned();
        let args: Vec<CadenceValue> = tx
            .arguments
            .iter()
            .map(|a| CadenceValue::from_json_bytes(a).map_err(|e| e.to_string()))
            .collect::<Result<_, _>>()?;
        let string_arg = |i: usize| args.get(i).and_then(|a| a.as_str()).map(str::to_string);
        let signer = tx.authorizers.first().copied().unwrap_or(tx.payer);

        if script.contains("panic(") {
            return Err("panic: transaction aborted".to_string());
        }

        if script.contains("Account(payer: signer)") {
            let address = Address::from_u64(NEW_ACCOUNT_ADDRESSES[chain.created]);
            chain.created += 1;
            let items = |i: usize| args[i].value.as_array().cloned().unwrap_or_default();
            let raw = |v: &Value| v["value"].as_str().unwrap_or_default().to_string();

            let mut keys = Vec::new();
            for (index, ((public, sig), hash)) in items(0).iter().zip(items(1)).zip(items(2)).enumerate() {
                let sig_algo = match raw(&sig).as_str() {
                    "1" => SignatureAlgorithm::EcdsaP256,
                    _ => SignatureAlgorithm::EcdsaSecp256k1,
                };
                let hash_algo = match raw(&hash).as_str() {
                    "1" => HashAlgorithm::Sha2_256,
                    _ => HashAlgorithm::Sha3_256,
                };
                keys.push(AccountPublicKey {
                    index: index as u32,
                    public_key: PublicKey::from_hex(sig_algo, &raw(public)).map_err(|e| e.to_string())?,
                    sig_algo,
                    hash_algo,
                    weight: FULL_KEY_WEIGHT,
                    sequence_number: 0,
                    revoked: false,
                });
            }
            chain.accounts.insert(
                address,
                ChainAccount {
                    address,
                    balance: 100_000,
                    keys,
                    contracts: BTreeMap::new(),
                },
            );

            let payload = json!({
                "id": "flow.AccountCreated",
                "fields": [{ "name": "address", "value": { "type": "Address", "value": address.to_hex_prefixed() } }]
            });
            return Ok(vec![Event {
                event_type: "flow.AccountCreated".to_string(),
                transaction_id: id,
                transaction_index: 0,
                event_index: 0,
                payload: CadenceValue::new("Event", payload),
            }]);
        }

        let account = chain
            .accounts
            .get_mut(&signer)
            .ok_or_else(|| format!("account {} not found", signer))?;
        let name = string_arg(0).ok_or("missing contract name")?;
        let code = || {
            string_arg(1)
                .and_then(|h| hex::decode(h).ok())
                .ok_or_else(|| "missing contract code".to_string())
        };

        if script.contains(".contracts.add(") {
            if account.contracts.contains_key(&name) {
                return Err(format!("cannot overwrite existing contract with name {:?}", name));
            }
            account.contracts.insert(name, code()?);
        } else if script.contains(".contracts.update(") {
            if !account.contracts.contains_key(&name) {
                return Err(format!("cannot update non-existing contract with name {:?}", name));
            }
            account.contracts.insert(name, code()?);
        } else if script.contains(".contracts.remove(") {
            account.contracts.remove(&name);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl Gateway for Emulator {
    async fn ping(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn get_account(&self, address: Address) -> Result<ChainAccount, GatewayError> {
        let chain = self.chain.lock().unwrap();
        chain
            .accounts
            .get(&address)
            .cloned()
            .ok_or(GatewayError::AccountNotFound(address))
    }

    async fn get_latest_block(&self) -> Result<Block, GatewayError> {
        let height = self.chain.lock().unwrap().height;
        self.get_block_by_height(height).await
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Block, GatewayError> {
        Ok(Block {
            header: BlockHeader {
                id: block_id(height),
                parent_id: block_id(height.saturating_sub(1)),
                height,
                timestamp: "2024-01-01T00:00:00Z".to_string(),
            },
            collection_ids: Vec::new(),
        })
    }

    async fn get_block_by_id(&self, id: Identifier) -> Result<Block, GatewayError> {
        let height = self.chain.lock().unwrap().height;
        match (0..=height).find(|h| block_id(*h) == id) {
            Some(height) => self.get_block_by_height(height).await,
            None => Err(GatewayError::NotFound(format!("block {}", id))),
        }
    }

    async fn get_collection(&self, id: Identifier) -> Result<Collection, GatewayError> {
        Err(GatewayError::NotFound(format!("collection {}", id)))
    }

    async fn get_events(
        &self,
        event_type: &str,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<BlockEvents>, GatewayError> {
        let chain = self.chain.lock().unwrap();
        if chain.failing_event_type.as_deref() == Some(event_type) {
            return Err(GatewayError::Api {
                code: 400,
                message: format!("invalid event type {}", event_type),
            });
        }
        Ok(chain
            .events
            .iter()
            .filter(|b| (start_height..=end_height).contains(&b.height))
            .filter(|b| b.events.iter().any(|e| e.event_type == event_type))
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, id: Identifier) -> Result<Transaction, GatewayError> {
        let chain = self.chain.lock().unwrap();
        chain
            .transactions
            .get(&id)
            .map(|(tx, _)| tx.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("transaction {}", id)))
    }

    async fn get_transaction_result(
        &self,
        id: Identifier,
        _wait_seal: bool,
    ) -> Result<TransactionResult, GatewayError> {
        let chain = self.chain.lock().unwrap();
        chain
            .transactions
            .get(&id)
            .map(|(_, result)| result.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("transaction result {}", id)))
    }

    async fn get_transactions_by_block_id(&self, block_id: Identifier) -> Result<Vec<Transaction>, GatewayError> {
        let chain = self.chain.lock().unwrap();
        Ok(chain
            .transactions
            .values()
            .filter(|(_, r)| r.block_id == block_id)
            .map(|(tx, _)| tx.clone())
            .collect())
    }

    async fn get_transaction_results_by_block_id(
        &self,
        block_id: Identifier,
    ) -> Result<Vec<TransactionResult>, GatewayError> {
        let chain = self.chain.lock().unwrap();
        Ok(chain
            .transactions
            .values()
            .filter(|(_, r)| r.block_id == block_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn get_system_transaction(&self, _block_id: Identifier) -> Result<Transaction, GatewayError> {
        Err(GatewayError::Unsupported("system transactions"))
    }

    async fn get_system_transaction_result(&self, _block_id: Identifier) -> Result<TransactionResult, GatewayError> {
        Err(GatewayError::Unsupported("system transactions"))
    }

    async fn send_signed_transaction(&self, tx: &Transaction) -> Result<Identifier, GatewayError> {
        let mut chain = self.chain.lock().unwrap();
        Self::check_signatures(&chain, tx)?;

        let proposal = &tx.proposal_key;
        let key = chain
            .accounts
            .get_mut(&proposal.address)
            .and_then(|a| a.keys.iter_mut().find(|k| k.index == proposal.key_index))
            .ok_or_else(|| api_error("unknown proposal key"))?;
        if key.sequence_number != proposal.sequence_number {
            return Err(api_error(format!(
                "invalid proposal key sequence number: expected {}, got {}",
                key.sequence_number, proposal.sequence_number
            )));
        }
        key.sequence_number += 1;

        let id = tx.id();
        chain.scripts.push(String::from_utf8_lossy(&tx.script).into_owned());
        chain.height += 1;
        let (events, error) = match Self::execute(&mut chain, tx, id) {
            Ok(events) => (events, None),
            Err(message) => (Vec::new(), Some(message)),
        };
        let result = TransactionResult {
            status: TransactionStatus::Sealed,
            error,
            events,
            block_id: block_id(chain.height),
            block_height: chain.height,
            computation_used: 10,
        };
        chain.transactions.insert(id, (tx.clone(), result));
        Ok(id)
    }

    async fn execute_script(&self, code: &[u8], _args: &[CadenceValue]) -> Result<CadenceValue, GatewayError> {
        Ok(CadenceValue::string(String::from_utf8_lossy(code)))
    }

    async fn get_latest_protocol_state_snapshot(&self) -> Result<Vec<u8>, GatewayError> {
        Err(GatewayError::Unsupported("protocol state snapshots"))
    }

    fn secure_connection(&self) -> bool {
        false
    }
}

// ============================================================================
// Project helpers
// ============================================================================

/// Key of the emulator service account in test projects.
pub const SERVICE_KEY: &str = "21c4f269ef0a5fd1badf47eeacebeeaa3de22eb8e5b0adcd0f27dd99d34d0119";

/// An in-memory project with `flow.json` and the given sources.
pub fn project_fs(config: &str, files: &[(&str, &str)]) -> Arc<MemoryFs> {
    let mut fs = MemoryFs::new().with_file("flow.json", config);
    for (path, source) in files {
        fs = fs.with_file(*path, *source);
    }
    Arc::new(fs)
}

pub fn load_state(fs: Arc<MemoryFs>) -> State {
    State::load(fs, &[PathBuf::from("flow.json")]).unwrap()
}

/// Route engine logs to the test output, filtered by `RUST_LOG`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine on `network` backed by a fresh emulator that knows every
/// configured account.
pub fn engine(state: State, network: &str) -> (Flowkit, Arc<Emulator>) {
    init_logging();
    let emulator = Emulator::new();
    for account in state.accounts().iter() {
        emulator.add_project_account(account);
    }
    let network = state.network(network).unwrap();
    let gateway: Arc<dyn Gateway> = emulator.clone();
    (Flowkit::new(state, network, gateway), emulator)
}
