//! The `flow.json` file format.
//!
//! Most entries have a short form and an advanced form:
//!
//! ```json
//! {
//!   "contracts": {
//!     "Hello": "./cadence/Hello.cdc",
//!     "FungibleToken": {
//!       "source": "./cadence/FungibleToken.cdc",
//!       "aliases": { "testnet": "9a0766d93b6608b7" }
//!     }
//!   },
//!   "networks": { "emulator": "127.0.0.1:3569" },
//!   "accounts": {
//!     "emulator-account": { "address": "f8d6e0586b0a20c7", "key": "<hex>" }
//!   },
//!   "deployments": { "emulator": { "emulator-account": ["Hello"] } }
//! }
//! ```
//!
//! Short forms are written back whenever an entry carries only defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    AccountConfig, Alias, Config, Contract, ContractDeployment, Deployment, Emulator, KeyConfig,
    KeyType, Network, Parser, Substitutions,
};
use crate::error::{ConfigError, ParseKeyError};
use crate::types::{CadenceValue, HashAlgorithm, PrivateKey, SignatureAlgorithm};

/// Parser for JSON configuration files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn supports(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
    }

    fn parse(&self, path: &Path, raw: &[u8], vars: &mut Substitutions) -> Result<Config, ConfigError> {
        let mut root: Value = serde_json::from_slice(raw).map_err(|e| parse_error(path, e))?;
        map_strings(&mut root, &mut |s| {
            let resolved = vars.substitute(s);
            *s = resolved;
        });
        let root = root
            .as_object()
            .ok_or_else(|| parse_error(path, "top level must be an object"))?;

        if is_outdated(root) {
            return Err(ConfigError::OutdatedFormat(path.to_path_buf()));
        }

        let mut config = Config::default();

        for (name, value) in section(root, "emulators") {
            let e: JsonEmulator = from_value(path, value)?;
            config.emulators.push(Emulator {
                name: name.clone(),
                port: e.port,
                service_account: e.service_account,
            });
        }

        for (name, value) in section(root, "contracts") {
            config.contracts.push(match from_value(path, value)? {
                JsonContract::Simple(location) => Contract {
                    name: name.clone(),
                    location,
                    aliases: Vec::new(),
                },
                JsonContract::Advanced { source, aliases } => Contract {
                    name: name.clone(),
                    location: source,
                    aliases: aliases
                        .into_iter()
                        .map(|(network, address)| {
                            let address = address
                                .parse()
                                .map_err(|e| parse_error(path, format!("alias for {}: {}", name, e)))?;
                            Ok(Alias { network, address })
                        })
                        .collect::<Result<_, ConfigError>>()?,
                },
            });
        }

        for (name, value) in section(root, "networks") {
            config.networks.push(match from_value(path, value)? {
                JsonNetwork::Simple(host) => Network::new(name.clone(), host),
                JsonNetwork::Advanced { host, key, fork } => Network {
                    name: name.clone(),
                    host,
                    key,
                    fork,
                },
            });
        }

        for (name, value) in section(root, "accounts") {
            let account: JsonAccount = from_value(path, value)?;
            let address = account
                .address
                .parse()
                .map_err(|e| parse_error(path, format!("account {}: {}", name, e)))?;
            let key = account
                .key
                .into_key_config()
                .map_err(|e| parse_error(path, format!("account {}: {}", name, e)))?;
            config.accounts.push(AccountConfig {
                name: name.clone(),
                address,
                key,
            });
        }

        for (network, value) in section(root, "deployments") {
            let accounts: Map<String, Value> = from_value(path, value)?;
            for (account, contracts) in accounts {
                let contracts: Vec<JsonDeployment> = from_value(path, &contracts)?;
                config.deployments.push(Deployment {
                    network: network.clone(),
                    account,
                    contracts: contracts
                        .into_iter()
                        .map(|c| match c {
                            JsonDeployment::Simple(name) => ContractDeployment::new(name),
                            JsonDeployment::Advanced { name, args } => {
                                ContractDeployment { name, args }
                            }
                        })
                        .collect(),
                });
            }
        }

        Ok(config)
    }

    fn serialize(&self, config: &Config, vars: &Substitutions) -> Result<Vec<u8>, ConfigError> {
        let mut root = Map::new();

        if !config.emulators.is_empty() {
            let mut emulators = Map::new();
            for e in &config.emulators {
                emulators.insert(
                    e.name.clone(),
                    to_value(&JsonEmulator {
                        port: e.port,
                        service_account: e.service_account.clone(),
                    })?,
                );
            }
            root.insert("emulators".to_string(), Value::Object(emulators));
        }

        let mut contracts = Map::new();
        for c in &config.contracts {
            let value = if c.aliases.is_empty() {
                JsonContract::Simple(c.location.clone())
            } else {
                JsonContract::Advanced {
                    source: c.location.clone(),
                    aliases: c
                        .aliases
                        .iter()
                        .map(|a| (a.network.clone(), a.address.to_string()))
                        .collect(),
                }
            };
            contracts.insert(c.name.clone(), to_value(&value)?);
        }
        root.insert("contracts".to_string(), Value::Object(contracts));

        let mut networks = Map::new();
        for n in &config.networks {
            let value = if n.key.is_none() && n.fork.is_none() {
                JsonNetwork::Simple(n.host.clone())
            } else {
                JsonNetwork::Advanced {
                    host: n.host.clone(),
                    key: n.key.clone(),
                    fork: n.fork.clone(),
                }
            };
            networks.insert(n.name.clone(), to_value(&value)?);
        }
        root.insert("networks".to_string(), Value::Object(networks));

        let mut accounts = Map::new();
        for a in &config.accounts {
            accounts.insert(
                a.name.clone(),
                to_value(&JsonAccount {
                    address: a.address.to_string(),
                    key: JsonKey::from_key_config(&a.key),
                })?,
            );
        }
        root.insert("accounts".to_string(), Value::Object(accounts));

        let mut deployments = Map::new();
        for d in &config.deployments {
            let contracts: Vec<JsonDeployment> = d
                .contracts
                .iter()
                .map(|c| {
                    if c.args.is_empty() {
                        JsonDeployment::Simple(c.name.clone())
                    } else {
                        JsonDeployment::Advanced {
                            name: c.name.clone(),
                            args: c.args.clone(),
                        }
                    }
                })
                .collect();
            let entry = deployments
                .entry(d.network.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(by_account) = entry {
                by_account.insert(d.account.clone(), to_value(&contracts)?);
            }
        }
        root.insert("deployments".to_string(), Value::Object(deployments));

        let mut root = Value::Object(root);
        map_strings(&mut root, &mut |s| {
            if let Some(template) = vars.template_of(s) {
                *s = template.to_string();
            }
        });

        let mut out = serde_json::to_vec_pretty(&root).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        out.push(b'\n');
        Ok(out)
    }
}

/// Apply `f` to every string value. Object keys are left alone.
fn map_strings(value: &mut Value, f: &mut dyn FnMut(&mut String)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => {
            for item in items {
                map_strings(item, f);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                map_strings(item, f);
            }
        }
        _ => {}
    }
}

fn parse_error(path: &Path, message: impl ToString) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn section<'a>(root: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
    root.get(key)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|m| m.iter())
}

fn from_value<T: serde::de::DeserializeOwned>(path: &Path, value: &Value) -> Result<T, ConfigError> {
    serde_json::from_value(value.clone()).map_err(|e| parse_error(path, e))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ConfigError> {
    serde_json::to_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Pre-1.0 files described accounts with `keys` and `chain` fields.
fn is_outdated(root: &Map<String, Value>) -> bool {
    section(root, "accounts").any(|(_, account)| {
        account
            .as_object()
            .is_some_and(|a| a.contains_key("keys") || a.contains_key("chain"))
    })
}

// ============================================================================
// File Schema
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonEmulator {
    port: u16,
    service_account: String,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonContract {
    Simple(String),
    Advanced {
        source: String,
        #[serde(default, with = "ordered_pairs")]
        aliases: Vec<(String, String)>,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonNetwork {
    Simple(String),
    Advanced {
        #[serde(default)]
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fork: Option<String>,
    },
}

#[derive(Serialize, Deserialize)]
struct JsonAccount {
    address: String,
    key: JsonKey,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonKey {
    Hex(String),
    Advanced(JsonAdvancedKey),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonAdvancedKey {
    #[serde(rename = "type", default = "default_key_type")]
    key_type: String,
    #[serde(default)]
    index: u32,
    #[serde(default = "default_sig_algo")]
    signature_algorithm: String,
    #[serde(default = "default_hash_algo")]
    hash_algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(rename = "resourceID", default, skip_serializing_if = "Option::is_none")]
    resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mnemonic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    derivation_path: Option<String>,
}

fn default_key_type() -> String {
    KeyType::Hex.as_str().to_string()
}

fn default_sig_algo() -> String {
    SignatureAlgorithm::default().as_str().to_string()
}

fn default_hash_algo() -> String {
    HashAlgorithm::default().as_str().to_string()
}

impl JsonKey {
    fn into_key_config(self) -> Result<KeyConfig, String> {
        match self {
            JsonKey::Hex(hex) => {
                let private_key = PrivateKey::from_hex(SignatureAlgorithm::default(), &hex)
                    .map_err(|e| e.to_string())?;
                Ok(KeyConfig::hex(private_key, HashAlgorithm::default()))
            }
            JsonKey::Advanced(k) => {
                let key_type: KeyType = k.key_type.parse().map_err(|e: ParseKeyError| e.to_string())?;
                let sig_algo: SignatureAlgorithm = k
                    .signature_algorithm
                    .parse()
                    .map_err(|e: ParseKeyError| e.to_string())?;
                let hash_algo: HashAlgorithm = k
                    .hash_algorithm
                    .parse()
                    .map_err(|e: ParseKeyError| e.to_string())?;

                let private_key = match (key_type, &k.private_key) {
                    (KeyType::Hex, Some(hex)) => {
                        Some(PrivateKey::from_hex(sig_algo, hex).map_err(|e| e.to_string())?)
                    }
                    (KeyType::Hex, None) => return Err("hex key requires privateKey".to_string()),
                    _ => None,
                };
                match key_type {
                    KeyType::File if k.location.is_none() => {
                        return Err("file key requires location".to_string());
                    }
                    KeyType::GoogleKms if k.resource_id.is_none() => {
                        return Err("google-kms key requires resourceID".to_string());
                    }
                    KeyType::Bip44 if k.mnemonic.is_none() => {
                        return Err("bip44 key requires mnemonic".to_string());
                    }
                    _ => {}
                }

                Ok(KeyConfig {
                    key_type,
                    index: k.index,
                    sig_algo,
                    hash_algo,
                    private_key,
                    location: k.location,
                    resource_id: k.resource_id,
                    mnemonic: k.mnemonic,
                    derivation_path: k.derivation_path,
                })
            }
        }
    }

    fn from_key_config(key: &KeyConfig) -> Self {
        let defaults = key.index == 0
            && key.sig_algo == SignatureAlgorithm::default()
            && key.hash_algo == HashAlgorithm::default();

        if let (KeyType::Hex, Some(private_key), true) = (key.key_type, &key.private_key, defaults) {
            return JsonKey::Hex(private_key.to_hex());
        }

        JsonKey::Advanced(JsonAdvancedKey {
            key_type: key.key_type.as_str().to_string(),
            index: key.index,
            signature_algorithm: key.sig_algo.as_str().to_string(),
            hash_algorithm: key.hash_algo.as_str().to_string(),
            private_key: key.private_key.as_ref().map(PrivateKey::to_hex),
            location: key.location.clone(),
            resource_id: key.resource_id.clone(),
            mnemonic: key.mnemonic.clone(),
            derivation_path: key.derivation_path.clone(),
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonDeployment {
    Simple(String),
    Advanced { name: String, args: Vec<CadenceValue> },
}

/// A JSON object kept as ordered pairs.
mod ordered_pairs {
    use serde::{Deserialize, Deserializer, Serializer, ser::SerializeMap};
    use serde_json::{Map, Value};

    pub fn serialize<S: Serializer>(pairs: &[(String, String)], s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(pairs.len()))?;
        for (k, v) in pairs {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(String, String)>, D::Error> {
        let map: Map<String, Value> = Deserialize::deserialize(d)?;
        map.into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k, s)),
                other => Err(serde::de::Error::custom(format!(
                    "expected string for '{}', got {}",
                    k, other
                ))),
            })
            .collect()
    }
}
