//! Named, addressed and keyed accounts.

use std::path::Path;

use tracing::info;

use crate::config::AccountConfig;
use crate::error::{ConfigError, Error};
use crate::keys::AccountKey;
use crate::rw::{SharedReaderWriter, append_ignore_entry};
use crate::types::{Address, PrivateKey};

/// Ignore files updated when a key is extracted next to them.
const IGNORE_FILES: [&str; 2] = [".gitignore", ".cursorignore"];

/// An account the project can sign for.
#[derive(Clone, Debug)]
pub struct Account {
    pub name: String,
    pub address: Address,
    pub key: AccountKey,
}

impl Account {
    pub fn new(name: impl Into<String>, address: Address, key: AccountKey) -> Self {
        Self {
            name: name.into(),
            address,
            key,
        }
    }

    pub fn from_config(config: &AccountConfig, rw: SharedReaderWriter) -> Result<Self, Error> {
        Ok(Self {
            name: config.name.clone(),
            address: config.address,
            key: AccountKey::from_config(&config.key, rw)?,
        })
    }

    pub fn to_config(&self) -> AccountConfig {
        AccountConfig {
            name: self.name.clone(),
            address: self.address,
            key: self.key.to_config(),
        }
    }

    /// Move the private key into `path` and switch this account to a file key.
    ///
    /// The file name is added to `.gitignore` and `.cursorignore` in the
    /// same directory.
    pub fn extract_key_to_file(&mut self, rw: SharedReaderWriter, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        self.key = self.key.extract_to_file(path, rw.clone())?;

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let entry = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidArgument(format!("'{}' has no file name", path.display())))?;

        for ignore in IGNORE_FILES {
            let ignore_path = dir.join(ignore);
            append_ignore_entry(rw.as_ref(), &ignore_path, &entry).map_err(|source| {
                ConfigError::Io {
                    path: ignore_path.clone(),
                    source,
                }
            })?;
        }
        info!(account = %self.name, path = %path.display(), "extracted account key");
        Ok(())
    }
}

/// Ordered account registry, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct Accounts(Vec<Account>);

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[AccountConfig], rw: SharedReaderWriter) -> Result<Self, Error> {
        configs
            .iter()
            .map(|c| Account::from_config(c, rw.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn to_config(&self) -> Vec<AccountConfig> {
        self.0.iter().map(Account::to_config).collect()
    }

    pub fn by_name(&self, name: &str) -> Result<&Account, ConfigError> {
        self.0
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| ConfigError::AccountNotFound(name.to_string()))
    }

    pub fn by_name_mut(&mut self, name: &str) -> Result<&mut Account, ConfigError> {
        self.0
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| ConfigError::AccountNotFound(name.to_string()))
    }

    /// First account at `address`. Several accounts may share one.
    pub fn by_address(&self, address: &Address) -> Result<&Account, ConfigError> {
        self.0
            .iter()
            .find(|a| a.address == *address)
            .ok_or_else(|| ConfigError::AccountNotFound(address.to_string()))
    }

    /// Replace the account with the same name in place, or append.
    pub fn add_or_update(&mut self, account: Account) {
        match self.0.iter_mut().find(|a| a.name == account.name) {
            Some(existing) => *existing = account,
            None => self.0.push(account),
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<(), ConfigError> {
        let before = self.0.len();
        self.0.retain(|a| a.name != name);
        if self.0.len() == before {
            return Err(ConfigError::AccountNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|a| a.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rotate the service account to `private_key`, keeping its hash
    /// algorithm and key index.
    pub fn set_emulator_key(&mut self, service_account: &str, private_key: PrivateKey) -> Result<(), ConfigError> {
        let account = self.by_name_mut(service_account)?;
        let index = account.key.index();
        account.key = AccountKey::hex(private_key, account.key.hash_algo()).with_index(index);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Accounts {
    type Item = &'a Account;
    type IntoIter = std::slice::Iter<'a, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyType;
    use crate::rw::{MemoryFs, ReaderWriter};
    use crate::types::{HashAlgorithm, SignatureAlgorithm};
    use std::sync::Arc;

    fn account(name: &str, address: u64) -> Account {
        let key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
        Account::new(name, Address::from_u64(address), AccountKey::hex(key, HashAlgorithm::Sha3_256))
    }

    #[test]
    fn test_add_or_update_replaces_by_name() {
        let mut accounts = Accounts::new();
        accounts.add_or_update(account("alice", 1));
        accounts.add_or_update(account("bob", 2));
        accounts.add_or_update(account("alice", 3));

        assert_eq!(accounts.names(), vec!["alice", "bob"]);
        assert_eq!(accounts.by_name("alice").unwrap().address, Address::from_u64(3));
    }

    #[test]
    fn test_shared_address_lookup() {
        let mut accounts = Accounts::new();
        accounts.add_or_update(account("a", 7));
        accounts.add_or_update(account("b", 7));
        assert_eq!(accounts.by_address(&Address::from_u64(7)).unwrap().name, "a");
        assert!(accounts.by_address(&Address::from_u64(8)).is_err());
    }

    #[test]
    fn test_remove() {
        let mut accounts = Accounts::new();
        accounts.add_or_update(account("a", 1));
        accounts.remove("a").unwrap();
        assert!(accounts.is_empty());
        assert!(matches!(accounts.remove("a"), Err(ConfigError::AccountNotFound(n)) if n == "a"));
    }

    #[test]
    fn test_set_emulator_key_preserves_index_and_hash() {
        let key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
        let mut accounts = Accounts::new();
        accounts.add_or_update(Account::new(
            "svc",
            Address::from_u64(1),
            AccountKey::hex(key, HashAlgorithm::Sha2_256).with_index(3),
        ));

        let new_key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
        accounts.set_emulator_key("svc", new_key.clone()).unwrap();
        let svc = accounts.by_name("svc").unwrap();
        assert_eq!(svc.key.index(), 3);
        assert_eq!(svc.key.hash_algo(), HashAlgorithm::Sha2_256);
        assert_eq!(svc.key.private_key().unwrap(), Some(new_key));

        assert!(accounts.set_emulator_key("missing", PrivateKey::generate(SignatureAlgorithm::EcdsaP256)).is_err());
    }

    #[test]
    fn test_extract_key_to_file_updates_ignores() {
        let fs = Arc::new(MemoryFs::new().with_file("keys/.gitignore", "other.pkey\n"));
        let mut alice = account("alice", 1);
        let original = alice.key.private_key().unwrap();

        alice.extract_key_to_file(fs.clone(), "keys/alice.pkey").unwrap();
        assert_eq!(alice.key.key_type(), KeyType::File);
        assert_eq!(alice.key.private_key().unwrap(), original);

        let gitignore = String::from_utf8(fs.read_file(Path::new("keys/.gitignore")).unwrap()).unwrap();
        assert_eq!(gitignore, "other.pkey\nalice.pkey\n");
        assert!(fs.exists(Path::new("keys/.cursorignore")));

        // Second extraction leaves the ignore files unchanged.
        alice.extract_key_to_file(fs.clone(), "keys/alice.pkey").unwrap();
        let again = String::from_utf8(fs.read_file(Path::new("keys/.gitignore")).unwrap()).unwrap();
        assert_eq!(again, gitignore);
    }

    #[test]
    fn test_config_roundtrip() {
        let rw: SharedReaderWriter = Arc::new(MemoryFs::new());
        let accounts = {
            let mut a = Accounts::new();
            a.add_or_update(account("alice", 1));
            a.add_or_update(account("bob", 2));
            a
        };
        let configs = accounts.to_config();
        let loaded = Accounts::from_config(&configs, rw).unwrap();
        assert_eq!(loaded.to_config(), configs);
    }
}
