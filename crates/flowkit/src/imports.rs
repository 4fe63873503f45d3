//! Resolving symbolic imports to addresses.

use std::collections::HashMap;

use tracing::debug;

use crate::accounts::Accounts;
use crate::error::{Error, ImportError};
use crate::program::{ImportKind, Program};
use crate::types::Address;

/// A contract with a known target address, as seen by the replacer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractLocation {
    pub name: String,
    pub location: String,
    pub address: Address,
}

/// Maps import tokens to addresses: file paths and contract names first,
/// then account names.
#[derive(Clone, Debug, Default)]
pub struct ImportReplacer {
    contract_locations: HashMap<String, Address>,
    account_locations: HashMap<String, Address>,
}

impl ImportReplacer {
    /// Build lookups from deployable contracts, aliases (keyed by location or
    /// name) and named accounts.
    pub fn new<'a>(
        contracts: impl IntoIterator<Item = &'a ContractLocation>,
        aliases: &HashMap<String, Address>,
        accounts: &Accounts,
    ) -> Self {
        let mut contract_locations = HashMap::new();
        for contract in contracts {
            contract_locations.insert(clean_path(&contract.location), contract.address);
            contract_locations.insert(contract.name.clone(), contract.address);
        }
        for (location, address) in aliases {
            contract_locations.insert(clean_path(location), *address);
        }

        let account_locations = accounts
            .iter()
            .map(|a| (a.name.clone(), a.address))
            .collect();

        Self {
            contract_locations,
            account_locations,
        }
    }

    /// Address an import of `program` resolves to, if any.
    pub fn resolve(&self, program: &Program, token: &str, kind: ImportKind) -> Result<Option<Address>, ImportError> {
        match kind {
            ImportKind::FilePath => {
                let location = program
                    .location()
                    .ok_or_else(|| ImportError::MissingLocation {
                        token: token.to_string(),
                    })?;
                let resolved = resolve_relative(location, token);
                Ok(self.contract_locations.get(&resolved).copied())
            }
            ImportKind::Identifier => Ok(self
                .contract_locations
                .get(token)
                .or_else(|| self.account_locations.get(token))
                .copied()),
        }
    }

    /// Rewrite every import of `program` to its address.
    pub fn replace(&self, mut program: Program) -> Result<Program, Error> {
        let imports = program.imports().to_vec();
        for import in imports {
            let address = self
                .resolve(&program, &import.token, import.kind)?
                .ok_or_else(|| ImportError::Unresolved {
                    token: import.token.clone(),
                })?;
            debug!(import = %import.token, %address, "resolved import");
            program.replace_import(&import.token, address)?;
        }
        if let Some(left) = program.imports().first() {
            return Err(ImportError::Unresolved {
                token: left.token.clone(),
            }
            .into());
        }
        Ok(program)
    }
}

/// Resolve `token` against the directory of `location`.
pub fn resolve_relative(location: &str, token: &str) -> String {
    if token.starts_with('/') {
        return clean_path(token);
    }
    clean_path(&format!("{}/{}", parent_dir(location), token))
}

fn parent_dir(location: &str) -> &str {
    match location.rfind('/') {
        Some(0) => "/",
        Some(idx) => &location[..idx],
        None => ".",
    }
}

/// Lexically normalize a slash-separated path: drop `.` elements, apply
/// `..` where possible and collapse repeated slashes.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
