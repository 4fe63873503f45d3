//! Canonical transactions for account creation and contract management.

use crate::error::Error;
use crate::transactions::Script;
use crate::types::{AccountKeySpec, CadenceValue};

/// Gas limit for user transactions unless overridden.
pub const DEFAULT_GAS_LIMIT: u64 = 1000;

/// Gas limit used for contract deployment templates.
pub const MAX_GAS_LIMIT: u64 = 9999;

const CREATE_ACCOUNT: &str = r#"transaction(publicKeys: [String], signatureAlgorithms: [UInt8], hashAlgorithms: [UInt8], weights: [UFix64], contracts: {String: String}) {
    prepare(signer: auth(BorrowValue) &Account) {
        pre {
            publicKeys.length > 0: "At least one public key is required"
            publicKeys.length == signatureAlgorithms.length: "Every key needs a signature algorithm"
            publicKeys.length == hashAlgorithms.length: "Every key needs a hash algorithm"
            publicKeys.length == weights.length: "Every key needs a weight"
        }

        let account = Account(payer: signer)

        for i, publicKey in publicKeys {
            let key = PublicKey(
                publicKey: publicKey.decodeHex(),
                signatureAlgorithm: SignatureAlgorithm(rawValue: signatureAlgorithms[i])!
            )
            account.keys.add(
                publicKey: key,
                hashAlgorithm: HashAlgorithm(rawValue: hashAlgorithms[i])!,
                weight: weights[i]
            )
        }

        for name in contracts.keys {
            account.contracts.add(name: name, code: contracts[name]!.decodeHex())
        }
    }
}
"#;

const ADD_CONTRACT: &str = r#"transaction(name: String, code: String{params}) {
    prepare(signer: auth(AddContract) &Account) {
        signer.contracts.add(name: name, code: code.decodeHex(){args})
    }
}
"#;

const UPDATE_CONTRACT: &str = r#"transaction(name: String, code: String) {
    prepare(signer: auth(UpdateContract) &Account) {
        signer.contracts.update(name: name, code: code.decodeHex())
    }
}
"#;

const REMOVE_CONTRACT: &str = r#"transaction(name: String) {
    prepare(signer: auth(RemoveContract) &Account) {
        signer.contracts.remove(name: name)
    }
}
"#;

/// Create an account with `keys` and optional initial contracts.
pub fn create_account(keys: &[AccountKeySpec], contracts: &[(String, Vec<u8>)]) -> Script {
    let public_keys = keys
        .iter()
        .map(|k| CadenceValue::string(k.public_key.to_hex()))
        .collect();
    let sig_algos = keys
        .iter()
        .map(|k| CadenceValue::uint8(k.public_key.algorithm().cadence_raw_value()))
        .collect();
    let hash_algos = keys
        .iter()
        .map(|k| CadenceValue::uint8(k.hash_algo.cadence_raw_value()))
        .collect();
    let weights = keys
        .iter()
        .map(|k| CadenceValue::ufix64(format!("{}.00000000", k.weight())))
        .collect();
    let contracts = contracts
        .iter()
        .map(|(name, code)| (CadenceValue::string(name.clone()), CadenceValue::string(hex::encode(code))))
        .collect();

    Script::new(
        CREATE_ACCOUNT,
        vec![
            CadenceValue::array(public_keys),
            CadenceValue::array(sig_algos),
            CadenceValue::array(hash_algos),
            CadenceValue::array(weights),
            CadenceValue::dictionary(contracts),
        ],
    )
}

/// Add contract `name`, passing `init_args` to its initializer.
///
/// Each argument becomes a typed transaction parameter `argN`; with no
/// arguments the transaction takes only the name and code.
pub fn add_account_contract(name: &str, code: &[u8], init_args: &[CadenceValue]) -> Result<Script, Error> {
    let mut params = String::new();
    let mut args = String::new();
    for (i, arg) in init_args.iter().enumerate() {
        params.push_str(&format!(", arg{}: {}", i, arg.cadence_type()?));
        args.push_str(&format!(", arg{}", i));
    }

    let source = ADD_CONTRACT
        .replace("{params}", &params)
        .replace("{args}", &args);

    let mut arguments = vec![
        CadenceValue::string(name),
        CadenceValue::string(hex::encode(code)),
    ];
    arguments.extend(init_args.iter().cloned());
    Ok(Script::new(source, arguments))
}

/// Replace the code of contract `name`.
pub fn update_account_contract(name: &str, code: &[u8]) -> Script {
    Script::new(
        UPDATE_CONTRACT,
        vec![CadenceValue::string(name), CadenceValue::string(hex::encode(code))],
    )
}

/// Remove contract `name`.
pub fn remove_account_contract(name: &str) -> Script {
    Script::new(REMOVE_CONTRACT, vec![CadenceValue::string(name)])
}
