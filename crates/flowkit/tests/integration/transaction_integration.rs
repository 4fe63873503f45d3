//! Building, signing and sending transactions, and running scripts.

use flowkit::*;

use crate::emulator::{SERVICE_KEY, engine, load_state, project_fs};

const TX_SINGLE_AUTH: &str = "transaction { prepare(signer: &Account) { } }";
const TX_TWO_AUTH: &str = "transaction { prepare(a: &Account, b: &Account) { } }";

fn project() -> String {
    format!(
        r#"{{
  "emulators": {{ "default": {{ "port": 3569, "serviceAccount": "emulator-account" }} }},
  "networks": {{ "emulator": "127.0.0.1:3569" }},
  "accounts": {{
    "emulator-account": {{ "address": "f8d6e0586b0a20c7", "key": "{SERVICE_KEY}" }}
  }},
  "contracts": {{ "Hello": "./Hello.cdc" }},
  "deployments": {{ "emulator": {{ "emulator-account": ["Hello"] }} }}
}}"#
    )
}

fn new_kit() -> (Flowkit, std::sync::Arc<crate::emulator::Emulator>) {
    let fs = project_fs(&project(), &[("./Hello.cdc", "pub contract Hello {}")]);
    engine(load_state(fs), "emulator")
}

fn account(name: &str, address: u64) -> Account {
    let key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
    Account::new(name, Address::from_u64(address), AccountKey::hex(key, HashAlgorithm::Sha3_256))
}

/// Alice, Bob and Charlie, registered on the emulator.
fn people(emulator: &crate::emulator::Emulator) -> (Account, Account, Account) {
    let alice = account("alice", 0x01cf0e2f2f715450);
    let bob = account("bob", 0x179b6b1cb6755e31);
    let charlie = account("charlie", 0xf3fcd2c1a78f5eee);
    for person in [&alice, &bob, &charlie] {
        emulator.add_project_account(person);
    }
    (alice, bob, charlie)
}

#[tokio::test]
async fn test_authorizer_count_checked_before_network() {
    let (kit, emulator) = new_kit();
    let service = kit.state().emulator_service_account().unwrap().clone();
    let roles = TransactionAccountRoles::single(service);

    let err = kit
        .build_transaction(&roles.address_roles(), 0, Script::new(TX_TWO_AUTH, vec![]), 1000)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::AuthorizersMismatch {
            required: 2,
            provided: 1
        }
    ));
    assert!(emulator.scripts().is_empty());
}

#[tokio::test]
async fn test_send_with_distinct_roles() {
    let (kit, emulator) = new_kit();
    let (alice, bob, charlie) = people(&emulator);
    let roles = TransactionAccountRoles {
        proposer: alice.clone(),
        payer: bob.clone(),
        authorizers: vec![charlie.clone()],
    };

    let (tx, result) = kit
        .send_transaction(&roles, Script::new(TX_SINGLE_AUTH, vec![]), 1000)
        .await
        .unwrap();

    assert_eq!(tx.proposal_key.address, alice.address);
    assert_eq!(tx.proposal_key.sequence_number, 0);
    assert_eq!(tx.payer, bob.address);
    assert_eq!(tx.authorizers, vec![charlie.address]);
    assert_eq!(tx.gas_limit, 1000);

    let payload: Vec<Address> = tx.payload_signatures.iter().map(|s| s.address).collect();
    assert_eq!(payload, vec![alice.address, charlie.address]);
    let envelope: Vec<Address> = tx.envelope_signatures.iter().map(|s| s.address).collect();
    assert_eq!(envelope, vec![bob.address]);

    assert_eq!(result.status, TransactionStatus::Sealed);
    assert!(result.error.is_none());
    assert_eq!(emulator.sequence_number(alice.address), 1);

    // The next build picks up the advanced sequence number.
    let (next, _) = kit
        .send_transaction(&roles, Script::new(TX_SINGLE_AUTH, vec![]), 1000)
        .await
        .unwrap();
    assert_eq!(next.proposal_key.sequence_number, 1);
    assert_eq!(emulator.sequence_number(alice.address), 2);

    let (fetched, fetched_result) = kit.get_transaction_by_id(tx.id(), true).await.unwrap();
    assert_eq!(fetched, tx);
    assert_eq!(fetched_result.status, TransactionStatus::Sealed);
}

#[tokio::test]
async fn test_offline_signing_between_parties() {
    let (kit, emulator) = new_kit();
    let (alice, bob, charlie) = people(&emulator);
    let roles = TransactionAddressRoles {
        proposer: alice.address,
        payer: bob.address,
        authorizers: vec![charlie.address],
    };

    let tx = kit
        .build_transaction(&roles, 0, Script::new(TX_SINGLE_AUTH, vec![]), 500)
        .await
        .unwrap();

    // Each party receives the hex form, signs and passes it on.
    let mut payload = tx.to_hex();
    for signer in [&alice, &charlie, &bob] {
        payload = kit.sign_transaction_payload(signer, &payload).await.unwrap().to_hex();
    }
    let signed = Transaction::from_hex(&payload).unwrap();
    assert_eq!(signed.payload_signatures.len(), 2);
    assert_eq!(signed.envelope_signatures.len(), 1);

    let (_, result) = kit.send_signed_transaction(&signed).await.unwrap();
    assert_eq!(result.status, TransactionStatus::Sealed);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_offline_signing_rejects_repeats_and_late_payload() {
    let (kit, emulator) = new_kit();
    let (alice, bob, charlie) = people(&emulator);
    let roles = TransactionAddressRoles {
        proposer: alice.address,
        payer: bob.address,
        authorizers: vec![charlie.address],
    };
    let tx = kit
        .build_transaction(&roles, 0, Script::new(TX_SINGLE_AUTH, vec![]), 500)
        .await
        .unwrap();

    // Alice signing twice.
    let once = kit.sign_transaction_payload(&alice, &tx.to_hex()).await.unwrap().to_hex();
    let err = kit.sign_transaction_payload(&alice, &once).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransaction(_)));

    // Charlie signing after the payer has sealed the envelope.
    let enveloped = kit.sign_transaction_payload(&bob, &once).await.unwrap().to_hex();
    let err = kit.sign_transaction_payload(&charlie, &enveloped).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransaction(_)));
    assert!(emulator.scripts().is_empty());
}

#[tokio::test]
async fn test_commented_import_leaves_real_import_resolved() {
    let (kit, emulator) = new_kit();
    let (alice, _, _) = people(&emulator);

    let code = "// import Hello from \"./Hello.cdc\"\nimport Hello from \"./Hello.cdc\"\ntransaction { prepare(signer: &Account) { } }";
    let script = Script::new(code, vec![]).with_location("./tx.cdc");
    let (tx, result) = kit
        .send_transaction(&TransactionAccountRoles::single(alice), script, 1000)
        .await
        .unwrap();

    assert!(result.error.is_none());
    assert_eq!(
        String::from_utf8(tx.script).unwrap(),
        "// import Hello from \"./Hello.cdc\"\nimport Hello from 0xf8d6e0586b0a20c7\ntransaction { prepare(signer: &Account) { } }"
    );
}

#[tokio::test]
async fn test_signer_without_role_is_rejected() {
    let (kit, emulator) = new_kit();
    let (alice, bob, _) = people(&emulator);
    let service = kit.state().emulator_service_account().unwrap().clone();

    let tx = kit
        .build_transaction(&TransactionAccountRoles::single(alice).address_roles(), 0, Script::new(TX_SINGLE_AUTH, vec![]), 500)
        .await
        .unwrap();

    let err = kit.sign_transaction_payload(&bob, &tx.to_hex()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransaction(_)));
    let err = kit.sign_transaction_payload(&service, &tx.to_hex()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransaction(_)));
}

#[tokio::test]
async fn test_failed_execution_is_returned_in_result() {
    let (kit, emulator) = new_kit();
    let (alice, _, _) = people(&emulator);

    let script = "transaction { prepare(signer: &Account) { panic(\"no\") } }";
    let (_, result) = kit
        .send_transaction(&TransactionAccountRoles::single(alice), Script::new(script, vec![]), 1000)
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::Sealed);
    assert!(result.error.unwrap().contains("panic"));
}

#[tokio::test]
async fn test_create_account() {
    let (kit, _) = new_kit();
    let service = kit.state().emulator_service_account().unwrap().clone();
    let key = kit.generate_key(SignatureAlgorithm::EcdsaSecp256k1, None).unwrap();

    let (created, _) = kit
        .create_account(&service, &[AccountKeySpec::new(key.public_key(), HashAlgorithm::Sha2_256)])
        .await
        .unwrap();

    assert_eq!(created.address, Address::from_u64(0x01cf0e2f2f715450));
    assert!(created.address.is_valid(ChainId::Emulator));
    assert_eq!(created.keys.len(), 1);
    assert_eq!(created.keys[0].public_key, key.public_key());
    assert_eq!(created.keys[0].sig_algo, SignatureAlgorithm::EcdsaSecp256k1);
    assert_eq!(created.keys[0].hash_algo, HashAlgorithm::Sha2_256);

    // The new account can sign for itself.
    let owner = Account::new("owner", created.address, AccountKey::hex(key, HashAlgorithm::Sha2_256));
    let (_, result) = kit
        .send_transaction(&TransactionAccountRoles::single(owner), Script::new(TX_SINGLE_AUTH, vec![]), 1000)
        .await
        .unwrap();
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_create_account_rejects_bad_keys() {
    let (kit, emulator) = new_kit();
    let service = kit.state().emulator_service_account().unwrap().clone();

    let err = kit.create_account(&service, &[]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
    let heavy = AccountKeySpec {
        weight: Some(FULL_KEY_WEIGHT + 1),
        ..AccountKeySpec::new(key.public_key(), HashAlgorithm::Sha3_256)
    };
    let err = kit.create_account(&service, &[heavy]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(emulator.scripts().is_empty());
}

#[tokio::test]
async fn test_execute_script_resolves_imports() {
    let (kit, _) = new_kit();

    let code = "import Hello\naccess(all) fun main(): Bool { return true }";
    let result = kit.execute_script(Script::new(code, vec![])).await.unwrap();

    // The stand-in echoes the code it was asked to run.
    assert_eq!(
        result.as_str(),
        Some("import Hello from 0xf8d6e0586b0a20c7\naccess(all) fun main(): Bool { return true }")
    );
}

#[tokio::test]
async fn test_transactions_by_block() {
    let (kit, emulator) = new_kit();
    let (alice, _, _) = people(&emulator);

    let (tx, result) = kit
        .send_transaction(&TransactionAccountRoles::single(alice), Script::new(TX_SINGLE_AUTH, vec![]), 1000)
        .await
        .unwrap();

    let block = kit.get_block(BlockQuery::Id(result.block_id)).await.unwrap();
    assert_eq!(block.height(), result.block_height);

    let (transactions, results) = kit.get_transactions_by_block_id(result.block_id).await.unwrap();
    assert_eq!(transactions, vec![tx]);
    assert_eq!(results.len(), 1);
}
