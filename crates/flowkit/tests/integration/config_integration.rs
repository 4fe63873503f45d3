//! Project state on disk: init, save, reload and key files.

use std::sync::Arc;

use flowkit::config::KeyType;
use flowkit::*;

#[test]
fn test_init_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.json");

    let mut state = State::init(Arc::new(FileSystem), SignatureAlgorithm::EcdsaP256, HashAlgorithm::Sha3_256).unwrap();
    let service = state.emulator_service_account().unwrap().clone();
    assert_eq!(service.address, ChainId::Emulator.service_address());
    state.save(&path).unwrap();

    let reloaded = State::load(Arc::new(FileSystem), &[path]).unwrap();
    let loaded = reloaded.emulator_service_account().unwrap();
    assert_eq!(loaded.address, service.address);
    assert_eq!(
        loaded.key.private_key().unwrap().unwrap().to_hex(),
        service.key.private_key().unwrap().unwrap().to_hex()
    );
    assert_eq!(reloaded.network("testnet").unwrap().host, "access.devnet.nodes.onflow.org:9000");
}

#[test]
fn test_extracted_key_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.json");
    let key_path = dir.path().join("emulator-account.pkey");
    let rw: SharedReaderWriter = Arc::new(FileSystem);

    let mut state = State::init(rw.clone(), SignatureAlgorithm::EcdsaSecp256k1, HashAlgorithm::Sha2_256).unwrap();
    let original = state.emulator_service_account().unwrap().key.private_key().unwrap().unwrap();
    state
        .accounts_mut()
        .by_name_mut("emulator-account")
        .unwrap()
        .extract_key_to_file(rw.clone(), &key_path)
        .unwrap();
    state.save(&path).unwrap();

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(!saved.contains(&original.to_hex()));
    let ignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(ignore.lines().any(|l| l == "emulator-account.pkey"));

    let reloaded = State::load(rw, &[path]).unwrap();
    let account = reloaded.emulator_service_account().unwrap();
    assert_eq!(account.key.key_type(), KeyType::File);
    assert_eq!(account.key.sig_algo(), SignatureAlgorithm::EcdsaSecp256k1);
    assert_eq!(account.key.private_key().unwrap().unwrap().to_hex(), original.to_hex());

    let signer = tokio_test::block_on(account.key.signer()).unwrap();
    let signature = tokio_test::block_on(signer.sign(b"message")).unwrap();
    assert!(original.public_key().verify(&signature, b"message", HashAlgorithm::Sha2_256));
}

#[test]
fn test_rotate_emulator_key() {
    let mut state = State::init(Arc::new(MemoryFs::new()), SignatureAlgorithm::EcdsaP256, HashAlgorithm::Sha3_256).unwrap();
    let key = PrivateKey::generate(SignatureAlgorithm::EcdsaP256);
    state.set_emulator_key(key.clone()).unwrap();

    let service = state.emulator_service_account().unwrap();
    assert_eq!(service.key.private_key().unwrap().unwrap().to_hex(), key.to_hex());
}

#[test]
fn test_missing_config() {
    let err = State::load(Arc::new(MemoryFs::new()), &[std::path::PathBuf::from("flow.json")]).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::NotFound(_))));
}

#[test]
fn test_slip10_p256_vector() {
    let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
    let key = keys::derive_private_key_from_seed(
        &seed,
        SignatureAlgorithm::EcdsaP256,
        Some("m/0'/1/2'/2/1000000000"),
    )
    .unwrap();
    assert_eq!(
        key.to_hex(),
        "21c4f269ef0a5fd1badf47eeacebeeaa3de22eb8e5b0adcd0f27dd99d34d0119"
    );
}

#[test]
fn test_generated_mnemonic_derives_same_key() {
    let state = State::init(Arc::new(MemoryFs::new()), SignatureAlgorithm::EcdsaP256, HashAlgorithm::Sha3_256).unwrap();
    let network = state.network("emulator").unwrap();
    let kit = Flowkit::new(state, network, Arc::new(HttpGateway::new("http://127.0.0.1:1")));

    let (key, mnemonic) = kit.generate_mnemonic_key(SignatureAlgorithm::EcdsaSecp256k1, None).unwrap();
    assert_eq!(mnemonic.split_whitespace().count(), 12);

    let shouted = mnemonic.to_uppercase();
    let derived = kit
        .derive_private_key_from_mnemonic(&shouted, SignatureAlgorithm::EcdsaSecp256k1, None)
        .unwrap();
    assert_eq!(derived.to_hex(), key.to_hex());
}
