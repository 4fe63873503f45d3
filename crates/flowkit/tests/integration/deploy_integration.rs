//! Project deployment against the emulator stand-in.

use flowkit::*;

use crate::emulator::{SERVICE_KEY, engine, load_state, project_fs};

const HELLO: &str = r#"pub contract Hello { init() { log("hi") } }"#;

fn single_contract_project() -> String {
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

fn service() -> Address {
    ChainId::Emulator.service_address()
}

#[tokio::test]
async fn test_deploy_single_contract() {
    let state = load_state(project_fs(&single_contract_project(), &[("./Hello.cdc", HELLO)]));
    let (kit, emulator) = engine(state, "emulator");

    let deployed = kit.deploy_project(UpdateContract::AddOnly).await.unwrap();

    assert_eq!(deployed.len(), 1);
    assert_eq!(deployed[0].name, "Hello");
    assert_eq!(deployed[0].account_address, service());
    assert_eq!(emulator.contract(service(), "Hello").as_deref(), Some(HELLO));
}

#[tokio::test]
async fn test_deploy_orders_dependencies_and_rewrites_imports() {
    let config = format!(
        r#"{{
  "emulators": {{ "default": {{ "port": 3569, "serviceAccount": "emulator-account" }} }},
  "networks": {{ "emulator": "127.0.0.1:3569", "staging": "127.0.0.1:3570" }},
  "accounts": {{
    "emulator-account": {{ "address": "f8d6e0586b0a20c7", "key": "{SERVICE_KEY}" }}
  }},
  "contracts": {{
    "A": {{ "source": "./A.cdc", "aliases": {{ "staging": "ee82856bf20e2aa6" }} }},
    "B": "./B.cdc",
    "C": "./C.cdc",
    "D": "./D.cdc"
  }},
  "deployments": {{ "staging": {{ "emulator-account": ["D", "B", "C"] }} }}
}}"#
    );
    let fs = project_fs(
        &config,
        &[
            ("./A.cdc", "pub contract A {}"),
            ("./B.cdc", "import A from \"./A.cdc\"\npub contract B {}"),
            ("./C.cdc", "import A from \"./A.cdc\"\npub contract C {}"),
            ("./D.cdc", "import C from \"./C.cdc\"\npub contract D {}"),
        ],
    );
    let (kit, emulator) = engine(load_state(fs), "staging");

    let deployed = kit.deploy_project(UpdateContract::AddOnly).await.unwrap();
    let order: Vec<&str> = deployed.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(order, vec!["B", "C", "D"]);

    assert_eq!(
        emulator.contract(service(), "B").unwrap(),
        "import A from 0xee82856bf20e2aa6\npub contract B {}"
    );
    assert_eq!(
        emulator.contract(service(), "C").unwrap(),
        "import A from 0xee82856bf20e2aa6\npub contract C {}"
    );
    assert_eq!(
        emulator.contract(service(), "D").unwrap(),
        "import C from 0xf8d6e0586b0a20c7\npub contract D {}"
    );
    assert!(emulator.contract(service(), "A").is_none());
}

#[tokio::test]
async fn test_deploy_cycle_fails_before_sending() {
    let config = format!(
        r#"{{
  "networks": {{ "emulator": "127.0.0.1:3569" }},
  "accounts": {{
    "emulator-account": {{ "address": "f8d6e0586b0a20c7", "key": "{SERVICE_KEY}" }}
  }},
  "contracts": {{ "E": "./E.cdc", "F": "./F.cdc" }},
  "deployments": {{ "emulator": {{ "emulator-account": ["E", "F"] }} }}
}}"#
    );
    let fs = project_fs(
        &config,
        &[
            ("./E.cdc", "import F from \"./F.cdc\"\npub contract E {}"),
            ("./F.cdc", "import E from \"./E.cdc\"\npub contract F {}"),
        ],
    );
    let (kit, emulator) = engine(load_state(fs), "emulator");

    let err = kit.deploy_project(UpdateContract::AddOnly).await.unwrap_err();
    match err {
        Error::CyclicImport(cycle) => {
            let mut names: Vec<&str> = cycle.contracts().collect();
            names.sort_unstable();
            assert_eq!(names, vec!["E", "F"]);
        }
        other => panic!("expected a cyclic import error, got {other:?}"),
    }
    assert!(emulator.scripts().is_empty());
}

#[tokio::test]
async fn test_redeploy_unchanged_is_skipped() {
    let state = load_state(project_fs(&single_contract_project(), &[("./Hello.cdc", HELLO)]));
    let (kit, emulator) = engine(state, "emulator");

    kit.deploy_project(UpdateContract::AddOnly).await.unwrap();
    let deployed = kit.deploy_project(UpdateContract::AddOnly).await.unwrap();

    assert_eq!(deployed.len(), 1);
    assert_eq!(emulator.scripts().len(), 1);
}

#[tokio::test]
async fn test_existing_contract_requires_update() {
    let state = load_state(project_fs(&single_contract_project(), &[("./Hello.cdc", HELLO)]));
    let (mut kit, emulator) = engine(state, "emulator");
    kit.deploy_project(UpdateContract::AddOnly).await.unwrap();

    // Change the source on disk through a reloaded state.
    let changed = "pub contract Hello { init() { log(\"changed\") } }";
    let fs = project_fs(&single_contract_project(), &[("./Hello.cdc", changed)]);
    *kit.state_mut() = load_state(fs);

    let err = kit.deploy_project(UpdateContract::AddOnly).await.unwrap_err();
    match err {
        Error::Deploy(failures) => {
            assert_eq!(failures.0.len(), 1);
            assert_eq!(failures.0[0].0, "Hello");
            assert!(matches!(failures.0[0].1, Error::ExistingContract { .. }));
        }
        other => panic!("expected deploy failures, got {other:?}"),
    }
    assert_eq!(emulator.contract(service(), "Hello").as_deref(), Some(HELLO));

    kit.deploy_project(UpdateContract::Update).await.unwrap();
    assert_eq!(emulator.contract(service(), "Hello").as_deref(), Some(changed));

    // On the emulator an update removes the contract and adds it again.
    let scripts = emulator.scripts();
    assert_eq!(scripts.len(), 3);
    assert!(scripts[1].contains("signer.contracts.remove("));
    assert!(scripts[2].contains("signer.contracts.add("));
}

#[tokio::test]
async fn test_remove_contract() {
    let state = load_state(project_fs(&single_contract_project(), &[("./Hello.cdc", HELLO)]));
    let (kit, emulator) = engine(state, "emulator");
    let account = kit.state().emulator_service_account().unwrap().clone();

    let err = kit.remove_contract(&account, "Hello").await.unwrap_err();
    match err {
        Error::MissingContract { contract, available, .. } => {
            assert_eq!(contract, "Hello");
            assert!(available.is_empty());
        }
        other => panic!("expected a missing contract error, got {other:?}"),
    }

    kit.deploy_project(UpdateContract::AddOnly).await.unwrap();
    kit.remove_contract(&account, "Hello").await.unwrap();
    assert!(emulator.contract(service(), "Hello").is_none());
}

#[tokio::test]
async fn test_add_contract_with_init_args() {
    let state = load_state(project_fs(&single_contract_project(), &[("./Hello.cdc", HELLO)]));
    let (kit, emulator) = engine(state, "emulator");
    let account = kit.state().emulator_service_account().unwrap().clone();

    let source = "pub contract Greeter { init(greeting: String) {} }";
    let script = Script::new(source, vec![CadenceValue::string("hello")]).with_location("./Greeter.cdc");
    let (_, updated) = kit.add_contract(&account, script, UpdateContract::AddOnly).await.unwrap();

    assert!(!updated);
    assert_eq!(emulator.contract(service(), "Greeter").as_deref(), Some(source));
    assert!(emulator.scripts()[0].contains("arg0: String"));
}
