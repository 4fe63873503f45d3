//! Event scanning with a worker pool.

use flowkit::*;

use crate::emulator::{SERVICE_KEY, engine, load_state, project_fs};

const DEPOSITED: &str = "A.0ae53cb6e3f42a79.FlowToken.TokensDeposited";
const CREATED: &str = "flow.AccountCreated";

fn new_kit() -> (Flowkit, std::sync::Arc<crate::emulator::Emulator>) {
    let config = format!(
        r#"{{
  "networks": {{ "emulator": "127.0.0.1:3569" }},
  "accounts": {{
    "emulator-account": {{ "address": "f8d6e0586b0a20c7", "key": "{SERVICE_KEY}" }}
  }}
}}"#
    );
    engine(load_state(project_fs(&config, &[])), "emulator")
}

fn names() -> Vec<String> {
    vec![DEPOSITED.to_string(), CREATED.to_string()]
}

#[tokio::test]
async fn test_events_across_workers() {
    let (kit, emulator) = new_kit();
    for height in [1, 9, 10, 11, 25, 40] {
        emulator.add_event(height, DEPOSITED);
    }
    emulator.add_event(12, CREATED);
    emulator.add_event(50, CREATED);

    let worker = EventWorker {
        count: 3,
        blocks_per_worker: 5,
    };
    let found = kit.get_events(&names(), 5, 45, Some(worker)).await.unwrap();

    let mut heights: Vec<(String, u64)> = found
        .iter()
        .map(|b| (b.events[0].event_type.clone(), b.height))
        .collect();
    heights.sort();
    assert_eq!(
        heights,
        vec![
            (DEPOSITED.to_string(), 9),
            (DEPOSITED.to_string(), 10),
            (DEPOSITED.to_string(), 11),
            (DEPOSITED.to_string(), 25),
            (DEPOSITED.to_string(), 40),
            (CREATED.to_string(), 12),
        ]
    );
}

#[tokio::test]
async fn test_default_worker_single_height() {
    let (kit, emulator) = new_kit();
    emulator.add_event(7, CREATED);

    let found = kit.get_events(&names(), 7, 7, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].height, 7);
}

#[tokio::test]
async fn test_event_query_failure_fails_scan() {
    let (kit, emulator) = new_kit();
    emulator.add_event(3, DEPOSITED);
    emulator.fail_events_of(CREATED);

    let worker = EventWorker {
        count: 4,
        blocks_per_worker: 2,
    };
    let err = kit.get_events(&names(), 0, 20, Some(worker)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::GatewayOperation {
            source: GatewayError::Api { code: 400, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_end_before_start() {
    let (kit, _) = new_kit();
    let err = kit.get_events(&names(), 10, 1, None).await.unwrap_err();
    assert!(err.to_string().contains("cannot have end height (1) less than start height (10)"));
}
