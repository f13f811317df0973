/// Tests for credential issuance and the controller registry, run against a
/// small in-process mock of the enterprise backend.
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use dr_core::backend::BackendClient;
use dr_core::error::RelayError;
use dr_core::issuer::{
    ConfigInit, ControllerCredential, CreateControllerRequest, create_controller, derive_client_id,
};
use dr_core::registry::{find_controller, list_controllers};
use dr_protocol::ClientConfig;

// ---------------------------------------------------------------------------
// Mock enterprise backend
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct BackendState {
    /// Records upserted through put_enterprise_setting.
    records: Arc<Mutex<Vec<Value>>>,
    /// Extra records returned by get_enterprise_setting, as-is.
    preset: Arc<Mutex<Vec<Value>>>,
    /// When set, put_enterprise_setting fails at the application level.
    fail_puts: Arc<AtomicBool>,
    /// One-time tokens handed out so far.
    issued: Arc<Mutex<Vec<String>>>,
}

async fn handle(State(state): State<BackendState>, Json(rq): Json<Value>) -> Json<Value> {
    match rq.get("command").and_then(Value::as_str) {
        Some("get_application") => {
            let app = rq.get("application").and_then(Value::as_str).unwrap_or("");
            if app == "Missing App" {
                Json(json!({
                    "result": "fail",
                    "resultCode": "app_not_found",
                    "message": "application not found",
                }))
            } else {
                Json(json!({"result": "success", "appUid": "APPUID123"}))
            }
        }
        Some("add_client") => {
            let mut issued = state.issued.lock().unwrap();
            let token = format!("tok-{}", issued.len() + 1);
            issued.push(token.clone());
            Json(json!({"result": "success", "tokens": [token]}))
        }
        Some("init_client_config") => Json(json!({
            "result": "success",
            "config": {
                "clientId": "cfg-client-id",
                "hostname": "relay.example.com",
                "privateKey": "pk-material",
                "appKey": "ak-material",
            },
        })),
        Some("put_enterprise_setting") => {
            if state.fail_puts.load(Ordering::SeqCst) {
                Json(json!({"result": "fail", "message": "settings store unavailable"}))
            } else {
                let settings = rq.get("settings").cloned().unwrap_or(Value::Null);
                state.records.lock().unwrap().push(settings);
                Json(json!({"result": "success"}))
            }
        }
        Some("get_enterprise_setting") => {
            let mut all = state.preset.lock().unwrap().clone();
            all.extend(state.records.lock().unwrap().iter().cloned());
            Json(json!({"result": "success", "RDControllerConfig": all}))
        }
        _ => Json(json!({"result": "fail", "message": "unknown command"})),
    }
}

async fn start_backend(state: BackendState) -> String {
    let app = Router::new().route("/", post(handle)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}/")
}

fn create_request(name: &str, config_init: Option<ConfigInit>) -> CreateControllerRequest {
    CreateControllerRequest {
        controller_name: name.to_owned(),
        application_ref: "Test App".to_owned(),
        config_init,
    }
}

// ---------------------------------------------------------------------------
// Issuer
// ---------------------------------------------------------------------------

/// Test: without config-init the credential is the raw token and the stored
/// record's client id is the hash of that same token.
#[tokio::test]
async fn token_path_round_trips_client_id_hash() {
    let state = BackendState::default();
    let url = start_backend(state.clone()).await;
    let backend = BackendClient::new(url, "session-token");

    let (credential, record) = create_controller(&backend, &create_request("ctr-a", None))
        .await
        .expect("create");

    let token = match &credential {
        ControllerCredential::Token(t) => t.clone(),
        other => panic!("expected raw token, got {:?}", other),
    };
    assert_eq!(record.client_id, derive_client_id(&token));
    assert_eq!(record.name, "ctr-a");
    assert!(!record.controller_uid.is_empty());

    // Exactly one server-side record, matching what we were returned.
    let stored = state.records.lock().unwrap().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].get("clientId").and_then(Value::as_str),
        Some(record.client_id.as_str())
    );
    assert_eq!(
        stored[0].get("controllerUid").and_then(Value::as_str),
        Some(record.controller_uid.as_str())
    );
}

/// Test: with config-init the token is redeemed for a full configuration and
/// the record carries the configuration's embedded client id.
#[tokio::test]
async fn config_path_uses_embedded_client_id() {
    let state = BackendState::default();
    let url = start_backend(state.clone()).await;
    let backend = BackendClient::new(url, "session-token");

    let (credential, record) =
        create_controller(&backend, &create_request("ctr-b", Some(ConfigInit::Json)))
            .await
            .expect("create");

    let config_json = match &credential {
        ControllerCredential::Config(c) => c.clone(),
        other => panic!("expected config credential, got {:?}", other),
    };
    let config: ClientConfig = serde_json::from_str(&config_json).expect("config json");
    assert_eq!(config.client_id, "cfg-client-id");
    assert_eq!(record.client_id, "cfg-client-id");
}

/// Test: config-init with a file path writes the configuration to disk and
/// returns the path as the credential.
#[tokio::test]
async fn config_file_path_writes_bundle_to_disk() {
    let state = BackendState::default();
    let url = start_backend(state.clone()).await;
    let backend = BackendClient::new(url, "session-token");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("client-config.json");

    let (credential, _record) = create_controller(
        &backend,
        &create_request("ctr-c", Some(ConfigInit::File(path.clone()))),
    )
    .await
    .expect("create");

    assert_eq!(credential.value(), path.display().to_string());
    let written: ClientConfig =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read config"))
            .expect("parse config");
    assert_eq!(written.client_id, "cfg-client-id");
}

/// Test: an unresolvable application fails with ApplicationNotFound before
/// any token is issued.
#[tokio::test]
async fn unknown_application_fails_without_issuing() {
    let state = BackendState::default();
    let url = start_backend(state.clone()).await;
    let backend = BackendClient::new(url, "session-token");

    let request = CreateControllerRequest {
        controller_name: "ctr-d".to_owned(),
        application_ref: "Missing App".to_owned(),
        config_init: None,
    };
    let err = create_controller(&backend, &request)
        .await
        .expect_err("must fail");
    assert!(matches!(err, RelayError::ApplicationNotFound(_)));
    assert!(state.issued.lock().unwrap().is_empty());
}

/// Test: a failing upsert after a successful token issuance surfaces the
/// backend error; the partial state (token spent, record missing) is not
/// swallowed.
#[tokio::test]
async fn upsert_failure_surfaces_after_token_issued() {
    let state = BackendState::default();
    state.fail_puts.store(true, Ordering::SeqCst);
    let url = start_backend(state.clone()).await;
    let backend = BackendClient::new(url, "session-token");

    let err = create_controller(&backend, &create_request("ctr-e", None))
        .await
        .expect_err("must fail");
    assert!(matches!(err, RelayError::Backend(_)));
    assert_eq!(state.issued.lock().unwrap().len(), 1, "token was issued");
    assert!(state.records.lock().unwrap().is_empty());
}

/// Test: an empty controller name is rejected up front.
#[tokio::test]
async fn empty_controller_name_is_rejected() {
    let state = BackendState::default();
    let url = start_backend(state.clone()).await;
    let backend = BackendClient::new(url, "session-token");

    let err = create_controller(&backend, &create_request("  ", None))
        .await
        .expect_err("must fail");
    assert!(matches!(err, RelayError::EmptyControllerName));
    assert!(state.issued.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

fn preset_record(uid: &str, modified: Option<&str>) -> Value {
    let mut record = json!({
        "controllerUid": uid,
        "name": format!("ctr-{uid}"),
        "clientId": "cid",
    });
    if let Some(ts) = modified {
        record["modified"] = json!(ts);
    }
    record
}

/// Test: listing sorts ascending by modified, missing timestamps first.
#[tokio::test]
async fn list_orders_by_modified_with_missing_first() {
    let state = BackendState::default();
    {
        let mut preset = state.preset.lock().unwrap();
        preset.push(preset_record("u1", Some("2024-01-02")));
        preset.push(preset_record("u2", None));
        preset.push(preset_record("u3", Some("2024-01-01")));
    }
    let url = start_backend(state).await;
    let backend = BackendClient::new(url, "session-token");

    let records = list_controllers(&backend).await.expect("list");
    let order: Vec<&str> = records.iter().map(|r| r.controller_uid.as_str()).collect();
    assert_eq!(order, vec!["u2", "u3", "u1"]);
}

/// Test: lookup matches by uid or by name, and a miss is ControllerNotFound.
#[tokio::test]
async fn find_matches_uid_or_name() {
    let state = BackendState::default();
    state
        .preset
        .lock()
        .unwrap()
        .push(preset_record("u9", None));
    let url = start_backend(state).await;
    let backend = BackendClient::new(url, "session-token");

    assert_eq!(
        find_controller(&backend, "u9").await.expect("by uid").name,
        "ctr-u9"
    );
    assert_eq!(
        find_controller(&backend, "ctr-u9")
            .await
            .expect("by name")
            .controller_uid,
        "u9"
    );
    let err = find_controller(&backend, "nope").await.expect_err("miss");
    assert!(matches!(err, RelayError::ControllerNotFound(_)));
}
