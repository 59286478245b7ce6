//! Integration tests for lifecycle operations
//!
//! These tests drive create, edit, upgrade, delete and backup against an
//! in-memory object store whose status replies are scripted per kind.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kube::core::TypeMeta;
use serde_json::{json, Value};

use dbaas_engine::adapters::{
    document_name, document_type, ClusterOptions, ObjectStore, OperationRequest, PlatformType,
    DEFAULT_BACKUP_STORAGE_NAME,
};
use dbaas_engine::builders::{ResourceSpecBuilder, VersionRegistry};
use dbaas_engine::controllers::{Lifecycle, OperationOutcome};
use dbaas_engine::crd::Engine;
use dbaas_engine::reconcilers::{ClusterState, OutputMsg};
use dbaas_engine::settings::EngineSettings;
use dbaas_engine::{Error, Result};

// ============================================================================
// Scripted Store
// ============================================================================

#[derive(Default)]
struct ScriptedStore {
    objects: Mutex<BTreeMap<(String, String), Value>>,
    statuses: Mutex<BTreeMap<String, VecDeque<Value>>>,
    corrupt_reads: Mutex<u32>,
    logs: Mutex<Vec<u8>>,
    secrets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    submitted: Mutex<Vec<Value>>,
    deleted_volumes: Mutex<Vec<String>>,
}

impl ScriptedStore {
    fn insert(&self, document: Value) {
        let key = key_of(&document);
        self.objects.lock().unwrap().insert(key, document);
    }

    /// Status replies for a kind; the last one repeats forever
    fn script(&self, kind: &str, statuses: Vec<Value>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(kind.to_string(), statuses.into());
    }

    fn corrupt_next_reads(&self, count: u32) {
        *self.corrupt_reads.lock().unwrap() = count;
    }

    fn set_logs(&self, lines: &[Value]) {
        let raw: Vec<String> = lines.iter().map(Value::to_string).collect();
        *self.logs.lock().unwrap() = raw.join("\n").into_bytes();
    }

    fn add_secret(&self, name: &str, values: &[(&str, &str)]) {
        let data = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        self.secrets.lock().unwrap().insert(name.to_string(), data);
    }

    fn submitted(&self) -> Vec<Value> {
        self.submitted.lock().unwrap().clone()
    }

    fn has(&self, kind: &str, name: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(kind.to_string(), name.to_string()))
    }
}

fn key_of(document: &Value) -> (String, String) {
    let kind = document_type(document).unwrap().kind;
    let name = document_name(document).unwrap().to_string();
    (kind, name)
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn get(&self, type_meta: &TypeMeta, name: &str) -> Result<Vec<u8>> {
        let mut objects = self.objects.lock().unwrap();
        let Some(object) = objects.get_mut(&(type_meta.kind.clone(), name.to_string())) else {
            return Err(Error::not_found(type_meta.kind.clone(), name));
        };

        let mut corrupt = self.corrupt_reads.lock().unwrap();
        if *corrupt > 0 {
            *corrupt -= 1;
            return Ok(b"{\"status\": {".to_vec());
        }

        let mut statuses = self.statuses.lock().unwrap();
        if let Some(queue) = statuses.get_mut(&type_meta.kind) {
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(status) = next {
                object["status"] = status;
            }
        }
        Ok(serde_json::to_vec(&*object)?)
    }

    async fn submit(&self, document: &Value) -> Result<()> {
        let key = key_of(document);
        let mut stored = document.clone();
        let mut objects = self.objects.lock().unwrap();
        if let Some(status) = objects.get(&key).and_then(|o| o.get("status")) {
            stored["status"] = status.clone();
        }
        objects.insert(key, stored);
        self.submitted.lock().unwrap().push(document.clone());
        Ok(())
    }

    async fn delete(&self, type_meta: &TypeMeta, name: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(type_meta.kind.clone(), name.to_string()));
        Ok(())
    }

    async fn delete_volumes(&self, cluster: &str) -> Result<()> {
        self.deleted_volumes.lock().unwrap().push(cluster.to_string());
        Ok(())
    }

    async fn list(&self, type_meta: &TypeMeta) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(kind, _)| *kind == type_meta.kind)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn operator_logs(&self, _operator: &str) -> Result<Vec<u8>> {
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn secret_values(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        self.secrets
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("Secret", name))
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

const PXC_KIND: &str = "PerconaXtraDBCluster";

fn fast_settings() -> EngineSettings {
    EngineSettings {
        poll_interval_ms: 1,
        max_poll_attempts: 50,
        ..Default::default()
    }
}

fn lifecycle(store: &Arc<ScriptedStore>, settings: EngineSettings) -> Lifecycle {
    let store: Arc<dyn ObjectStore> = store.clone();
    Lifecycle::new(
        store,
        Arc::new(VersionRegistry::builtin().unwrap()),
        settings,
    )
}

fn request(yaml: &str) -> OperationRequest {
    OperationRequest::from_yaml_str(yaml).unwrap()
}

async fn run(
    lifecycle: &Lifecycle,
    yaml: &str,
) -> (Result<OperationOutcome>, Vec<OutputMsg>) {
    let handle = lifecycle.launch(&request(yaml)).unwrap();
    let mut progress = Vec::new();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        handle.wait(|msg| progress.push(msg)),
    )
    .await
    .expect("operation did not finish");
    (result, progress)
}

async fn wait_idle(lifecycle: &Lifecycle) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !lifecycle.in_flight().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("in-flight guard was not released");
}

/// A stored pxc cluster as the default builder would create it
fn stored_pxc_cluster(name: &str, options: &ClusterOptions) -> Value {
    let registry = VersionRegistry::builtin().unwrap();
    let builder = &registry.resolve(Engine::Pxc, "default").unwrap().builder;
    let config = options.translate().unwrap();
    let storage = options.backup_storage().unwrap();
    let mut document = builder
        .set_new(name, &config, storage.as_ref(), PlatformType::Kubernetes)
        .unwrap();
    document["metadata"]["uid"] = json!("8d1c-uid");
    document["status"] = json!({"status": "ready"});
    document
}

fn s3_options() -> ClusterOptions {
    ClusterOptions {
        s3_bucket: Some("backups".to_string()),
        s3_region: Some("us-east-1".to_string()),
        s3_credentials_secret: Some("s3-creds".to_string()),
        ..Default::default()
    }
}

// ============================================================================
// Create Tests
// ============================================================================

#[tokio::test]
async fn create_reaches_ready_with_endpoint() {
    let store = Arc::new(ScriptedStore::default());
    store.script(
        PXC_KIND,
        vec![
            json!({"status": "initializing"}),
            json!({"status": "ready", "host": "orders-proxysql.default"}),
        ],
    );
    store.add_secret("orders-secrets", &[("root", "s3cret")]);
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(&lifecycle, "operation: create\nengine: pxc\nname: orders\n").await;
    let outcome = result.unwrap();

    assert_eq!(outcome.state, ClusterState::Ready);
    assert!(outcome.messages[0].contains("MySQL cluster started successfully"));
    assert!(outcome.messages[0].contains("Host: orders-proxysql.default"));
    assert!(outcome.messages[0].contains("s3cret"));
    assert_eq!(outcome.endpoint.unwrap().port, 3306);

    // Operator bundle first, then the cluster document
    let submitted = store.submitted();
    assert_eq!(submitted.len(), 5);
    let deployment = submitted.iter().find(|d| d["kind"] == "Deployment").unwrap();
    assert_eq!(
        deployment["spec"]["template"]["spec"]["containers"][0]["image"],
        "percona/percona-xtradb-cluster-operator:1.4.0"
    );
    assert_eq!(submitted[4]["kind"], PXC_KIND);
    assert_eq!(submitted[4]["metadata"]["name"], "orders");

    wait_idle(&lifecycle).await;
}

#[tokio::test]
async fn create_mongodb_reports_replset_endpoint() {
    let store = Arc::new(ScriptedStore::default());
    store.script("PerconaServerMongoDB", vec![json!({"status": "ready"})]);
    store.add_secret(
        "catalog-psmdb-secrets",
        &[
            ("MONGODB_CLUSTER_ADMIN_USER", "clusterAdmin"),
            ("MONGODB_CLUSTER_ADMIN_PASSWORD", "ca-pass"),
        ],
    );
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(&lifecycle, "operation: create\nengine: psmdb\nname: catalog\n").await;
    let outcome = result.unwrap();

    let endpoint = outcome.endpoint.unwrap();
    assert_eq!(endpoint.host, "catalog-rs0-0.catalog-rs0");
    assert_eq!(endpoint.port, 27017);
    assert!(outcome.messages[0].contains("MongoDB cluster started successfully"));
    assert!(outcome.messages[0].contains("ca-pass"));
}

#[tokio::test]
async fn create_existing_cluster_lists_clusters() {
    let store = Arc::new(ScriptedStore::default());
    for name in ["orders", "billing"] {
        store.insert(json!({
            "apiVersion": "pxc.percona.com/v1-4-0",
            "kind": PXC_KIND,
            "metadata": {"name": name},
        }));
    }
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(&lifecycle, "operation: create\nengine: pxc\nname: orders\n").await;
    match result.unwrap_err() {
        Error::AlreadyExists { name, existing, .. } => {
            assert_eq!(name, "orders");
            assert_eq!(existing, vec!["billing".to_string(), "orders".to_string()]);
        }
        other => panic!("expected AlreadyExists, got {:?}", other),
    }
    assert!(store.submitted().is_empty());
}

#[tokio::test]
async fn invalid_input_fails_before_submission() {
    let store = Arc::new(ScriptedStore::default());
    let lifecycle = lifecycle(&store, fast_settings());

    let bad_quantity = request(
        "operation: create\nengine: pxc\nname: orders\noptions:\n  storage-size: lots\n",
    );
    assert!(matches!(
        lifecycle.launch(&bad_quantity),
        Err(Error::ConfigInvalid(_))
    ));

    let bad_version = request("operation: create\nengine: pxc\nversion: 9.9.9\nname: orders\n");
    assert!(matches!(
        lifecycle.launch(&bad_version),
        Err(Error::UnknownVersion { .. })
    ));

    let partial_s3 = request(
        "operation: create\nengine: psmdb\nname: catalog\noptions:\n  s3-bucket: backups\n",
    );
    assert!(matches!(
        lifecycle.launch(&partial_s3),
        Err(Error::ConfigInvalid(_))
    ));

    assert!(store.submitted().is_empty());
    assert!(lifecycle.in_flight().is_empty());
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

#[tokio::test]
async fn second_operation_on_same_cluster_is_rejected() {
    let store = Arc::new(ScriptedStore::default());
    store.script(PXC_KIND, vec![json!({"status": "initializing"})]);
    let settings = EngineSettings {
        max_poll_attempts: 100_000,
        ..fast_settings()
    };
    let lifecycle = lifecycle(&store, settings);

    let first = lifecycle
        .launch(&request("operation: create\nengine: pxc\nname: orders\n"))
        .unwrap();
    let second = lifecycle.launch(&request("operation: delete\nengine: pxc\nname: orders\n"));
    assert!(matches!(second, Err(Error::OperationInProgress { .. })));

    first.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), first.wait(|_| {}))
        .await
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    wait_idle(&lifecycle).await;
}

#[tokio::test]
async fn poll_budget_exhaustion_is_reported() {
    let store = Arc::new(ScriptedStore::default());
    store.script(PXC_KIND, vec![json!({"status": "initializing"})]);
    let settings = EngineSettings {
        max_poll_attempts: 3,
        ..fast_settings()
    };
    let lifecycle = lifecycle(&store, settings);

    let (result, _) = run(&lifecycle, "operation: create\nengine: pxc\nname: orders\n").await;
    assert!(matches!(
        result,
        Err(Error::ReconcileExhausted { attempts: 3 })
    ));
}

#[tokio::test]
async fn error_status_fails_with_rewritten_messages() {
    let store = Arc::new(ScriptedStore::default());
    store.script(
        PXC_KIND,
        vec![json!({
            "status": "error",
            "messages": ["PXC: 0/3 nodes are available: 3 Insufficient memory."]
        })],
    );
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(&lifecycle, "operation: create\nengine: pxc\nname: orders\n").await;
    match result.unwrap_err() {
        Error::ClusterFailed { messages } => {
            assert_eq!(messages.len(), 1);
            assert!(messages[0].contains("--pxc-request-mem"));
        }
        other => panic!("expected ClusterFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn operator_log_errors_arrive_once_as_progress() {
    let store = Arc::new(ScriptedStore::default());
    store.script(
        PXC_KIND,
        vec![
            json!({"status": "initializing"}),
            json!({"status": "initializing"}),
            json!({"status": "ready"}),
        ],
    );
    let controller = Engine::Pxc.controller();
    store.set_logs(&[
        json!({"level": "info", "ts": 1.0, "msg": "reconcile", "request": "default/orders", "controller": controller}),
        json!({"level": "error", "ts": 2.0, "msg": "Reconciler error", "error": "create pvc failed", "request": "default/orders", "controller": controller}),
        json!({"level": "error", "ts": 3.0, "msg": "Reconciler error",
            "error": "Operation cannot be fulfilled on perconaxtradbclusters.pxc.percona.com \"orders\": the object has been modified; please apply your changes to the latest version and try again",
            "request": "default/orders", "controller": controller}),
        json!({"level": "error", "ts": 4.0, "msg": "Reconciler error", "error": "not ours", "request": "default/billing", "controller": controller}),
    ]);
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, progress) = run(&lifecycle, "operation: create\nengine: pxc\nname: orders\n").await;
    assert!(result.is_ok());

    let errors: Vec<&OutputMsg> = progress
        .iter()
        .filter(|m| matches!(m, OutputMsg::Error(_)))
        .collect();
    assert_eq!(
        errors,
        vec![&OutputMsg::Error("Reconciler error: create pvc failed".to_string())]
    );
    assert!(progress.iter().any(|m| matches!(
        m,
        OutputMsg::Debug(text) if text.starts_with("Operation cannot be fulfilled")
    )));
}

#[tokio::test]
async fn undecodable_status_only_costs_budget() {
    let store = Arc::new(ScriptedStore::default());
    store.script(PXC_KIND, vec![json!({"status": "ready"})]);
    store.corrupt_next_reads(2);
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, progress) = run(&lifecycle, "operation: create\nengine: pxc\nname: orders\n").await;
    assert_eq!(result.unwrap().state, ClusterState::Ready);

    let decode_notes = progress
        .iter()
        .filter(|m| matches!(m, OutputMsg::Debug(text) if text.contains("Unable to decode cluster status")))
        .count();
    assert_eq!(decode_notes, 2);
}

// ============================================================================
// Edit / Upgrade / Delete Tests
// ============================================================================

#[tokio::test]
async fn edit_patches_and_preserves_unknown_fields() {
    let store = Arc::new(ScriptedStore::default());
    let mut existing = stored_pxc_cluster("orders", &ClusterOptions::default());
    existing["spec"]["futureField"] = json!({"keep": true});
    store.insert(existing);
    store.script(PXC_KIND, vec![json!({"status": "ready"})]);
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(
        &lifecycle,
        "operation: edit\nengine: pxc\nname: orders\noptions:\n  pxc-instances: 5\n",
    )
    .await;
    assert!(result.is_ok());

    let submitted = store.submitted();
    assert_eq!(submitted.len(), 1);
    let document = &submitted[0];
    assert_eq!(document["spec"]["pxc"]["size"], 5);
    assert_eq!(document["spec"]["proxysql"]["size"], 1);
    assert_eq!(document["spec"]["futureField"], json!({"keep": true}));
    assert_eq!(document["metadata"]["uid"], "8d1c-uid");
}

#[tokio::test]
async fn edit_of_missing_cluster_is_not_found() {
    let store = Arc::new(ScriptedStore::default());
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(
        &lifecycle,
        "operation: edit\nengine: pxc\nname: ghost\noptions:\n  pxc-instances: 5\n",
    )
    .await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
    assert!(store.submitted().is_empty());
}

#[tokio::test]
async fn upgrade_replaces_only_requested_images() {
    let store = Arc::new(ScriptedStore::default());
    let mut existing = stored_pxc_cluster("orders", &ClusterOptions::default());
    existing["spec"]["pxc"]["image"] = json!("custom/pxc:5.7");
    existing["spec"]["proxysql"]["image"] = json!("custom/proxysql:1");
    store.insert(existing);
    store.script(PXC_KIND, vec![json!({"status": "ready"})]);
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(
        &lifecycle,
        "operation: upgrade\nengine: pxc\nname: orders\nimages:\n  backup: registry.local/pxc-backup:v2\n",
    )
    .await;
    assert!(result.is_ok());

    // No operator image requested, so no bundle
    let submitted = store.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0]["spec"]["backup"]["image"],
        "registry.local/pxc-backup:v2"
    );
    assert_eq!(submitted[0]["spec"]["pxc"]["image"], "custom/pxc:5.7");
    assert_eq!(submitted[0]["spec"]["proxysql"]["image"], "custom/proxysql:1");
}

#[tokio::test]
async fn delete_removes_cluster_and_volumes() {
    let store = Arc::new(ScriptedStore::default());
    store.insert(stored_pxc_cluster("orders", &ClusterOptions::default()));
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(
        &lifecycle,
        "operation: delete\nengine: pxc\nname: orders\nclear-data: true\n",
    )
    .await;
    let outcome = result.unwrap();

    assert!(outcome.messages[0].contains("orders deleted"));
    assert!(!store.has(PXC_KIND, "orders"));
    assert_eq!(*store.deleted_volumes.lock().unwrap(), vec!["orders".to_string()]);
}

// ============================================================================
// Backup Tests
// ============================================================================

#[tokio::test]
async fn backup_polls_backup_status() {
    let store = Arc::new(ScriptedStore::default());
    store.insert(stored_pxc_cluster("orders", &s3_options()));
    store.script(
        "PerconaXtraDBClusterBackup",
        vec![
            json!({"state": "Running"}),
            json!({"state": "Succeeded", "destination": "s3://backups/orders-1"}),
        ],
    );
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(
        &lifecycle,
        "operation: backup\nengine: pxc\nname: orders\nbackup-name: orders-1\n",
    )
    .await;
    let outcome = result.unwrap();
    assert!(outcome.messages[0].contains("orders-1"));
    assert!(outcome.messages[0].contains("s3://backups/orders-1"));

    let submitted = store.submitted();
    assert_eq!(submitted[0]["kind"], "PerconaXtraDBClusterBackup");
    assert_eq!(submitted[0]["spec"]["pxcCluster"], "orders");
    assert_eq!(submitted[0]["spec"]["storageName"], DEFAULT_BACKUP_STORAGE_NAME);
}

#[tokio::test]
async fn backup_to_unknown_storage_is_rejected() {
    let store = Arc::new(ScriptedStore::default());
    store.insert(stored_pxc_cluster("orders", &ClusterOptions::default()));
    let lifecycle = lifecycle(&store, fast_settings());

    let (result, _) = run(&lifecycle, "operation: backup\nengine: pxc\nname: orders\n").await;
    match result.unwrap_err() {
        Error::ConfigInvalid(message) => assert!(message.contains(DEFAULT_BACKUP_STORAGE_NAME)),
        other => panic!("expected ConfigInvalid, got {:?}", other),
    }
    assert!(store.submitted().is_empty());
}
