//! End-to-end reconcile passes against the in-memory runtime.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;

use dockhand_core::labels::{
    LABEL_ENABLE, LABEL_HOOKS_TEMPLATE, LABEL_PATHS_INCLUDE, LABEL_REPO,
};
use dockhand_core::runtime::fake::FakeRuntime;
use dockhand_core::runtime::{Container, Mount};
use dockhand_core::{ReconcileOptions, Reconciler};

fn seed_config(dir: &TempDir, value: &Value) -> PathBuf {
    let path = dir.path().join("backrest.config.json");
    fs::write(&path, serde_json::to_vec_pretty(value).expect("seed json")).expect("seed config");
    path
}

fn options(config_path: PathBuf) -> ReconcileOptions {
    ReconcileOptions {
        config_path,
        ..ReconcileOptions::default()
    }
}

fn opted_in(name: &str, labels: &[(&str, &str)], mounts: Vec<Mount>) -> Container {
    let mut label_map: HashMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    label_map.insert(LABEL_ENABLE.to_string(), "true".to_string());
    Container {
        id: format!("{name}-0123456789abcdef0123456789abcdef"),
        name: name.to_string(),
        labels: label_map,
        mounts,
        state: "running".to_string(),
        ..Container::default()
    }
    .with_compose_metadata()
}

#[tokio::test]
async fn bind_mounted_workload_renders_a_full_plan() {
    let dir = TempDir::new().expect("temp dir");
    let path = seed_config(&dir, &json!({ "repos": [{ "id": "r1" }], "plans": [] }));

    let fake = FakeRuntime::with_containers(vec![opted_in(
        "demo-1",
        &[
            (LABEL_REPO, "r1"),
            (LABEL_PATHS_INCLUDE, "/srv/data"),
            (LABEL_HOOKS_TEMPLATE, "simple-stop-start"),
        ],
        vec![Mount::bind("/host/data", "/srv/data")],
    )]);

    let mut reconciler = Reconciler::new(fake, options(path.clone()));
    let result = reconciler.run().await.expect("reconcile pass");
    assert!(result.changed);
    assert_eq!(result.plans_seen, 1);
    assert_eq!(result.plans_skipped, 0);

    let written: Value =
        serde_json::from_slice(&fs::read(&path).expect("read config")).expect("written json");
    let plan = &written["plans"][0];
    assert_eq!(plan["id"], json!("demo_1"));
    assert_eq!(plan["repo"], json!("r1"));
    assert_eq!(plan["paths"], json!(["/host/data"]));
    assert_eq!(plan["hooks"][0]["conditions"], json!(["CONDITION_SNAPSHOT_START"]));
    assert_eq!(plan["hooks"][0]["actionCommand"]["command"], json!("docker stop demo-1"));
    assert_eq!(plan["hooks"][1]["conditions"], json!(["CONDITION_SNAPSHOT_END"]));
    assert_eq!(plan["hooks"][1]["actionCommand"]["command"], json!("docker start demo-1"));
}

#[tokio::test]
async fn second_pass_with_unchanged_fleet_writes_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let path = seed_config(&dir, &json!({ "repos": [{ "id": "r1" }], "plans": [] }));

    let fake = FakeRuntime::with_containers(vec![opted_in(
        "web-1",
        &[(LABEL_REPO, "r1")],
        vec![Mount::volume("web-data", "/data")],
    )]);

    let mut reconciler = Reconciler::new(fake, options(path.clone()));
    assert!(reconciler.run().await.expect("first pass").changed);
    let after_first = fs::read(&path).expect("read config");

    let result = reconciler.run().await.expect("second pass");
    assert!(!result.changed);
    assert_eq!(after_first, fs::read(&path).expect("read config again"));
}

#[tokio::test]
async fn empty_fleet_leaves_existing_document_alone() {
    let dir = TempDir::new().expect("temp dir");
    let seed = json!({
        "repos": [{ "id": "r1" }],
        "plans": [],
        "auth": { "disabled": true }
    });
    let path = seed_config(&dir, &seed);
    let before = fs::read(&path).expect("read seed");

    let fake = FakeRuntime::new();
    let mut reconciler = Reconciler::new(fake.clone(), ReconcileOptions {
        config_path: path.clone(),
        apply: true,
        ..ReconcileOptions::default()
    });
    let result = reconciler.run().await.expect("pass");

    assert!(!result.changed);
    assert_eq!(result.plans_seen, 0);
    assert_eq!(before, fs::read(&path).expect("read config"));
    assert!(fake.restarted().is_empty(), "no restart without a change");
}

#[tokio::test]
async fn unresolvable_containers_are_skipped_not_fatal() {
    let dir = TempDir::new().expect("temp dir");
    let path = seed_config(&dir, &json!({ "repos": [{ "id": "r1" }], "plans": [] }));

    let fake = FakeRuntime::with_containers(vec![
        // no mounts and no include label -> build failure
        opted_in("broken-1", &[(LABEL_REPO, "r1")], Vec::new()),
        // references a repo the document does not declare
        opted_in(
            "orphan-1",
            &[(LABEL_REPO, "missing-repo")],
            vec![Mount::volume("orphan-data", "/data")],
        ),
        opted_in("ok-1", &[(LABEL_REPO, "r1")], vec![Mount::volume("ok-data", "/data")]),
    ]);

    let mut reconciler = Reconciler::new(fake, options(path.clone()));
    let result = reconciler.run().await.expect("pass");
    assert!(result.changed);
    assert_eq!(result.plans_seen, 1);
    assert_eq!(result.plans_skipped, 2);

    let written: Value =
        serde_json::from_slice(&fs::read(&path).expect("read config")).expect("written json");
    assert_eq!(written["plans"].as_array().expect("plans array").len(), 1);
    assert_eq!(written["plans"][0]["id"], json!("ok_1"));
}

#[tokio::test]
async fn apply_restarts_backrest_only_after_a_write() {
    let dir = TempDir::new().expect("temp dir");
    let path = seed_config(&dir, &json!({ "repos": [{ "id": "r1" }], "plans": [] }));

    let fake = FakeRuntime::with_containers(vec![opted_in(
        "web-1",
        &[(LABEL_REPO, "r1")],
        vec![Mount::volume("web-data", "/data")],
    )]);

    let mut reconciler = Reconciler::new(fake.clone(), ReconcileOptions {
        config_path: path,
        apply: true,
        ..ReconcileOptions::default()
    });

    assert!(reconciler.run().await.expect("first pass").changed);
    assert_eq!(fake.restarted(), vec!["backrest"]);

    assert!(!reconciler.run().await.expect("second pass").changed);
    assert_eq!(fake.restarted().len(), 1, "unchanged pass must not restart");
}

#[tokio::test]
async fn dry_run_reports_changes_without_writing() {
    let dir = TempDir::new().expect("temp dir");
    let path = seed_config(&dir, &json!({ "repos": [{ "id": "r1" }], "plans": [] }));
    let before = fs::read(&path).expect("read seed");

    let fake = FakeRuntime::with_containers(vec![opted_in(
        "web-1",
        &[(LABEL_REPO, "r1")],
        vec![Mount::volume("web-data", "/data")],
    )]);

    let mut reconciler = Reconciler::new(fake.clone(), ReconcileOptions {
        config_path: path.clone(),
        dry_run: true,
        apply: true,
        ..ReconcileOptions::default()
    });
    let result = reconciler.run().await.expect("pass");

    assert!(result.changed);
    assert!(result.dry_run);
    assert_eq!(before, fs::read(&path).expect("read config"), "dry run must not write");
    assert!(fake.restarted().is_empty());
}

#[tokio::test]
async fn default_repo_is_adopted_from_the_document() {
    let dir = TempDir::new().expect("temp dir");
    // no repo label on the container; the configured default repo does
    // not exist, so the first declared repo is adopted instead
    let path = seed_config(&dir, &json!({ "repos": [{ "id": "declared" }], "plans": [] }));

    let fake = FakeRuntime::with_containers(vec![opted_in(
        "web-1",
        &[],
        vec![Mount::volume("web-data", "/data")],
    )]);

    let mut reconciler = Reconciler::new(fake, options(path.clone()));
    let result = reconciler.run().await.expect("pass");
    assert!(result.changed);

    let written: Value =
        serde_json::from_slice(&fs::read(&path).expect("read config")).expect("written json");
    assert_eq!(written["plans"][0]["repo"], json!("declared"));
}

#[tokio::test]
async fn missing_document_starts_from_an_empty_one() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("absent.json");

    // no repos at all: every plan is dropped for its unresolved repo
    let fake = FakeRuntime::with_containers(vec![opted_in(
        "web-1",
        &[(LABEL_REPO, "r1")],
        vec![Mount::volume("web-data", "/data")],
    )]);

    let mut reconciler = Reconciler::new(fake, options(path.clone()));
    let result = reconciler.run().await.expect("pass");
    assert!(!result.changed);
    assert_eq!(result.plans_skipped, 1);
    assert!(!path.exists(), "unchanged pass must not create the file");
}
