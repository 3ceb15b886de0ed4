//! Tests for the document models.

use serde_json::{json, Value};

use super::*;

fn plan(id: &str, repo: &str, paths: &[&str]) -> Plan {
    Plan {
        id: id.to_string(),
        repo: repo.to_string(),
        paths: paths.iter().map(|p| p.to_string()).collect(),
        paths_exclude: Vec::new(),
        schedule: PlanSchedule::resolve("0 2 * * *", id),
        retention: PlanRetention::from_spec("daily=7,weekly=4"),
        hooks: Vec::new(),
    }
}

fn doc_from_json(value: Value) -> ConfigDoc {
    let Value::Object(top) = value else {
        panic!("test document must be an object");
    };
    ConfigDoc::from_object(top).expect("parse test document")
}

#[test]
fn upsert_appends_new_plans_and_sorts_by_id() {
    let mut doc = doc_from_json(json!({ "repos": [{ "id": "r1" }], "plans": [] }));
    let (changed, ids) = doc.upsert_plans(vec![plan("zeta", "r1", &["/b"]), plan("alpha", "r1", &["/a"])]);
    assert!(changed);
    assert_eq!(ids, vec!["zeta", "alpha"]);
    let ordered: Vec<&str> = doc.plans.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ordered, vec!["alpha", "zeta"]);
}

#[test]
fn upsert_is_idempotent() {
    let mut doc = doc_from_json(json!({ "repos": [{ "id": "r1" }] }));
    let plans = vec![plan("web", "r1", &["/srv/a", "/srv/b"])];

    let (changed, _) = doc.upsert_plans(plans.clone());
    assert!(changed);

    let (changed, ids) = doc.upsert_plans(plans);
    assert!(!changed);
    assert!(ids.is_empty());
}

#[test]
fn upsert_replaces_on_any_difference() {
    let mut doc = doc_from_json(json!({ "repos": [{ "id": "r1" }] }));
    doc.upsert_plans(vec![plan("web", "r1", &["/srv/a"])]);

    let mut updated = plan("web", "r1", &["/srv/a"]);
    updated.paths_exclude = vec!["/srv/a/cache".to_string()];
    let (changed, ids) = doc.upsert_plans(vec![updated]);
    assert!(changed);
    assert_eq!(ids, vec!["web"]);
    assert_eq!(doc.plans[0].paths_exclude, vec!["/srv/a/cache"]);
}

#[test]
fn normalize_sorts_paths_and_orders_hooks() {
    let mut p = plan("web", "r1", &["/z", "/a", "/z"]);
    p.hooks = vec![
        PlanHook::snapshot_end("docker start web"),
        PlanHook::snapshot_start("docker stop web"),
    ];
    p.normalize();
    assert_eq!(p.paths, vec!["/a", "/z"]);
    assert_eq!(p.hooks[0].conditions, vec![CONDITION_SNAPSHOT_START]);
    assert_eq!(p.hooks[1].conditions, vec![CONDITION_SNAPSHOT_END]);
}

#[test]
fn schedule_resolution_is_deterministic_per_plan() {
    let a = PlanSchedule::resolve("T 3 * * *", "demo_api");
    let b = PlanSchedule::resolve("T 3 * * *", "demo_api");
    assert_eq!(a, b);
    assert_eq!(a.clock, CLOCK_LOCAL);

    let fields: Vec<&str> = a.cron.split_whitespace().collect();
    let minute: u32 = fields[0].parse().expect("resolved minute is numeric");
    assert!(minute < 60);
    assert_eq!(&fields[1..], ["3", "*", "*", "*"]);

    // a plain schedule passes through untouched
    let plain = PlanSchedule::resolve("15 4 * * *", "demo_api");
    assert_eq!(plain.cron, "15 4 * * *");
}

#[test]
fn retention_spec_maps_to_buckets() {
    let buckets = RetentionBuckets::from_spec("daily=7,weekly=4").expect("buckets");
    assert_eq!(buckets.daily, 7);
    assert_eq!(buckets.weekly, 4);
    assert_eq!(buckets.hourly, 0);

    // unknown keys and junk values are skipped, not errors
    let buckets = RetentionBuckets::from_spec("daily=7,fortnightly=2,weekly=oops").expect("buckets");
    assert_eq!(buckets.daily, 7);
    assert_eq!(buckets.weekly, 0);

    assert!(RetentionBuckets::from_spec("").is_none());
    assert!(RetentionBuckets::from_spec("bogus=x").is_none());
    assert!(RetentionBuckets::from_spec("daily=0").is_none());
}

#[test]
fn retention_spec_maps_to_restic_flags() {
    assert_eq!(
        retention_flags("daily=7,weekly=4"),
        vec!["--keep-daily", "7", "--keep-weekly", "4"]
    );
    assert_eq!(
        retention_flags("last=3,within=7d,within-m=12,junk=1"),
        vec!["--keep-last", "3", "--keep-within", "7d", "--keep-within-m", "12"]
    );
    assert!(retention_flags("").is_empty());
}

#[test]
fn document_round_trip_preserves_passthrough_fields() {
    let mut doc = doc_from_json(json!({
        "version": 4,
        "instance": "lab1",
        "repos": [{
            "id": "b2-offsite",
            "guid": "11111111-2222-3333-4444-555555555555",
            "uri": "b2:bucket/prefix",
            "auto_initialize": false,
            "env": ["B2_ACCOUNT_ID=abc"]
        }],
        "plans": [],
        "auth": { "disabled": true }
    }));
    assert_eq!(doc.repos.len(), 1);
    assert_eq!(doc.repos[0].id, "b2-offsite");

    doc.upsert_plans(vec![plan("web", "b2-offsite", &["/data"])]);
    let out = doc.to_object().expect("render document");

    // unknown top-level keys survive, in order
    let keys: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["version", "instance", "repos", "plans", "auth"]);
    assert_eq!(out["version"], json!(4));
    assert_eq!(out["auth"], json!({ "disabled": true }));

    // unmodeled repo fields survive because repos is re-emitted raw
    assert_eq!(
        out["repos"][0]["guid"],
        json!("11111111-2222-3333-4444-555555555555")
    );
    assert_eq!(out["repos"][0]["auto_initialize"], json!(false));

    // plans is the rewritten key
    assert_eq!(out["plans"][0]["id"], json!("web"));
}

#[test]
fn plan_serializes_with_backrest_field_names() {
    let mut p = plan("web", "r1", &["/data"]);
    p.paths_exclude = vec!["/data/tmp".to_string()];
    p.hooks = vec![PlanHook::snapshot_start("docker stop web")];
    let value = serde_json::to_value(&p).expect("serialize plan");
    assert_eq!(value["pathsExclude"], json!(["/data/tmp"]));
    assert_eq!(value["schedule"]["clock"], json!("CLOCK_LOCAL"));
    assert_eq!(value["retention"]["policyTimeBucketed"]["daily"], json!(7));
    assert_eq!(
        value["hooks"][0]["actionCommand"]["command"],
        json!("docker stop web")
    );

    // empty retention serializes as an empty object, not a bucket set
    let empty = plan("db", "r1", &["/db"]);
    let value = serde_json::to_value(Plan {
        retention: PlanRetention::from_spec(""),
        ..empty
    })
    .expect("serialize plan");
    assert_eq!(value["retention"], json!({}));
}
