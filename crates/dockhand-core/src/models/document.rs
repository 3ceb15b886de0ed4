//! In-memory representation of the persisted Backrest config document.
//!
//! The document is read-modify-written as a whole: `plans` is the only
//! top-level key the sidecar rewrites. Everything else, including
//! unknown keys, their order, and the raw `repos` value with whatever
//! fields the operator put there, is kept as loaded and re-emitted
//! verbatim.

use serde_json::{Map, Value};

use super::{Plan, Repo};
use crate::error::Result;

/// The persisted config document: typed repos/plans plus the full
/// ordered top-level object as loaded.
#[derive(Debug, Clone, Default)]
pub struct ConfigDoc {
    /// Typed view of the repository list (read-only to the sidecar)
    pub repos: Vec<Repo>,
    /// Typed view of the plan list (owned by the sidecar)
    pub plans: Vec<Plan>,
    // Top-level object exactly as loaded; `repos` stays raw in here so
    // unmodeled repository fields survive the round trip.
    top: Map<String, Value>,
}

impl ConfigDoc {
    /// Builds a document from a parsed top-level JSON object.
    pub fn from_object(top: Map<String, Value>) -> Result<Self> {
        let repos = match top.get("repos") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };
        let plans = match top.get("plans") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };
        Ok(Self { repos, plans, top })
    }

    /// Ensures the document has its structural keys even when it was
    /// absent or empty on disk.
    pub fn ensure_initialized(&mut self) {
        if !self.top.contains_key("repos") {
            self.top.insert("repos".to_string(), Value::Array(Vec::new()));
        }
        if !self.top.contains_key("plans") {
            self.top.insert("plans".to_string(), Value::Array(Vec::new()));
        }
    }

    /// Returns true if a repository with this id exists.
    pub fn repo_exists(&self, id: &str) -> bool {
        self.repos.iter().any(|repo| repo.id == id)
    }

    /// Merges the candidate plans by id, returning whether anything
    /// changed and which plan ids did.
    ///
    /// Candidates are normalized, then compared against any existing
    /// plan with the same id via full deep equality; an existing plan
    /// is replaced only when it actually differs. New ids are appended.
    /// The plan list is re-sorted by id afterwards.
    pub fn upsert_plans(&mut self, plans: Vec<Plan>) -> (bool, Vec<String>) {
        if plans.is_empty() {
            return (false, Vec::new());
        }

        let mut changed_ids = Vec::with_capacity(plans.len());
        for mut plan in plans {
            plan.normalize();
            match self.plans.iter_mut().find(|existing| existing.id == plan.id) {
                Some(existing) => {
                    if *existing != plan {
                        changed_ids.push(plan.id.clone());
                        *existing = plan;
                    }
                }
                None => {
                    changed_ids.push(plan.id.clone());
                    self.plans.push(plan);
                }
            }
        }

        self.plans.sort_by(|a, b| a.id.cmp(&b.id));
        (!changed_ids.is_empty(), changed_ids)
    }

    /// Normalizes every plan and the plan ordering for deterministic
    /// serialization.
    pub fn normalize(&mut self) {
        for plan in &mut self.plans {
            plan.normalize();
        }
        self.plans.sort_by(|a, b| a.id.cmp(&b.id));
    }

    /// Renders the document back into a top-level JSON object.
    ///
    /// Passthrough keys keep their loaded order and content; `plans` is
    /// re-serialized from the typed list, and `repos` is left exactly
    /// as loaded (or emitted from the typed list when it was absent).
    pub fn to_object(&self) -> Result<Map<String, Value>> {
        let mut out = self.top.clone();
        if !out.contains_key("repos") {
            out.insert("repos".to_string(), serde_json::to_value(&self.repos)?);
        }
        out.insert("plans".to_string(), serde_json::to_value(&self.plans)?);
        Ok(out)
    }
}
