//! The discovery/merge flow: list opted-in containers, build plans,
//! merge into the config document, persist only on change.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};

use crate::builder::{PlanBuilder, PlanBuilderOptions};
use crate::error::{Result, SidecarError};
use crate::labels::LABEL_ENABLE;
use crate::models::{ConfigDoc, Plan};
use crate::runtime::{short_id, ContainerRuntime};
use crate::store;

/// Options shared by the reconcile and daemon commands.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub config_path: PathBuf,
    /// Restart the Backrest container after a config change
    pub apply: bool,
    pub backrest_container: String,
    pub dry_run: bool,
    pub docker_root: String,
    pub volume_prefix: String,
    pub default_repo: String,
    pub default_schedule: String,
    pub default_retention: String,
    pub plan_id_prefix: String,
    pub include_project_name: bool,
    pub exclude_bind_mounts: bool,
    pub restart_timeout: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("./backrest.config.json"),
            apply: false,
            backrest_container: "backrest".to_string(),
            dry_run: false,
            docker_root: "/var/lib/docker".to_string(),
            volume_prefix: "/var/lib/docker/volumes".to_string(),
            default_repo: "default".to_string(),
            default_schedule: "0 2 * * *".to_string(),
            default_retention: String::new(),
            plan_id_prefix: String::new(),
            include_project_name: false,
            exclude_bind_mounts: false,
            restart_timeout: Duration::from_secs(15),
        }
    }
}

/// Summary of one reconcile pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileResult {
    pub plans_seen: usize,
    pub plans_skipped: usize,
    pub plans_changed: usize,
    pub changed: bool,
    pub dry_run: bool,
}

/// Runs the main discovery/merge flow against a container runtime.
pub struct Reconciler<R> {
    opts: ReconcileOptions,
    runtime: R,
    builder: PlanBuilder,
    default_repo_provided: bool,
}

impl<R: ContainerRuntime> Reconciler<R> {
    pub fn new(runtime: R, opts: ReconcileOptions) -> Self {
        let builder = PlanBuilder::new(PlanBuilderOptions {
            docker_root: opts.docker_root.clone(),
            volume_prefix: opts.volume_prefix.clone(),
            default_repo: opts.default_repo.clone(),
            default_schedule: opts.default_schedule.clone(),
            default_retention: opts.default_retention.clone(),
            plan_id_prefix: opts.plan_id_prefix.clone(),
            include_project_name: opts.include_project_name,
            exclude_bind_mounts: opts.exclude_bind_mounts,
        });
        let default_repo_provided = !opts.default_repo.trim().is_empty();
        Self {
            opts,
            runtime,
            builder,
            default_repo_provided,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Executes a single reconcile pass.
    pub async fn run(&mut self) -> Result<ReconcileResult> {
        let mut doc = store::load(&self.opts.config_path).await?;
        self.adopt_default_repo(&doc);

        let selector = format!("{LABEL_ENABLE}=true");
        let containers = self.runtime.list_by_label(&selector).await?;

        let mut skipped = 0usize;
        let mut plans: Vec<Plan> = Vec::with_capacity(containers.len());
        for container in &containers {
            let plan = match self.builder.build(container) {
                Ok(plan) => plan,
                Err(err) => {
                    warn!(
                        "plan skipped: container={} id={} error={err}",
                        container.display_name(),
                        short_id(&container.id)
                    );
                    skipped += 1;
                    continue;
                }
            };
            if !doc.repo_exists(&plan.repo) {
                warn!("plan skipped, repo missing: plan_id={} repo={}", plan.id, plan.repo);
                skipped += 1;
                continue;
            }
            plans.push(plan);
        }
        let rendered = plans.len();

        let (changed, changed_ids) = doc.upsert_plans(plans.clone());
        for plan in &plans {
            let is_changed = changed_ids.contains(&plan.id);
            let line = format!(
                "plan rendered: plan_id={} repo={} paths={:?} dry_run={}",
                plan.id, plan.repo, plan.paths, self.opts.dry_run
            );
            if is_changed {
                info!("{line}");
            } else {
                debug!("{line}");
            }
        }

        if !changed {
            debug!("reconcile complete: rendered={rendered} skipped={skipped} changed=false");
            return Ok(ReconcileResult {
                plans_seen: rendered,
                plans_skipped: skipped,
                plans_changed: 0,
                changed: false,
                dry_run: self.opts.dry_run,
            });
        }

        doc.normalize();
        if self.opts.dry_run {
            info!(
                "dry-run complete: plans_seen={rendered} plans_changed={} config={}",
                changed_ids.len(),
                self.opts.config_path.display()
            );
            return Ok(ReconcileResult {
                plans_seen: rendered,
                plans_skipped: skipped,
                plans_changed: changed_ids.len(),
                changed: true,
                dry_run: true,
            });
        }

        let plans_total = doc.plans.len();
        store::write(&self.opts.config_path, doc).await?;
        info!(
            "config written: path={} plans_total={plans_total} plans_changed={changed_ids:?}",
            self.opts.config_path.display()
        );

        if self.opts.apply && !self.opts.backrest_container.is_empty() {
            self.runtime
                .restart(&self.opts.backrest_container, self.opts.restart_timeout)
                .await
                .map_err(|e| {
                    SidecarError::runtime(
                        "restart backrest container",
                        format!("{}: {e}", self.opts.backrest_container),
                    )
                })?;
            info!("backrest restarted: container={}", self.opts.backrest_container);
        }

        info!("reconcile complete: rendered={rendered} skipped={skipped} changed=true");
        Ok(ReconcileResult {
            plans_seen: rendered,
            plans_skipped: skipped,
            plans_changed: changed_ids.len(),
            changed: true,
            dry_run: false,
        })
    }

    /// Adopts a default repo from the document when none was configured,
    /// or when the configured one does not exist in the document.
    fn adopt_default_repo(&mut self, doc: &ConfigDoc) {
        if doc.repos.is_empty() {
            return;
        }
        let current = self.builder.options().default_repo.trim();
        if self.default_repo_provided && !current.is_empty() && doc.repo_exists(current) {
            return;
        }
        let adopted = doc
            .plans
            .first()
            .map(|plan| plan.repo.clone())
            .or_else(|| doc.repos.first().map(|repo| repo.id.clone()));
        if let Some(repo) = adopted {
            if !repo.is_empty() {
                self.builder.set_default_repo(repo);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{PlanRetention, PlanSchedule, Repo};
    use crate::runtime::fake::FakeRuntime;

    fn doc(value: serde_json::Value) -> ConfigDoc {
        let serde_json::Value::Object(top) = value else {
            panic!("test document must be an object");
        };
        ConfigDoc::from_object(top).expect("parse test document")
    }

    fn reconciler_with_default(default_repo: &str, provided: bool) -> Reconciler<FakeRuntime> {
        let mut r = Reconciler::new(
            FakeRuntime::new(),
            ReconcileOptions {
                default_repo: default_repo.to_string(),
                ..ReconcileOptions::default()
            },
        );
        r.default_repo_provided = provided;
        r
    }

    fn doc_with_plan_repos(plan_repos: &[&str], repos: &[&str]) -> ConfigDoc {
        let mut d = doc(json!({
            "repos": repos.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
        }));
        d.plans = plan_repos
            .iter()
            .enumerate()
            .map(|(i, repo)| crate::models::Plan {
                id: format!("plan-{i}"),
                repo: repo.to_string(),
                paths: vec!["/data".to_string()],
                paths_exclude: Vec::new(),
                schedule: PlanSchedule::resolve("0 2 * * *", "plan"),
                retention: PlanRetention::default(),
                hooks: Vec::new(),
            })
            .collect();
        d
    }

    #[test]
    fn adopt_prefers_first_plan_repo_when_default_not_provided() {
        let mut r = reconciler_with_default("default", false);
        let d = doc_with_plan_repos(&["plan-alpha", "plan-beta"], &["repo-entry"]);
        r.adopt_default_repo(&d);
        assert_eq!(r.builder.options().default_repo, "plan-alpha");
    }

    #[test]
    fn adopt_falls_back_to_repo_list_when_no_plans() {
        let mut r = reconciler_with_default("", false);
        let d = doc_with_plan_repos(&[], &["repo-one", "repo-two"]);
        r.adopt_default_repo(&d);
        assert_eq!(r.builder.options().default_repo, "repo-one");
    }

    #[test]
    fn adopt_respects_existing_explicit_default() {
        let mut r = reconciler_with_default("custom", true);
        let d = doc_with_plan_repos(&[], &["custom"]);
        r.adopt_default_repo(&d);
        assert_eq!(r.builder.options().default_repo, "custom");
    }

    #[test]
    fn adopt_overrides_missing_explicit_default() {
        let mut r = reconciler_with_default("does-not-exist", true);
        let d = doc_with_plan_repos(&["plan-alpha"], &["repo-entry"]);
        r.adopt_default_repo(&d);
        assert_eq!(r.builder.options().default_repo, "plan-alpha");
    }

    #[test]
    fn adopt_is_a_no_op_for_documents_without_repos() {
        let mut r = reconciler_with_default("default", false);
        let d = doc(json!({}));
        r.adopt_default_repo(&d);
        assert_eq!(r.builder.options().default_repo, "default");
    }

    #[test]
    fn repo_model_round_trips_ids() {
        let d = doc(json!({ "repos": [{ "id": "r1", "type": "local", "uri": "/repo" }] }));
        assert_eq!(d.repos, vec![Repo {
            id: "r1".to_string(),
            kind: "local".to_string(),
            uri: "/repo".to_string(),
            ..Repo::default()
        }]);
        assert!(d.repo_exists("r1"));
        assert!(!d.repo_exists("r2"));
    }
}
