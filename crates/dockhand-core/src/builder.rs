//! Plan synthesis from container metadata.

use log::warn;

use crate::error::{Result, SidecarError};
use crate::labels::{
    get_label, parse_csv, LABEL_HOOKS_TEMPLATE, LABEL_HOOK_SNAPSHOT_END,
    LABEL_HOOK_SNAPSHOT_START, LABEL_PATHS_EXCLUDE, LABEL_PATHS_INCLUDE, LABEL_REPO,
    LABEL_RETENTION_KEEP, LABEL_SCHEDULE,
};
use crate::models::{Plan, PlanHook, PlanRetention, PlanSchedule};
use crate::naming::sanitize_id;
use crate::runtime::{Container, Mount, MountKind};

/// Hook template synthesizing a stop-before/start-after pair for the
/// container itself.
const TEMPLATE_SIMPLE_STOP_START: &str = "simple-stop-start";

/// Builder-wide defaults and switches for plan synthesis.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilderOptions {
    /// Host docker root used to synthesize named-volume paths
    pub docker_root: String,
    /// Rewrites derived named-volume sources under this prefix; used
    /// when the sidecar runs in a differently-rooted mount namespace
    pub volume_prefix: String,
    /// Fallback repository id when the label is absent
    pub default_repo: String,
    /// Fallback cron schedule when the label is absent
    pub default_schedule: String,
    /// Fallback retention spec when the label is absent
    pub default_retention: String,
    /// Prefix prepended to every derived plan id
    pub plan_id_prefix: String,
    /// Namespaces plan ids with the compose project name
    pub include_project_name: bool,
    /// Derives sources only from named volumes
    pub exclude_bind_mounts: bool,
}

/// Converts containers into Backrest plans.
pub struct PlanBuilder {
    opts: PlanBuilderOptions,
}

impl PlanBuilder {
    pub fn new(opts: PlanBuilderOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &PlanBuilderOptions {
        &self.opts
    }

    pub(crate) fn set_default_repo(&mut self, repo: String) {
        self.opts.default_repo = repo;
    }

    /// Builds a plan, or reports why this container cannot be
    /// represented. Callers skip the container and continue the batch.
    pub fn build(&self, container: &Container) -> Result<Plan> {
        let name = container.display_name();

        let repo = get_label(&container.labels, LABEL_REPO, &self.opts.default_repo);
        if repo.is_empty() {
            return Err(SidecarError::plan_build(
                name,
                format!("missing {LABEL_REPO} label and no default repo configured"),
            ));
        }

        let schedule = get_label(&container.labels, LABEL_SCHEDULE, &self.opts.default_schedule);
        if schedule.is_empty() {
            return Err(SidecarError::plan_build(
                name,
                format!("missing {LABEL_SCHEDULE} label and no default schedule configured"),
            ));
        }

        let id = self.plan_id(container);
        if id.is_empty() {
            return Err(SidecarError::plan_build(name, "unable to derive a plan id"));
        }

        let paths = self.resolve_paths(container);
        if paths.is_empty() {
            return Err(SidecarError::plan_build(
                name,
                format!("no backup sources derived from mounts; add {LABEL_PATHS_INCLUDE}"),
            ));
        }

        let paths_exclude = parse_csv(get_label(&container.labels, LABEL_PATHS_EXCLUDE, ""));
        let hooks = self.resolve_hooks(container);
        let retention_spec = get_label(
            &container.labels,
            LABEL_RETENTION_KEEP,
            &self.opts.default_retention,
        );

        let mut plan = Plan {
            schedule: PlanSchedule::resolve(schedule, &id),
            id,
            repo: repo.to_string(),
            paths,
            paths_exclude,
            retention: PlanRetention::from_spec(retention_spec),
            hooks,
        };
        plan.normalize();
        Ok(plan)
    }

    /// Derives the plan id: `project_service` when namespacing is on,
    /// else service, else display name, else the shortened runtime id.
    fn plan_id(&self, container: &Container) -> String {
        let project = container.project.trim();
        let service = container.service.trim();
        let base = if self.opts.include_project_name && !project.is_empty() && !service.is_empty() {
            format!("{project}_{service}")
        } else if !service.is_empty() {
            service.to_string()
        } else if !container.name.is_empty() {
            container.name.clone()
        } else {
            crate::runtime::short_id(&container.id).to_string()
        };
        sanitize_id(&format!("{}{}", self.opts.plan_id_prefix, base))
    }

    /// Resolves the backup source set for a container.
    ///
    /// Explicit label paths are matched against the mount table and
    /// rewritten to host paths; unmatched entries pass through. Without
    /// the label every mount is used, bind mounts optionally excluded.
    fn resolve_paths(&self, container: &Container) -> Vec<String> {
        let explicit = parse_csv(get_label(&container.labels, LABEL_PATHS_INCLUDE, ""));
        if !explicit.is_empty() {
            let resolved = explicit
                .iter()
                .map(|path| self.resolve_explicit_path(path, &container.mounts))
                .collect();
            return dedup_preserving_order(resolved);
        }

        let mut paths = Vec::with_capacity(container.mounts.len());
        for mount in &container.mounts {
            match mount.kind {
                MountKind::Bind => {
                    if self.opts.exclude_bind_mounts || mount.source.is_empty() {
                        continue;
                    }
                    paths.push(mount.source.clone());
                }
                MountKind::Volume => {
                    if mount.name.is_empty() {
                        continue;
                    }
                    paths.push(self.derived_volume_path(&mount.name));
                }
            }
        }
        dedup_preserving_order(paths)
    }

    /// Maps one container-visible path to its host location via the
    /// mount table; a path outside every mount passes through as-is.
    fn resolve_explicit_path(&self, path: &str, mounts: &[Mount]) -> String {
        for mount in mounts {
            let dest = mount.destination.as_str();
            if dest.is_empty() {
                continue;
            }
            let remainder = if path == dest {
                ""
            } else if let Some(rest) = path.strip_prefix(&format!("{dest}/")) {
                rest
            } else {
                continue;
            };

            let host_base = match mount.kind {
                MountKind::Bind => mount.source.clone(),
                MountKind::Volume => self.explicit_volume_path(&mount.name),
            };
            if host_base.is_empty() {
                continue;
            }
            return if remainder.is_empty() {
                host_base
            } else {
                format!("{}/{remainder}", host_base.trim_end_matches('/'))
            };
        }
        path.to_string()
    }

    fn explicit_volume_path(&self, volume: &str) -> String {
        if volume.is_empty() {
            return String::new();
        }
        let root = self.opts.docker_root.trim_end_matches('/');
        format!("{root}/volumes/{volume}/_data")
    }

    fn derived_volume_path(&self, volume: &str) -> String {
        let prefix = self.opts.volume_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return self.explicit_volume_path(volume);
        }
        format!("{prefix}/{volume}/_data")
    }

    /// Resolves hook entries: explicit snapshot-start/-end labels win
    /// outright; otherwise a recognized template name synthesizes a
    /// fixed pair. The two sources are never combined.
    fn resolve_hooks(&self, container: &Container) -> Vec<PlanHook> {
        let start_commands = parse_csv(get_label(&container.labels, LABEL_HOOK_SNAPSHOT_START, ""));
        let end_commands = parse_csv(get_label(&container.labels, LABEL_HOOK_SNAPSHOT_END, ""));
        let template = get_label(&container.labels, LABEL_HOOKS_TEMPLATE, "");

        if !start_commands.is_empty() || !end_commands.is_empty() {
            if !template.is_empty() {
                warn!(
                    "container {}: explicit snapshot hooks override hook template {template:?}",
                    container.display_name()
                );
            }
            let mut hooks: Vec<PlanHook> =
                start_commands.into_iter().map(PlanHook::snapshot_start).collect();
            hooks.extend(end_commands.into_iter().map(PlanHook::snapshot_end));
            return hooks;
        }

        match template {
            "" => Vec::new(),
            TEMPLATE_SIMPLE_STOP_START => {
                let name = container.display_name();
                vec![
                    PlanHook::snapshot_start(format!("docker stop {name}")),
                    PlanHook::snapshot_end(format!("docker start {name}")),
                ]
            }
            other => {
                warn!(
                    "container {}: unknown hook template {other:?}, no hooks synthesized",
                    container.display_name()
                );
                Vec::new()
            }
        }
    }
}

fn dedup_preserving_order(paths: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(paths.len());
    paths
        .into_iter()
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}
