//! Label names and helpers for reading container metadata.
//!
//! All opt-in and per-workload tuning flows through the `backrest.*`
//! label family; compose identity comes from the standard
//! `com.docker.compose.*` labels.

use std::collections::HashMap;

/// Opt-in label: containers carrying `backrest.enable=true` are discovered.
pub const LABEL_ENABLE: &str = "backrest.enable";
/// Repository id the plan backs up to.
pub const LABEL_REPO: &str = "backrest.repo";
/// Cron schedule, optionally with a `T` minute placeholder.
pub const LABEL_SCHEDULE: &str = "backrest.schedule";
/// Comma-separated explicit include paths (container-visible).
pub const LABEL_PATHS_INCLUDE: &str = "backrest.paths.include";
/// Comma-separated exclude paths.
pub const LABEL_PATHS_EXCLUDE: &str = "backrest.paths.exclude";
/// Comma-separated commands to run when a snapshot starts.
pub const LABEL_HOOK_SNAPSHOT_START: &str = "backrest.snapshot-start";
/// Comma-separated commands to run when a snapshot ends.
pub const LABEL_HOOK_SNAPSHOT_END: &str = "backrest.snapshot-end";
/// Named hook template selector; ignored when explicit hooks are present.
pub const LABEL_HOOKS_TEMPLATE: &str = "backrest.hooks.template";
/// Retention spec, e.g. `daily=7,weekly=4`.
pub const LABEL_RETENTION_KEEP: &str = "backrest.keep";
/// Marks a container for quiesce during `backup-once`.
pub const LABEL_QUIESCE: &str = "backrest.quiesce";

pub const LABEL_COMPOSE_PROJECT: &str = "com.docker.compose.project";
pub const LABEL_COMPOSE_SERVICE: &str = "com.docker.compose.service";

/// Returns the trimmed label value, or the default when absent or blank.
pub fn get_label<'a>(labels: &'a HashMap<String, String>, key: &str, default: &'a str) -> &'a str {
    match labels.get(key) {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default
            } else {
                trimmed
            }
        }
        None => default,
    }
}

/// Returns true if the label value reads as a truthy flag.
pub fn bool_label(labels: &HashMap<String, String>, key: &str) -> bool {
    match labels.get(key) {
        Some(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "t" | "true" | "y" | "yes"
        ),
        None => false,
    }
}

/// Extracts compose project/service names from labels, trimmed.
pub fn compose_metadata(labels: &HashMap<String, String>) -> (String, String) {
    let project = labels
        .get(LABEL_COMPOSE_PROJECT)
        .map(|v| v.trim().to_string())
        .unwrap_or_default();
    let service = labels
        .get(LABEL_COMPOSE_SERVICE)
        .map(|v| v.trim().to_string())
        .unwrap_or_default();
    (project, service)
}

/// Splits comma-separated values, trimming whitespace and dropping empties.
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
