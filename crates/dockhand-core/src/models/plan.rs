//! Plan model definition and normalization.

use serde::{Deserialize, Serialize};

use super::retention::PlanRetention;
use crate::naming::random_minute_for_plan;

/// Hook condition fired when a snapshot starts.
pub const CONDITION_SNAPSHOT_START: &str = "CONDITION_SNAPSHOT_START";
/// Hook condition fired when a snapshot ends.
pub const CONDITION_SNAPSHOT_END: &str = "CONDITION_SNAPSHOT_END";
/// The only clock reference the sidecar emits.
pub const CLOCK_LOCAL: &str = "CLOCK_LOCAL";

/// A Backrest plan synthesized for one workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Stable sanitized identifier; the merge key within the document
    pub id: String,

    /// Repository id this plan backs up to
    pub repo: String,

    /// Backup source paths (host-resolved, sorted, deduplicated)
    pub paths: Vec<String>,

    /// Paths excluded from the backup set
    #[serde(rename = "pathsExclude", default, skip_serializing_if = "Vec::is_empty")]
    pub paths_exclude: Vec<String>,

    /// Cron schedule plus clock reference
    pub schedule: PlanSchedule,

    /// Derived retention policy
    #[serde(default)]
    pub retention: PlanRetention,

    /// Ordered (condition, command) hook entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<PlanHook>,
}

/// Cron expression with its clock reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanSchedule {
    pub cron: String,
    pub clock: String,
}

impl PlanSchedule {
    /// Resolves a raw schedule string for a plan.
    ///
    /// A `T` minute field is replaced with a minute derived purely from
    /// the plan id, so the same plan always lands on the same minute.
    pub fn resolve(raw: &str, plan_id: &str) -> Self {
        let mut fields: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        if let Some(minute) = fields.first_mut() {
            if minute == "T" {
                *minute = random_minute_for_plan(plan_id).to_string();
            }
        }
        Self {
            cron: fields.join(" "),
            clock: CLOCK_LOCAL.to_string(),
        }
    }
}

/// One hook entry: trigger conditions plus the command to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanHook {
    pub conditions: Vec<String>,
    #[serde(rename = "actionCommand")]
    pub action_command: HookCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookCommand {
    pub command: String,
}

impl PlanHook {
    /// Hook running `command` when a snapshot starts.
    pub fn snapshot_start(command: impl Into<String>) -> Self {
        Self {
            conditions: vec![CONDITION_SNAPSHOT_START.to_string()],
            action_command: HookCommand {
                command: command.into(),
            },
        }
    }

    /// Hook running `command` when a snapshot ends.
    pub fn snapshot_end(command: impl Into<String>) -> Self {
        Self {
            conditions: vec![CONDITION_SNAPSHOT_END.to_string()],
            action_command: HookCommand {
                command: command.into(),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self.conditions.first().map(String::as_str) {
            Some(CONDITION_SNAPSHOT_START) => 0,
            Some(CONDITION_SNAPSHOT_END) => 1,
            Some(_) => 2,
            None => 99,
        }
    }
}

impl Plan {
    /// Sorts path/hook lists so semantically equal plans serialize
    /// byte-identically.
    pub fn normalize(&mut self) {
        self.paths.sort();
        self.paths.dedup();

        self.paths_exclude.sort();
        self.paths_exclude.dedup();

        self.hooks.sort_by(|a, b| {
            a.rank()
                .cmp(&b.rank())
                .then_with(|| a.action_command.command.cmp(&b.action_command.command))
        });
    }
}
