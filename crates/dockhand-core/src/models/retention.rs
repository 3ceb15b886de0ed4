//! Retention spec parsing: document buckets and restic keep-flags.

use serde::{Deserialize, Serialize};

/// Retention policy carried by a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlanRetention {
    #[serde(
        rename = "policyTimeBucketed",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub policy_time_bucketed: Option<RetentionBuckets>,
}

impl PlanRetention {
    /// Builds the retention policy from a `key=value` spec string.
    pub fn from_spec(spec: &str) -> Self {
        Self {
            policy_time_bucketed: RetentionBuckets::from_spec(spec),
        }
    }
}

/// Snapshot counts kept per time bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RetentionBuckets {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub hourly: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub daily: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub weekly: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub monthly: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub yearly: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl RetentionBuckets {
    /// Parses comma-separated `key=value` pairs into named buckets.
    ///
    /// Unrecognized keys and non-integer values are skipped, not
    /// errors. An empty or all-zero result yields `None` so the plan
    /// carries no retention policy at all.
    pub fn from_spec(spec: &str) -> Option<Self> {
        if spec.trim().is_empty() {
            return None;
        }
        let mut buckets = Self::default();
        for part in spec.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let Ok(n) = value.trim().parse::<u32>() else {
                continue;
            };
            match key.trim().to_lowercase().as_str() {
                "hourly" => buckets.hourly = n,
                "daily" => buckets.daily = n,
                "weekly" => buckets.weekly = n,
                "monthly" => buckets.monthly = n,
                "yearly" => buckets.yearly = n,
                _ => {}
            }
        }
        if buckets == Self::default() {
            None
        } else {
            Some(buckets)
        }
    }
}

/// Translates a retention spec into restic `--keep-*` flag pairs for
/// the standalone prune invocation.
///
/// The `within*` variants take restic duration values and are passed
/// through untrimmed of their unit syntax; entries with unknown keys or
/// empty values are skipped.
pub fn retention_flags(spec: &str) -> Vec<String> {
    let mut flags = Vec::new();
    for pair in spec.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let flag = match key.trim().to_lowercase().as_str() {
            "last" => "--keep-last",
            "hourly" => "--keep-hourly",
            "daily" => "--keep-daily",
            "weekly" => "--keep-weekly",
            "monthly" => "--keep-monthly",
            "yearly" => "--keep-yearly",
            "within" => "--keep-within",
            "within-d" => "--keep-within-d",
            "within-w" => "--keep-within-w",
            "within-m" => "--keep-within-m",
            "within-y" => "--keep-within-y",
            _ => continue,
        };
        flags.push(flag.to_string());
        flags.push(value.to_string());
    }
    flags
}
