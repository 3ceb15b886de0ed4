//! Data models for the Backrest config document.
//!
//! The document is a typed core ([`Repo`], [`Plan`]) plus an ordered
//! side-map of opaque top-level fields that must survive a
//! read-modify-write cycle untouched ([`ConfigDoc`]).

pub mod document;
pub mod plan;
pub mod repo;
pub mod retention;

#[cfg(test)]
mod tests;

pub use document::ConfigDoc;
pub use plan::{
    HookCommand, Plan, PlanHook, PlanSchedule, CLOCK_LOCAL, CONDITION_SNAPSHOT_END,
    CONDITION_SNAPSHOT_START,
};
pub use repo::Repo;
pub use retention::{retention_flags, PlanRetention, RetentionBuckets};
