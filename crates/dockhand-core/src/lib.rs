//! Core library for the dockhand Backrest sidecar.
//!
//! The sidecar watches Docker containers that opt in via labels,
//! synthesizes one Backrest plan per workload, and keeps the Backrest
//! config document in sync with the observed fleet, without touching
//! document fields the operator manages independently. A separate
//! one-shot pipeline quiesces labeled workloads around an external
//! backup tool run and applies retention pruning.
//!
//! # Architecture Overview
//!
//! ```text
//! runtime metadata ──▶ PlanBuilder ──▶ Reconciler ──▶ ConfigDoc ──▶ store
//!        │                                  ▲
//!        └── events ──▶ daemon loop ────────┘
//! ```
//!
//! - [`runtime`]: the container-runtime port with a Docker CLI adapter
//!   and an in-memory fake for tests
//! - [`builder`]: plan synthesis from labels and the mount table
//! - [`models`]: the config document, plans, repos, and retention
//! - [`store`]: atomic JSON persistence with passthrough preservation
//! - [`reconcile`]: the single-pass discovery/merge flow
//! - [`daemon`]: the coalescing timer/event loop around the reconciler
//! - [`backup`]: the quiesce-guarded backup/prune pipeline

pub mod backup;
pub mod builder;
pub mod daemon;
pub mod error;
pub mod exec;
pub mod labels;
pub mod models;
pub mod naming;
pub mod reconcile;
pub mod runtime;
pub mod store;

pub use backup::{run_backup, BackupOptions};
pub use builder::{PlanBuilder, PlanBuilderOptions};
pub use daemon::{run_daemon, DaemonOptions};
pub use error::{Result, SidecarError};
pub use models::ConfigDoc;
pub use reconcile::{ReconcileOptions, ReconcileResult, Reconciler};
