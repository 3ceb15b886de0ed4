//! Command-line interface definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Backrest config sidecar for Docker Compose workloads.
///
/// Watches containers labeled `backrest.enable=true`, synthesizes one
/// Backrest plan per workload, and keeps the Backrest config document
/// in sync. Without a subcommand it runs a single reconcile pass.
#[derive(Parser, Debug)]
#[command(version, about, name = "dockhand")]
pub struct Args {
    /// Log level (error|warn|info|debug|trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(flatten)]
    pub shared: SharedArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags shared by the reconcile, daemon, and backup commands.
#[derive(clap::Args, Debug)]
pub struct SharedArgs {
    /// Path to the Backrest config file
    #[arg(long, global = true, env = "BACKREST_CONFIG", default_value = "./backrest.config.json")]
    pub config: PathBuf,

    /// Restart the Backrest container when the config changes
    #[arg(long, global = true)]
    pub apply: bool,

    /// Container name/id for Backrest
    #[arg(long, global = true, default_value = "backrest")]
    pub backrest_container: String,

    /// Render plans but skip the config write
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Docker socket path or host (e.g. /var/run/docker.sock)
    #[arg(long = "docker-sock", global = true, env = "DOCKER_HOST", default_value = "/var/run/docker.sock")]
    pub docker_sock: String,

    /// Host docker root for named volumes
    #[arg(long, global = true, default_value = "/var/lib/docker")]
    pub docker_root: String,

    /// Rewrite derived volume sources to this prefix (e.g. /docker_volumes)
    #[arg(long, global = true, env = "BACKREST_VOLUME_PREFIX", default_value = "/var/lib/docker/volumes")]
    pub volume_prefix: String,

    /// Fallback Backrest repo id
    #[arg(long, global = true, default_value = "default")]
    pub default_repo: String,

    /// Fallback cron schedule
    #[arg(long, global = true, default_value = "0 2 * * *")]
    pub default_schedule: String,

    /// Fallback retention spec (e.g. daily=7,weekly=4)
    #[arg(long, global = true, default_value = "")]
    pub default_retention: String,

    /// Prefix prepended to derived plan ids
    #[arg(long, global = true, default_value = "")]
    pub plan_id_prefix: String,

    /// Prefix plan ids with the compose project
    #[arg(long, global = true)]
    pub include_project_name: bool,

    /// Derive sources only from named volumes
    #[arg(long, global = true)]
    pub exclude_bind_mounts: bool,

    /// Backrest restart timeout in seconds
    #[arg(long, global = true, default_value_t = 15)]
    pub restart_timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover labeled containers and upsert Backrest plans
    Reconcile,
    /// Continuous reconcile loop, optionally listening to docker events
    Daemon {
        /// Reconcile interval in seconds
        #[arg(long, default_value_t = 60)]
        interval: u64,

        /// Subscribe to docker events for faster updates
        #[arg(long)]
        with_events: bool,
    },
    /// Run restic-compose-backup once plus per-workload retention
    BackupOnce(BackupArgs),
}

/// Flags for the one-shot backup pipeline.
#[derive(clap::Args, Debug)]
pub struct BackupArgs {
    /// restic-compose-backup image reference
    #[arg(long, default_value = "zettaio/restic-compose-backup:0.7.1")]
    pub rcb_image: String,

    /// rcb command + args run inside the image
    #[arg(long, value_delimiter = ',', default_values_t = vec!["rcb".to_string(), "backup".to_string()])]
    pub rcb_command: Vec<String>,

    /// Env file passed to the rcb container
    #[arg(long)]
    pub rcb_env_file: Option<String>,

    /// Additional args appended to the rcb command (repeatable)
    #[arg(long = "rcb-arg")]
    pub rcb_args: Vec<String>,

    /// Label selector for sidecar-controlled quiesce
    #[arg(long, default_value = "restic-compose-backup.quiesce=true")]
    pub quiesce_label: String,

    /// Quiesce stop timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub quiesce_timeout: u64,

    /// restic --group-by value for retention
    #[arg(long, default_value = "paths")]
    pub restic_group_by: String,

    /// Base path prefix used in restic forget
    #[arg(long, default_value = "/volumes")]
    pub restic_path_prefix: String,
}
