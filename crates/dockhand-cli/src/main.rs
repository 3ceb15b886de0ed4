//! dockhand CLI
//!
//! Command-line surface for the Backrest sidecar: single-shot
//! reconcile (the default command), the daemon loop, and the one-shot
//! backup pipeline.

mod args;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use args::{Args, BackupArgs, Commands, SharedArgs};
use clap::error::ErrorKind;
use clap::Parser;
use dockhand_core::runtime::docker::DockerCli;
use dockhand_core::{
    run_backup, run_daemon, BackupOptions, DaemonOptions, ReconcileOptions, Reconciler,
};
use log::{error, info, LevelFilter};
use tokio_util::sync::CancellationToken;

/// Success, the config document changed.
const EXIT_CHANGED: u8 = 0;
/// Flag or logging setup errors, before any side effect.
const EXIT_USAGE: u8 = 1;
/// Success without a change, or a dry run.
const EXIT_UNCHANGED: u8 = 2;
/// Pass-fatal error.
const EXIT_FATAL: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_CHANGED,
                _ => EXIT_USAGE,
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let Some(level) = parse_log_level(&args.log_level) else {
        eprintln!("invalid log level {:?}", args.log_level);
        return ExitCode::from(EXIT_USAGE);
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.to_string()))
        .init();

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let code = match args.command {
        None | Some(Commands::Reconcile) => reconcile_once(args.shared, cancel).await,
        Some(Commands::Daemon { interval, with_events }) => {
            daemon(args.shared, interval, with_events, cancel).await
        }
        Some(Commands::BackupOnce(backup)) => backup_once(args.shared, backup, cancel).await,
    };
    ExitCode::from(code)
}

async fn reconcile_once(shared: SharedArgs, cancel: CancellationToken) -> u8 {
    let runtime = DockerCli::new(shared.docker_sock.clone(), cancel);
    let mut reconciler = Reconciler::new(runtime, reconcile_options(&shared));

    match reconciler.run().await.context("reconcile failed") {
        Ok(result) => {
            if !result.changed || result.dry_run {
                EXIT_UNCHANGED
            } else {
                EXIT_CHANGED
            }
        }
        Err(err) => {
            error!("{err:#}");
            EXIT_FATAL
        }
    }
}

async fn daemon(shared: SharedArgs, interval: u64, with_events: bool, cancel: CancellationToken) -> u8 {
    let runtime = DockerCli::new(shared.docker_sock.clone(), cancel.clone());
    let opts = DaemonOptions {
        reconcile: reconcile_options(&shared),
        interval: Duration::from_secs(interval),
        with_events,
    };
    match run_daemon(runtime, opts, cancel).await.context("daemon failed") {
        Ok(()) => EXIT_CHANGED,
        Err(err) => {
            error!("{err:#}");
            EXIT_FATAL
        }
    }
}

async fn backup_once(shared: SharedArgs, backup: BackupArgs, cancel: CancellationToken) -> u8 {
    let runtime = DockerCli::new(shared.docker_sock.clone(), cancel.clone());
    let opts = BackupOptions {
        docker_sock: shared.docker_sock,
        docker_root: shared.docker_root,
        include_project_name: shared.include_project_name,
        exclude_bind_mounts: shared.exclude_bind_mounts,
        rcb_image: backup.rcb_image,
        rcb_command: backup.rcb_command,
        rcb_env_file: backup.rcb_env_file,
        rcb_extra_args: backup.rcb_args,
        quiesce_label: backup.quiesce_label,
        quiesce_timeout: Duration::from_secs(backup.quiesce_timeout),
        restic_group_by: backup.restic_group_by,
        restic_path_prefix: backup.restic_path_prefix,
    };
    match run_backup(&runtime, &opts, &cancel).await.context("backup-once failed") {
        Ok(()) => EXIT_CHANGED,
        Err(err) => {
            error!("{err:#}");
            EXIT_FATAL
        }
    }
}

fn reconcile_options(shared: &SharedArgs) -> ReconcileOptions {
    ReconcileOptions {
        config_path: shared.config.clone(),
        apply: shared.apply,
        backrest_container: shared.backrest_container.clone(),
        dry_run: shared.dry_run,
        docker_root: shared.docker_root.clone(),
        volume_prefix: shared.volume_prefix.clone(),
        default_repo: shared.default_repo.clone(),
        default_schedule: shared.default_schedule.clone(),
        default_retention: shared.default_retention.clone(),
        plan_id_prefix: shared.plan_id_prefix.clone(),
        include_project_name: shared.include_project_name,
        exclude_bind_mounts: shared.exclude_bind_mounts,
        restart_timeout: Duration::from_secs(shared.restart_timeout),
    }
}

fn parse_log_level(raw: &str) -> Option<LevelFilter> {
    match raw.to_lowercase().as_str() {
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Cancels the shared token on SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    error!("failed to install SIGTERM handler: {err}");
                    let _ = ctrl_c.await;
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received interrupt, shutting down");
        }
        cancel.cancel();
    });
}
