//! One-shot backup pipeline: quiesce, invoke restic-compose-backup,
//! prune per-workload retention, and always resume what was stopped.

use std::time::Duration;

use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SidecarError};
use crate::exec::{self, RunOptions};
use crate::labels::{get_label, LABEL_ENABLE, LABEL_RETENTION_KEEP};
use crate::models::retention_flags;
use crate::naming::service_path_name;
use crate::runtime::{docker, Container, ContainerRuntime};

/// Configuration for the `backup-once` pipeline.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub docker_sock: String,
    pub docker_root: String,
    pub include_project_name: bool,
    pub exclude_bind_mounts: bool,

    /// restic-compose-backup image reference
    pub rcb_image: String,
    /// Command + args run inside the image
    pub rcb_command: Vec<String>,
    /// Optional env file passed to the tool container
    pub rcb_env_file: Option<String>,
    /// Extra args appended to the command
    pub rcb_extra_args: Vec<String>,

    /// Label selector for sidecar-controlled quiesce
    pub quiesce_label: String,
    pub quiesce_timeout: Duration,

    /// restic `--group-by` value for retention pruning
    pub restic_group_by: String,
    /// Base path prefix used in `restic forget --path`
    pub restic_path_prefix: String,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            docker_sock: "/var/run/docker.sock".to_string(),
            docker_root: "/var/lib/docker".to_string(),
            include_project_name: false,
            exclude_bind_mounts: false,
            rcb_image: "zettaio/restic-compose-backup:0.7.1".to_string(),
            rcb_command: vec!["rcb".to_string(), "backup".to_string()],
            rcb_env_file: None,
            rcb_extra_args: Vec::new(),
            quiesce_label: "restic-compose-backup.quiesce=true".to_string(),
            quiesce_timeout: Duration::from_secs(60),
            restic_group_by: "paths".to_string(),
            restic_path_prefix: "/volumes".to_string(),
        }
    }
}

/// Runs the one-shot backup pipeline.
///
/// Containers this pass stops are restarted on every exit path:
/// quiesce failure, tool failure, prune failure, or success. Restart
/// failures during the resume sweep are logged, never raised.
pub async fn run_backup<R: ContainerRuntime>(
    runtime: &R,
    opts: &BackupOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    if opts.rcb_image.is_empty() {
        return Err(SidecarError::configuration("rcb image required"));
    }
    // fail on an unusable socket before any container is touched
    docker::socket_path(&opts.docker_sock)?;

    let (stopped, stop_err) = quiesce(runtime, opts).await;

    let result = match stop_err {
        Some(err) => Err(err),
        None => backup_and_prune(runtime, opts, cancel).await,
    };

    for container in &stopped {
        match runtime.start(&container.id).await {
            Ok(()) => info!("quiesce resumed: container={}", container.display_name()),
            Err(err) => error!(
                "quiesce resume failed: container={} error={err}",
                container.display_name()
            ),
        }
    }

    result
}

/// Stops every running container matching the quiesce selector.
///
/// Returns the set actually stopped alongside the first stop failure;
/// the caller resumes the partial set either way.
async fn quiesce<R: ContainerRuntime>(
    runtime: &R,
    opts: &BackupOptions,
) -> (Vec<Container>, Option<SidecarError>) {
    if opts.quiesce_label.is_empty() {
        return (Vec::new(), None);
    }
    let containers = match runtime.list_by_label(&opts.quiesce_label).await {
        Ok(containers) => containers,
        Err(err) => return (Vec::new(), Some(err)),
    };

    let mut stopped = Vec::with_capacity(containers.len());
    for container in containers {
        if !container.is_running() {
            continue;
        }
        info!("quiesce stop: container={}", container.display_name());
        if let Err(err) = runtime.stop(&container.id, opts.quiesce_timeout).await {
            let err = SidecarError::runtime(
                "quiesce stop",
                format!("{}: {err}", container.display_name()),
            );
            return (stopped, Some(err));
        }
        stopped.push(container);
    }
    (stopped, None)
}

async fn backup_and_prune<R: ContainerRuntime>(
    runtime: &R,
    opts: &BackupOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    run_tool(opts, cancel, &opts.rcb_command, &opts.rcb_extra_args).await?;
    run_retention(runtime, opts, cancel).await?;
    info!("backup-once complete");
    Ok(())
}

/// Prunes snapshots for every opted-in workload carrying a retention
/// spec; workloads without a spec or a usable path identity are skipped.
async fn run_retention<R: ContainerRuntime>(
    runtime: &R,
    opts: &BackupOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let selector = format!("{LABEL_ENABLE}=true");
    let containers = runtime.list_by_label(&selector).await?;

    for container in containers {
        let spec = get_label(&container.labels, LABEL_RETENTION_KEEP, "");
        if spec.is_empty() {
            continue;
        }
        let Some(path) = restic_path(opts, &container) else {
            continue;
        };
        let flags = retention_flags(spec);
        if flags.is_empty() {
            continue;
        }

        let mut command = vec![
            "restic".to_string(),
            "forget".to_string(),
            "--group-by".to_string(),
            opts.restic_group_by.clone(),
            "--path".to_string(),
            path.clone(),
        ];
        command.extend(flags);
        command.push("--prune".to_string());

        info!(
            "retention run: container={} path={path}",
            container.display_name()
        );
        run_tool(opts, cancel, &command, &[]).await.map_err(|err| {
            SidecarError::CommandFailed {
                command: format!("restic forget ({})", container.display_name()),
                message: err.to_string(),
            }
        })?;
    }
    Ok(())
}

/// restic path identity of a workload under the configured prefix.
fn restic_path(opts: &BackupOptions, container: &Container) -> Option<String> {
    let service = if container.service.is_empty() {
        container.name.as_str()
    } else {
        container.service.as_str()
    };
    let name = service_path_name(
        &container.project,
        service,
        &container.name,
        opts.include_project_name,
    );
    if name.is_empty() {
        return None;
    }
    let prefix = opts.restic_path_prefix.trim_end_matches('/');
    Some(format!("{prefix}/{name}"))
}

/// Invokes the tool image once via `docker run --rm`, with the runtime
/// socket and docker root mounted read-only.
async fn run_tool(
    opts: &BackupOptions,
    cancel: &CancellationToken,
    command: &[String],
    extra: &[String],
) -> Result<()> {
    let socket = docker::socket_path(&opts.docker_sock)?;

    let mut args: Vec<String> = vec!["run".to_string(), "--rm".to_string()];
    args.push("-v".to_string());
    args.push(format!("{socket}:/tmp/docker.sock:ro"));
    if !opts.docker_root.is_empty() {
        args.push("-v".to_string());
        args.push(format!(
            "{}:/var/lib/docker:ro",
            opts.docker_root.trim_end_matches('/')
        ));
    }
    if let Some(env_file) = &opts.rcb_env_file {
        args.push("--env-file".to_string());
        args.push(env_file.clone());
    }
    args.push("-e".to_string());
    args.push(format!(
        "EXCLUDE_BIND_MOUNTS={}",
        u8::from(opts.exclude_bind_mounts)
    ));
    args.push("-e".to_string());
    args.push(format!(
        "INCLUDE_PROJECT_NAME={}",
        u8::from(opts.include_project_name)
    ));

    args.push(opts.rcb_image.clone());
    args.extend(command.iter().cloned());
    args.extend(extra.iter().cloned());

    exec::run(cancel, "docker", &args, &RunOptions::default()).await
}
