//! Continuous reconcile loop with coalesced triggers.
//!
//! A single depth-1 channel carries "a reconcile is due": the startup
//! trigger, the interval timer, and (optionally) every container
//! lifecycle event all post into it with a non-blocking send, so bursts
//! collapse into one pending pass and passes never overlap.

use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SidecarError};
use crate::reconcile::{ReconcileOptions, Reconciler};
use crate::runtime::ContainerRuntime;

/// Scheduling knobs layered over the reconcile options.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub reconcile: ReconcileOptions,
    pub interval: Duration,
    /// Also reconcile on container lifecycle events
    pub with_events: bool,
}

/// Runs reconcile passes until the cancellation token fires.
///
/// Cancellation is a clean shutdown, not an error; pass-fatal reconcile
/// errors are logged and the loop keeps going.
pub async fn run_daemon<R: ContainerRuntime>(
    runtime: R,
    opts: DaemonOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let mut reconciler = Reconciler::new(runtime, opts.reconcile);

    let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
    // run immediately at startup
    let _ = trigger_tx.try_send(());

    let mut ticker = time::interval_at(Instant::now() + opts.interval, opts.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if opts.with_events {
        let mut events = reconciler
            .runtime()
            .subscribe_events(cancel.child_token())
            .await?;
        let event_trigger = trigger_tx.clone();
        let event_cancel = cancel.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = event_cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            debug!("runtime event: action={} container={}", event.action, event.container_id);
                            let _ = event_trigger.try_send(());
                        }
                        None => {
                            // stream ended or errored; one last pass picks up
                            // whatever state change we may have missed
                            debug!("event stream ended");
                            let _ = event_trigger.try_send(());
                            break;
                        }
                    },
                }
            }
        });
        info!("daemon listening for container events");
    }

    info!("daemon started: interval={:?}", opts.interval);
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("daemon shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                let _ = trigger_tx.try_send(());
            }
            received = trigger_rx.recv() => {
                if received.is_none() {
                    return Ok(());
                }
                match reconciler.run().await {
                    Ok(result) => debug!(
                        "pass complete: seen={} skipped={} changed={}",
                        result.plans_seen, result.plans_skipped, result.changed
                    ),
                    Err(SidecarError::Canceled) => {
                        info!("daemon shutting down");
                        return Ok(());
                    }
                    Err(err) => error!("reconcile failed: {err}"),
                }
            }
        }
    }
}
