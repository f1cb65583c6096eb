//! Watchdog task - restarts managed servers that died unexpectedly.
//!
//! Runs for the lifetime of the daemon, one pass per interval. Passes never
//! overlap: a slow pass delays the next tick instead of queueing extra ones.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coordinator::ServerCoordinator;

/// Spawns the watchdog loop.
///
/// The loop exits when `cancel_token` is cancelled.
pub fn spawn_watchdog(
    coordinator: ServerCoordinator,
    period: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "Watchdog started");

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Watchdog shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let summary = coordinator.watchdog_tick().await;
                    if summary.restarted > 0 || summary.failed > 0 {
                        info!(
                            checked = summary.checked,
                            restarted = summary.restarted,
                            failed = summary.failed,
                            exhausted = summary.exhausted,
                            "Watchdog pass"
                        );
                    } else {
                        debug!(checked = summary.checked, busy = summary.busy, "Watchdog pass");
                    }
                }
            }
        }
    })
}
