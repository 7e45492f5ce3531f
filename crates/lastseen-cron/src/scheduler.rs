// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-interval job loops.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run `job` every `period` until `cancel` fires.
///
/// The first run happens one period after spawning unless `run_immediately`
/// is set. A run is never interrupted by cancellation; the loop stops before
/// the next tick.
pub fn spawn_interval<F, Fut>(
    name: &'static str,
    period: Duration,
    run_immediately: bool,
    cancel: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if period.is_zero() {
            warn!(job = name, "zero interval, job disabled");
            return;
        }
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        if !run_immediately {
            interval.tick().await;
        }
        info!(job = name, period_secs = period.as_secs(), "maintenance job scheduled");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!(job = name, "running");
                    job().await;
                }
                _ = cancel.cancelled() => {
                    info!(job = name, "maintenance job shutting down");
                    break;
                }
            }
        }
    })
}
