// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write-coalescing buffer for message activity.
//!
//! Message events increment in-memory counters keyed by UTC day and hour.
//! A flush takes the counters and any previously failed entries in one step
//! under the state lock, then writes one aggregated count per key through an
//! [`ActivitySink`]. Writes that fail are kept for the next flush together
//! with the number of cycles they have failed.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use lastseen_config::model::BufferConfig;
use lastseen_core::ActivitySink;
use lastseen_core::time::{day_bucket, hour_bucket, hour_of_day};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::shutdown::drain;

/// Tuning of an [`ActivityBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSettings {
    pub flush_interval: Duration,
    /// Combined daily and hourly keys that trigger an inline flush.
    pub max_buffered_keys: usize,
    /// Failed cycles after which an entry is abandoned. `0` retries forever.
    pub max_flush_retries: u32,
    pub shutdown_timeout: Duration,
}

impl From<&BufferConfig> for BufferSettings {
    fn from(config: &BufferConfig) -> Self {
        Self {
            flush_interval: Duration::from_secs(config.flush_interval_secs),
            max_buffered_keys: config.max_buffered_keys.max(1),
            max_flush_retries: config.max_flush_retries,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self::from(&BufferConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DailyKey {
    pub guild_id: i64,
    pub user_id: i64,
    pub day_bucket: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HourlyKey {
    pub guild_id: i64,
    pub user_id: i64,
    pub hour_bucket: i64,
    pub hour_of_day: u8,
}

/// A count waiting to be written and how many flushes it has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Pending {
    count: i64,
    attempts: u32,
}

impl Pending {
    fn absorb(&mut self, other: Pending) {
        self.count += other.count;
        self.attempts = self.attempts.max(other.attempts);
    }
}

#[derive(Debug, Default)]
struct Ledger {
    daily: HashMap<DailyKey, i64>,
    hourly: HashMap<HourlyKey, i64>,
    failed_daily: HashMap<DailyKey, Pending>,
    failed_hourly: HashMap<HourlyKey, Pending>,
}

impl Ledger {
    fn live_keys(&self) -> usize {
        self.daily.len() + self.hourly.len()
    }

    fn pending_keys(&self) -> usize {
        self.live_keys() + self.failed_daily.len() + self.failed_hourly.len()
    }

    /// Take live and failed entries, merged per key, leaving the ledger empty.
    fn take_batch(&mut self) -> (HashMap<DailyKey, Pending>, HashMap<HourlyKey, Pending>) {
        (
            merge_failed(std::mem::take(&mut self.daily), std::mem::take(&mut self.failed_daily)),
            merge_failed(std::mem::take(&mut self.hourly), std::mem::take(&mut self.failed_hourly)),
        )
    }
}

fn merge_failed<K: Eq + Hash>(
    live: HashMap<K, i64>,
    failed: HashMap<K, Pending>,
) -> HashMap<K, Pending> {
    let mut batch: HashMap<K, Pending> = live
        .into_iter()
        .map(|(key, count)| (key, Pending { count, attempts: 0 }))
        .collect();
    for (key, pending) in failed {
        batch.entry(key).or_default().absorb(pending);
    }
    batch
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Keys written to the sink.
    pub delivered: usize,
    /// Keys the sink declined, such as activity of unknown members.
    pub dropped_orphans: usize,
    /// Keys that failed and will be retried.
    pub requeued: usize,
    /// Keys discarded after reaching the retry ceiling.
    pub abandoned: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.delivered + self.dropped_orphans + self.requeued + self.abandoned == 0
    }
}

enum Delivery {
    Delivered,
    Dropped,
    Failed,
}

/// Coalesces message counts and flushes them to an [`ActivitySink`].
pub struct ActivityBuffer {
    sink: Arc<dyn ActivitySink>,
    settings: BufferSettings,
    ledger: Mutex<Ledger>,
    flush_gate: Mutex<()>,
    runner: StdMutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ActivityBuffer {
    pub fn new(sink: Arc<dyn ActivitySink>, settings: BufferSettings) -> Self {
        Self {
            sink,
            settings,
            ledger: Mutex::new(Ledger::default()),
            flush_gate: Mutex::new(()),
            runner: StdMutex::new(None),
        }
    }

    pub fn settings(&self) -> &BufferSettings {
        &self.settings
    }

    /// Count one message by `user_id` in `guild_id` sent at `at` (Unix seconds).
    ///
    /// When the buffer reaches its key limit the message is counted and the
    /// buffer is flushed before returning; the report of that flush is returned.
    pub async fn record(&self, guild_id: i64, user_id: i64, at: i64) -> Option<FlushReport> {
        let full = {
            let mut ledger = self.ledger.lock().await;
            let daily = DailyKey {
                guild_id,
                user_id,
                day_bucket: day_bucket(at),
            };
            let hourly = HourlyKey {
                guild_id,
                user_id,
                hour_bucket: hour_bucket(at),
                hour_of_day: hour_of_day(at),
            };
            *ledger.daily.entry(daily).or_default() += 1;
            *ledger.hourly.entry(hourly).or_default() += 1;
            ledger.live_keys() >= self.settings.max_buffered_keys
        };

        if full {
            info!(
                limit = self.settings.max_buffered_keys,
                "activity buffer full, flushing early"
            );
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Keys waiting for a flush, including failed ones awaiting retry.
    pub async fn pending_keys(&self) -> usize {
        self.ledger.lock().await.pending_keys()
    }

    /// Write every pending count to the sink.
    ///
    /// Concurrent calls are serialized. Counts recorded while a flush is
    /// writing land in the next flush.
    pub async fn flush(&self) -> FlushReport {
        let _gate = self.flush_gate.lock().await;
        let (daily, hourly) = self.ledger.lock().await.take_batch();
        if daily.is_empty() && hourly.is_empty() {
            return FlushReport::default();
        }

        let mut report = FlushReport::default();
        let mut failed_daily = HashMap::new();
        let mut failed_hourly = HashMap::new();

        for (key, pending) in daily {
            let result = self
                .sink
                .record_daily(key.guild_id, key.user_id, key.day_bucket, pending.count)
                .await;
            let outcome = match result {
                Ok(true) => Delivery::Delivered,
                Ok(false) => Delivery::Dropped,
                Err(e) => {
                    debug!(guild_id = key.guild_id, user_id = key.user_id, error = %e, "daily activity write failed");
                    Delivery::Failed
                }
            };
            if let Some(retry) = self.settle(&mut report, outcome, pending, || {
                error!(
                    guild_id = key.guild_id,
                    user_id = key.user_id,
                    day_bucket = key.day_bucket,
                    count = pending.count,
                    attempts = pending.attempts + 1,
                    "abandoning daily activity after repeated write failures"
                );
            }) {
                failed_daily.insert(key, retry);
            }
        }

        for (key, pending) in hourly {
            let result = self
                .sink
                .record_hourly(
                    key.guild_id,
                    key.user_id,
                    key.hour_bucket,
                    key.hour_of_day,
                    pending.count,
                )
                .await;
            let outcome = match result {
                Ok(true) => Delivery::Delivered,
                Ok(false) => Delivery::Dropped,
                Err(e) => {
                    debug!(guild_id = key.guild_id, user_id = key.user_id, error = %e, "hourly activity write failed");
                    Delivery::Failed
                }
            };
            if let Some(retry) = self.settle(&mut report, outcome, pending, || {
                error!(
                    guild_id = key.guild_id,
                    user_id = key.user_id,
                    hour_bucket = key.hour_bucket,
                    count = pending.count,
                    attempts = pending.attempts + 1,
                    "abandoning hourly activity after repeated write failures"
                );
            }) {
                failed_hourly.insert(key, retry);
            }
        }

        if !failed_daily.is_empty() || !failed_hourly.is_empty() {
            let mut ledger = self.ledger.lock().await;
            for (key, pending) in failed_daily {
                ledger.failed_daily.entry(key).or_default().absorb(pending);
            }
            for (key, pending) in failed_hourly {
                ledger.failed_hourly.entry(key).or_default().absorb(pending);
            }
        }

        if report.requeued > 0 || report.abandoned > 0 {
            warn!(
                delivered = report.delivered,
                requeued = report.requeued,
                abandoned = report.abandoned,
                "activity flush incomplete"
            );
        } else {
            debug!(
                delivered = report.delivered,
                dropped = report.dropped_orphans,
                "activity flushed"
            );
        }
        report
    }

    /// Count an outcome; returns the entry to retry, if any.
    fn settle(
        &self,
        report: &mut FlushReport,
        outcome: Delivery,
        pending: Pending,
        on_abandon: impl FnOnce(),
    ) -> Option<Pending> {
        match outcome {
            Delivery::Delivered => report.delivered += 1,
            Delivery::Dropped => report.dropped_orphans += 1,
            Delivery::Failed => {
                let attempts = pending.attempts.saturating_add(1);
                let ceiling = self.settings.max_flush_retries;
                if ceiling > 0 && attempts >= ceiling {
                    on_abandon();
                    report.abandoned += 1;
                } else {
                    report.requeued += 1;
                    return Some(Pending {
                        count: pending.count,
                        attempts,
                    });
                }
            }
        }
        None
    }

    /// Start the periodic flush loop. It stops when `shutdown` is cancelled
    /// or [`ActivityBuffer::shutdown`] is called.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) {
        let buffer = Arc::clone(self);
        let token = shutdown.child_token();
        let loop_token = token.clone();
        let period = self.settings.flush_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        buffer.flush().await;
                    }
                    _ = loop_token.cancelled() => {
                        debug!("activity flush loop stopping");
                        break;
                    }
                }
            }
        });

        let previous = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((token, handle));
        if let Some((old_token, _)) = previous {
            old_token.cancel();
        }
        info!(
            interval_secs = period.as_secs(),
            max_keys = self.settings.max_buffered_keys,
            "activity buffer started"
        );
    }

    /// Stop the flush loop and write what remains.
    ///
    /// Waiting for the loop and the final flush are each bounded by the
    /// shutdown timeout; a loop flush still running past it is left detached.
    /// If the final flush task cannot complete, a direct flush is attempted
    /// instead.
    pub async fn shutdown(self: &Arc<Self>) -> FlushReport {
        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((token, handle)) = runner {
            token.cancel();
            if let Some(Err(e)) =
                drain("activity flush loop", self.settings.shutdown_timeout, handle).await
            {
                warn!(error = %e, "activity flush loop ended abnormally");
            }
        }

        let buffer = Arc::clone(self);
        let task = tokio::spawn(async move { buffer.flush().await });
        let report = match drain("final activity flush", self.settings.shutdown_timeout, task).await {
            Some(Ok(report)) => report,
            Some(Err(e)) => {
                warn!(error = %e, "final flush task failed, flushing directly");
                self.flush().await
            }
            None => FlushReport::default(),
        };

        let left = self.pending_keys().await;
        if left > 0 {
            warn!(pending = left, "activity buffer stopped with unwritten counts");
        } else {
            info!(delivered = report.delivered, "activity buffer stopped");
        }
        report
    }
}
