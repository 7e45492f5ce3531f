// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled weekly and monthly guild reports.
//!
//! Due-ness is evaluated in UTC. A report is due when its cadence is enabled,
//! today is the scheduled weekday or day of month, and no report of that
//! cadence was sent earlier on the same UTC date.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Datelike;
use lastseen_core::time::{day_bucket, to_datetime};
use lastseen_core::{Guild, Member, ReportCadence, ReportKind, ReportPublisher, ReportSchedule};
use lastseen_storage::SqliteStore;
use lastseen_storage::queries::stats::weekday_of;
use tracing::{debug, info, warn};

/// Weekday names, Monday first.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Entries listed per section before the remainder is summarized.
pub const LIST_LIMIT: usize = 25;

/// Members shown on the activity leaderboard.
pub const LEADERBOARD_SIZE: usize = 5;

/// Whether a report of `cadence` should go out at `now`.
pub fn is_due(schedule: &ReportSchedule, cadence: ReportCadence, now: i64) -> bool {
    if !schedule.enabled || !schedule.frequency.includes(cadence) {
        return false;
    }
    let today = day_bucket(now);
    let scheduled_today = match cadence {
        ReportCadence::Weekly => weekday_of(today) == usize::from(schedule.weekly_day),
        ReportCadence::Monthly => to_datetime(now).day() == u32::from(schedule.monthly_day),
    };
    scheduled_today
        && schedule
            .last_sent(cadence)
            .is_none_or(|sent| day_bucket(sent) != today)
}

fn member_line(member: &Member) -> String {
    match &member.nickname {
        Some(nick) => format!("{nick} ({})", member.username),
        None => member.username.clone(),
    }
}

/// Render the text body of a report for `guild`.
pub async fn build_report(store: &SqliteStore, guild: &Guild, cadence: ReportCadence) -> String {
    let days = cadence.window_days();
    let mut body = String::new();
    let _ = writeln!(
        body,
        "{} report for {} (last {days} days, times in UTC; guild timezone {})",
        cadence.label(),
        guild.guild_name,
        guild.timezone
    );

    for kind in guild.reports.types.iter() {
        body.push('\n');
        match kind {
            ReportKind::Activity => activity_section(store, guild.guild_id, days, &mut body).await,
            ReportKind::Members => members_section(store, guild.guild_id, days, &mut body).await,
            ReportKind::Departures => {
                departures_section(store, guild.guild_id, days, &mut body).await
            }
        }
    }
    body
}

async fn activity_section(store: &SqliteStore, guild_id: i64, days: i64, body: &mut String) {
    let period = store.get_message_activity_period(guild_id, None, days).await;
    let by_day = store.get_activity_by_day(guild_id, days).await;
    let leaders = store
        .get_activity_leaderboard(guild_id, days, LEADERBOARD_SIZE)
        .await;

    let _ = writeln!(body, "Activity");
    let _ = writeln!(body, "  Messages: {}", period.total);
    let _ = writeln!(body, "  Daily average: {:.1}", period.daily_average);
    let peak = by_day
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by_key(|(i, count)| (**count, std::cmp::Reverse(*i)));
    if let Some((day, count)) = peak {
        let _ = writeln!(body, "  Busiest day: {} ({count} messages)", WEEKDAYS[day]);
    }
    if leaders.is_empty() {
        let _ = writeln!(body, "  No messages in this period.");
    } else {
        let _ = writeln!(body, "  Top members:");
        for (rank, entry) in leaders.iter().enumerate() {
            let _ = writeln!(
                body,
                "    {}. {} - {} messages",
                rank + 1,
                entry.display_name(),
                entry.total_messages
            );
        }
    }
}

async fn members_section(store: &SqliteStore, guild_id: i64, days: i64, body: &mut String) {
    let joined = store.get_new_members_period(guild_id, days).await;
    let _ = writeln!(body, "New members: {}", joined.len());
    for member in joined.iter().take(LIST_LIMIT) {
        let _ = writeln!(body, "  {}", member_line(member));
    }
    if joined.len() > LIST_LIMIT {
        let _ = writeln!(body, "  ...and {} more", joined.len() - LIST_LIMIT);
    }
}

async fn departures_section(store: &SqliteStore, guild_id: i64, days: i64, body: &mut String) {
    let departed = store.get_departed_members_period(guild_id, days).await;
    let _ = writeln!(body, "Departures: {}", departed.len());
    let pages = departed.chunks(LIST_LIMIT).count();
    for (page, chunk) in departed.chunks(LIST_LIMIT).enumerate() {
        if pages > 1 {
            let _ = writeln!(body, "  Page {}/{pages}", page + 1);
        }
        for member in chunk {
            let left = member
                .left_date
                .map(|ts| to_datetime(ts).format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let _ = writeln!(body, "  {} (left {left})", member_line(member));
        }
    }
}

/// Counts of one report pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportRun {
    pub sent: usize,
    pub failed: usize,
    /// Due reports with no channel to post to.
    pub skipped: usize,
    /// Delivered reports whose last-sent stamp could not be written.
    pub unstamped: usize,
}

/// Sends due reports for every guild.
pub struct ReportJob {
    store: Arc<SqliteStore>,
    publisher: Arc<dyn ReportPublisher>,
}

impl ReportJob {
    pub fn new(store: Arc<SqliteStore>, publisher: Arc<dyn ReportPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn run(&self) -> ReportRun {
        let now = self.store.now();
        let mut run = ReportRun::default();

        for guild in self.store.list_guilds().await {
            if !guild.reports.enabled {
                continue;
            }
            for cadence in [ReportCadence::Weekly, ReportCadence::Monthly] {
                if !is_due(&guild.reports, cadence, now) {
                    continue;
                }
                let Some(channel_id) = guild.reports.channel_id.or(guild.notification_channel_id)
                else {
                    warn!(guild_id = guild.guild_id, %cadence, "report due but no channel configured");
                    run.skipped += 1;
                    continue;
                };

                let body = build_report(&self.store, &guild, cadence).await;
                match self.publisher.publish(guild.guild_id, channel_id, &body).await {
                    Ok(()) => {
                        if !self.store.mark_report_sent(guild.guild_id, cadence, now).await {
                            warn!(
                                guild_id = guild.guild_id,
                                %cadence,
                                "report sent but not stamped, it may be sent again today"
                            );
                            run.unstamped += 1;
                        }
                        info!(guild_id = guild.guild_id, %cadence, channel_id, "report sent");
                        run.sent += 1;
                    }
                    Err(e) => {
                        warn!(guild_id = guild.guild_id, %cadence, error = %e, "report delivery failed");
                        run.failed += 1;
                    }
                }
            }
        }

        debug!(
            sent = run.sent,
            failed = run.failed,
            skipped = run.skipped,
            unstamped = run.unstamped,
            "report check complete"
        );
        run
    }
}
