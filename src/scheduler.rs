use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AutoPostConfig, Config};
use crate::pipeline::Services;
use crate::store;

/// How often the scheduler checks for due jobs.
const TICK_SECS: u64 = 30;

/// Parsed schedule representation. Every form is evaluated in the configured timezone.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// One or more times per day.
    Daily { times: Vec<NaiveTime> },
    /// Once per week on a specific day and time.
    Weekly { day: Weekday, time: NaiveTime },
    Cron { schedule: Box<cron::Schedule> },
}

impl Schedule {
    /// Parse "at:08:00,20:00", "weekly:monday,08:00" or "cron:0 8 * * *".
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(times_str) = s.strip_prefix("at:") {
            let mut times = times_str
                .split(',')
                .map(|part| parse_time(part.trim()))
                .collect::<Result<Vec<_>>>()?;
            times.sort();
            times.dedup();
            Ok(Schedule::Daily { times })
        } else if let Some(rest) = s.strip_prefix("weekly:") {
            let (day, time) = rest
                .split_once(',')
                .with_context(|| format!("invalid weekly schedule '{s}': expected 'weekly:DAY,HH:MM'"))?;
            Ok(Schedule::Weekly {
                day: parse_weekday(day.trim())?,
                time: parse_time(time.trim())?,
            })
        } else if let Some(expr) = s.strip_prefix("cron:") {
            // The cron crate wants seconds and year fields around the usual five
            let schedule = cron::Schedule::from_str(&format!("0 {} *", expr.trim()))
                .with_context(|| format!("invalid cron expression '{expr}'"))?;
            Ok(Schedule::Cron {
                schedule: Box::new(schedule),
            })
        } else {
            anyhow::bail!("invalid schedule '{s}': must start with 'at:', 'weekly:', or 'cron:'");
        }
    }

    /// First tick strictly after `after`.
    pub fn next_tick(&self, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let after_local = after.with_timezone(&tz);
        let today = after_local.date_naive();

        match self {
            Schedule::Daily { times } => (0..4).find_map(|offset| {
                let date = today + chrono::Duration::days(offset);
                times
                    .iter()
                    .filter_map(|&time| local_instant(tz, date, time))
                    .find(|candidate| *candidate > after)
            }),
            Schedule::Weekly { day, time } => {
                let days_ahead =
                    (day.num_days_from_monday() as i64 - today.weekday().num_days_from_monday() as i64 + 7) % 7;
                // This week's slot, then the next two in case of a passed time or DST gap
                (0..3).find_map(|week| {
                    let date = today + chrono::Duration::days(days_ahead + week * 7);
                    local_instant(tz, date, *time).filter(|candidate| *candidate > after)
                })
            }
            Schedule::Cron { schedule } => schedule
                .after(&after_local)
                .next()
                .map(|t| t.with_timezone(&Utc)),
        }
    }

    /// True when a tick fell in `(after, now]`.
    pub fn is_due(&self, tz: Tz, after: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.next_tick(tz, after).is_some_and(|next| next <= now)
    }
}

/// Resolve a local wall-clock time; `None` inside a DST gap.
fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").with_context(|| format!("invalid time '{s}': expected HH:MM"))
}

fn parse_weekday(s: &str) -> Result<Weekday> {
    match s.to_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        _ => anyhow::bail!("unknown weekday '{s}'"),
    }
}

fn last_run_key(job: &AutoPostConfig) -> String {
    format!("auto_post:{}:last_run", job.name)
}

async fn last_run(pool: &SqlitePool, job: &AutoPostConfig) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = store::get_setting(pool, &last_run_key(job)).await? else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("parsing last run '{raw}' for auto_post '{}'", job.name))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

/// Auto-post loop. Jobs run one at a time; a failed run is logged and the
/// job waits for its next tick.
pub async fn scheduler_loop(
    pool: SqlitePool,
    config: Arc<Config>,
    services: Arc<Services>,
    cancel: CancellationToken,
) {
    let jobs: Vec<(&AutoPostConfig, Schedule)> = config
        .auto_post
        .iter()
        .filter(|job| job.enabled)
        .filter_map(|job| match Schedule::parse(&job.schedule) {
            Ok(schedule) => Some((job, schedule)),
            Err(e) => {
                warn!(job = %job.name, error = %e, "invalid schedule, skipping");
                None
            }
        })
        .collect();

    if jobs.is_empty() {
        info!("no auto-post jobs enabled, scheduler idle");
        cancel.cancelled().await;
        return;
    }

    let tz: Tz = match config.blogsmith.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            error!(tz = %config.blogsmith.timezone, "invalid timezone in config, scheduler stopped");
            return;
        }
    };

    info!(jobs = jobs.len(), "auto-post scheduler started");

    // Jobs that never ran wait for their next tick after startup; missed ticks are skipped
    let mut first_seen: HashMap<&str, DateTime<Utc>> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("scheduler shutting down");
                return;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(TICK_SECS)) => {}
        }

        for (job, schedule) in &jobs {
            if cancel.is_cancelled() {
                return;
            }

            let now = Utc::now();
            let after = match last_run(&pool, job).await {
                Ok(Some(t)) => t,
                Ok(None) => *first_seen.entry(job.name.as_str()).or_insert(now),
                Err(e) => {
                    error!(job = %job.name, error = %e, "failed to read last run");
                    continue;
                }
            };

            if !schedule.is_due(tz, after, now) {
                debug!(job = %job.name, "not due yet");
                continue;
            }

            info!(job = %job.name, "scheduled auto-post starting");
            match services.run(Some(&job.user_id), &job.request).await {
                Ok(id) => info!(job = %job.name, id = %id, "scheduled auto-post complete"),
                Err(e) => error!(job = %job.name, error = format!("{e:#}"), "scheduled auto-post failed"),
            }

            // Recorded after failures too, so a broken job does not refire every tick
            if let Err(e) = store::set_setting(&pool, &last_run_key(job), &now.to_rfc3339()).await {
                error!(job = %job.name, error = %e, "failed to record last run");
            }
        }
    }
}
