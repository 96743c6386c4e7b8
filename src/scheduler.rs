//! Cron triggers pinned to a timezone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::task::JoinSet;

use crate::error::{Error, Result};

const WEEKDAY_NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

pub struct Trigger {
    name: &'static str,
    expr: String,
    schedule: Schedule,
    tz: Tz,
}

impl Trigger {
    pub fn new(name: &'static str, expr: &str, tz: Tz) -> Result<Self> {
        Ok(Self {
            name,
            expr: expr.to_string(),
            schedule: parse_cron(expr)?,
            tz,
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Next fire time strictly after `now`, evaluated in the trigger's timezone.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.tz))
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Like `next_after`, but never returns `last` again when the timer woke
    /// slightly before the wall clock reached it.
    fn next_fire(&self, now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        let from = last.map_or(now, |l| l.max(now));
        self.next_after(from)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}' ({})", self.name, self.expr, self.tz)
    }
}

/// Parse a cron expression.
///
/// Five-field Unix expressions (`min hour dom month dow`) are padded with a
/// seconds and a year field, and their numeric day-of-week values are read
/// the Unix way (0 or 7 = Sunday). Six and seven field expressions are passed
/// to the `cron` crate untouched.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if fields.len() == 5 {
        format!(
            "0 {} {} {} {} {} *",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            unix_day_of_week(fields[4])
        )
    } else {
        expr.to_string()
    };
    normalized.parse().map_err(|source| Error::InvalidCron {
        expr: expr.to_string(),
        source,
    })
}

/// Rewrite Unix day-of-week numbers as names; step values stay numeric.
/// A numeric range ending in 7 is spelled out day by day, since `Sun` sorts
/// first for the `cron` crate and `Fri-Sun` would be a reversed range.
fn unix_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| expand_range_to_sunday(part).unwrap_or_else(|| day_names(part)))
        .collect::<Vec<_>>()
        .join(",")
}

fn expand_range_to_sunday(part: &str) -> Option<String> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
        None => (part, 1),
    };
    let (start, end) = range.split_once('-')?;
    let (start, end) = (start.parse::<usize>().ok()?, end.parse::<usize>().ok()?);
    if end != 7 || start > end {
        return None;
    }
    let days: Vec<&str> = (start..=end)
        .step_by(step)
        .map(|n| WEEKDAY_NAMES[n])
        .collect();
    Some(days.join(","))
}

fn day_names(part: &str) -> String {
    let mut out = String::with_capacity(part.len() * 2);
    let mut chars = part.chars().peekable();
    let mut after_step = false;
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            let mut digits = String::from(c);
            while let Some(d) = chars.next_if(char::is_ascii_digit) {
                digits.push(d);
            }
            match digits.parse::<usize>().ok().and_then(|n| WEEKDAY_NAMES.get(n)) {
                Some(name) if !after_step => out.push_str(name),
                _ => out.push_str(&digits),
            }
            after_step = false;
        } else {
            after_step = c == '/';
            out.push(c);
        }
    }
    out
}

/// Running trigger tasks. Dropping the set aborts them.
#[derive(Default)]
pub struct Triggers {
    tasks: JoinSet<&'static str>,
}

impl Triggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` every time `trigger` fires. Each run is awaited before the
    /// next fire time is computed, so one trigger never overlaps itself.
    pub fn spawn<F, Fut>(&mut self, trigger: Trigger, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            let mut last = None;
            loop {
                let now = Utc::now();
                let Some(next) = trigger.next_fire(now, last) else {
                    return trigger.name;
                };
                tracing::debug!("Trigger {} next fires at {next}", trigger.name());
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                last = Some(next);
                tracing::info!("Trigger {} fired", trigger.name());
                job().await;
            }
        });
    }

    /// Wait for `shutdown`. A trigger task that ends first, by panicking or by
    /// running out of fire times, is returned as an error.
    pub async fn run_until<T>(mut self, shutdown: impl Future<Output = T>) -> Result<T> {
        if self.tasks.is_empty() {
            return Ok(shutdown.await);
        }
        tokio::select! {
            value = shutdown => Ok(value),
            Some(ended) = self.tasks.join_next() => match ended {
                Ok(name) => Err(Error::TriggerStopped { name: name.to_string() }),
                Err(e) => Err(Error::TriggerFailed(e)),
            },
        }
    }
}
