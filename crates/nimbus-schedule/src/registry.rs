//! Trigger keys and recurring daily timers.
//!
//! One live timer exists per distinct time-of-day value, shared by every
//! target whose override equals that value, plus one permanent default
//! timer. Fired keys are pushed onto an mpsc channel and consumed serially
//! by the scheduling service.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Utc};
use cron::Schedule;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Canonical identifier for one recurring daily timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKey {
    /// The permanent default trigger.
    Default,
    /// A per-target override, time of day in UTC.
    At(NaiveTime),
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::At(time) => write!(f, "{}", time.format("%H:%M:%S")),
        }
    }
}

impl FromStr for TriggerKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "default" {
            return Ok(Self::Default);
        }
        NaiveTime::parse_from_str(s, "%H:%M:%S").map(Self::At)
    }
}

/// Handle to one live recurring timer, remembering the time of day it was
/// registered with.
#[derive(Debug)]
pub struct TimerHandle {
    time_utc: NaiveTime,
    task: tokio::task::JoinHandle<()>,
}

impl TimerHandle {
    pub fn time_utc(&self) -> NaiveTime {
        self.time_utc
    }

    /// Stop the timer. Safe to call on an already-finished task.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns recurring daily timers that report fired trigger keys over a
/// channel.
#[derive(Debug, Clone)]
pub struct TriggerTimers {
    fired_tx: mpsc::UnboundedSender<TriggerKey>,
}

impl TriggerTimers {
    pub fn new(fired_tx: mpsc::UnboundedSender<TriggerKey>) -> Self {
        Self { fired_tx }
    }

    /// Register a recurring daily timer firing at `time_utc` every day.
    pub fn register_daily(&self, key: TriggerKey, time_utc: NaiveTime) -> TimerHandle {
        let tx = self.fired_tx.clone();
        let schedule = daily_schedule(time_utc);
        let task = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    warn!(key = %key, "Daily schedule produced no next occurrence");
                    return;
                };
                let wait = match (next - Utc::now()).to_std() {
                    Ok(wait) => wait,
                    Err(_) => continue, // already due
                };
                tokio::time::sleep(wait).await;
                debug!(key = %key, "Trigger fired");
                if tx.send(key).is_err() {
                    // Dispatcher is gone; nothing left to fire for.
                    return;
                }
            }
        });
        TimerHandle {
            time_utc,
            task,
        }
    }
}

/// Cron schedule for "every day at this UTC time of day".
fn daily_schedule(time_utc: NaiveTime) -> Schedule {
    let expression = format!(
        "{} {} {} * * *",
        time_utc.second(),
        time_utc.minute(),
        time_utc.hour()
    );
    // The expression is generated from a valid NaiveTime, so it always parses.
    Schedule::from_str(&expression).expect("generated cron expression is valid")
}
