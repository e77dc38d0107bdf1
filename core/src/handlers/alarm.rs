//! Alarm and reminder handler.
//!
//! Timers are in-process tokio sleep tasks; when one fires it announces
//! itself through the shared speech output. Nothing is persisted across
//! restarts.

use super::{Handler, HandlerResult};
use crate::feedback::SpeechOutput;
use async_trait::async_trait;
use chrono::{Local, NaiveTime, Timelike};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const NAME: &str = "AlarmRoute";

pub const UTTERANCES: &[&str] = &["set an alarm", "wake me up", "remind me in"];

const ALARM_LABEL: &str = "Alarm";
const REMINDER_LABEL: &str = "Reminder";

pub struct AlarmRoute {
    speech: Arc<dyn SpeechOutput>,
    timers: Arc<DashMap<String, JoinHandle<()>>>,
}

impl AlarmRoute {
    pub fn new(speech: Arc<dyn SpeechOutput>) -> Self {
        Self {
            speech,
            timers: Arc::new(DashMap::new()),
        }
    }

    fn schedule(&self, label: &str, delay: Duration, announcement: String) {
        // A new timer under the same label replaces the old one
        if let Some((_, old)) = self.timers.remove(label) {
            old.abort();
        }
        let speech = Arc::clone(&self.speech);
        let timers = Arc::clone(&self.timers);
        let label_owned = label.to_string();
        info!(target: "alarm_route", label = %label, delay_secs = delay.as_secs(), "Timer scheduled");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(target: "alarm_route", label = %label_owned, "Timer fired");
            let cancel = CancellationToken::new();
            if let Err(e) = speech.speak(&announcement, &cancel).await {
                debug!(target: "alarm_route", error = %e, "Timer announcement failed");
            }
            timers.remove(&label_owned);
        });
        self.timers.insert(label.to_string(), handle);
    }

    fn cancel(&self, label: &str) -> bool {
        match self.timers.remove(label) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

#[async_trait]
impl Handler for AlarmRoute {
    fn name(&self) -> String {
        NAME.to_string()
    }

    async fn handle(&self, text: &str) -> HandlerResult<String> {
        let text = words_to_digits(text);
        let words: Vec<&str> = text.split_whitespace().collect();

        let wants = |options: &[&str]| words.iter().any(|w| options.contains(w));

        if wants(&["snooze", "delay", "postpone"]) {
            let minutes = parse_delay(&words)
                .map(|d| d.as_secs() / 60)
                .unwrap_or(5);
            if !self.cancel(ALARM_LABEL) {
                return Ok("No such alarm to snooze.".to_string());
            }
            self.schedule(
                ALARM_LABEL,
                Duration::from_secs(minutes * 60),
                "Alarm!".to_string(),
            );
            return Ok("Alarm snoozed successfully.".to_string());
        }

        if wants(&["delete", "remove", "cancel"]) {
            return Ok(if self.cancel(ALARM_LABEL) {
                "Alarm deleted successfully.".to_string()
            } else {
                "No such alarm to delete.".to_string()
            });
        }

        if wants(&["remind", "reminder"]) {
            let Some(delay) = parse_delay(&words) else {
                return Ok("No time specified for the reminder.".to_string());
            };
            let Some((_, task)) = text.rsplit_once(" to ") else {
                return Ok("Tell me what to remind you about.".to_string());
            };
            self.schedule(REMINDER_LABEL, delay, format!("Reminder: {}", task.trim()));
            return Ok("Reminder set successfully.".to_string());
        }

        if wants(&["alarm", "wake"]) {
            let Some(delay) = parse_delay(&words) else {
                return Ok("No time specified for the alarm.".to_string());
            };
            self.schedule(ALARM_LABEL, delay, "Alarm!".to_string());
            return Ok("Alarm set successfully.".to_string());
        }

        Ok("Invalid command.".to_string())
    }
}

/// Delay until the requested time: either a clock time ("7:30", next
/// occurrence) or a relative span ("10 minutes", "2 hours").
fn parse_delay(words: &[&str]) -> Option<Duration> {
    for (i, word) in words.iter().enumerate() {
        // HH:MM clock time
        if word.contains(':') {
            if let Ok(t) = word.parse::<NaiveTime>() {
                return Some(delay_until_clock(t.hour(), t.minute()));
            }
            if let Some((h, m)) = word
                .split_once(':')
                .and_then(|(h, m)| Some((h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)))
            {
                if h < 24 && m < 60 {
                    return Some(delay_until_clock(h, m));
                }
            }
        }
        // "<N> minutes" / "<N> hours"
        if let Ok(n) = word.parse::<u64>() {
            if let Some(unit) = words.get(i + 1) {
                if unit.starts_with("minute") || unit.starts_with("min") {
                    return Some(Duration::from_secs(n * 60));
                }
                if unit.starts_with("hour") || unit.starts_with("hr") {
                    return Some(Duration::from_secs(n * 3600));
                }
            }
        }
    }
    None
}

/// Seconds until the next local occurrence of `hour:minute`.
fn delay_until_clock(hour: u32, minute: u32) -> Duration {
    let now = Local::now();
    let target_secs = (hour * 3600 + minute * 60) as i64;
    let now_secs = (now.hour() * 3600 + now.minute() * 60 + now.second()) as i64;
    let mut diff = target_secs - now_secs;
    if diff <= 0 {
        diff += 24 * 3600;
    }
    Duration::from_secs(diff as u64)
}

/// Replace spelled-out small numbers with digits ("five minutes" → "5
/// minutes") so the rest of the parser only deals with digits.
fn words_to_digits(text: &str) -> String {
    const SMALL: &[(&str, u64)] = &[
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
        ("eleven", 11),
        ("twelve", 12),
        ("thirteen", 13),
        ("fourteen", 14),
        ("fifteen", 15),
        ("sixteen", 16),
        ("seventeen", 17),
        ("eighteen", 18),
        ("nineteen", 19),
        ("twenty", 20),
        ("thirty", 30),
        ("forty", 40),
        ("fifty", 50),
        ("sixty", 60),
    ];
    text.split_whitespace()
        .map(|w| {
            SMALL
                .iter()
                .find(|(name, _)| *name == w)
                .map(|(_, n)| n.to_string())
                .unwrap_or_else(|| w.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
