//! CalDAV task handler.
//!
//! Minimal CalDAV client over HTTP: lists open to-dos with a REPORT query
//! and creates new ones with a PUT of a VTODO calendar object. Server
//! coordinates come from `CALDAV_URL`, `CALDAV_USERNAME`, `CALDAV_PASSWORD`.

use super::{Handler, HandlerError, HandlerResult};
use crate::util::gen_id;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "CalendarRoute";

pub const UTTERANCES: &[&str] = &[
    "schedule a meeting",
    "what's on my calendar",
    "add an event",
    "what is left to do today",
];

const TODO_REPORT: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><c:calendar-data/></d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VTODO"/>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#;

struct Credentials {
    url: String,
    username: String,
    password: String,
}

pub struct CalendarRoute {
    http: reqwest::Client,
}

impl Default for CalendarRoute {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarRoute {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    fn credentials() -> Option<Credentials> {
        let get = |key: &str| std::env::var(key).ok().filter(|s| !s.is_empty());
        Some(Credentials {
            url: get("CALDAV_URL")?,
            username: get("CALDAV_USERNAME")?,
            password: get("CALDAV_PASSWORD")?,
        })
    }

    async fn open_tasks(&self, creds: &Credentials) -> HandlerResult<Vec<String>> {
        let method = reqwest::Method::from_bytes(b"REPORT")
            .map_err(|e| HandlerError::Internal(format!("bad method: {e}")))?;
        let resp = self
            .http
            .request(method, &creds.url)
            .basic_auth(&creds.username, Some(&creds.password))
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(TODO_REPORT)
            .send()
            .await
            .map_err(|e| HandlerError::Upstream(format!("CalDAV server unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(HandlerError::Upstream(format!(
                "CalDAV query failed: {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| HandlerError::Upstream(format!("bad CalDAV response: {e}")))?;
        Ok(parse_open_summaries(&body))
    }

    async fn create_task(&self, creds: &Credentials, summary: &str) -> HandlerResult<()> {
        let ics = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:{uid}\r\nSUMMARY:{summary}\r\nSTATUS:NEEDS-ACTION\r\nEND:VTODO\r\nEND:VCALENDAR\r\n",
            uid = gen_id(),
        );
        let url = format!("{}/{}.ics", creds.url.trim_end_matches('/'), gen_id());
        debug!(target: "calendar_route", url = %url, "Creating task");
        let resp = self
            .http
            .put(&url)
            .basic_auth(&creds.username, Some(&creds.password))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(ics)
            .send()
            .await
            .map_err(|e| HandlerError::Upstream(format!("CalDAV server unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(HandlerError::Upstream(format!(
                "CalDAV create failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// SUMMARY lines of VTODO blocks that are not completed.
fn parse_open_summaries(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_todo = false;
    let mut summary: Option<String> = None;
    let mut completed = false;
    for line in body.lines() {
        let line = line.trim();
        if line.starts_with("BEGIN:VTODO") {
            in_todo = true;
            summary = None;
            completed = false;
        } else if line.starts_with("END:VTODO") {
            if in_todo && !completed {
                if let Some(s) = summary.take() {
                    out.push(s);
                }
            }
            in_todo = false;
        } else if in_todo {
            if let Some(rest) = line.strip_prefix("SUMMARY:") {
                summary = Some(rest.trim().to_string());
            } else if line.starts_with("STATUS:COMPLETED") {
                completed = true;
            }
        }
    }
    out
}

#[async_trait]
impl Handler for CalendarRoute {
    fn name(&self) -> String {
        NAME.to_string()
    }

    async fn handle(&self, text: &str) -> HandlerResult<String> {
        let Some(creds) = Self::credentials() else {
            return Ok(
                "CalDAV server credentials are not properly set in environment variables."
                    .to_string(),
            );
        };

        // "add a task called buy milk"
        if let Some((_, name)) = text.split_once(" called ") {
            let name = name.trim();
            if name.is_empty() {
                return Ok("Tell me what the task should be called.".to_string());
            }
            self.create_task(&creds, name).await?;
            return Ok(format!("Task '{name}' created successfully."));
        }

        let tasks = self.open_tasks(&creds).await?;
        if tasks.is_empty() {
            Ok("There is nothing left to do today.".to_string())
        } else {
            Ok(format!(
                "You have {} open {}: {}.",
                tasks.len(),
                if tasks.len() == 1 { "task" } else { "tasks" },
                tasks.join(", ")
            ))
        }
    }
}
