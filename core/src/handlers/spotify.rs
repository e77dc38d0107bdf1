//! Spotify handler.
//!
//! Playback control itself lives in a companion service on the device; this
//! handler forwards the raw request text to it and relays the answer.
//! Client credentials (`SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`) gate
//! the feature; the control endpoint can be moved with
//! `CHIME_SPOTIFY_CONTROL_URL`.

use super::{Handler, HandlerError, HandlerResult};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub const NAME: &str = "SpotifyRoute";

pub const UTTERANCES: &[&str] = &[
    "play some music",
    "next song",
    "pause the music",
    "play earth wind and fire on Spotify",
    "play my playlist",
];

pub struct SpotifyRoute {
    http: reqwest::Client,
    control_url: String,
}

impl Default for SpotifyRoute {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotifyRoute {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let control_url = std::env::var("CHIME_SPOTIFY_CONTROL_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://127.0.0.1/spotify-control".to_string());
        Self { http, control_url }
    }

    fn credentials_present() -> bool {
        let id = std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default();
        let secret = std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default();
        !id.is_empty() && !secret.is_empty()
    }
}

#[async_trait]
impl Handler for SpotifyRoute {
    fn name(&self) -> String {
        NAME.to_string()
    }

    async fn handle(&self, text: &str) -> HandlerResult<String> {
        if !Self::credentials_present() {
            return Err(HandlerError::ConfigurationMissing(
                "No Spotify client id or client secret found. Provide the credentials in \
                 the web interface."
                    .to_string(),
            ));
        }

        debug!(target: "spotify_route", url = %self.control_url, "Forwarding playback request");
        let resp = self
            .http
            .post(&self.control_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| HandlerError::Upstream(format!("playback control unreachable: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            let val: serde_json::Value = resp.json().await.map_err(|e| {
                HandlerError::Upstream(format!("bad playback control response: {e}"))
            })?;
            Ok(val["message"]
                .as_str()
                .unwrap_or("Done.")
                .to_string())
        } else {
            let body = resp.text().await.unwrap_or_default();
            warn!(target: "spotify_route", status = %status, body = %body, "Playback control refused request");
            Ok(format!("Received a {status} status code from playback control. {body}"))
        }
    }
}
