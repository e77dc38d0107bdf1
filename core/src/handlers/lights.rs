//! Philips Hue lights handler.
//!
//! Controls group 0 (all lights) through the bridge's REST API. Bridge
//! address and username come from `PHILIPS_HUE_BRIDGE_IP` and
//! `PHILIPS_HUE_USERNAME`, matching how the device is provisioned.

use super::{Handler, HandlerError, HandlerResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "LightsRoute";

pub const UTTERANCES: &[&str] = &[
    "turn on the lights",
    "switch off the lights",
    "dim the lights",
    "change the color of the lights",
    "set the lights to red",
];

/// Named colors to Hue hue values (0-65535).
const COLORS: &[(&str, u32)] = &[
    ("red", 0),
    ("orange", 6_000),
    ("yellow", 12_750),
    ("white", 15_330),
    ("green", 25_500),
    ("blue", 46_920),
    ("purple", 56_100),
    ("pink", 56_100),
];

pub struct LightsRoute {
    http: reqwest::Client,
}

impl Default for LightsRoute {
    fn default() -> Self {
        Self::new()
    }
}

impl LightsRoute {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    fn credentials() -> HandlerResult<(String, String)> {
        let bridge = std::env::var("PHILIPS_HUE_BRIDGE_IP")
            .ok()
            .filter(|s| !s.is_empty());
        let user = std::env::var("PHILIPS_HUE_USERNAME")
            .ok()
            .filter(|s| !s.is_empty());
        match (bridge, user) {
            (Some(b), Some(u)) => Ok((b, u)),
            _ => Err(HandlerError::ConfigurationMissing(
                "No Philips Hue bridge IP or username configured. Set them in the web \
                 interface or try reconnecting the service."
                    .to_string(),
            )),
        }
    }

    async fn set_group(&self, bridge: &str, user: &str, body: Value) -> HandlerResult<()> {
        let url = format!("http://{bridge}/api/{user}/groups/0/action");
        debug!(target: "lights_route", body = %body, "Hue group action");
        let resp = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| HandlerError::Upstream(format!("Hue bridge unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(HandlerError::Upstream(format!(
                "Hue bridge error: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// What the utterance asks the lights to do.
#[derive(Debug, PartialEq)]
enum LightsCommand {
    On,
    Off,
    Color(&'static str, u32),
    Brightness(u8),
    Unknown,
}

fn parse_command(text: &str) -> LightsCommand {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.iter().any(|w| *w == "off") {
        return LightsCommand::Off;
    }
    if words.iter().any(|w| *w == "on") {
        return LightsCommand::On;
    }
    for (color, hue) in COLORS {
        if words.iter().any(|w| w == color) {
            return LightsCommand::Color(color, *hue);
        }
    }
    // "set brightness to 80" / "dim the lights to 30"
    if let Some(pos) = words.iter().position(|w| *w == "to") {
        if let Some(n) = words.get(pos + 1).and_then(|w| w.parse::<u16>().ok()) {
            return LightsCommand::Brightness(n.min(254) as u8);
        }
    }
    LightsCommand::Unknown
}

#[async_trait]
impl Handler for LightsRoute {
    fn name(&self) -> String {
        NAME.to_string()
    }

    async fn handle(&self, text: &str) -> HandlerResult<String> {
        let (bridge, user) = Self::credentials()?;
        match parse_command(text) {
            LightsCommand::On => {
                self.set_group(&bridge, &user, json!({ "on": true })).await?;
                Ok("Turning on all lights.".to_string())
            }
            LightsCommand::Off => {
                self.set_group(&bridge, &user, json!({ "on": false })).await?;
                Ok("Turning off all lights.".to_string())
            }
            LightsCommand::Color(color, hue) => {
                self.set_group(&bridge, &user, json!({ "on": true, "hue": hue }))
                    .await?;
                Ok(format!("Changing lights {color}."))
            }
            LightsCommand::Brightness(bri) => {
                self.set_group(&bridge, &user, json!({ "on": true, "bri": bri }))
                    .await?;
                Ok(format!("Setting brightness to {bri}."))
            }
            LightsCommand::Unknown => Ok(
                "I'm sorry, I don't know how to handle that lights request.".to_string(),
            ),
        }
    }
}
