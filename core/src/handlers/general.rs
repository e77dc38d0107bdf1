//! Free-form chat handler and fallback route.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint. Everything the
//! classifier cannot place lands here, so this handler must always produce
//! an answer or a clear failure.

use super::{Handler, HandlerError, HandlerResult};
use crate::config::LlmSettings;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

pub const NAME: &str = "GeneralRoute";

pub const UTTERANCES: &[&str] = &[
    "how's it going",
    "tell me a joke",
    "what's the time",
    "how are you",
    "what is the meaning of life",
    "what is the capital of France",
    "what is the best programming language",
    "who was the first president of the United States",
    "what is the largest mammal",
];

const RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct GeneralRoute {
    http: reqwest::Client,
    cfg: LlmSettings,
}

impl GeneralRoute {
    pub fn new(cfg: &LlmSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            cfg: cfg.clone(),
        }
    }

    async fn complete_once(&self, text: &str) -> HandlerResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let system = format!(
            "You are a helpful assistant. {}",
            self.cfg.custom_instructions
        );
        let body = json!({
            "model": self.cfg.model,
            "messages": [
                { "role": "system", "content": system.trim() },
                { "role": "user", "content": format!("Human: {text}\nAI:") },
            ],
            "max_tokens": self.cfg.max_tokens,
            "temperature": self.cfg.temperature,
        });

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HandlerError::Upstream(format!("chat request failed: {e}")))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(HandlerError::ConfigurationMissing(format!(
                    "The API key you provided for `{}` is not valid. Double check the key \
                     corresponds to the model you are trying to call.",
                    self.cfg.model
                )))
            }
            s if !s.is_success() => {
                return Err(HandlerError::Upstream(format!("chat API error: {s}")))
            }
            _ => {}
        }

        let val: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| HandlerError::Upstream(format!("failed to parse chat response: {e}")))?;

        let content = val["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            Err(HandlerError::Upstream("empty completion".to_string()))
        } else {
            Ok(content)
        }
    }
}

#[async_trait]
impl Handler for GeneralRoute {
    fn name(&self) -> String {
        NAME.to_string()
    }

    async fn handle(&self, text: &str) -> HandlerResult<String> {
        let mut last_err = None;
        for attempt in 1..=RETRIES {
            match self.complete_once(text).await {
                Ok(reply) => return Ok(reply),
                // A bad key will not get better on retry
                Err(e @ HandlerError::ConfigurationMissing(_)) => return Err(e),
                Err(e) => {
                    warn!(target: "general_route", attempt, "Completion attempt failed");
                    debug!(target: "general_route", attempt, error = %e, "Completion failure detail");
                    last_err = Some(e);
                }
            }
            if attempt < RETRIES {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        Err(last_err.unwrap_or_else(|| {
            HandlerError::Internal("retry loop exited without a result".to_string())
        }))
    }
}
