use std::fs;
use std::path::Path;

/// High-level configuration for the assistant.
///
/// Defaults come from environment variables; an optional TOML file
/// (path via `CHIME_CONFIG` or `./chime.toml`) is overlaid on top.
/// Service credentials (Hue bridge, Spotify, CalDAV) stay env-only and are
/// read by the handlers that need them.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Keyword that must prefix an utterance for it to be treated as a command
    pub wake_word: String,
    /// Speak/display an "I'm on it" acknowledgement while the handler runs
    pub say_acknowledgement: bool,
    /// Admission budget shared by all background work
    pub concurrency_budget: usize,
    /// Optional per-handler timeout; `None` lets a handler run unbounded
    pub handler_timeout_ms: Option<u64>,
    pub llm: LlmSettings,
    pub network: NetworkSettings,
}

/// Chat-completion backend used by the general handler.
#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub base_url: String, // e.g., http://localhost:8000/v1
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Appended to the system prompt verbatim
    pub custom_instructions: String,
}

/// Reachability probe run before entering the steady loop.
#[derive(Clone, Debug)]
pub struct NetworkSettings {
    pub probe_url: String,
    pub probe_timeout_ms: u64,
    pub retry_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wake_word: std::env::var("CHIME_WAKE_WORD")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "chime".to_string()),
            say_acknowledgement: std::env::var("CHIME_SAY_ACK")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(true),
            concurrency_budget: std::env::var("CHIME_CONCURRENCY_BUDGET")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(10),
            handler_timeout_ms: std::env::var("CHIME_HANDLER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
            llm: LlmSettings::default(),
            network: NetworkSettings::default(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: std::env::var("CHIME_LLM_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:8000/v1".to_string()),
            model: std::env::var("CHIME_LLM_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "qwen2.5-0.5b-instruct".to_string()),
            api_key: std::env::var("CHIME_LLM_API_KEY").ok().filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("CHIME_LLM_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
            temperature: std::env::var("CHIME_LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.7),
            max_tokens: std::env::var("CHIME_LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(256),
            custom_instructions: std::env::var("CHIME_LLM_INSTRUCTIONS").unwrap_or_default(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            probe_url: std::env::var("CHIME_NETWORK_PROBE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://www.google.com".to_string()),
            probe_timeout_ms: 5_000,
            retry_interval_secs: std::env::var("CHIME_NETWORK_RETRY_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10),
        }
    }
}

impl Settings {
    /// Load configuration, overlaying a TOML file onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("CHIME_CONFIG").unwrap_or_else(|_| "chime.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "config", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<SettingsToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "config", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "config", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SettingsToml {
    pub wake_word: Option<String>,
    pub say_acknowledgement: Option<bool>,
    pub concurrency_budget: Option<usize>,
    pub handler_timeout_ms: Option<u64>,
    pub llm: Option<LlmToml>,
    pub network: Option<NetworkToml>,
}

impl SettingsToml {
    fn overlay(self, mut base: Settings) -> Settings {
        if let Some(w) = self.wake_word {
            base.wake_word = w;
        }
        if let Some(a) = self.say_acknowledgement {
            base.say_acknowledgement = a;
        }
        if let Some(n) = self.concurrency_budget {
            if n > 0 {
                base.concurrency_budget = n;
            }
        }
        if let Some(t) = self.handler_timeout_ms {
            base.handler_timeout_ms = Some(t);
        }
        if let Some(l) = self.llm {
            l.apply(&mut base.llm);
        }
        if let Some(n) = self.network {
            n.apply(&mut base.network);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LlmToml {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub custom_instructions: Option<String>,
}
impl LlmToml {
    fn apply(self, l: &mut LlmSettings) {
        if let Some(x) = self.base_url {
            l.base_url = x;
        }
        if let Some(x) = self.model {
            l.model = x;
        }
        if let Some(x) = self.api_key {
            l.api_key = Some(x);
        }
        if let Some(x) = self.request_timeout_ms {
            l.request_timeout_ms = x;
        }
        if let Some(x) = self.temperature {
            l.temperature = x;
        }
        if let Some(x) = self.max_tokens {
            l.max_tokens = x;
        }
        if let Some(x) = self.custom_instructions {
            l.custom_instructions = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NetworkToml {
    pub probe_url: Option<String>,
    pub probe_timeout_ms: Option<u64>,
    pub retry_interval_secs: Option<u64>,
}
impl NetworkToml {
    fn apply(self, n: &mut NetworkSettings) {
        if let Some(x) = self.probe_url {
            n.probe_url = x;
        }
        if let Some(x) = self.probe_timeout_ms {
            n.probe_timeout_ms = x;
        }
        if let Some(x) = self.retry_interval_secs {
            n.retry_interval_secs = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_keeps_defaults_for_missing_fields() {
        let toml_src = r#"
            wake_word = "computer"

            [llm]
            model = "test-model"
        "#;
        let t: SettingsToml = toml::from_str(toml_src).unwrap();
        let base = Settings {
            wake_word: "chime".into(),
            say_acknowledgement: true,
            concurrency_budget: 10,
            handler_timeout_ms: None,
            llm: LlmSettings {
                base_url: "http://localhost:8000/v1".into(),
                model: "default-model".into(),
                api_key: None,
                request_timeout_ms: 30_000,
                temperature: 0.7,
                max_tokens: 256,
                custom_instructions: String::new(),
            },
            network: NetworkSettings {
                probe_url: "http://www.google.com".into(),
                probe_timeout_ms: 5_000,
                retry_interval_secs: 10,
            },
        };
        let s = t.overlay(base);
        assert_eq!(s.wake_word, "computer");
        assert_eq!(s.llm.model, "test-model");
        assert_eq!(s.llm.max_tokens, 256);
        assert!(s.say_acknowledgement);
        assert_eq!(s.concurrency_budget, 10);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let t: SettingsToml = toml::from_str("concurrency_budget = 0").unwrap();
        let s = t.overlay(Settings {
            concurrency_budget: 10,
            ..test_settings()
        });
        assert_eq!(s.concurrency_budget, 10);
    }

    fn test_settings() -> Settings {
        Settings {
            wake_word: "chime".into(),
            say_acknowledgement: true,
            concurrency_budget: 10,
            handler_timeout_ms: None,
            llm: LlmSettings {
                base_url: String::new(),
                model: String::new(),
                api_key: None,
                request_timeout_ms: 1,
                temperature: 0.0,
                max_tokens: 1,
                custom_instructions: String::new(),
            },
            network: NetworkSettings {
                probe_url: String::new(),
                probe_timeout_ms: 1,
                retry_interval_secs: 1,
            },
        }
    }
}
