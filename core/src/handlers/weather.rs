//! Weather handler backed by Open-Meteo (geocoding + current conditions).

use super::{Handler, HandlerError, HandlerResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "WeatherRoute";

pub const UTTERANCES: &[&str] = &[
    "how's the weather today?",
    "tell me the weather",
    "what is the temperature",
    "is it going to rain",
    "what is the weather like in New York",
];

/// Configuration for the weather handler.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_endpoint: String,
    pub geocoding_endpoint: String,
    pub timeout_ms: u64,
    /// Used when the utterance names no city.
    pub default_city: Option<String>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.open-meteo.com/v1/forecast".to_string(),
            geocoding_endpoint: "https://geocoding-api.open-meteo.com/v1/search".to_string(),
            timeout_ms: 10_000,
            default_city: std::env::var("CHIME_WEATHER_CITY")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeoLocation>>,
}

#[derive(Debug, Deserialize)]
struct GeoLocation {
    name: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    current: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature_2m: f64,
    weather_code: i32,
}

pub struct WeatherRoute {
    config: WeatherConfig,
    http: reqwest::Client,
}

impl Default for WeatherRoute {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherRoute {
    pub fn new() -> Self {
        Self::with_config(WeatherConfig::default())
    }

    pub fn with_config(config: WeatherConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, http }
    }

    async fn coordinates(&self, city: &str) -> HandlerResult<Option<(f64, f64, String)>> {
        let url = format!("{}?name={}&count=1", self.config.geocoding_endpoint, city);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| HandlerError::Upstream(format!("geocoding request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(HandlerError::Upstream(format!(
                "geocoding API error: {}",
                resp.status()
            )));
        }
        let data: GeocodingResponse = resp
            .json()
            .await
            .map_err(|e| HandlerError::Upstream(format!("bad geocoding response: {e}")))?;
        Ok(data
            .results
            .and_then(|r| r.into_iter().next())
            .map(|g| (g.latitude, g.longitude, g.name)))
    }

    async fn current(&self, lat: f64, lon: f64) -> HandlerResult<CurrentWeather> {
        let url = format!(
            "{}?latitude={}&longitude={}&current=temperature_2m,weather_code",
            self.config.api_endpoint, lat, lon
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| HandlerError::Upstream(format!("weather request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(HandlerError::Upstream(format!(
                "weather API error: {}",
                resp.status()
            )));
        }
        let data: WeatherResponse = resp
            .json()
            .await
            .map_err(|e| HandlerError::Upstream(format!("bad weather response: {e}")))?;
        Ok(data.current)
    }

    fn interpret_weather_code(code: i32) -> &'static str {
        match code {
            0 => "clear",
            1..=3 => "partly cloudy",
            45 | 48 => "foggy",
            51..=57 => "drizzling",
            61..=67 => "raining",
            71..=77 => "snowing",
            80..=82 => "showery",
            85 | 86 => "snow showers",
            95..=99 => "stormy",
            _ => "hard to describe",
        }
    }

    /// "what's the weather in paris" → "paris". The payload arrives
    /// normalized (lower-case, no punctuation).
    fn city_from(&self, text: &str) -> Option<String> {
        if let Some((_, after)) = text.rsplit_once(" in ") {
            let city = after.trim();
            if !city.is_empty() {
                return Some(city.to_string());
            }
        }
        self.config.default_city.clone()
    }
}

#[async_trait]
impl Handler for WeatherRoute {
    fn name(&self) -> String {
        NAME.to_string()
    }

    async fn handle(&self, text: &str) -> HandlerResult<String> {
        let Some(city) = self.city_from(text) else {
            return Ok(
                "I can tell you the weather if you name a city, for example \
                 'what is the weather in Paris'."
                    .to_string(),
            );
        };
        debug!(target: "weather_route", city = %city, "Fetching weather");

        let Some((lat, lon, resolved)) = self.coordinates(&city).await? else {
            return Ok(format!(
                "No weather data available for {city}. Please check the city name and try again."
            ));
        };
        let current = self.current(lat, lon).await?;
        let condition = Self::interpret_weather_code(current.weather_code);
        Ok(format!(
            "It is currently {:.0} degrees and {} in {}.",
            current.temperature_2m, condition, resolved
        ))
    }
}
