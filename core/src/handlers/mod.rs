// Intent handlers: pluggable domain logic behind one narrow async contract

pub mod alarm;
pub mod calendar;
pub mod general;
pub mod lights;
pub mod registry;
pub mod spotify;
pub mod weather;

pub use alarm::AlarmRoute;
pub use calendar::CalendarRoute;
pub use general::GeneralRoute;
pub use lights::LightsRoute;
pub use registry::HandlerRegistry;
pub use spotify::SpotifyRoute;
pub use weather::WeatherRoute;

use crate::classifier::Intent;
use async_trait::async_trait;
use thiserror::Error;

/// Why a handler could not produce a response.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Required credentials or settings are absent; fixable by the user.
    #[error("Missing configuration: {0}")]
    ConfigurationMissing(String),

    /// The backing service failed, timed out, or was unreachable.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Unexpected state inside the handler itself.
    #[error("Internal fault: {0}")]
    Internal(String),
}

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Domain logic for one intent.
///
/// Handlers are stateless or configuration-only and are invoked once per
/// command cycle through the registry. A handler that cannot interpret its
/// input returns a user-facing "I don't understand" message as `Ok`; errors
/// are reserved for genuine failures, which the orchestrator substitutes
/// with a short message naming the handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Registry key; also names the handler in user-facing error messages.
    fn name(&self) -> String;

    /// Produce the user-facing response for `text`.
    async fn handle(&self, text: &str) -> HandlerResult<String>;
}

/// Example phrases for the built-in intents, used to seed the classifier.
/// The set of intents is this static table; there is no runtime discovery.
pub fn builtin_intents() -> Vec<Intent> {
    vec![
        Intent::new(alarm::NAME, alarm::UTTERANCES),
        Intent::new(calendar::NAME, calendar::UTTERANCES),
        Intent::new(general::NAME, general::UTTERANCES),
        Intent::new(lights::NAME, lights::UTTERANCES),
        Intent::new(spotify::NAME, spotify::UTTERANCES),
        Intent::new(weather::NAME, weather::UTTERANCES),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_intent_names_are_unique() {
        let intents = builtin_intents();
        let mut names: Vec<_> = intents.iter().map(|i| i.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), intents.len());
        assert!(names.iter().any(|n| n == "GeneralRoute"));
    }
}
