//! The command cycle state machine.
//!
//! One utterance in, one response cycle out:
//! `Idle → WakeCheck → AckFeedback ∥ HandlerInvoke → ResponseFeedback → Idle`,
//! with any unexpected failure detouring through `ErrorFeedback`. The
//! handler invocation is launched before acknowledgement feedback is
//! awaited so a slow network call overlaps the cheap "I'm on it", but its
//! result is never consumed until the acknowledgement phase has settled -
//! acknowledgement and response never overlap audibly or visually.

use crate::classifier::IntentClassifier;
use crate::config::Settings;
use crate::feedback::FeedbackChannel;
use crate::handlers::HandlerRegistry;
use crate::limiter::ConcurrencyLimiter;
use crate::transcript::Utterance;
use crate::util::normalize;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Longest error message ever surfaced to the user.
const ERROR_MESSAGE_LIMIT: usize = 500;

/// Where the active cycle currently is. Purely observational; transitions
/// are logged at debug level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    WakeCheck,
    AckFeedback,
    HandlerInvoke,
    ResponseFeedback,
    ErrorFeedback,
}

/// How a cycle ended, from the supervisor's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The utterance was not addressed to us; no feedback was produced.
    Ignored,
    /// The full cycle ran and response feedback was delivered.
    Completed,
    /// Something unexpected failed; best-effort error feedback was
    /// delivered instead of a response.
    Recovered,
}

pub struct CommandOrchestrator {
    wake_word: String,
    say_acknowledgement: bool,
    handler_timeout: Option<Duration>,
    classifier: Arc<dyn IntentClassifier>,
    registry: Arc<HandlerRegistry>,
    feedback: Arc<FeedbackChannel>,
    limiter: Arc<ConcurrencyLimiter>,
}

impl CommandOrchestrator {
    pub fn new(
        settings: &Settings,
        classifier: Arc<dyn IntentClassifier>,
        registry: Arc<HandlerRegistry>,
        feedback: Arc<FeedbackChannel>,
        limiter: Arc<ConcurrencyLimiter>,
    ) -> Self {
        Self {
            wake_word: normalize(&settings.wake_word),
            say_acknowledgement: settings.say_acknowledgement,
            handler_timeout: settings.handler_timeout_ms.map(Duration::from_millis),
            classifier,
            registry,
            feedback,
            limiter,
        }
    }

    fn enter(&self, phase: CyclePhase) {
        debug!(target: "orchestrator", ?phase, "Entering phase");
    }

    /// Run one command cycle for `utterance`. `cancel` is the supervision
    /// token; cancelling it makes every feedback task in the cycle wind
    /// down early.
    pub async fn handle_utterance(
        &self,
        utterance: &Utterance,
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        self.enter(CyclePhase::WakeCheck);
        let clean = normalize(&utterance.text);

        // Not talking to us: the steady-state case, discarded without
        // feedback or log-level escalation.
        let Some(payload) = extract_command(&clean, &self.wake_word) else {
            self.enter(CyclePhase::Idle);
            return CycleOutcome::Ignored;
        };

        info!(target: "orchestrator", "Heard: \"{payload}\"");

        let outcome = match self.run_cycle(&payload, cancel).await {
            Ok(()) => CycleOutcome::Completed,
            Err(message) => {
                self.error_feedback(&message, cancel).await;
                CycleOutcome::Recovered
            }
        };
        self.enter(CyclePhase::Idle);
        outcome
    }

    async fn run_cycle(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), String> {
        // Intent resolution. Classifier unavailability surfaces as None and
        // falls through to the fallback handler; it is never cycle-fatal.
        let intent = self.classifier.classify(payload).await;
        match &intent {
            Some(name) => info!(target: "orchestrator", intent = %name, "Resolved intent"),
            None => debug!(target: "orchestrator", "No confident intent; using fallback"),
        }
        let handler = self.registry.resolve(intent.as_deref());
        let handler_name = handler.name();

        // Launch the handler before awaiting acknowledgement: the expensive
        // call overlaps the cheap feedback.
        self.enter(CyclePhase::HandlerInvoke);
        let handler_task = {
            let limiter = Arc::clone(&self.limiter);
            let handler = Arc::clone(&handler);
            let text = payload.to_string();
            let timeout = self.handler_timeout;
            tokio::spawn(async move {
                limiter
                    .run(async move {
                        match timeout {
                            Some(t) => match tokio::time::timeout(t, handler.handle(&text)).await {
                                Ok(res) => res,
                                Err(_) => Err(crate::handlers::HandlerError::Upstream(format!(
                                    "timed out after {}ms",
                                    t.as_millis()
                                ))),
                            },
                            None => handler.handle(&text).await,
                        }
                    })
                    .await
            })
        };

        // Acknowledgement is skipped entirely (no task created) when
        // disabled; when enabled it runs to joint completion before the
        // handler result is consumed.
        if self.say_acknowledgement {
            self.enter(CyclePhase::AckFeedback);
            let ack_cancel = cancel.child_token();
            self.feedback
                .deliver("I'm on it", &format!("Heard: \"{payload}\""), &ack_cancel)
                .await;
            ack_cancel.cancel();
        }

        let response = match handler_task.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                // The raw failure stays in the debug log; the user hears a
                // short substitution naming the capability.
                error!(target: "orchestrator", handler = %handler_name, "Handler failed");
                debug!(target: "orchestrator", handler = %handler_name, error = %e, "Handler failure detail");
                format!("An error occurred in the {handler_name} module")
            }
            Err(join_err) => {
                debug!(target: "orchestrator", handler = %handler_name, error = %join_err, "Handler task aborted");
                return Err(format!(
                    "Something went wrong: the {handler_name} module stopped unexpectedly"
                ));
            }
        };

        self.enter(CyclePhase::ResponseFeedback);
        info!(target: "orchestrator", response = %response, "Responding");
        let response_cancel = cancel.child_token();
        self.feedback.announce(&response, &response_cancel).await;
        response_cancel.cancel();
        Ok(())
    }

    /// Best-effort spoken/displayed error message, truncated so a huge
    /// failure never floods the output devices.
    async fn error_feedback(&self, message: &str, cancel: &CancellationToken) {
        self.enter(CyclePhase::ErrorFeedback);
        error!(target: "orchestrator", "An error occurred: {message}");
        let message = truncate_message(message, ERROR_MESSAGE_LIMIT);
        let error_cancel = cancel.child_token();
        self.feedback.announce(&message, &error_cancel).await;
        error_cancel.cancel();
    }
}

/// Payload after the first occurrence of the wake phrase, or `None` when
/// the wake phrase is absent or nothing follows it.
fn extract_command(text: &str, wake: &str) -> Option<String> {
    if wake.is_empty() {
        return None;
    }
    let idx = text.find(wake)?;
    let remainder = text[idx + wake.len()..].trim();
    if remainder.is_empty() {
        None
    } else {
        Some(remainder.to_string())
    }
}

fn truncate_message(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_phrase_extraction() {
        assert_eq!(
            extract_command("computer whats the weather", "computer"),
            Some("whats the weather".to_string())
        );
        // No wake phrase: silent discard
        assert_eq!(extract_command("turn on the lights", "computer"), None);
        // Wake phrase with empty remainder: silent discard
        assert_eq!(extract_command("computer", "computer"), None);
        assert_eq!(extract_command("hey computer   ", "computer"), None);
        // Wake phrase mid-sentence still yields the tail
        assert_eq!(
            extract_command("hey computer play music", "computer"),
            Some("play music".to_string())
        );
    }

    #[test]
    fn empty_wake_word_matches_nothing() {
        assert_eq!(extract_command("anything at all", ""), None);
    }

    #[test]
    fn messages_truncate_on_char_boundaries() {
        let long = "é".repeat(600);
        let cut = truncate_message(&long, 500);
        assert_eq!(cut.chars().count(), 500);
        assert_eq!(truncate_message("short", 500), "short");
    }
}
