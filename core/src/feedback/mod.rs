// Feedback delivery: one message, two modalities, joint completion

pub mod display;
pub mod speech;

pub use display::{ConsoleDisplay, DisplayOutput, NullDisplay};
pub use speech::{CliSpeech, NullSpeech, SpeechOutput};

use crate::limiter::ConcurrencyLimiter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Delivers one user-facing message through speech and display at once.
///
/// Modalities are best-effort and independent: a failing speech engine
/// never aborts the display and vice versa (each failure is contained and
/// logged inside its admission wrapper). `deliver` returns only when both
/// modalities have settled, which is what lets the orchestrator sequence
/// phases - acknowledgement strictly before response, never overlapping.
pub struct FeedbackChannel {
    speech: Arc<dyn SpeechOutput>,
    display: Arc<dyn DisplayOutput>,
    limiter: Arc<ConcurrencyLimiter>,
}

impl FeedbackChannel {
    pub fn new(
        speech: Arc<dyn SpeechOutput>,
        display: Arc<dyn DisplayOutput>,
        limiter: Arc<ConcurrencyLimiter>,
    ) -> Self {
        Self {
            speech,
            display,
            limiter,
        }
    }

    pub fn speech(&self) -> Arc<dyn SpeechOutput> {
        Arc::clone(&self.speech)
    }

    pub fn display(&self) -> Arc<dyn DisplayOutput> {
        Arc::clone(&self.display)
    }

    /// One feedback phase with different texts per modality (the
    /// acknowledgement speaks "I'm on it" while the display shows what was
    /// heard). Both tasks go through the limiter and share `cancel`.
    pub async fn deliver(&self, spoken: &str, shown: &str, cancel: &CancellationToken) {
        let speak_task = {
            let speech = Arc::clone(&self.speech);
            let text = spoken.to_string();
            let cancel = cancel.clone();
            self.limiter
                .spawn("feedback.speak", async move { speech.speak(&text, &cancel).await })
        };
        let render_task = {
            let display = Arc::clone(&self.display);
            let text = shown.to_string();
            let cancel = cancel.clone();
            self.limiter
                .spawn("feedback.render", async move { display.render(&text, &cancel).await })
        };
        // Joint completion; modality errors were already contained above.
        let _ = tokio::join!(speak_task, render_task);
    }

    /// Same message on both modalities.
    pub async fn announce(&self, message: &str, cancel: &CancellationToken) {
        self.deliver(message, message, cancel).await;
    }
}
