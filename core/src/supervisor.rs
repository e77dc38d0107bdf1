//! Process lifecycle: initialization with graceful degradation, the
//! network gate, the steady listen/command loop, and orderly shutdown.

use crate::classifier::IntentClassifier;
use crate::config::Settings;
use crate::feedback::{DisplayOutput, FeedbackChannel, SpeechOutput};
use crate::handlers::HandlerRegistry;
use crate::limiter::ConcurrencyLimiter;
use crate::orchestrator::CommandOrchestrator;
use crate::transcript::TranscriptSource;
use crate::{ChimeError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Owns the whole session: one orchestrator, one transcript stream, one
/// shutdown token. Missing output devices degrade to no-ops at
/// construction time; a missing intent classifier is fatal, because there
/// is no pipeline without intent resolution.
pub struct SessionSupervisor {
    settings: Settings,
    orchestrator: CommandOrchestrator,
    feedback: Arc<FeedbackChannel>,
    transcripts: Box<dyn TranscriptSource>,
    http: reqwest::Client,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl SessionSupervisor {
    /// Fallible startup. Each collaborator is checked and logged; only a
    /// failed classifier aborts (with an actionable message), everything
    /// else degrades.
    pub async fn initialize(
        settings: Settings,
        speech: Arc<dyn SpeechOutput>,
        display: Arc<dyn DisplayOutput>,
        classifier: Result<Arc<dyn IntentClassifier>>,
        registry: Arc<HandlerRegistry>,
        transcripts: Box<dyn TranscriptSource>,
    ) -> Result<Self> {
        let limiter = Arc::new(ConcurrencyLimiter::new(settings.concurrency_budget));
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        info!(target: "supervisor", "Initializing display");
        if display.is_available() {
            info!(target: "supervisor", "Display initialized successfully");
            // Tracked so shutdown drains it even when it is cancelled
            // mid-message
            let boot_display = Arc::clone(&display);
            let boot_cancel = shutdown.child_token();
            let boot_limiter = Arc::clone(&limiter);
            tracker.spawn(async move {
                let _slot = boot_limiter.acquire().await;
                if let Err(e) = boot_display.render("Booting up", &boot_cancel).await {
                    debug!(target: "supervisor", error = %e, "Boot render failed");
                }
            });
        } else {
            error!(target: "supervisor", "No display found; continuing speech-only");
        }

        info!(target: "supervisor", "Initializing audio");
        if speech.is_available() {
            info!(target: "supervisor", "Audio initialized successfully");
            let boot_cancel = shutdown.child_token();
            if let Err(e) = speech.speak("Booting up", &boot_cancel).await {
                debug!(target: "supervisor", error = %e, "Boot announcement failed");
            }
        } else {
            error!(target: "supervisor", "No speech engine found; continuing display-only");
        }

        info!(target: "supervisor", "Initializing intent classifier, this may take a while...");
        let classifier = match classifier {
            Ok(c) => {
                info!(target: "supervisor", "Intent classifier initialized successfully");
                c
            }
            Err(e) => {
                error!(
                    target: "supervisor",
                    "Failed to initialize the intent classifier; there is no pipeline \
                     without intent resolution. Check the model configuration. Shutting down."
                );
                debug!(target: "supervisor", error = %e, "Classifier initialization detail");
                return Err(ChimeError::InitError(format!(
                    "intent classifier initialization failed: {e}"
                )));
            }
        };

        let feedback = Arc::new(FeedbackChannel::new(
            speech,
            display,
            Arc::clone(&limiter),
        ));
        let orchestrator = CommandOrchestrator::new(
            &settings,
            classifier,
            registry,
            Arc::clone(&feedback),
            limiter,
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.network.probe_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            settings,
            orchestrator,
            feedback,
            transcripts,
            http,
            tracker,
            shutdown,
        })
    }

    /// Clone of the shutdown token, for wiring Ctrl+C or an external stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The main loop. Returns after the transcript stream ends or the
    /// shutdown token fires, with all outstanding background work drained.
    pub async fn run(&mut self) -> Result<()> {
        self.check_network().await;
        if self.shutdown.is_cancelled() {
            self.drain().await;
            return Ok(());
        }
        self.check_api_key().await;

        let greet_cancel = self.shutdown.child_token();
        self.feedback
            .announce("Hello, I'm ready to help you", &greet_cancel)
            .await;
        greet_cancel.cancel();
        info!(target: "supervisor", "Ready; listening for commands");

        loop {
            // Listening animation between commands; stopped (and awaited,
            // releasing the display) before a cycle starts.
            let listen_cancel = self.shutdown.child_token();
            let state_task = {
                let display = self.feedback.display();
                let cancel = listen_cancel.clone();
                self.tracker.spawn(async move {
                    if let Err(e) = display.render_state("Listening", &cancel).await {
                        debug!(target: "supervisor", error = %e, "Listening state render failed");
                    }
                })
            };

            let shutdown = self.shutdown.clone();
            let utterance = tokio::select! {
                u = self.transcripts.next_utterance() => u,
                _ = shutdown.cancelled() => None,
            };
            listen_cancel.cancel();
            let _ = state_task.await;

            let Some(utterance) = utterance else { break };
            if !utterance.is_reliable() {
                // A transcription error, not a command: brief backoff, no
                // user-facing feedback.
                error!(target: "supervisor", "Transcription failed; backing off briefly");
                sleep(Duration::from_secs(2)).await;
                continue;
            }
            if utterance.text.trim().is_empty() {
                continue;
            }

            let cycle_cancel = self.shutdown.child_token();
            let outcome = self
                .orchestrator
                .handle_utterance(&utterance, &cycle_cancel)
                .await;
            cycle_cancel.cancel();
            debug!(target: "supervisor", ?outcome, "Cycle finished");

            if self.shutdown.is_cancelled() {
                break;
            }
        }

        self.drain().await;
        Ok(())
    }

    /// Block until the network is reachable, retrying on a fixed interval
    /// with spoken feedback, under a "Connecting" display state.
    async fn check_network(&self) {
        let state_cancel = self.shutdown.child_token();
        let state_task = {
            let display = self.feedback.display();
            let cancel = state_cancel.clone();
            self.tracker.spawn(async move {
                if let Err(e) = display.render_state("Connecting", &cancel).await {
                    debug!(target: "supervisor", error = %e, "Connecting state render failed");
                }
            })
        };

        let retry = Duration::from_secs(self.settings.network.retry_interval_secs);
        loop {
            if self.is_network_connected().await || self.shutdown.is_cancelled() {
                break;
            }
            let message = format!(
                "Network not connected. Retrying in {} seconds...",
                retry.as_secs()
            );
            error!(target: "supervisor", "{message}");
            let speak_cancel = self.shutdown.child_token();
            if let Err(e) = self.feedback.speech().speak(&message, &speak_cancel).await {
                debug!(target: "supervisor", error = %e, "Retry announcement failed");
            }
            speak_cancel.cancel();
            tokio::select! {
                _ = sleep(retry) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        state_cancel.cancel();
        let _ = state_task.await;
    }

    async fn is_network_connected(&self) -> bool {
        self.http
            .get(&self.settings.network.probe_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// A missing chat-model key is not fatal, but the user should see an
    /// actionable hint on the device.
    async fn check_api_key(&self) {
        if self.settings.llm.api_key.is_some() {
            return;
        }
        warn!(target: "supervisor", "No chat-model API key configured");
        let display = self.feedback.display();
        if display.is_available() {
            let cancel = self.shutdown.child_token();
            if let Err(e) = display
                .render("Missing API key. Visit the settings page to add one.", &cancel)
                .await
            {
                debug!(target: "supervisor", error = %e, "API key notice render failed");
            }
            cancel.cancel();
        }
    }

    /// Cancel everything outstanding and wait for it to wind down; no task
    /// is abandoned mid-flight.
    async fn drain(&self) {
        info!(target: "supervisor", "Shutting down; draining outstanding tasks");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(target: "supervisor", "Shutdown complete");
    }
}
