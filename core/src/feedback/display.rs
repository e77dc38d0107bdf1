//! Display output modality.
//!
//! The reference device is a small character display that types messages
//! out one character at a time; `ConsoleDisplay` reproduces that pacing on
//! a terminal. The cancellation token is checked at every character and
//! every animation frame, so cancellation latency stays perceptually small.

use crate::Result;
use async_trait::async_trait;
use std::io::Write;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Renders text to the user. One logical message renders at a time per
/// device.
#[async_trait]
pub trait DisplayOutput: Send + Sync {
    /// Type `text` out, observing `cancel` at each character.
    async fn render(&self, text: &str, cancel: &CancellationToken) -> Result<()>;

    /// Animate a state label ("Listening", "Connecting") until cancelled.
    async fn render_state(&self, label: &str, cancel: &CancellationToken) -> Result<()>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in for an absent device; every call is a successful no-op.
pub struct NullDisplay;

#[async_trait]
impl DisplayOutput for NullDisplay {
    async fn render(&self, text: &str, _cancel: &CancellationToken) -> Result<()> {
        debug!(target: "display", text = %text, "No display; dropping message");
        Ok(())
    }

    async fn render_state(&self, _label: &str, cancel: &CancellationToken) -> Result<()> {
        cancel.cancelled().await;
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Terminal typewriter display.
pub struct ConsoleDisplay {
    device: Mutex<()>,
    state_frame: Duration,
}

impl Default for ConsoleDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self {
            device: Mutex::new(()),
            state_frame: Duration::from_millis(500),
        }
    }

    /// Per-character delay, stretched slightly for punctuation-heavy text
    /// so pacing feels natural.
    fn char_delay(text: &str) -> Duration {
        let base_ms = 20u64;
        let pauses = [": ", ". ", "? ", "! ", ", ", "\n"];
        let extra_ms: u64 = pauses
            .iter()
            .map(|p| text.matches(p).count() as u64)
            .sum();
        Duration::from_millis(base_ms + extra_ms)
    }

    fn put(s: &str) {
        let mut out = std::io::stdout();
        let _ = out.write_all(s.as_bytes());
        let _ = out.flush();
    }
}

#[async_trait]
impl DisplayOutput for ConsoleDisplay {
    async fn render(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let _device = self.device.lock().await;
        let delay = Self::char_delay(text);
        for ch in text.chars() {
            if cancel.is_cancelled() {
                debug!(target: "display", "Render cancelled mid-message");
                break;
            }
            Self::put(&ch.to_string());
            sleep(delay).await;
        }
        Self::put("\n");
        Ok(())
    }

    async fn render_state(&self, label: &str, cancel: &CancellationToken) -> Result<()> {
        let _device = self.device.lock().await;
        loop {
            for dots in 0..4 {
                if cancel.is_cancelled() {
                    Self::put("\r\x1b[2K");
                    return Ok(());
                }
                Self::put(&format!("\r\x1b[2K{}{}", label, ".".repeat(dots)));
                tokio::select! {
                    _ = sleep(self.state_frame) => {}
                    _ = cancel.cancelled() => {
                        Self::put("\r\x1b[2K");
                        return Ok(());
                    }
                }
            }
        }
    }
}
