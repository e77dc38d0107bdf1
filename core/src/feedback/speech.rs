//! Speech output modality.
//!
//! `CliSpeech` shells out to a local synthesis engine (espeak-ng, or any
//! binary named via `CHIME_SPEECH_BIN`) one sentence at a time so the
//! cancellation signal is observed between sentences and mid-sentence via
//! process kill. If no engine is present the caller degrades to
//! `NullSpeech` and the pipeline runs display-only.

use crate::{ChimeError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Speaks text aloud. One logical utterance renders at a time per device.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, checking `cancel` at each unit of progress.
    /// Early termination by cancellation is not an error.
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()>;

    fn is_available(&self) -> bool {
        true
    }
}

/// No-op output used when no speech engine is present (display-only mode).
pub struct NullSpeech;

#[async_trait]
impl SpeechOutput for NullSpeech {
    async fn speak(&self, text: &str, _cancel: &CancellationToken) -> Result<()> {
        debug!(target: "speech", text = %text, "No speech engine; dropping utterance");
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// CLI-backed speech engine.
pub struct CliSpeech {
    bin: PathBuf,
    rate_wpm: u32,
    // One utterance at a time on the audio device
    device: Mutex<()>,
}

impl CliSpeech {
    /// Probe for a usable engine: `CHIME_SPEECH_BIN`, then espeak-ng, then
    /// espeak on PATH. Returns `None` when nothing is installed.
    pub fn detect() -> Option<Self> {
        let bin = get_from_env_or_path("CHIME_SPEECH_BIN", "espeak-ng")
            .or_else(|| get_from_path("espeak"))?;
        let rate_wpm = std::env::var("CHIME_SPEECH_RATE_WPM")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(150);
        info!(target: "speech", bin = ?bin, "Detected speech engine");
        Some(Self {
            bin,
            rate_wpm,
            device: Mutex::new(()),
        })
    }

    async fn speak_sentence(&self, sentence: &str, cancel: &CancellationToken) -> Result<()> {
        let mut child = Command::new(&self.bin)
            .arg("-s")
            .arg(self.rate_wpm.to_string())
            .arg(sentence)
            .spawn()
            .map_err(|e| ChimeError::FeedbackError(format!("speech engine spawn failed: {e}")))?;

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| ChimeError::FeedbackError(format!("speech engine wait failed: {e}")))?;
                if !status.success() {
                    return Err(ChimeError::FeedbackError(format!(
                        "speech engine exited with {status}"
                    )));
                }
                Ok(())
            }
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(target: "speech", error = %e, "Failed to stop speech engine on cancel");
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SpeechOutput for CliSpeech {
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let _device = self.device.lock().await;
        for sentence in split_sentences(text) {
            if cancel.is_cancelled() {
                debug!(target: "speech", "Speech cancelled mid-utterance");
                return Ok(());
            }
            self.speak_sentence(sentence, cancel).await?;
        }
        Ok(())
    }
}

/// Split on sentence terminators, keeping non-empty fragments.
fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

fn get_from_path(bin: &str) -> Option<PathBuf> {
    // A path-like string is respected directly
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }
    if let Some(paths_os) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths_os) {
            let candidate = dir.join(bin);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}
