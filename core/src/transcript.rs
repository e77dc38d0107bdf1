use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// A single transcribed utterance pushed by the external speech-to-text
/// collaborator. Immutable; consumed exactly once by the orchestrator.
#[derive(Clone, Debug)]
pub struct Utterance {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Transcription confidence in [0.0, 1.0]; `Some(0.0)` flags a failed
    /// recognition that should be skipped with a brief backoff.
    pub confidence: Option<f32>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            confidence: None,
        }
    }

    pub fn with_confidence(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            confidence: Some(confidence),
        }
    }

    /// False when the transcription collaborator flagged this result as
    /// unusable (a transcription error, not a command).
    pub fn is_reliable(&self) -> bool {
        self.confidence.map_or(true, |c| c > 0.0)
    }
}

/// Boundary to the continuous listening process. The core never drives
/// microphone access itself; it consumes whatever the collaborator pushes.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Next transcribed utterance, or `None` when the stream has ended.
    async fn next_utterance(&mut self) -> Option<Utterance>;
}

/// Channel-backed source; the push side lives with the speech-to-text
/// collaborator (or a test, or a stdin reader).
pub struct ChannelTranscripts {
    rx: mpsc::Receiver<Utterance>,
}

impl ChannelTranscripts {
    pub fn new(rx: mpsc::Receiver<Utterance>) -> Self {
        Self { rx }
    }

    /// Convenience pair: a sender for the collaborator and the source for
    /// the supervisor.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Utterance>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl TranscriptSource for ChannelTranscripts {
    async fn next_utterance(&mut self) -> Option<Utterance> {
        self.rx.recv().await
    }
}
