// Chime Core Library
// Voice command orchestration: wake phrase → intent → handler → feedback

pub mod classifier;
pub mod config;
pub mod feedback;
pub mod handlers;
pub mod limiter;
pub mod orchestrator;
pub mod supervisor;
pub mod transcript;

pub(crate) mod util;

// Export core types
pub use classifier::{Intent, IntentClassifier, SimilarityClassifier};
pub use config::Settings;
pub use feedback::{
    CliSpeech, ConsoleDisplay, DisplayOutput, FeedbackChannel, NullDisplay, NullSpeech,
    SpeechOutput,
};
pub use handlers::{Handler, HandlerError, HandlerRegistry, HandlerResult};
pub use limiter::{ConcurrencyLimiter, ConcurrencySlot};
pub use orchestrator::{CommandOrchestrator, CycleOutcome};
pub use supervisor::SessionSupervisor;
pub use transcript::{ChannelTranscripts, TranscriptSource, Utterance};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChimeError {
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Feedback error: {0}")]
    FeedbackError(String),
}

pub type Result<T> = std::result::Result<T, ChimeError>;
