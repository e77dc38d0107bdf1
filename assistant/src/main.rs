use chime_core::handlers::{
    builtin_intents, AlarmRoute, CalendarRoute, GeneralRoute, HandlerRegistry, LightsRoute,
    SpotifyRoute, WeatherRoute,
};
use chime_core::{
    ChannelTranscripts, CliSpeech, ConsoleDisplay, DisplayOutput, IntentClassifier, NullSpeech,
    SessionSupervisor, Settings, SimilarityClassifier, SpeechOutput, Utterance,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,chime_core=info,chime=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        target = "chime",
        "Starting Chime: transcript → wake → intent → handler → speech + display"
    );

    // Load configuration (defaults + env + optional TOML overlay)
    let settings = Settings::load();

    // Output devices; a missing speech engine degrades to display-only
    let speech: Arc<dyn SpeechOutput> = match CliSpeech::detect() {
        Some(engine) => Arc::new(engine),
        None => {
            warn!(target = "chime", "No speech engine on PATH; running display-only");
            Arc::new(NullSpeech)
        }
    };
    let display: Arc<dyn DisplayOutput> = Arc::new(ConsoleDisplay::new());

    // Intent classifier seeded with the built-in intent table
    let classifier: chime_core::Result<Arc<dyn IntentClassifier>> =
        Ok(Arc::new(SimilarityClassifier::new(builtin_intents())));

    // Handlers; the chat handler doubles as the fallback for anything the
    // classifier cannot place
    let registry = Arc::new(HandlerRegistry::new(Arc::new(GeneralRoute::new(
        &settings.llm,
    ))));
    registry.register(Arc::new(AlarmRoute::new(Arc::clone(&speech))));
    registry.register(Arc::new(CalendarRoute::new()));
    registry.register(Arc::new(LightsRoute::new()));
    registry.register(Arc::new(SpotifyRoute::new()));
    registry.register(Arc::new(WeatherRoute::new()));

    // Transcripts arrive on stdin, one utterance per line, standing in for
    // the external speech-to-text process
    let (tx, source) = ChannelTranscripts::channel(16);
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(Utterance::new(line)).await.is_err() {
                break;
            }
        }
    });

    let mut supervisor = SessionSupervisor::initialize(
        settings,
        speech,
        display,
        classifier,
        registry,
        Box::new(source),
    )
    .await?;

    // Ctrl+C requests a graceful shutdown; the supervisor drains in-flight
    // work before returning
    let stop = supervisor.shutdown_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!(target = "chime", "Shutting down...");
            stop.cancel();
        }
    });

    supervisor.run().await?;
    stdin_task.abort();
    Ok(())
}
