//! Supervisor lifecycle: fatal classifier failure, the steady loop end to
//! end against a local probe endpoint, and shutdown behavior.

use async_trait::async_trait;
use chime_core::classifier::IntentClassifier;
use chime_core::config::{LlmSettings, NetworkSettings, Settings};
use chime_core::feedback::{DisplayOutput, SpeechOutput};
use chime_core::handlers::{Handler, HandlerRegistry, HandlerResult};
use chime_core::supervisor::SessionSupervisor;
use chime_core::transcript::{ChannelTranscripts, Utterance};
use chime_core::ChimeError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, e: String) {
        self.0.lock().unwrap().push(e);
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct RecordingSpeech(EventLog);

#[async_trait]
impl SpeechOutput for RecordingSpeech {
    async fn speak(&self, text: &str, _cancel: &CancellationToken) -> chime_core::Result<()> {
        self.0.push(format!("speak:{text}"));
        Ok(())
    }
}

struct RecordingDisplay(EventLog);

#[async_trait]
impl DisplayOutput for RecordingDisplay {
    async fn render(&self, text: &str, _cancel: &CancellationToken) -> chime_core::Result<()> {
        self.0.push(format!("render:{text}"));
        Ok(())
    }

    async fn render_state(&self, _label: &str, cancel: &CancellationToken) -> chime_core::Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

/// A display whose renders only finish once cancelled, like a typewriter
/// device caught mid-message.
struct HeldDisplay(EventLog);

#[async_trait]
impl DisplayOutput for HeldDisplay {
    async fn render(&self, text: &str, cancel: &CancellationToken) -> chime_core::Result<()> {
        self.0.push(format!("render-start:{text}"));
        cancel.cancelled().await;
        self.0.push(format!("render-done:{text}"));
        Ok(())
    }

    async fn render_state(&self, _label: &str, cancel: &CancellationToken) -> chime_core::Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

struct NoneClassifier;

#[async_trait]
impl IntentClassifier for NoneClassifier {
    async fn classify(&self, _text: &str) -> Option<String> {
        None
    }
}

struct EchoFallback;

#[async_trait]
impl Handler for EchoFallback {
    fn name(&self) -> String {
        "GeneralRoute".to_string()
    }

    async fn handle(&self, text: &str) -> HandlerResult<String> {
        Ok(format!("You said {text}."))
    }
}

/// Minimal HTTP endpoint answering 200 to anything, standing in for the
/// reachability probe target.
async fn probe_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let _ = sock
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
            });
        }
    });
    format!("http://{addr}/")
}

fn settings(probe_url: String) -> Settings {
    Settings {
        wake_word: "chime".into(),
        say_acknowledgement: false,
        concurrency_budget: 10,
        handler_timeout_ms: None,
        llm: LlmSettings {
            base_url: String::new(),
            model: String::new(),
            api_key: Some("test-key".into()),
            request_timeout_ms: 1_000,
            temperature: 0.7,
            max_tokens: 64,
            custom_instructions: String::new(),
        },
        network: NetworkSettings {
            probe_url,
            probe_timeout_ms: 1_000,
            retry_interval_secs: 1,
        },
    }
}

#[tokio::test]
async fn classifier_failure_is_fatal() {
    let log = EventLog::default();
    let (_tx, source) = ChannelTranscripts::channel(4);
    let result = SessionSupervisor::initialize(
        settings(String::new()),
        Arc::new(RecordingSpeech(log.clone())),
        Arc::new(RecordingDisplay(log)),
        Err(ChimeError::InitError("model load failed".into())),
        Arc::new(HandlerRegistry::new(Arc::new(EchoFallback))),
        Box::new(source),
    )
    .await;

    assert!(matches!(result, Err(ChimeError::InitError(_))));
}

#[tokio::test]
async fn steady_loop_runs_commands_until_stream_ends() {
    let probe = probe_endpoint().await;
    let log = EventLog::default();
    let (tx, source) = ChannelTranscripts::channel(4);

    let mut supervisor = SessionSupervisor::initialize(
        settings(probe),
        Arc::new(RecordingSpeech(log.clone())),
        Arc::new(RecordingDisplay(log.clone())),
        Ok(Arc::new(NoneClassifier)),
        Arc::new(HandlerRegistry::new(Arc::new(EchoFallback))),
        Box::new(source),
    )
    .await
    .unwrap();

    tx.send(Utterance::new("chime hello there")).await.unwrap();
    tx.send(Utterance::new("unaddressed chatter")).await.unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("run did not finish after the stream ended")
        .unwrap();

    let events = log.events();
    assert!(events.contains(&"speak:Hello, I'm ready to help you".to_string()));
    assert!(events.contains(&"speak:You said hello there.".to_string()));
    assert!(events.contains(&"render:You said hello there.".to_string()));
    // The unaddressed utterance produced nothing
    assert!(!events.iter().any(|e| e.contains("unaddressed")));
}

#[tokio::test]
async fn shutdown_token_stops_the_loop() {
    let probe = probe_endpoint().await;
    let log = EventLog::default();
    let (tx, source) = ChannelTranscripts::channel(4);

    let mut supervisor = SessionSupervisor::initialize(
        settings(probe),
        Arc::new(RecordingSpeech(log.clone())),
        Arc::new(RecordingDisplay(log)),
        Ok(Arc::new(NoneClassifier)),
        Arc::new(HandlerRegistry::new(Arc::new(EchoFallback))),
        Box::new(source),
    )
    .await
    .unwrap();

    let stop = supervisor.shutdown_token();
    let run = tokio::spawn(async move { supervisor.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.cancel();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run did not stop after shutdown")
        .unwrap()
        .unwrap();
    drop(tx);
}

#[tokio::test]
async fn shutdown_drains_the_boot_render() {
    let log = EventLog::default();
    let (_tx, source) = ChannelTranscripts::channel(1);

    let mut supervisor = SessionSupervisor::initialize(
        settings(String::new()),
        Arc::new(RecordingSpeech(log.clone())),
        Arc::new(HeldDisplay(log.clone())),
        Ok(Arc::new(NoneClassifier)),
        Arc::new(HandlerRegistry::new(Arc::new(EchoFallback))),
        Box::new(source),
    )
    .await
    .unwrap();

    // Cancel while the boot message is still being typed out
    supervisor.shutdown_token().cancel();
    tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("run did not finish after shutdown")
        .unwrap();

    // run() must not return before the held render has wound down
    let events = log.events();
    assert!(events.contains(&"render-start:Booting up".to_string()));
    assert!(events.contains(&"render-done:Booting up".to_string()));
}

#[tokio::test]
async fn unreliable_utterances_are_skipped() {
    let probe = probe_endpoint().await;
    let log = EventLog::default();
    let (tx, source) = ChannelTranscripts::channel(4);

    let mut supervisor = SessionSupervisor::initialize(
        settings(probe),
        Arc::new(RecordingSpeech(log.clone())),
        Arc::new(RecordingDisplay(log.clone())),
        Ok(Arc::new(NoneClassifier)),
        Arc::new(HandlerRegistry::new(Arc::new(EchoFallback))),
        Box::new(source),
    )
    .await
    .unwrap();

    tx.send(Utterance::with_confidence("chime garbled audio", 0.0))
        .await
        .unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("run did not finish")
        .unwrap();

    assert!(!log.events().iter().any(|e| e.contains("garbled")));
}
