//! Full command cycles through the orchestrator, observed via recording
//! output fakes: wake matching, acknowledgement ordering, substitution
//! messages and panic containment.

use async_trait::async_trait;
use chime_core::classifier::IntentClassifier;
use chime_core::config::{LlmSettings, NetworkSettings, Settings};
use chime_core::feedback::{DisplayOutput, FeedbackChannel, SpeechOutput};
use chime_core::handlers::{Handler, HandlerError, HandlerRegistry, HandlerResult};
use chime_core::limiter::ConcurrencyLimiter;
use chime_core::orchestrator::{CommandOrchestrator, CycleOutcome};
use chime_core::transcript::Utterance;
use mockall::mock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    Spoke(String),
    Rendered(String),
}

/// Shared record of everything the user would have heard or seen, in
/// completion order.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, e: Event) {
        self.0.lock().unwrap().push(e);
    }

    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    fn position(&self, wanted: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == wanted)
    }
}

struct RecordingSpeech {
    log: EventLog,
    delay: Duration,
}

#[async_trait]
impl SpeechOutput for RecordingSpeech {
    async fn speak(&self, text: &str, _cancel: &CancellationToken) -> chime_core::Result<()> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.log.push(Event::Spoke(text.to_string()));
        Ok(())
    }
}

struct RecordingDisplay {
    log: EventLog,
}

#[async_trait]
impl DisplayOutput for RecordingDisplay {
    async fn render(&self, text: &str, _cancel: &CancellationToken) -> chime_core::Result<()> {
        self.log.push(Event::Rendered(text.to_string()));
        Ok(())
    }

    async fn render_state(&self, _label: &str, cancel: &CancellationToken) -> chime_core::Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

struct FixedClassifier(Option<String>);

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Option<String> {
        self.0.clone()
    }
}

struct ScriptedHandler {
    name: &'static str,
    reply: &'static str,
    delay: Duration,
}

impl ScriptedHandler {
    fn instant(name: &'static str, reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply,
            delay: Duration::ZERO,
        })
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    fn name(&self) -> String {
        self.name.to_string()
    }

    async fn handle(&self, _text: &str) -> HandlerResult<String> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        Ok(self.reply.to_string())
    }
}

struct PanickyHandler;

#[async_trait]
impl Handler for PanickyHandler {
    fn name(&self) -> String {
        "LightsRoute".to_string()
    }

    async fn handle(&self, _text: &str) -> HandlerResult<String> {
        panic!("bridge driver blew up");
    }
}

mock! {
    FailingHandler {}

    #[async_trait]
    impl Handler for FailingHandler {
        fn name(&self) -> String;
        async fn handle(&self, text: &str) -> HandlerResult<String>;
    }
}

fn settings(ack: bool, handler_timeout_ms: Option<u64>) -> Settings {
    Settings {
        wake_word: "chime".into(),
        say_acknowledgement: ack,
        concurrency_budget: 10,
        handler_timeout_ms,
        llm: LlmSettings {
            base_url: String::new(),
            model: String::new(),
            api_key: None,
            request_timeout_ms: 1_000,
            temperature: 0.7,
            max_tokens: 64,
            custom_instructions: String::new(),
        },
        network: NetworkSettings {
            probe_url: String::new(),
            probe_timeout_ms: 1_000,
            retry_interval_secs: 1,
        },
    }
}

fn orchestrator(
    settings: Settings,
    intent: Option<&str>,
    handlers: Vec<Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
    speak_delay: Duration,
) -> (CommandOrchestrator, EventLog) {
    let log = EventLog::default();
    let speech = Arc::new(RecordingSpeech {
        log: log.clone(),
        delay: speak_delay,
    });
    let display = Arc::new(RecordingDisplay { log: log.clone() });
    let limiter = Arc::new(ConcurrencyLimiter::new(settings.concurrency_budget));
    let feedback = Arc::new(FeedbackChannel::new(speech, display, Arc::clone(&limiter)));
    let registry = Arc::new(HandlerRegistry::new(fallback));
    for h in handlers {
        registry.register(h);
    }
    let classifier: Arc<dyn IntentClassifier> =
        Arc::new(FixedClassifier(intent.map(String::from)));
    let orch = CommandOrchestrator::new(&settings, classifier, registry, feedback, limiter);
    (orch, log)
}

async fn run(orch: &CommandOrchestrator, text: &str) -> CycleOutcome {
    let cancel = CancellationToken::new();
    let outcome = orch
        .handle_utterance(&Utterance::new(text), &cancel)
        .await;
    cancel.cancel();
    outcome
}

#[tokio::test]
async fn full_cycle_delivers_ack_then_response() {
    let (orch, log) = orchestrator(
        settings(true, None),
        Some("WeatherRoute"),
        vec![ScriptedHandler::instant("WeatherRoute", "It is sunny.")],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::from_millis(40),
    );

    let outcome = run(&orch, "Chime, what's the weather?").await;
    assert_eq!(outcome, CycleOutcome::Completed);

    let ack_spoke = log
        .position(&Event::Spoke("I'm on it".into()))
        .expect("no spoken acknowledgement");
    let ack_render = log
        .position(&Event::Rendered("Heard: \"whats the weather\"".into()))
        .expect("no rendered acknowledgement");
    let resp_spoke = log
        .position(&Event::Spoke("It is sunny.".into()))
        .expect("no spoken response");
    let resp_render = log
        .position(&Event::Rendered("It is sunny.".into()))
        .expect("no rendered response");

    // Acknowledgement settles on both modalities before any response output
    assert!(ack_spoke < resp_spoke && ack_spoke < resp_render);
    assert!(ack_render < resp_spoke && ack_render < resp_render);
}

#[tokio::test]
async fn slow_handler_still_acks_first() {
    let (orch, log) = orchestrator(
        settings(true, None),
        Some("WeatherRoute"),
        vec![Arc::new(ScriptedHandler {
            name: "WeatherRoute",
            reply: "Eventually sunny.",
            delay: Duration::from_millis(200),
        })],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::ZERO,
    );

    assert_eq!(
        run(&orch, "chime what is the weather").await,
        CycleOutcome::Completed
    );
    let ack = log.position(&Event::Spoke("I'm on it".into())).unwrap();
    let resp = log
        .position(&Event::Spoke("Eventually sunny.".into()))
        .unwrap();
    assert!(ack < resp);
}

#[tokio::test]
async fn unaddressed_utterance_is_discarded_silently() {
    let (orch, log) = orchestrator(
        settings(true, None),
        Some("WeatherRoute"),
        vec![ScriptedHandler::instant("WeatherRoute", "It is sunny.")],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::ZERO,
    );

    let outcome = run(&orch, "what's the weather like").await;
    assert_eq!(outcome, CycleOutcome::Ignored);
    assert!(log.events().is_empty(), "discard must produce no feedback");
}

#[tokio::test]
async fn bare_wake_word_is_discarded_silently() {
    let (orch, log) = orchestrator(
        settings(true, None),
        None,
        vec![],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::ZERO,
    );

    assert_eq!(run(&orch, "Chime!").await, CycleOutcome::Ignored);
    assert!(log.events().is_empty());
}

#[tokio::test]
async fn disabled_acknowledgement_goes_straight_to_response() {
    let (orch, log) = orchestrator(
        settings(false, None),
        Some("WeatherRoute"),
        vec![ScriptedHandler::instant("WeatherRoute", "It is sunny.")],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::ZERO,
    );

    assert_eq!(
        run(&orch, "chime whats the weather").await,
        CycleOutcome::Completed
    );
    let events = log.events();
    assert!(!events.contains(&Event::Spoke("I'm on it".into())));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::Rendered(t) if t.starts_with("Heard:"))));
    assert!(events.contains(&Event::Spoke("It is sunny.".into())));
}

#[tokio::test]
async fn handler_failure_substitutes_a_short_message() {
    let mut failing = MockFailingHandler::new();
    failing.expect_name().return_const("AlarmRoute".to_string());
    failing.expect_handle().returning(|_| {
        Err(HandlerError::Upstream(
            "CalDAV server unreachable: connection refused (os error 111)".to_string(),
        ))
    });

    let (orch, log) = orchestrator(
        settings(true, None),
        Some("AlarmRoute"),
        vec![Arc::new(failing)],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::ZERO,
    );

    assert_eq!(
        run(&orch, "chime set an alarm for 7").await,
        CycleOutcome::Completed
    );
    let substitution = "An error occurred in the AlarmRoute module";
    assert!(log.events().contains(&Event::Spoke(substitution.into())));
    assert!(log.events().contains(&Event::Rendered(substitution.into())));
    // The raw failure never reaches the user
    assert!(!log
        .events()
        .iter()
        .any(|e| matches!(e, Event::Spoke(t) | Event::Rendered(t) if t.contains("os error"))));
}

#[tokio::test]
async fn panicking_handler_is_contained() {
    let (orch, log) = orchestrator(
        settings(false, None),
        Some("LightsRoute"),
        vec![Arc::new(PanickyHandler)],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::ZERO,
    );

    assert_eq!(
        run(&orch, "chime turn on the lights").await,
        CycleOutcome::Recovered
    );
    assert!(log.events().iter().any(|e| matches!(
        e,
        Event::Spoke(t) if t.starts_with("Something went wrong") && t.contains("LightsRoute")
    )));
}

#[tokio::test]
async fn unresolved_intent_uses_the_fallback() {
    let (orch, log) = orchestrator(
        settings(false, None),
        None,
        vec![ScriptedHandler::instant("WeatherRoute", "It is sunny.")],
        ScriptedHandler::instant("GeneralRoute", "Let me think about that."),
        Duration::ZERO,
    );

    assert_eq!(
        run(&orch, "chime ponder the meaning of life").await,
        CycleOutcome::Completed
    );
    assert!(log
        .events()
        .contains(&Event::Spoke("Let me think about that.".into())));
}

#[tokio::test]
async fn handler_timeout_substitutes_like_a_failure() {
    let (orch, log) = orchestrator(
        settings(false, Some(50)),
        Some("SpotifyRoute"),
        vec![Arc::new(ScriptedHandler {
            name: "SpotifyRoute",
            reply: "never delivered",
            delay: Duration::from_millis(500),
        })],
        ScriptedHandler::instant("GeneralRoute", "fallback"),
        Duration::ZERO,
    );

    assert_eq!(
        run(&orch, "chime play some music").await,
        CycleOutcome::Completed
    );
    assert!(log
        .events()
        .contains(&Event::Spoke("An error occurred in the SpotifyRoute module".into())));
    assert!(!log
        .events()
        .contains(&Event::Spoke("never delivered".into())));
}
