use crate::util::normalize;
use async_trait::async_trait;
use strsim::jaro_winkler;
use tracing::debug;

/// A named category of user request plus the example phrases used to
/// recognize it.
#[derive(Clone, Debug)]
pub struct Intent {
    pub name: String,
    pub utterances: Vec<String>,
}

impl Intent {
    pub fn new(name: &str, utterances: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            utterances: utterances.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Maps free text to an intent name.
///
/// Internal failure must surface as `None`, never as an error: classifier
/// unavailability routes to the fallback handler instead of aborting the
/// command cycle.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Option<String>;
}

/// Lexical similarity classifier.
///
/// Scores an utterance against each intent's examples with per-token
/// Jaro-Winkler matching and picks the best intent, thresholded so that
/// gibberish falls through to the fallback handler. Deterministic for a
/// fixed intent table.
pub struct SimilarityClassifier {
    intents: Vec<Intent>,
    threshold: f64,
}

impl SimilarityClassifier {
    pub const DEFAULT_THRESHOLD: f64 = 0.82;

    pub fn new(intents: Vec<Intent>) -> Self {
        Self::with_threshold(intents, Self::DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(intents: Vec<Intent>, threshold: f64) -> Self {
        Self { intents, threshold }
    }

    /// Best example score for one intent.
    fn score(&self, query: &str, intent: &Intent) -> f64 {
        intent
            .utterances
            .iter()
            .map(|example| phrase_similarity(query, &normalize(example)))
            .fold(0.0, f64::max)
    }
}

#[async_trait]
impl IntentClassifier for SimilarityClassifier {
    async fn classify(&self, text: &str) -> Option<String> {
        let query = normalize(text);
        if query.is_empty() {
            return None;
        }

        let mut best: Option<(&Intent, f64)> = None;
        for intent in &self.intents {
            let s = self.score(&query, intent);
            match best {
                Some((_, b)) if s <= b => {}
                _ => best = Some((intent, s)),
            }
        }

        let (intent, score) = best?;
        debug!(target: "classifier", intent = %intent.name, score, "Best intent candidate");
        if score >= self.threshold {
            Some(intent.name.clone())
        } else {
            None
        }
    }
}

/// Mean over the query's tokens of each token's best Jaro-Winkler match in
/// the example. Word order does not matter; shared vocabulary does.
fn phrase_similarity(query: &str, example: &str) -> f64 {
    let q_tokens: Vec<&str> = query.split_whitespace().collect();
    let e_tokens: Vec<&str> = example.split_whitespace().collect();
    if q_tokens.is_empty() || e_tokens.is_empty() {
        return 0.0;
    }
    let sum: f64 = q_tokens
        .iter()
        .map(|q| {
            e_tokens
                .iter()
                .map(|e| jaro_winkler(q, e))
                .fold(0.0, f64::max)
        })
        .sum();
    sum / q_tokens.len() as f64
}
