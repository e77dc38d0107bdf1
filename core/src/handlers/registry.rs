use super::Handler;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps intent names to handlers.
///
/// Unknown names and failed classification both resolve to the designated
/// fallback, so every command that passes wake matching receives some
/// response. Resolution is a pure lookup with no side effects.
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
}

impl HandlerRegistry {
    /// The fallback is registered under its own name as well, so it can be
    /// targeted directly by the classifier.
    pub fn new(fallback: Arc<dyn Handler>) -> Self {
        let handlers = DashMap::new();
        handlers.insert(fallback.name(), Arc::clone(&fallback));
        Self { handlers, fallback }
    }

    pub fn register(&self, handler: Arc<dyn Handler>) {
        let name = handler.name();
        info!(target: "registry", handler = %name, "Registering handler");
        self.handlers.insert(name, handler);
    }

    /// Resolve an intent to a handler; `None` or an unknown name yields the
    /// fallback.
    pub fn resolve(&self, intent: Option<&str>) -> Arc<dyn Handler> {
        match intent {
            Some(name) => self
                .handlers
                .get(name)
                .map(|h| Arc::clone(h.value()))
                .unwrap_or_else(|| {
                    debug!(target: "registry", intent = %name, "Unknown intent; using fallback");
                    Arc::clone(&self.fallback)
                }),
            None => Arc::clone(&self.fallback),
        }
    }

    pub fn intent_names(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
