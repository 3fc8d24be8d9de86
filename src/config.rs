//! Runtime configuration.
//!
//! One [`RuntimeConfig`] is active per thread. Install it at startup; every
//! component instance reads it when it connects.
//!
//! ```ignore
//! use std::time::Duration;
//! use spark_elements::config::{self, RuntimeConfig};
//!
//! config::install(RuntimeConfig::default().with_dependency_timeout(Duration::from_millis(500)));
//! ```

use std::cell::RefCell;
use std::time::Duration;

/// Environment variable overriding the dependency timeout (milliseconds).
pub const DEPENDENCY_TIMEOUT_ENV: &str = "SPARK_ELEMENTS_DEPENDENCY_TIMEOUT_MS";

/// Default wait for nested components to be defined.
pub const DEFAULT_DEPENDENCY_TIMEOUT: Duration = Duration::from_millis(200);

/// Event types whose handlers are deferred to the next frame.
pub const DEFAULT_PASSIVE_EVENTS: &[&str] = &[
    "scroll",
    "resize",
    "wheel",
    "touchstart",
    "touchmove",
    "touchend",
    "touchcancel",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// How long a component waits for undefined nested components.
    pub dependency_timeout: Duration,
    /// Event types classified as passive.
    pub passive_events: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dependency_timeout: DEFAULT_DEPENDENCY_TIMEOUT,
            passive_events: DEFAULT_PASSIVE_EVENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults, with overrides read from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(DEPENDENCY_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.dependency_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(
                    var = DEPENDENCY_TIMEOUT_ENV,
                    value = %raw,
                    "ignoring non-numeric dependency timeout"
                ),
            }
        }
        config
    }

    pub fn with_dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = timeout;
        self
    }

    pub fn with_passive_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passive_events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Check if handlers for this event type are deferred.
    pub fn is_passive(&self, event_type: &str) -> bool {
        self.passive_events.iter().any(|e| e == event_type)
    }

    pub fn dependency_timeout_ms(&self) -> u64 {
        self.dependency_timeout.as_millis() as u64
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::from_env());
}

/// Install the configuration for this thread.
pub fn install(config: RuntimeConfig) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Current configuration (cloned).
pub fn current() -> RuntimeConfig {
    CONFIG.with(|c| c.borrow().clone())
}

/// Check an event type against the installed passive set.
pub fn is_passive_event(event_type: &str) -> bool {
    CONFIG.with(|c| c.borrow().is_passive(event_type))
}

/// Reset to defaults plus environment overrides (for testing)
pub fn reset_config() {
    install(RuntimeConfig::from_env());
}
