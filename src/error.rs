//! Error types for the component runtime.
//!
//! Construction-time errors (bad names, missing required elements, unsafe
//! attribute writes) are returned synchronously to the caller. Runtime
//! failures inside effects are caught by the effect engine, logged, and
//! reported through failure hooks; they never escape into the reactive graph.

use thiserror::Error;

/// Errors surfaced by the runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Component name is not a valid custom element name.
    #[error("invalid component name <{name}>: {reason}")]
    InvalidComponentName { name: String, reason: String },

    /// Declared property collides with a reserved or built-in name.
    #[error("invalid property name `{property}` in <{component}>: {reason}")]
    InvalidPropertyName {
        component: String,
        property: String,
        reason: String,
    },

    /// Setup returned effect declarations the runtime cannot install.
    #[error("invalid effects in <{component}>: {reason}")]
    InvalidEffects { component: String, reason: String },

    /// Effects were declared for a key the UI record does not contain.
    #[error("invalid UI key `{key}` in <{component}>: {reason}")]
    InvalidUiKey {
        component: String,
        key: String,
        reason: String,
    },

    /// A required selector matched nothing.
    #[error("missing element `{selector}` in <{component}>: {reason}")]
    MissingElement {
        component: String,
        selector: String,
        reason: String,
    },

    /// Nested components were not defined within the dependency timeout.
    #[error("<{component}> timed out after {timeout_ms}ms waiting for {}", pending.join(", "))]
    DependencyTimeout {
        component: String,
        pending: Vec<String>,
        timeout_ms: u64,
    },

    /// A reactive value could not be resolved or passed on.
    #[error("invalid reactives for `{property}` in <{component}>: {reason}")]
    InvalidReactives {
        component: String,
        property: String,
        reason: String,
    },

    /// Target element is not (or not yet) a custom element.
    #[error("invalid custom element <{element}>: {reason}")]
    InvalidCustomElement { element: String, reason: String },

    /// Write attempted on a derived or sensor-backed property.
    #[error("property `{property}` of <{component}> is read-only")]
    ReadOnlyProperty { component: String, property: String },

    /// Attribute name or value rejected by the safety check.
    #[error("unsafe attribute `{name}`: {reason}")]
    UnsafeAttribute { name: String, reason: String },

    /// Selector text could not be parsed.
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A scheduled task reported a failure.
    #[error("scheduled task `{key}` failed: {reason}")]
    TaskFailed { key: String, reason: String },
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
