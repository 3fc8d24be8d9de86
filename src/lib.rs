//! # spark-elements
//!
//! Reactive custom-element runtime for Rust.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! A component is a custom element tag plus three things: typed properties
//! backed by reactive cells, a select function that resolves a frozen UI
//! record of descendant elements and live collections, and a setup function
//! that declares effects against that record.
//!
//! ```text
//! define -> upgrade -> select (UI record) -> properties -> [dependencies] -> setup -> effects
//! ```
//!
//! Effects are reactive bindings from a source (a cell, a host property, a
//! getter) to one facet of an element. They re-run when their sources change,
//! skip writes that would change nothing, and fail closed on unsafe
//! attributes. Disconnect runs every cleanup exactly once.
//!
//! ## Modules
//!
//! - [`types`] - `Value`, typed extraction, cleanups
//! - [`dom`] - the host element tree, observers, events, custom elements
//! - [`platform`] - microtasks, animation frames, timers
//! - [`reactive`] - cells and lazy-activation watch frames
//! - [`collection`] - observed, diffed element sets
//! - [`sensor`] - event-driven read-only values
//! - [`scheduler`] - key-deduplicated per-frame work
//! - [`effects`] - operations and effect constructors
//! - [`component`] - definitions, UI records, instances
//! - [`parsers`] - attribute parsers for property initializers
//!
//! ## Example
//!
//! ```ignore
//! use spark_elements::*;
//!
//! component("my-counter")
//!     .prop("count", parsers::as_integer(0))
//!     .select(|s| {
//!         Ok(vec![
//!             ("button".into(), s.first("button", "increments the count")?),
//!             ("label".into(), s.first("span", "shows the count")?),
//!         ])
//!     })
//!     .setup(|_ui| {
//!         Ok(Effects::new()
//!             .add("button", on("click", |_, _| None))
//!             .add("label", set_text("count")))
//!     })
//!     .define()?;
//! ```

pub mod collection;
pub mod component;
pub mod config;
pub mod deferred;
pub mod dom;
pub mod effects;
pub mod error;
pub mod parsers;
pub mod platform;
pub mod reactive;
pub mod scheduler;
pub mod sensor;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{Error, Result};

pub use config::RuntimeConfig;

pub use deferred::Deferred;

pub use collection::{Collection, ElementChanges};

pub use component::{
    ComponentBuilder, ComponentDefinition, ComponentHandle, EffectDeclaration, Effects, Initializer,
    LifecycleState, Selection, Ui, UiEntry, component, reset_components,
};

pub use effects::{
    Effect, EffectContext, Reactive, call_method, dangerously_set_inner_html, focus, on, pass, set_attribute,
    set_property, set_style, set_text, show, toggle_attribute, toggle_class,
};

pub use reactive::Cell;

pub use scheduler::{FrameDriver, ManualFrameDriver, Scheduler};

pub use sensor::{Sensor, SensorContext, create_sensor};

/// Reset every thread-local registry (for testing)
pub fn reset_runtime() {
    component::reset_components();
    collection::reset_collections();
    scheduler::reset_scheduler();
    dom::reset_dom();
    platform::reset_platform();
    config::reset_config();
}
