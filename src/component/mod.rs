//! Components - definitions, UI records and per-element instances.
//!
//! - `definition` - the builder, property initializers, effect declarations
//! - `ui` - the frozen UI record and the selection helpers used to build it
//! - `instance` - lifecycle state machine and property accessors

pub mod definition;
pub mod instance;
pub mod ui;

pub use definition::{
    ComponentBuilder, ComponentDefinition, EffectDeclaration, Effects, Initializer, attribute_name, component,
};
pub use instance::{
    Accessor, ComponentHandle, LifecycleState, diagnostics, get_property, is_component, lifecycle_state,
    set_property,
};
pub use ui::{HOST_KEY, Selection, Ui, UiEntry};

/// Forget definitions and instances (for testing)
pub fn reset_components() {
    instance::reset_instances();
    definition::reset_definitions();
}
