//! Host tree - the in-memory element tree components bind to.
//!
//! This is the platform surface the runtime needs and nothing more:
//!
//! - `tree` - node arena, attributes, classes, styles, properties, text, methods
//! - `selector` - selector parsing, matching, attribute filter inference
//! - `markup` - fragment parsing and serialization for inner markup
//! - `observer` - batched subtree mutation observation
//! - `events` - listeners, bubbling dispatch across shadow boundaries
//! - `custom_elements` - definitions, upgrades, lifecycle reactions
//! - `safety` - fail-closed attribute writes
//!
//! All state is thread-local. [`reset_dom`] clears every part of it.

pub mod custom_elements;
pub mod events;
pub mod markup;
pub mod observer;
pub mod safety;
pub mod selector;
pub mod tree;

pub use custom_elements::{ElementLifecycle, define, is_defined, is_upgraded, when_defined};
pub use events::{Event, EventFlags, ListenerId, add_event_listener, dispatch_event, listener_count, remove_event_listener};
pub use markup::{inner_html, parse_fragment, serialize, set_inner_html};
pub use observer::{MutationKind, MutationRecord, ObserveFlags, ObserverId, disconnect, observe, observer_count};
pub use safety::{check_attribute, safe_set_attribute};
pub use selector::{Selector, attribute_filter, matches, query, query_all};
pub use tree::{
    NodeId, append_child, attach_shadow, attribute_names, call_method, children, class_list,
    contains, create_comment, create_element, create_fragment, create_text, define_method,
    describe, document, element_children, focused, get_attribute, get_property, get_style,
    has_attribute, has_class, insert_before, is_connected, is_element, parent, remove,
    remove_attribute, remove_property, remove_style, set_attribute, set_property, set_style,
    set_text, set_text_content, shadow_root, tag_name, text_content, toggle_attribute, toggle_class,
};

/// Reset the tree, observers, listeners and definitions (for testing)
pub fn reset_dom() {
    tree::reset_tree();
    observer::reset_observers();
    events::reset_events();
    custom_elements::reset_custom_elements();
}
