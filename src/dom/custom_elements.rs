//! Custom element registry.
//!
//! A definition attaches an [`ElementLifecycle`] to a tag name. Elements with
//! that tag are upgraded when they connect, or immediately (in document order)
//! when the definition arrives after they were already connected.
//!
//! Reactions run after the tree mutation that caused them has completed, so a
//! lifecycle callback is free to read and mutate the tree.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::tree::{self, NodeId};
use crate::deferred::Deferred;
use crate::error::{Error, Result};

/// Names the platform reserves even though they look like custom element names.
const RESERVED_NAMES: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

/// Callbacks a defined element receives.
pub trait ElementLifecycle {
    /// Element was inserted into a connected tree (or upgraded while connected).
    fn connected(&self, _element: NodeId) {}

    /// Element was removed from a connected tree.
    fn disconnected(&self, _element: NodeId) {}

    /// An observed attribute changed.
    fn attribute_changed(&self, _element: NodeId, _name: &str, _old: Option<&str>, _new: Option<&str>) {}

    /// Attribute names that produce [`ElementLifecycle::attribute_changed`].
    fn observed_attributes(&self) -> Vec<String> {
        Vec::new()
    }
}

struct Definition {
    lifecycle: Rc<dyn ElementLifecycle>,
    observed: Vec<String>,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<String, Rc<Definition>>> = RefCell::new(HashMap::new());
    static WAITERS: RefCell<HashMap<String, Deferred<()>>> = RefCell::new(HashMap::new());
}

/// Validate a custom element name: lowercase ASCII letter first, then
/// lowercase letters, digits and hyphens, with at least one hyphen.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidComponentName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !name.contains('-') {
        return Err(invalid("must contain a hyphen"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(invalid(&format!(
            "may only contain lowercase letters, digits and hyphens, found `{c}`"
        )));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(invalid("name is reserved"));
    }
    Ok(())
}

fn definition(tag: &str) -> Option<Rc<Definition>> {
    REGISTRY.with(|r| r.borrow().get(tag).cloned())
}

fn definition_for(element: NodeId) -> Option<Rc<Definition>> {
    tree::tag_name(element).and_then(|tag| definition(&tag))
}

/// Register a definition and upgrade matching connected elements.
pub fn define(name: &str, lifecycle: Rc<dyn ElementLifecycle>) -> Result<()> {
    validate_name(name)?;
    if is_defined(name) {
        return Err(Error::InvalidComponentName {
            name: name.to_string(),
            reason: "already defined".to_string(),
        });
    }

    let observed = lifecycle
        .observed_attributes()
        .into_iter()
        .map(|a| a.to_ascii_lowercase())
        .collect();
    REGISTRY.with(|r| {
        r.borrow_mut()
            .insert(name.to_string(), Rc::new(Definition { lifecycle, observed }))
    });
    tracing::debug!(name, "custom element defined");

    let pending: Vec<NodeId> = tree::composed_subtree(tree::document())
        .into_iter()
        .filter(|el| tree::tag_name(*el).as_deref() == Some(name))
        .collect();
    for element in pending {
        upgrade(element);
    }

    let waiter = WAITERS.with(|w| w.borrow_mut().remove(name));
    if let Some(waiter) = waiter {
        waiter.resolve(());
    }
    Ok(())
}

pub fn is_defined(name: &str) -> bool {
    REGISTRY.with(|r| r.borrow().contains_key(name))
}

/// Resolves once `name` is defined (immediately if it already is).
pub fn when_defined(name: &str) -> Deferred<()> {
    if is_defined(name) {
        return Deferred::resolved(());
    }
    WAITERS.with(|w| w.borrow_mut().entry(name.to_string()).or_default().clone())
}

/// Whether the element has run its definition's upgrade.
pub fn is_upgraded(element: NodeId) -> bool {
    tree::is_upgraded(element)
}

/// A custom-element-named tag that has not been upgraded yet.
pub fn is_pending_upgrade(element: NodeId) -> bool {
    tree::tag_name(element).is_some_and(|tag| validate_name(&tag).is_ok()) && !tree::is_upgraded(element)
}

/// Upgrade an element if its tag is defined. Connected elements also get
/// their `connected` reaction.
pub fn upgrade(element: NodeId) {
    if tree::is_upgraded(element) {
        return;
    }
    let Some(def) = definition_for(element) else {
        return;
    };
    tree::set_upgraded(element, true);

    for name in &def.observed {
        if let Some(value) = tree::get_attribute(element, name) {
            def.lifecycle.attribute_changed(element, name, None, Some(&value));
        }
    }
    if tree::is_connected(element) {
        def.lifecycle.connected(element);
    }
}

pub(crate) fn connected_subtree(root: NodeId) {
    for element in tree::composed_subtree(root) {
        let Some(def) = definition_for(element) else {
            continue;
        };
        // The element may have been moved out by an earlier reaction.
        if !tree::is_connected(element) {
            continue;
        }
        if tree::is_upgraded(element) {
            def.lifecycle.connected(element);
        } else {
            upgrade(element);
        }
    }
}

pub(crate) fn disconnected_subtree(root: NodeId) {
    for element in tree::composed_subtree(root) {
        if !tree::is_upgraded(element) {
            continue;
        }
        if let Some(def) = definition_for(element) {
            def.lifecycle.disconnected(element);
        }
    }
}

pub(crate) fn attribute_changed(element: NodeId, name: &str, old: Option<&str>, new: Option<&str>) {
    if !tree::is_upgraded(element) {
        return;
    }
    let Some(def) = definition_for(element) else {
        return;
    };
    if def.observed.iter().any(|o| o == name) {
        def.lifecycle.attribute_changed(element, name, old, new);
    }
}

/// Clear definitions and waiters (for testing)
pub fn reset_custom_elements() {
    REGISTRY.with(|r| r.borrow_mut().clear());
    WAITERS.with(|w| w.borrow_mut().clear());
}
