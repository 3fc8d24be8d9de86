//! Event dispatch.
//!
//! Listeners are registered per (node, event type). Dispatch runs listeners
//! on the target, then, for bubbling events, on each composed ancestor: a
//! shadow root hands the event to its host. [`Event::stop_propagation`]
//! stops the walk after the current node's listeners.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;

use super::tree::{self, NodeId};
use crate::types::Value;

bitflags! {
    /// Event and listener options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u8 {
        /// Event travels up through ancestors.
        const BUBBLES = 1 << 0;
        /// Listener promises not to cancel the event.
        const PASSIVE = 1 << 1;
    }
}

/// A dispatched event. Fields mutated during dispatch use interior mutability
/// so listeners can take it by shared reference.
#[derive(Debug, Clone)]
pub struct Event {
    event_type: String,
    flags: EventFlags,
    detail: Value,
    target: Cell<Option<NodeId>>,
    current_target: Cell<Option<NodeId>>,
    propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

impl Event {
    /// Non-bubbling event.
    pub fn new(event_type: &str) -> Self {
        Self::with_flags(event_type, EventFlags::empty())
    }

    /// Bubbling event.
    pub fn bubbling(event_type: &str) -> Self {
        Self::with_flags(event_type, EventFlags::BUBBLES)
    }

    pub fn with_flags(event_type: &str, flags: EventFlags) -> Self {
        Self {
            event_type: event_type.to_string(),
            flags,
            detail: Value::Null,
            target: Cell::new(None),
            current_target: Cell::new(None),
            propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        }
    }

    /// Attach a payload.
    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn bubbles(&self) -> bool {
        self.flags.contains(EventFlags::BUBBLES)
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    /// Node the event was dispatched on.
    pub fn target(&self) -> Option<NodeId> {
        self.target.get()
    }

    /// Node whose listeners are currently running.
    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target.get()
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

/// Handle returned by [`add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type EventCallback = Rc<dyn Fn(&Event)>;

struct Listener {
    id: ListenerId,
    node: NodeId,
    event_type: String,
    flags: EventFlags,
    callback: EventCallback,
}

thread_local! {
    static LISTENERS: RefCell<Vec<Listener>> = const { RefCell::new(Vec::new()) };
    static NEXT_LISTENER_ID: Cell<u64> = const { Cell::new(1) };
}

/// Register a listener.
pub fn add_event_listener<F>(node: NodeId, event_type: &str, flags: EventFlags, callback: F) -> ListenerId
where
    F: Fn(&Event) + 'static,
{
    let id = NEXT_LISTENER_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        ListenerId(id)
    });
    LISTENERS.with(|listeners| {
        listeners.borrow_mut().push(Listener {
            id,
            node,
            event_type: event_type.to_string(),
            flags,
            callback: Rc::new(callback),
        })
    });
    id
}

pub fn remove_event_listener(id: ListenerId) {
    LISTENERS.with(|listeners| listeners.borrow_mut().retain(|l| l.id != id));
}

/// Listeners registered on `node`.
pub fn listener_count(node: NodeId) -> usize {
    LISTENERS.with(|listeners| listeners.borrow().iter().filter(|l| l.node == node).count())
}

/// Listeners registered on `node` that were added as passive.
pub fn passive_listener_count(node: NodeId) -> usize {
    LISTENERS.with(|listeners| {
        listeners
            .borrow()
            .iter()
            .filter(|l| l.node == node && l.flags.contains(EventFlags::PASSIVE))
            .count()
    })
}

fn listeners_for(node: NodeId, event_type: &str) -> Vec<EventCallback> {
    LISTENERS.with(|listeners| {
        listeners
            .borrow()
            .iter()
            .filter(|l| l.node == node && l.event_type == event_type)
            .map(|l| l.callback.clone())
            .collect()
    })
}

/// Dispatch `event` at `target`. Returns false if a listener prevented default.
pub fn dispatch_event(target: NodeId, event: &Event) -> bool {
    event.target.set(Some(target));

    let mut path = vec![target];
    if event.bubbles() {
        let mut current = tree::composed_parent(target);
        while let Some(node) = current {
            path.push(node);
            current = tree::composed_parent(node);
        }
    }

    for node in path {
        event.current_target.set(Some(node));
        for callback in listeners_for(node, &event.event_type) {
            callback(event);
        }
        if event.is_propagation_stopped() {
            break;
        }
    }
    event.current_target.set(None);
    !event.default_prevented()
}

/// Drop all listeners (for testing)
pub fn reset_events() {
    LISTENERS.with(|listeners| listeners.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, reset_dom};

    fn setup() -> (NodeId, NodeId) {
        reset_dom();
        let body = dom::create_element("body");
        let button = dom::create_element("button");
        dom::append_child(dom::document(), body);
        dom::append_child(body, button);
        (body, button)
    }

    #[test]
    fn test_bubbles_to_ancestors() {
        let (body, button) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        add_event_listener(body, "click", EventFlags::empty(), move |e| {
            s.borrow_mut().push(("body", e.target(), e.current_target()))
        });
        let s = seen.clone();
        add_event_listener(button, "click", EventFlags::empty(), move |e| {
            s.borrow_mut().push(("button", e.target(), e.current_target()))
        });

        dispatch_event(button, &Event::bubbling("click"));
        assert_eq!(
            *seen.borrow(),
            vec![
                ("button", Some(button), Some(button)),
                ("body", Some(button), Some(body)),
            ]
        );
    }

    #[test]
    fn test_non_bubbling_stays_on_target() {
        let (body, button) = setup();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        add_event_listener(body, "focus", EventFlags::empty(), move |_| c.set(c.get() + 1));
        dispatch_event(button, &Event::new("focus"));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_stop_propagation() {
        let (body, button) = setup();
        let count = Rc::new(Cell::new(0));
        add_event_listener(button, "click", EventFlags::empty(), |e| e.stop_propagation());
        let c = count.clone();
        add_event_listener(body, "click", EventFlags::empty(), move |_| c.set(c.get() + 1));
        dispatch_event(button, &Event::bubbling("click"));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_crosses_shadow_boundary() {
        let (body, button) = setup();
        let shadow = dom::attach_shadow(button).unwrap();
        let inner = dom::create_element("span");
        dom::append_child(shadow, inner);

        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        add_event_listener(body, "click", EventFlags::empty(), move |_| c.set(c.get() + 1));
        dispatch_event(inner, &Event::bubbling("click"));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_remove_and_count() {
        let (_, button) = setup();
        let id = add_event_listener(button, "scroll", EventFlags::PASSIVE, |_| {});
        assert_eq!(listener_count(button), 1);
        assert_eq!(passive_listener_count(button), 1);
        remove_event_listener(id);
        assert_eq!(listener_count(button), 0);
    }

    #[test]
    fn test_prevent_default() {
        let (_, button) = setup();
        add_event_listener(button, "submit", EventFlags::empty(), |e| e.prevent_default());
        assert!(!dispatch_event(button, &Event::new("submit")));
    }
}
