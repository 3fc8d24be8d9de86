//! Sensor - a read-only value driven by delegated events.
//!
//! A sensor listens on the component host, once per declared event type, and
//! only reacts to events that originate inside its watched target: the
//! element or collection stored under a UI key.
//!
//! - Event outside every target: ignored, keeps propagating.
//! - Event inside a target: propagation stops and the handler runs with the
//!   event, the UI record, the matched target and the previous value.
//!   `None` leaves the value alone; a different value replaces it.
//! - Passive event types (scroll, touch, ...) run through the scheduler,
//!   coalesced per host and event type, instead of synchronously.
//!
//! Listeners exist only while the sensor has subscribers, like a collection's
//! observer.
//!
//! # Example
//!
//! ```ignore
//! let selected = create_sensor(host, ui.clone(), Value::Null, "items", vec![
//!     ("click".into(), Rc::new(|ctx: &SensorContext| Some(ctx.target.into())) as SensorHandler),
//! ])?;
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use spark_signals::{Signal, signal};

use crate::component::ui::{Ui, UiEntry};
use crate::config;
use crate::dom::{self, Event, EventFlags, ListenerId, NodeId};
use crate::error::{Error, Result};
use crate::reactive::{Watch, Watchable, track};
use crate::scheduler;
use crate::types::Value;

/// What a sensor handler sees.
pub struct SensorContext<'a> {
    pub event: &'a Event,
    pub ui: &'a Ui,
    /// Watched element the event originated in.
    pub target: NodeId,
    pub previous: &'a Value,
}

pub type SensorHandler = Rc<dyn Fn(&SensorContext) -> Option<Value>>;

#[derive(Default)]
struct SensorState {
    subscribers: usize,
    listeners: Vec<ListenerId>,
    /// Keeps a collection target observed while the sensor is active.
    target_watch: Option<Watch>,
}

struct Inner {
    host: NodeId,
    ui: Rc<Ui>,
    target_key: String,
    handlers: Vec<(String, SensorHandler)>,
    value: Signal<Value>,
    /// Untracked copy of `value` for handlers.
    current: RefCell<Value>,
    state: RefCell<SensorState>,
}

#[derive(Clone)]
pub struct Sensor {
    inner: Rc<Inner>,
}

/// Create a sensor on `host` watching the UI entry `target_key`.
pub fn create_sensor(
    host: NodeId,
    ui: Rc<Ui>,
    initial: Value,
    target_key: &str,
    handlers: Vec<(String, SensorHandler)>,
) -> Result<Sensor> {
    Sensor::new(host, ui, initial, target_key, handlers)
}

impl Sensor {
    pub fn new(
        host: NodeId,
        ui: Rc<Ui>,
        initial: Value,
        target_key: &str,
        handlers: Vec<(String, SensorHandler)>,
    ) -> Result<Self> {
        ui.require(target_key)?;
        if handlers.is_empty() {
            return Err(Error::InvalidReactives {
                component: ui.component().to_string(),
                property: target_key.to_string(),
                reason: "sensor declares no event handlers".to_string(),
            });
        }
        Ok(Self {
            inner: Rc::new(Inner {
                host,
                ui,
                target_key: target_key.to_string(),
                handlers,
                value: signal(initial.clone()),
                current: RefCell::new(initial),
                state: RefCell::new(SensorState::default()),
            }),
        })
    }

    /// Current value. Inside an effect this also activates the listeners.
    pub fn get(&self) -> Value {
        track(self);
        self.inner.value.get()
    }

    /// Whether host listeners are installed.
    pub fn is_listening(&self) -> bool {
        !self.inner.state.borrow().listeners.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.borrow().subscribers
    }

    /// Keep the sensor active until the returned watch is dropped.
    pub fn subscribe(&self) -> Watch {
        self.watch()
    }

    fn activate(&self) {
        let first = {
            let mut state = self.inner.state.borrow_mut();
            state.subscribers += 1;
            state.subscribers == 1
        };
        if !first {
            return;
        }

        let mut listeners = Vec::with_capacity(self.inner.handlers.len());
        for (index, (event_type, _)) in self.inner.handlers.iter().enumerate() {
            let flags = if config::is_passive_event(event_type) {
                EventFlags::PASSIVE
            } else {
                EventFlags::empty()
            };
            let weak: Weak<Inner> = Rc::downgrade(&self.inner);
            listeners.push(dom::add_event_listener(self.inner.host, event_type, flags, move |event| {
                if let Some(inner) = weak.upgrade() {
                    Sensor { inner }.receive(index, event);
                }
            }));
        }

        let target_watch = match self.inner.ui.get(&self.inner.target_key) {
            Some(UiEntry::Collection(collection)) => Some(collection.watch()),
            _ => None,
        };

        let mut state = self.inner.state.borrow_mut();
        state.listeners = listeners;
        state.target_watch = target_watch;
        tracing::debug!(host = %self.inner.host, target = %self.inner.target_key, "sensor listeners installed");
    }

    fn deactivate(&self) {
        let (listeners, target_watch) = {
            let mut state = self.inner.state.borrow_mut();
            state.subscribers = state.subscribers.saturating_sub(1);
            if state.subscribers > 0 {
                return;
            }
            (std::mem::take(&mut state.listeners), state.target_watch.take())
        };
        for id in listeners {
            dom::remove_event_listener(id);
        }
        for (event_type, _) in &self.inner.handlers {
            if config::is_passive_event(event_type) {
                scheduler::current().cancel(&self.passive_key(event_type));
            }
        }
        drop(target_watch);
        tracing::debug!(host = %self.inner.host, target = %self.inner.target_key, "sensor listeners removed");
    }

    /// Dedupe key for deferred updates of one event type.
    fn passive_key(&self, event_type: &str) -> String {
        format!("sensor:{}:{}", self.inner.host, event_type)
    }

    /// Watched element containing the event origin, if any.
    fn locate(&self, origin: NodeId) -> Option<NodeId> {
        self.inner
            .ui
            .get(&self.inner.target_key)?
            .targets()
            .into_iter()
            .find(|target| dom::contains(*target, origin))
    }

    fn receive(&self, index: usize, event: &Event) {
        let Some(target) = event.target().and_then(|origin| self.locate(origin)) else {
            return;
        };
        event.stop_propagation();

        let event_type = event.event_type().to_string();
        if config::is_passive_event(&event_type) {
            let sensor = self.clone();
            let event = event.clone();
            let key = self.passive_key(&event_type);
            scheduler::schedule(Some(&key), move || {
                sensor.apply(index, &event, target);
                Ok(())
            });
        } else {
            self.apply(index, event, target);
        }
    }

    fn apply(&self, index: usize, event: &Event, target: NodeId) {
        let Some((_, handler)) = self.inner.handlers.get(index) else {
            return;
        };
        let previous = self.inner.current.borrow().clone();
        let next = handler(&SensorContext {
            event,
            ui: &self.inner.ui,
            target,
            previous: &previous,
        });
        if let Some(next) = next.filter(|next| *next != previous) {
            *self.inner.current.borrow_mut() = next.clone();
            self.inner.value.set(next);
        }
    }
}

impl Watchable for Sensor {
    fn watch_key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn watch(&self) -> Watch {
        self.activate();
        let sensor = self.clone();
        Watch::new(move || sensor.deactivate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::reset_collections;
    use crate::component::ui::Selection;
    use crate::platform::{reset_platform, run_until_idle};
    use crate::scheduler::reset_scheduler;
    use std::cell::Cell;

    struct Fixture {
        host: NodeId,
        outside: NodeId,
        items: Vec<NodeId>,
        ui: Rc<Ui>,
    }

    fn setup() -> Fixture {
        reset_platform();
        reset_scheduler();
        dom::reset_dom();
        reset_collections();
        config::reset_config();

        let body = dom::create_element("body");
        dom::append_child(dom::document(), body);
        let host = dom::create_element("my-list");
        dom::append_child(body, host);
        let outside = dom::create_element("p");
        dom::append_child(host, outside);
        let items: Vec<NodeId> = (0..3)
            .map(|i| {
                let li = dom::create_element("li");
                dom::set_attribute(li, "data-index", &i.to_string());
                dom::append_child(host, li);
                li
            })
            .collect();

        let s = Selection::new("my-list", host);
        let entries = vec![("items".to_string(), s.all("li", None).unwrap())];
        let ui = Rc::new(Ui::new("my-list", host, entries).unwrap());
        Fixture {
            host,
            outside,
            items,
            ui,
        }
    }

    fn index_handler() -> SensorHandler {
        Rc::new(|ctx: &SensorContext| {
            dom::get_attribute(ctx.target, "data-index")
                .and_then(|i| i.parse::<i64>().ok())
                .map(Value::Int)
        })
    }

    #[test]
    fn test_unknown_target_key() {
        let f = setup();
        let result = create_sensor(f.host, f.ui, Value::Null, "nope", vec![("click".into(), index_handler())]);
        assert!(matches!(result, Err(Error::InvalidUiKey { .. })));
    }

    #[test]
    fn test_lazy_listeners() {
        let f = setup();
        let sensor = create_sensor(f.host, f.ui, Value::Null, "items", vec![("click".into(), index_handler())]).unwrap();
        assert_eq!(dom::listener_count(f.host), 0);
        let watch = sensor.subscribe();
        assert_eq!(dom::listener_count(f.host), 1);
        assert!(sensor.is_listening());
        drop(watch);
        assert_eq!(dom::listener_count(f.host), 0);
    }

    #[test]
    fn test_updates_from_matching_target() {
        let f = setup();
        let sensor = create_sensor(f.host, f.ui, Value::Int(-1), "items", vec![("click".into(), index_handler())]).unwrap();
        let _watch = sensor.subscribe();

        dom::call_method(f.items[2], "click", None);
        assert_eq!(sensor.get(), Value::Int(2));
    }

    #[test]
    fn test_outside_events_keep_propagating() {
        let f = setup();
        let sensor = create_sensor(f.host, f.ui, Value::Int(-1), "items", vec![("click".into(), index_handler())]).unwrap();
        let _watch = sensor.subscribe();

        let reached_document = Rc::new(Cell::new(0));
        let r = reached_document.clone();
        dom::add_event_listener(dom::document(), "click", EventFlags::empty(), move |_| r.set(r.get() + 1));

        dom::call_method(f.outside, "click", None);
        assert_eq!(sensor.get(), Value::Int(-1));
        assert_eq!(reached_document.get(), 1);

        dom::call_method(f.items[0], "click", None);
        assert_eq!(sensor.get(), Value::Int(0));
        assert_eq!(reached_document.get(), 1);
    }

    #[test]
    fn test_passive_events_apply_after_frame() {
        let f = setup();
        let sensor = create_sensor(f.host, f.ui, Value::Int(-1), "items", vec![("scroll".into(), index_handler())]).unwrap();
        let _watch = sensor.subscribe();
        assert_eq!(dom::events::passive_listener_count(f.host), 1);

        dom::dispatch_event(f.items[1], &Event::bubbling("scroll"));
        assert_eq!(sensor.get(), Value::Int(-1));
        run_until_idle();
        assert_eq!(sensor.get(), Value::Int(1));
    }

    #[test]
    fn test_deactivate_drops_pending_passive_update() {
        let f = setup();
        let sensor = create_sensor(f.host, f.ui, Value::Int(-1), "items", vec![("scroll".into(), index_handler())]).unwrap();
        let watch = sensor.subscribe();

        dom::dispatch_event(f.items[2], &Event::bubbling("scroll"));
        assert!(crate::scheduler::current().is_pending(&format!("sensor:{}:scroll", f.host)));
        drop(watch);
        assert!(!crate::scheduler::current().is_pending(&format!("sensor:{}:scroll", f.host)));

        run_until_idle();
        assert_eq!(sensor.get(), Value::Int(-1));
    }
}
