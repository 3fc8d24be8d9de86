//! Effects - keep one facet of one element in step with one reactive value.
//!
//! [`bind`] is the engine every effect goes through:
//!
//! 1. Read the facet once before the first run; that is the fallback.
//! 2. On each run resolve the source. No value (`Null` or pending) means
//!    "delete" when the operation can delete; a failed resolution, or no
//!    value without a delete, falls back.
//! 3. Write only when the new value differs from what the element holds now.
//!    Writing the same value twice therefore mutates the element once, and an
//!    observer reacting to our own write cannot loop.
//! 4. Failures are caught, logged with host/element/operation context and
//!    handed to the operation's `on_fail` hook. They never reach the reactive
//!    graph or sibling effects.
//!
//! The effect constructors in [`bindings`] build on it: `set_attribute`,
//! `toggle_class`, `set_text`, `on`, `pass`, ...

pub mod bindings;
pub mod operations;

use std::cell::{Cell as StdCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use spark_signals::effect;

use crate::collection::ElementChanges;
use crate::component::instance;
use crate::component::ui::{Ui, UiEntry};
use crate::dom::{self, NodeId};
use crate::error::{Error, Result};
use crate::reactive::{Cell, SharedWatchSet, with_frame};
use crate::types::{Cleanup, Value, noop_cleanup};

pub use bindings::{
    EventHandler, call_method, dangerously_set_inner_html, focus, on, pass, set_attribute,
    set_property, set_style, set_text, show, toggle_attribute, toggle_class,
};
pub use operations::{Operation, OperationKind};

// =============================================================================
// Types
// =============================================================================

/// Where an effect is running.
#[derive(Clone)]
pub struct EffectContext {
    pub host: NodeId,
    pub component: String,
    pub ui: Rc<Ui>,
}

/// Installs itself on a target element and returns its cleanup.
pub type Effect = Rc<dyn Fn(&EffectContext, NodeId) -> Result<Cleanup>>;

/// Outcome of resolving a source.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Value(Value),
    /// Not available yet.
    Pending,
    Failed(Error),
}

pub type Getter = Rc<dyn Fn(NodeId) -> Resolution>;

/// A source an effect can follow.
#[derive(Clone)]
pub enum Reactive {
    Cell(Cell),
    /// Named property of the host component.
    Property(String),
    /// Per-target computation.
    Getter(Getter),
    Static(Value),
}

impl Reactive {
    pub fn property(name: &str) -> Self {
        Reactive::Property(name.to_string())
    }

    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(NodeId) -> Resolution + 'static,
    {
        Reactive::Getter(Rc::new(f))
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Reactive::Static(value.into())
    }

    pub fn resolve(&self, ctx: &EffectContext, target: NodeId) -> Resolution {
        match self {
            Reactive::Cell(cell) => Resolution::Value(cell.get()),
            Reactive::Property(name) => match instance::get_property(ctx.host, name) {
                Ok(value) => Resolution::Value(value),
                Err(e) => Resolution::Failed(e),
            },
            Reactive::Getter(getter) => getter(target),
            Reactive::Static(value) => Resolution::Value(value.clone()),
        }
    }
}

impl From<Cell> for Reactive {
    fn from(cell: Cell) -> Self {
        Reactive::Cell(cell)
    }
}

/// A string names a host property.
impl From<&str> for Reactive {
    fn from(name: &str) -> Self {
        Reactive::property(name)
    }
}

impl From<Value> for Reactive {
    fn from(value: Value) -> Self {
        Reactive::Static(value)
    }
}

// =============================================================================
// Running-effect tracking
// =============================================================================

thread_local! {
    static RUNNING_DEPTH: StdCell<usize> = const { StdCell::new(0) };
}

/// Whether an effect body is executing on this thread right now.
pub fn is_running_effect() -> bool {
    RUNNING_DEPTH.with(|d| d.get() > 0)
}

fn running<R>(f: impl FnOnce() -> R) -> R {
    RUNNING_DEPTH.with(|d| d.set(d.get() + 1));
    let result = f();
    RUNNING_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    result
}

// =============================================================================
// Engine
// =============================================================================

/// Bind `source` to `op` on `target`. The binding lives until the returned
/// cleanup runs.
pub fn bind(ctx: &EffectContext, target: NodeId, source: Reactive, op: Operation) -> Cleanup {
    let fallback = op.read(target);
    let watches: SharedWatchSet = Rc::default();

    let ctx = ctx.clone();
    let held = watches.clone();
    let stop = effect(move || {
        // Sources read by this run are watched before the previous run's
        // watches are released, so sources still in use never deactivate.
        let frame: SharedWatchSet = Rc::default();
        with_frame(&frame, || running(|| run_once(&ctx, target, &source, &op, &fallback)));
        let current = std::mem::take(&mut *frame.borrow_mut());
        let previous = std::mem::replace(&mut *held.borrow_mut(), current);
        drop(previous);
    });

    Box::new(move || {
        stop();
        watches.borrow_mut().clear();
    })
}

fn run_once(ctx: &EffectContext, target: NodeId, source: &Reactive, op: &Operation, fallback: &Value) {
    let mut value = match source.resolve(ctx, target) {
        Resolution::Value(value) => value,
        Resolution::Pending => Value::Null,
        Resolution::Failed(error) => {
            tracing::debug!(
                host = %dom::describe(ctx.host),
                element = %dom::describe(target),
                operation = ?op.kind,
                name = %op.name,
                error = %error,
                "source failed to resolve, using fallback"
            );
            fallback.clone()
        }
    };

    let outcome = if value.is_null() && op.can_delete() {
        if op.has_read() && op.read(target).is_null() {
            Ok(false)
        } else {
            op.delete(target).map(|_| true)
        }
    } else {
        if value.is_null() {
            value = fallback.clone();
        }
        let next = op.kind.normalize(value);
        if op.has_read() && op.read(target) == next {
            Ok(false)
        } else {
            op.write(target, &next).map(|_| true)
        }
    };

    match outcome {
        Ok(true) => op.succeeded(target),
        Ok(false) => {}
        Err(error) => {
            tracing::error!(
                host = %dom::describe(ctx.host),
                element = %dom::describe(target),
                operation = ?op.kind,
                name = %op.name,
                error = %error,
                "effect failed"
            );
            op.failed(target, &error);
        }
    }
}

// =============================================================================
// Applying effects to UI entries
// =============================================================================

fn install_all(ctx: &EffectContext, target: NodeId, effects: &[Effect]) -> Result<Vec<Cleanup>> {
    let mut cleanups = Vec::with_capacity(effects.len());
    for effect in effects {
        match effect(ctx, target) {
            Ok(cleanup) => cleanups.push(cleanup),
            Err(e) => {
                for cleanup in cleanups {
                    cleanup();
                }
                return Err(e);
            }
        }
    }
    Ok(cleanups)
}

fn run_cleanups(cleanups: Vec<Cleanup>) {
    for cleanup in cleanups {
        cleanup();
    }
}

/// Install `effects` on every element of a UI entry.
///
/// For a collection, members that join later get fresh effects and members
/// that leave have theirs cleaned up.
pub fn apply_to_entry(ctx: &EffectContext, entry: &UiEntry, effects: Vec<Effect>) -> Result<Cleanup> {
    match entry {
        UiEntry::Element(None) => Ok(noop_cleanup()),
        UiEntry::Element(Some(target)) => {
            let cleanups = install_all(ctx, *target, &effects)?;
            Ok(Box::new(move || run_cleanups(cleanups)))
        }
        UiEntry::Collection(collection) => {
            let members: Rc<RefCell<HashMap<NodeId, Vec<Cleanup>>>> = Rc::default();
            let effects = Rc::new(effects);

            let listener_ctx = ctx.clone();
            let listener_members = members.clone();
            let listener_effects = effects.clone();
            let watch = collection.subscribe(move |changes: &ElementChanges| {
                for removed in &changes.removed {
                    let cleanups = listener_members.borrow_mut().remove(removed);
                    if let Some(cleanups) = cleanups {
                        run_cleanups(cleanups);
                    }
                }
                for added in &changes.added {
                    match install_all(&listener_ctx, *added, &listener_effects) {
                        Ok(cleanups) => {
                            listener_members.borrow_mut().insert(*added, cleanups);
                        }
                        Err(error) => tracing::error!(
                            host = %dom::describe(listener_ctx.host),
                            element = %dom::describe(*added),
                            error = %error,
                            "failed to install effects on new collection member"
                        ),
                    }
                }
            });

            for member in collection.peek() {
                let cleanups = install_all(ctx, member, &effects)?;
                members.borrow_mut().insert(member, cleanups);
            }

            Ok(Box::new(move || {
                drop(watch);
                let all: Vec<Vec<Cleanup>> = members.borrow_mut().drain().map(|(_, c)| c).collect();
                for cleanups in all {
                    run_cleanups(cleanups);
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::reset_collections;
    use crate::component::ui::Selection;
    use crate::platform::{reset_platform, run_microtasks};
    use spark_signals::flush_sync;

    fn setup() -> (EffectContext, NodeId) {
        reset_platform();
        dom::reset_dom();
        reset_collections();
        let host = dom::create_element("my-host");
        dom::append_child(dom::document(), host);
        let target = dom::create_element("div");
        dom::append_child(host, target);
        let ui = Rc::new(Ui::new("my-host", host, Vec::new()).unwrap());
        (
            EffectContext {
                host,
                component: "my-host".into(),
                ui,
            },
            target,
        )
    }

    fn counting(op: Operation) -> (Operation, Rc<StdCell<u32>>) {
        let writes = Rc::new(StdCell::new(0));
        let w = writes.clone();
        (op.on_success(move |_| w.set(w.get() + 1)), writes)
    }

    #[test]
    fn test_idempotent_writes() {
        let (ctx, target) = setup();
        let source = Cell::state("a");
        let (op, writes) = counting(operations::attribute("title").unwrap());
        let cleanup = bind(&ctx, target, source.clone().into(), op);
        flush_sync();
        assert_eq!(dom::get_attribute(target, "title").as_deref(), Some("a"));
        assert_eq!(writes.get(), 1);

        source.set("b");
        flush_sync();
        source.set("b");
        flush_sync();
        assert_eq!(writes.get(), 2);

        // Element already holds the value: no write.
        dom::set_attribute(target, "title", "c");
        source.set("c");
        flush_sync();
        assert_eq!(writes.get(), 2);
        cleanup();
    }

    #[test]
    fn test_deletion_sentinel() {
        let (ctx, target) = setup();
        let source = Cell::state("red");
        let cleanup = bind(&ctx, target, source.clone().into(), operations::style("color"));
        flush_sync();
        assert_eq!(dom::get_style(target, "color").as_deref(), Some("red"));

        source.set(Value::Null);
        flush_sync();
        assert_eq!(dom::get_style(target, "color"), None);
        cleanup();
    }

    #[test]
    fn test_failed_resolution_falls_back() {
        let (ctx, target) = setup();
        dom::set_text(target, "original");
        let fail = Rc::new(StdCell::new(false));
        let f = fail.clone();
        let trigger = Cell::state(0);
        let t = trigger.clone();
        let source = Reactive::getter(move |_| {
            t.get();
            if f.get() {
                Resolution::Failed(Error::InvalidReactives {
                    component: "my-host".into(),
                    property: "text".into(),
                    reason: "boom".into(),
                })
            } else {
                Resolution::Value(Value::from("live"))
            }
        });
        let cleanup = bind(&ctx, target, source, operations::text());
        flush_sync();
        assert_eq!(dom::text_content(target), "live");

        fail.set(true);
        trigger.set(1);
        flush_sync();
        assert_eq!(dom::text_content(target), "original");
        cleanup();
    }

    #[test]
    fn test_write_failure_reaches_on_fail() {
        let (ctx, target) = setup();
        let failures = Rc::new(RefCell::new(Vec::new()));
        let f = failures.clone();
        let op = operations::attribute("href")
            .unwrap()
            .on_fail(move |_, e| f.borrow_mut().push(e.clone()));
        let cleanup = bind(&ctx, target, Reactive::value("javascript:alert(1)"), op);
        flush_sync();
        assert!(!dom::has_attribute(target, "href"));
        assert!(matches!(failures.borrow()[0], Error::UnsafeAttribute { .. }));
        cleanup();
    }

    #[test]
    fn test_cleanup_stops_updates() {
        let (ctx, target) = setup();
        let source = Cell::state(true);
        let cleanup = bind(&ctx, target, source.clone().into(), operations::class("active"));
        flush_sync();
        assert!(dom::has_class(target, "active"));
        cleanup();
        source.set(false);
        flush_sync();
        assert!(dom::has_class(target, "active"));
    }

    #[test]
    fn test_collection_members_follow_changes() {
        let (ctx, _) = setup();
        let host = ctx.host;
        let first = dom::create_element("li");
        dom::append_child(host, first);
        let entry = Selection::new("my-host", host).all("li", None).unwrap();

        let effect: Effect = Rc::new(|ctx: &EffectContext, target: NodeId| Ok(bind(ctx, target, Reactive::value(true), operations::class("seen"))));
        let cleanup = apply_to_entry(&ctx, &entry, vec![effect]).unwrap();
        flush_sync();
        assert!(dom::has_class(first, "seen"));

        let second = dom::create_element("li");
        dom::append_child(host, second);
        run_microtasks();
        assert!(dom::has_class(second, "seen"));

        cleanup();
        assert_eq!(dom::observer_count(), 0);
    }

    #[test]
    fn test_sources_no_longer_read_are_released() {
        let (ctx, target) = setup();
        let host = ctx.host;
        dom::append_child(host, dom::create_element("li"));
        let items = crate::collection::Collection::new(host, "li").unwrap();
        let counting_items = Cell::state(true);

        let reader = items.clone();
        let flag = counting_items.clone();
        let source = Reactive::getter(move |_| {
            if flag.get().is_truthy() {
                Resolution::Value(Value::Int(reader.len() as i64))
            } else {
                Resolution::Value(Value::Int(-1))
            }
        });
        let cleanup = bind(&ctx, target, source, operations::property("count"));
        flush_sync();
        assert!(items.is_observing());
        assert_eq!(dom::get_property(target, "count"), Some(Value::Int(1)));

        counting_items.set(false);
        flush_sync();
        assert_eq!(dom::get_property(target, "count"), Some(Value::Int(-1)));
        assert!(!items.is_observing());
        assert_eq!(dom::observer_count(), 0);

        counting_items.set(true);
        flush_sync();
        assert!(items.is_observing());
        cleanup();
        assert!(!items.is_observing());
    }

    #[test]
    fn test_reruns_keep_sources_still_read() {
        let (ctx, target) = setup();
        let host = ctx.host;
        let items = crate::collection::Collection::new(host, "li").unwrap();
        let tick = Cell::state(0);

        let reader = items.clone();
        let counter = tick.clone();
        let source = Reactive::getter(move |_| {
            counter.get();
            Resolution::Value(Value::Int(reader.len() as i64))
        });
        let cleanup = bind(&ctx, target, source, operations::property("count"));
        flush_sync();
        assert_eq!(dom::observer_count(), 1);

        tick.set(1);
        flush_sync();
        assert!(items.is_observing());
        assert_eq!(dom::observer_count(), 1);
        cleanup();
    }
}
