//! Component instances - per-element lifecycle and property accessors.
//!
//! An instance moves through:
//!
//! ```text
//! Unattached -> Upgrading -> [WaitingForDependencies] -> Active -> Disconnected
//!                   ^                                                  |
//!                   +---------------------- reconnect -----------------+
//! ```
//!
//! Upgrading resolves the UI record and installs property accessors. If the
//! selection found undefined custom elements, the instance waits for their
//! definitions or the configured timeout, whichever comes first. Active runs
//! setup and installs the declared effects. Disconnect runs every cleanup
//! exactly once; property values survive and a reconnect resolves a fresh
//! UI record.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use spark_signals::untrack;
use tracing::{debug, error, warn};

use super::definition::{self, ComponentDefinition, EffectDeclaration, Initializer, attribute_name};
use super::ui::{Selection, Ui, UiEntry};
use crate::config;
use crate::deferred::{self, Deferred};
use crate::dom::{self, NodeId, custom_elements};
use crate::effects::{EffectContext, apply_to_entry};
use crate::error::{Error, Result};
use crate::platform::{self, TimerId};
use crate::reactive::Cell;
use crate::types::{Cleanup, FromValue, Value};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Unattached,
    Upgrading,
    WaitingForDependencies,
    Active,
    Disconnected,
}

/// Host-visible access to a property's backing cell.
#[derive(Clone)]
pub enum Accessor {
    ReadOnly(Rc<dyn Fn() -> Value>),
    Mutable {
        get: Rc<dyn Fn() -> Value>,
        set: Rc<dyn Fn(Value) -> bool>,
    },
}

impl Accessor {
    pub fn from_cell(cell: Cell) -> Self {
        if cell.is_mutable() {
            let reader = cell.clone();
            Accessor::Mutable {
                get: Rc::new(move || reader.get()),
                set: Rc::new(move |value| cell.set(value)),
            }
        } else {
            Accessor::ReadOnly(Rc::new(move || cell.get()))
        }
    }

    pub fn get(&self) -> Value {
        match self {
            Accessor::ReadOnly(get) | Accessor::Mutable { get, .. } => get(),
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, Accessor::Mutable { .. })
    }
}

struct Instance {
    definition: Rc<ComponentDefinition>,
    host: NodeId,
    state: RefCell<InstanceState>,
}

#[derive(Default)]
struct InstanceState {
    lifecycle: LifecycleState,
    /// Bumped on every connect and disconnect; stale async work compares it.
    epoch: u64,
    ui: Option<Rc<Ui>>,
    accessors: HashMap<String, Accessor>,
    cleanups: Vec<Cleanup>,
    timer: Option<TimerId>,
    diagnostics: Vec<Error>,
}

impl Instance {
    fn name(&self) -> &str {
        self.definition.name()
    }

    fn is_current(&self, epoch: u64, lifecycle: LifecycleState) -> bool {
        let state = self.state.borrow();
        state.epoch == epoch && state.lifecycle == lifecycle
    }

    fn accessor(&self, property: &str) -> Option<Accessor> {
        self.state.borrow().accessors.get(property).cloned()
    }

    fn report(&self, error: Error) {
        error!(
            component = self.name(),
            host = %dom::describe(self.host),
            %error,
            "component failed"
        );
        self.state.borrow_mut().diagnostics.push(error);
    }
}

thread_local! {
    static INSTANCES: RefCell<HashMap<NodeId, Rc<Instance>>> = RefCell::new(HashMap::new());
}

fn lookup(host: NodeId) -> Option<Rc<Instance>> {
    INSTANCES.with(|i| i.borrow().get(&host).cloned())
}

fn instance_for(definition: &Rc<ComponentDefinition>, host: NodeId) -> Rc<Instance> {
    INSTANCES.with(|i| {
        i.borrow_mut()
            .entry(host)
            .or_insert_with(|| {
                Rc::new(Instance {
                    definition: definition.clone(),
                    host,
                    state: RefCell::new(InstanceState::default()),
                })
            })
            .clone()
    })
}

fn not_a_component(host: NodeId) -> Error {
    Error::InvalidCustomElement {
        element: dom::describe(host),
        reason: "element is not a component instance".to_string(),
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Connect `host` using the definition registered for its tag.
pub fn connect(host: NodeId) -> Result<()> {
    let tag = dom::tag_name(host).unwrap_or_default();
    let definition = definition::definition(&tag).ok_or_else(|| Error::InvalidCustomElement {
        element: dom::describe(host),
        reason: "no component is defined for this tag".to_string(),
    })?;
    connect_with(&definition, host)
}

pub(crate) fn connect_with(definition: &Rc<ComponentDefinition>, host: NodeId) -> Result<()> {
    let instance = instance_for(definition, host);
    {
        let mut state = instance.state.borrow_mut();
        if matches!(
            state.lifecycle,
            LifecycleState::Upgrading | LifecycleState::WaitingForDependencies | LifecycleState::Active
        ) {
            return Ok(());
        }
        state.lifecycle = LifecycleState::Upgrading;
        state.epoch += 1;
    }
    debug!(component = instance.name(), host = %dom::describe(host), "connecting");

    if let Err(error) = upgrade(&instance) {
        teardown(&instance, LifecycleState::Unattached);
        instance.report(error.clone());
        return Err(error);
    }
    Ok(())
}

fn upgrade(instance: &Rc<Instance>) -> Result<()> {
    let selection = Selection::new(instance.name(), instance.host);
    let entries = instance.definition.select(&selection)?;
    let ui = Rc::new(Ui::new(instance.name(), instance.host, entries)?);
    install_properties(instance, &ui)?;
    instance.state.borrow_mut().ui = Some(ui);

    let pending = selection.dependencies();
    if pending.is_empty() {
        activate(instance)
    } else {
        wait_for_dependencies(instance, pending);
        Ok(())
    }
}

/// Create cells for properties that do not have one yet. Existing cells are
/// kept across reconnects.
fn install_properties(instance: &Instance, ui: &Rc<Ui>) -> Result<()> {
    for (name, initializer) in instance.definition.properties() {
        if instance.state.borrow().accessors.contains_key(name) {
            continue;
        }
        let cell = match initializer {
            Initializer::Value(value) => Cell::state(value.clone()),
            Initializer::Cell(cell) => cell.clone(),
            Initializer::Parser(parse) => {
                let raw = dom::get_attribute(instance.host, &attribute_name(name));
                Cell::state(parse(ui, raw.as_deref(), None))
            }
            Initializer::Factory(factory) => factory(ui)?,
        };
        instance
            .state
            .borrow_mut()
            .accessors
            .insert(name.clone(), Accessor::from_cell(cell));
    }
    Ok(())
}

fn wait_for_dependencies(instance: &Rc<Instance>, pending: Vec<String>) {
    let timeout_ms = config::current().dependency_timeout_ms();
    debug!(
        component = instance.name(),
        host = %dom::describe(instance.host),
        pending = ?pending,
        timeout_ms,
        "waiting for dependencies"
    );

    let ready: Deferred<bool> =
        deferred::all(pending.iter().map(|tag| custom_elements::when_defined(tag)).collect()).map(|_| true);
    let timed_out: Deferred<bool> = Deferred::new();
    let expire = timed_out.clone();
    let timer = platform::set_timeout(timeout_ms, move || {
        expire.resolve(false);
    });

    let epoch = {
        let mut state = instance.state.borrow_mut();
        state.lifecycle = LifecycleState::WaitingForDependencies;
        state.timer = Some(timer);
        state.epoch
    };

    let weak: Weak<Instance> = Rc::downgrade(instance);
    deferred::race(&ready, &timed_out).on_settle(move |result| {
        let Some(instance) = weak.upgrade() else {
            return;
        };
        if !instance.is_current(epoch, LifecycleState::WaitingForDependencies) {
            return;
        }
        if let Some(timer) = instance.state.borrow_mut().timer.take() {
            platform::clear_timeout(timer);
        }
        if matches!(result, Ok(false)) {
            let still_pending: Vec<String> = pending
                .iter()
                .filter(|tag| !custom_elements::is_defined(tag))
                .cloned()
                .collect();
            warn!(
                component = instance.name(),
                host = %dom::describe(instance.host),
                pending = ?still_pending,
                timeout_ms,
                "dependencies not defined in time, activating anyway"
            );
            instance.state.borrow_mut().diagnostics.push(Error::DependencyTimeout {
                component: instance.name().to_string(),
                pending: still_pending,
                timeout_ms,
            });
        }
        if let Err(error) = activate(&instance) {
            teardown(&instance, LifecycleState::Unattached);
            instance.report(error);
        }
    });
}

fn activate(instance: &Rc<Instance>) -> Result<()> {
    let (ui, epoch) = {
        let mut state = instance.state.borrow_mut();
        state.lifecycle = LifecycleState::Active;
        (state.ui.clone(), state.epoch)
    };
    let Some(ui) = ui else {
        return Ok(());
    };

    let effects = instance.definition.setup(&ui)?;
    let ctx = EffectContext {
        host: instance.host,
        component: instance.name().to_string(),
        ui: ui.clone(),
    };
    for (key, declaration) in effects.entries() {
        let entry = ui.require(key)?;
        install_declaration(instance, &ctx, key, entry, declaration.clone(), epoch)?;
    }
    debug!(component = instance.name(), host = %dom::describe(instance.host), "active");
    Ok(())
}

fn install_declaration(
    instance: &Rc<Instance>,
    ctx: &EffectContext,
    key: &str,
    entry: &UiEntry,
    declaration: EffectDeclaration,
    epoch: u64,
) -> Result<()> {
    let cleanup = match declaration {
        EffectDeclaration::Single(effect) => apply_to_entry(ctx, entry, vec![effect])?,
        EffectDeclaration::List(effects) => apply_to_entry(ctx, entry, effects)?,
        EffectDeclaration::Deferred(pending) => {
            let weak = Rc::downgrade(instance);
            let ctx = ctx.clone();
            let key = key.to_string();
            pending.on_settle(move |result| {
                let Some(instance) = weak.upgrade() else {
                    return;
                };
                if !instance.is_current(epoch, LifecycleState::Active) {
                    return;
                }
                let invalid = |reason: String| Error::InvalidEffects {
                    component: instance.name().to_string(),
                    reason,
                };
                let outcome = match result {
                    Ok(EffectDeclaration::Deferred(_)) => {
                        Err(invalid(format!("effects for `{key}` resolved to another deferred")))
                    }
                    Ok(declaration) => {
                        let ui = ctx.ui.clone();
                        ui.require(&key).and_then(|entry| {
                            install_declaration(&instance, &ctx, &key, entry, declaration.clone(), epoch)
                        })
                    }
                    Err(e) => Err(invalid(format!("effects for `{key}` failed to resolve: {e}"))),
                };
                if let Err(error) = outcome {
                    instance.report(error);
                }
            });
            return Ok(());
        }
    };
    instance.state.borrow_mut().cleanups.push(cleanup);
    Ok(())
}

/// Cancel pending work and run cleanups. Each cleanup runs once.
fn teardown(instance: &Instance, next: LifecycleState) {
    let (cleanups, timer) = {
        let mut state = instance.state.borrow_mut();
        state.lifecycle = next;
        state.epoch += 1;
        (std::mem::take(&mut state.cleanups), state.timer.take())
    };
    if let Some(timer) = timer {
        platform::clear_timeout(timer);
    }
    for cleanup in cleanups {
        cleanup();
    }
}

/// Tear down a connected instance. Idempotent.
pub fn disconnect(host: NodeId) {
    let Some(instance) = lookup(host) else {
        return;
    };
    let lifecycle = instance.state.borrow().lifecycle;
    if matches!(lifecycle, LifecycleState::Unattached | LifecycleState::Disconnected) {
        return;
    }
    teardown(&instance, LifecycleState::Disconnected);
    debug!(component = instance.name(), host = %dom::describe(host), "disconnected");
}

/// Re-parse a parser-backed property after its attribute changed.
///
/// Ignored before the instance has accessors, when the value did not change,
/// or when the property is read-only, as it is while a parent passes it.
/// A missing accessor is installed.
pub fn attribute_changed(host: NodeId, attribute: &str, old: Option<&str>, new: Option<&str>) {
    if old == new {
        return;
    }
    let Some(instance) = lookup(host) else {
        return;
    };
    let ui = {
        let state = instance.state.borrow();
        if matches!(state.lifecycle, LifecycleState::Unattached | LifecycleState::Upgrading) {
            return;
        }
        state.ui.clone()
    };
    let Some(ui) = ui else {
        return;
    };
    let Some(property) = instance.definition.property_for_attribute(attribute) else {
        return;
    };
    let Some(Initializer::Parser(parse)) = instance.definition.initializer(property) else {
        return;
    };
    match instance.accessor(property) {
        Some(Accessor::Mutable { set, .. }) => {
            set(parse(&ui, new, old));
        }
        Some(Accessor::ReadOnly(_)) => {
            debug!(component = instance.name(), property, "ignoring attribute change for read-only property");
        }
        None => {
            let cell = Cell::state(parse(&ui, new, old));
            instance
                .state
                .borrow_mut()
                .accessors
                .insert(property.to_string(), Accessor::from_cell(cell));
        }
    }
}

// =============================================================================
// Property access
// =============================================================================

/// Read a component property. Inside an effect this subscribes to it.
pub fn get_property(host: NodeId, name: &str) -> Result<Value> {
    let instance = lookup(host).ok_or_else(|| not_a_component(host))?;
    let accessor = instance.accessor(name).ok_or_else(|| Error::InvalidReactives {
        component: instance.name().to_string(),
        property: name.to_string(),
        reason: "no such property".to_string(),
    })?;
    Ok(accessor.get())
}

/// Write a component property. Derived and sensor-backed properties refuse.
pub fn set_property(host: NodeId, name: &str, value: Value) -> Result<()> {
    let instance = lookup(host).ok_or_else(|| not_a_component(host))?;
    match instance.accessor(name) {
        Some(Accessor::Mutable { set, .. }) => {
            set(value);
            Ok(())
        }
        Some(Accessor::ReadOnly(_)) => Err(Error::ReadOnlyProperty {
            component: instance.name().to_string(),
            property: name.to_string(),
        }),
        None => Err(Error::InvalidReactives {
            component: instance.name().to_string(),
            property: name.to_string(),
            reason: "no such property".to_string(),
        }),
    }
}

pub fn has_property(host: NodeId, name: &str) -> bool {
    lookup(host).is_some_and(|i| i.state.borrow().accessors.contains_key(name))
}

/// Read a component property without subscribing to it.
pub fn peek_property(host: NodeId, name: &str) -> Option<Value> {
    let accessor = lookup(host)?.accessor(name)?;
    Some(untrack(|| accessor.get()))
}

/// Writer for a property taken over by [`drive_property`].
pub type PropertyWriter = Rc<dyn Fn(Value) -> bool>;

/// Take over a mutable property so it follows an outside source.
///
/// Until the returned cleanup runs the property is read-only: host writes
/// fail with [`Error::ReadOnlyProperty`] and attribute changes are ignored.
/// Only the returned writer updates it. The backing cell stays the same, so
/// effects already reading the property keep following it.
pub fn drive_property(host: NodeId, name: &str) -> Result<(PropertyWriter, Cleanup)> {
    let instance = lookup(host).ok_or_else(|| not_a_component(host))?;
    let invalid = |reason: &str| Error::InvalidReactives {
        component: instance.name().to_string(),
        property: name.to_string(),
        reason: reason.to_string(),
    };
    let (get, set) = match instance.accessor(name) {
        Some(Accessor::Mutable { get, set }) => (get, set),
        Some(Accessor::ReadOnly(_)) => return Err(invalid("property is read-only")),
        None => return Err(invalid("no such property")),
    };
    instance
        .state
        .borrow_mut()
        .accessors
        .insert(name.to_string(), Accessor::ReadOnly(get.clone()));

    let weak = Rc::downgrade(&instance);
    let property = name.to_string();
    let writer = set.clone();
    let release: Cleanup = Box::new(move || {
        let Some(instance) = weak.upgrade() else {
            return;
        };
        let mut state = instance.state.borrow_mut();
        let driven = matches!(state.accessors.get(&property), Some(Accessor::ReadOnly(current)) if Rc::ptr_eq(current, &get));
        if driven {
            state.accessors.insert(property, Accessor::Mutable { get, set });
        }
    });
    Ok((writer, release))
}

/// `None` when the property does not exist.
pub fn is_mutable_property(host: NodeId, name: &str) -> Option<bool> {
    lookup(host)?.accessor(name).map(|a| a.is_mutable())
}

pub fn property_names(host: NodeId) -> Vec<String> {
    let Some(instance) = lookup(host) else {
        return Vec::new();
    };
    let mut names: Vec<String> = instance.state.borrow().accessors.keys().cloned().collect();
    names.sort();
    names
}

/// Whether `host` is an upgraded component with accessors installed.
pub fn is_component(host: NodeId) -> bool {
    lookup(host).is_some_and(|i| {
        matches!(
            i.state.borrow().lifecycle,
            LifecycleState::WaitingForDependencies | LifecycleState::Active | LifecycleState::Disconnected
        )
    })
}

pub fn lifecycle_state(host: NodeId) -> LifecycleState {
    lookup(host)
        .map(|i| i.state.borrow().lifecycle)
        .unwrap_or_default()
}

/// Errors recorded for an instance (timeouts, failed setup, bad effects).
pub fn diagnostics(host: NodeId) -> Vec<Error> {
    lookup(host)
        .map(|i| i.state.borrow().diagnostics.clone())
        .unwrap_or_default()
}

/// UI record of the current or most recent connection.
pub fn ui(host: NodeId) -> Option<Rc<Ui>> {
    lookup(host)?.state.borrow().ui.clone()
}

/// Drop every instance without running cleanups (for testing)
pub fn reset_instances() {
    let instances: Vec<Rc<Instance>> = INSTANCES.with(|i| i.borrow_mut().drain().map(|(_, v)| v).collect());
    drop(instances);
}

// =============================================================================
// Handle
// =============================================================================

/// Typed property access on a component element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentHandle {
    host: NodeId,
}

impl ComponentHandle {
    /// `None` unless `host` has a component instance.
    pub fn new(host: NodeId) -> Option<Self> {
        lookup(host).map(|_| Self { host })
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    /// Typed read; `None` when missing or of another type.
    pub fn get<T: FromValue>(&self, name: &str) -> Option<T> {
        get_property(self.host, name)
            .ok()
            .and_then(|v| T::from_value(&v))
    }

    pub fn get_value(&self, name: &str) -> Result<Value> {
        get_property(self.host, name)
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        set_property(self.host, name, value.into())
    }

    pub fn state(&self) -> LifecycleState {
        lifecycle_state(self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::definition::{Effects, component, reset_definitions};
    use crate::effects::{on, set_text, toggle_class};
    use crate::{collection, parsers, scheduler};
    use spark_signals::flush_sync;
    use std::cell::Cell as StdCell;

    fn setup() {
        dom::reset_dom();
        platform::reset_platform();
        config::reset_config();
        collection::reset_collections();
        scheduler::reset_scheduler();
        reset_definitions();
        reset_instances();
    }

    fn settle() {
        platform::run_until_idle();
        flush_sync();
    }

    fn mount(tag: &str, inner: &str) -> NodeId {
        let host = dom::create_element(tag);
        dom::set_inner_html(host, inner);
        dom::append_child(dom::document(), host);
        host
    }

    #[test]
    fn test_connect_installs_effects() {
        setup();
        let host = mount("x-label", "<span></span>");
        component("x-label")
            .prop("label", Value::from("hello"))
            .select(|s| Ok(vec![("text".to_string(), s.first("span", "renders the label")?)]))
            .setup(|_| Ok(Effects::new().add("text", set_text("label"))))
            .define()
            .unwrap();
        settle();

        assert_eq!(lifecycle_state(host), LifecycleState::Active);
        let span = dom::query(host, "span").unwrap().unwrap();
        assert_eq!(dom::text_content(span), "hello");

        set_property(host, "label", Value::from("bye")).unwrap();
        settle();
        assert_eq!(dom::text_content(span), "bye");
    }

    #[test]
    fn test_missing_element_aborts_connect() {
        setup();
        let host = mount("x-strict", "");
        component("x-strict")
            .select(|s| Ok(vec![("button".to_string(), s.first("button", "toggles")?)]))
            .define()
            .unwrap();

        assert_eq!(lifecycle_state(host), LifecycleState::Unattached);
        assert!(matches!(diagnostics(host).as_slice(), [Error::MissingElement { .. }]));
        assert!(connect(host).is_err());
    }

    #[test]
    fn test_unknown_effect_key() {
        setup();
        let host = mount("x-typo", "");
        component("x-typo")
            .setup(|_| Ok(Effects::new().add("missing", toggle_class("a", Value::Bool(true)))))
            .define()
            .unwrap();
        assert!(matches!(diagnostics(host).as_slice(), [Error::InvalidUiKey { .. }]));
    }

    #[test]
    fn test_parser_property_follows_attribute() {
        setup();
        let host = mount("x-flag", "");
        dom::set_attribute(host, "open", "");
        component("x-flag").prop("open", parsers::as_boolean()).define().unwrap();
        assert_eq!(get_property(host, "open").unwrap(), Value::Bool(true));

        dom::set_attribute(host, "open", "false");
        assert_eq!(get_property(host, "open").unwrap(), Value::Bool(false));
        dom::set_attribute(host, "open", "");
        dom::remove_attribute(host, "open");
        assert_eq!(get_property(host, "open").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_read_only_property() {
        setup();
        let host = mount("x-derived", "");
        component("x-derived")
            .prop("double", Cell::derived(|| Value::Int(4)))
            .define()
            .unwrap();

        assert_eq!(is_mutable_property(host, "double"), Some(false));
        assert!(matches!(
            set_property(host, "double", Value::Int(1)),
            Err(Error::ReadOnlyProperty { .. })
        ));
        assert_eq!(get_property(host, "double").unwrap(), Value::Int(4));
        assert!(matches!(get_property(host, "nope"), Err(Error::InvalidReactives { .. })));
    }

    #[test]
    fn test_disconnect_runs_cleanups_once() {
        setup();
        let host = mount("x-click", "<button></button>");
        let clicks = Rc::new(StdCell::new(0));
        let counter = clicks.clone();
        component("x-click")
            .prop("count", Value::Int(0))
            .select(|s| Ok(vec![("button".to_string(), s.first("button", "counts")?)]))
            .setup(move |_| {
                let counter = counter.clone();
                Ok(Effects::new().add(
                    "button",
                    on("click", move |_, _| {
                        counter.set(counter.get() + 1);
                        None
                    }),
                ))
            })
            .define()
            .unwrap();

        let button = dom::query(host, "button").unwrap().unwrap();
        dom::dispatch_event(button, &dom::Event::bubbling("click"));
        assert_eq!(clicks.get(), 1);

        dom::remove(host);
        disconnect(host);
        assert_eq!(lifecycle_state(host), LifecycleState::Disconnected);
        assert_eq!(dom::listener_count(button), 0);
        dom::dispatch_event(button, &dom::Event::bubbling("click"));
        assert_eq!(clicks.get(), 1);

        dom::append_child(dom::document(), host);
        assert_eq!(lifecycle_state(host), LifecycleState::Active);
        dom::dispatch_event(button, &dom::Event::bubbling("click"));
        assert_eq!(clicks.get(), 2);
    }

    #[test]
    fn test_properties_survive_reconnect() {
        setup();
        let host = mount("x-keep", "");
        component("x-keep").prop("count", Value::Int(0)).define().unwrap();
        set_property(host, "count", Value::Int(5)).unwrap();

        dom::remove(host);
        dom::append_child(dom::document(), host);
        assert_eq!(get_property(host, "count").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_deferred_effects() {
        setup();
        let host = mount("x-later", "");
        let pending: Deferred<EffectDeclaration> = Deferred::new();
        let declared = pending.clone();
        component("x-later")
            .prop("enabled", Value::Bool(true))
            .setup(move |_| Ok(Effects::new().add("host", declared.clone())))
            .define()
            .unwrap();
        settle();
        assert!(!dom::has_class(host, "ready"));

        pending.resolve(EffectDeclaration::Single(toggle_class("ready", "enabled")));
        settle();
        assert!(dom::has_class(host, "ready"));
    }

    #[test]
    fn test_nested_deferred_is_rejected() {
        setup();
        let host = mount("x-nested", "");
        let inner: Deferred<EffectDeclaration> = Deferred::new();
        let outer = Deferred::resolved(EffectDeclaration::Deferred(inner));
        component("x-nested")
            .setup(move |_| Ok(Effects::new().add("host", outer.clone())))
            .define()
            .unwrap();
        assert!(matches!(diagnostics(host).as_slice(), [Error::InvalidEffects { .. }]));
    }

    #[test]
    fn test_dependency_timeout() {
        setup();
        let host = mount("x-outer", "<x-inner></x-inner>");
        component("x-outer")
            .prop("ready", Value::Bool(true))
            .select(|s| Ok(vec![("inner".to_string(), s.first("x-inner", "wraps it")?)]))
            .setup(|_| Ok(Effects::new().add("host", toggle_class("ready", "ready"))))
            .define()
            .unwrap();
        assert_eq!(lifecycle_state(host), LifecycleState::WaitingForDependencies);
        assert!(!dom::has_class(host, "ready"));

        platform::advance_time(config::current().dependency_timeout_ms());
        settle();
        assert_eq!(lifecycle_state(host), LifecycleState::Active);
        assert!(dom::has_class(host, "ready"));
        match diagnostics(host).as_slice() {
            [Error::DependencyTimeout { pending, .. }] => assert_eq!(pending, &vec!["x-inner".to_string()]),
            other => panic!("unexpected diagnostics: {other:?}"),
        }
    }

    #[test]
    fn test_dependency_defined_in_time() {
        setup();
        let host = mount("x-outer", "<x-inner></x-inner>");
        component("x-outer")
            .select(|s| Ok(vec![("inner".to_string(), s.first("x-inner", "wraps it")?)]))
            .define()
            .unwrap();
        assert_eq!(lifecycle_state(host), LifecycleState::WaitingForDependencies);

        component("x-inner").define().unwrap();
        settle();
        assert_eq!(lifecycle_state(host), LifecycleState::Active);
        assert!(diagnostics(host).is_empty());
        assert_eq!(platform::pending_timer_count(), 0);
    }

    #[test]
    fn test_handle() {
        setup();
        let host = mount("x-handle", "");
        component("x-handle").prop("count", Value::Int(1)).define().unwrap();
        let handle = ComponentHandle::new(host).unwrap();
        assert_eq!(handle.get::<i64>("count"), Some(1));
        handle.set("count", 3i64).unwrap();
        assert_eq!(handle.get::<i64>("count"), Some(3));
        assert_eq!(handle.get::<String>("count"), None);
        assert_eq!(handle.state(), LifecycleState::Active);
        assert!(ComponentHandle::new(dom::create_element("div")).is_none());
    }

    #[test]
    fn test_peek_does_not_subscribe() {
        setup();
        let host = mount("x-peek", "");
        component("x-peek").prop("count", Value::Int(1)).define().unwrap();
        let runs = Rc::new(StdCell::new(0));
        let r = runs.clone();
        let stop = spark_signals::effect(move || {
            peek_property(host, "count");
            r.set(r.get() + 1);
        });
        flush_sync();
        assert_eq!(runs.get(), 1);

        set_property(host, "count", Value::Int(2)).unwrap();
        flush_sync();
        assert_eq!(runs.get(), 1);
        assert_eq!(peek_property(host, "count"), Some(Value::Int(2)));
        stop();
    }

    #[test]
    fn test_driven_property() {
        setup();
        let host = mount("x-driven", "");
        dom::set_attribute(host, "level", "2");
        component("x-driven").prop("level", parsers::as_integer(0)).define().unwrap();

        let (write, release) = drive_property(host, "level").unwrap();
        assert_eq!(is_mutable_property(host, "level"), Some(false));
        assert!(matches!(drive_property(host, "level"), Err(Error::InvalidReactives { .. })));
        assert!(matches!(drive_property(host, "nope"), Err(Error::InvalidReactives { .. })));

        write(Value::Int(7));
        dom::set_attribute(host, "level", "9");
        assert_eq!(get_property(host, "level").unwrap(), Value::Int(7));
        assert!(matches!(
            set_property(host, "level", Value::Int(1)),
            Err(Error::ReadOnlyProperty { .. })
        ));

        release();
        assert_eq!(is_mutable_property(host, "level"), Some(true));
        dom::set_attribute(host, "level", "3");
        assert_eq!(get_property(host, "level").unwrap(), Value::Int(3));
    }
}
