//! Effect constructors.
//!
//! Each returns an [`Effect`] ready to be declared against a UI key:
//!
//! ```ignore
//! Effects::new()
//!     .add("host", toggle_class("open", "expanded"))
//!     .add("label", set_text("label"))
//!     .add("button", on("click", |_, _| Some(vec![("expanded".into(), true.into())])))
//! ```

use std::rc::Rc;

use super::operations::{self, Operation, OperationKind};
use super::{Effect, EffectContext, Reactive, bind};
use crate::component::instance;
use crate::config;
use crate::dom::{self, Event, EventFlags, NodeId, custom_elements};
use crate::error::{Error, Result};
use crate::scheduler;
use crate::types::{Cleanup, Value};

fn binding(source: Reactive, op: Operation) -> Effect {
    Rc::new(move |ctx: &EffectContext, target: NodeId| Ok(bind(ctx, target, source.clone(), op.clone())))
}

/// Bind an attribute. Event handler names fail here, before anything is
/// declared.
pub fn set_attribute(name: &str, source: impl Into<Reactive>) -> Result<Effect> {
    Ok(binding(source.into(), operations::attribute(name)?))
}

/// Bind attribute presence to truthiness.
pub fn toggle_attribute(name: &str, source: impl Into<Reactive>) -> Result<Effect> {
    Ok(binding(source.into(), operations::boolean_attribute(name)?))
}

pub fn toggle_class(token: &str, source: impl Into<Reactive>) -> Effect {
    binding(source.into(), operations::class(token))
}

/// Bind an inline style property. `Null` removes it.
pub fn set_style(property: &str, source: impl Into<Reactive>) -> Effect {
    binding(source.into(), operations::style(property))
}

pub fn set_property(name: &str, source: impl Into<Reactive>) -> Effect {
    binding(source.into(), operations::property(name))
}

/// Visible while the source is truthy (drives `hidden`).
pub fn show(source: impl Into<Reactive>) -> Effect {
    let op = Operation::new(OperationKind::BooleanAttribute, "hidden", |el, value| {
        dom::toggle_attribute(el, "hidden", Some(!value.is_truthy()));
        Ok(())
    })
    .with_read(|el| Value::Bool(!dom::has_attribute(el, "hidden")));
    binding(source.into(), op)
}

pub fn set_text(source: impl Into<Reactive>) -> Effect {
    binding(source.into(), operations::text())
}

/// Replace inner markup. Scripts only run with `allow_scripts`.
pub fn dangerously_set_inner_html(source: impl Into<Reactive>, shadow: bool, allow_scripts: bool) -> Effect {
    binding(source.into(), operations::inner_markup(shadow, allow_scripts))
}

/// Invoke `name` with `arg` whenever the source becomes truthy.
pub fn call_method(name: &str, source: impl Into<Reactive>, arg: Option<Value>) -> Effect {
    binding(source.into(), operations::method(name, arg))
}

pub fn focus(source: impl Into<Reactive>) -> Effect {
    call_method("focus", source, None)
}

// =============================================================================
// Events
// =============================================================================

/// Event handler for [`on`]. Returned pairs are written to host properties.
pub type EventHandler = Rc<dyn Fn(&Event, NodeId) -> Option<Vec<(String, Value)>>>;

fn apply_updates(host: NodeId, updates: Option<Vec<(String, Value)>>) -> Result<()> {
    for (name, value) in updates.unwrap_or_default() {
        instance::set_property(host, &name, value)?;
    }
    Ok(())
}

/// Listen for `event_type` on the target.
///
/// Passive event types are handled on the next frame, coalesced per host and
/// event type. A pending update is dropped when the effect is cleaned up.
pub fn on<F>(event_type: &str, handler: F) -> Effect
where
    F: Fn(&Event, NodeId) -> Option<Vec<(String, Value)>> + 'static,
{
    let handler: EventHandler = Rc::new(handler);
    let event_type = event_type.to_string();
    Rc::new(move |ctx: &EffectContext, target: NodeId| {
        let passive = config::is_passive_event(&event_type);
        let flags = if passive { EventFlags::PASSIVE } else { EventFlags::empty() };
        let host = ctx.host;
        let handler = handler.clone();
        let key = format!("on:{host}:{event_type}");
        let pending_key = key.clone();

        let id = dom::add_event_listener(target, &event_type, flags, move |event| {
            if passive {
                let handler = handler.clone();
                let event = event.clone();
                scheduler::schedule(Some(&key), move || apply_updates(host, handler(&event, target)));
            } else if let Err(error) = apply_updates(host, handler(event, target)) {
                tracing::error!(
                    host = %dom::describe(host),
                    element = %dom::describe(target),
                    event = event.event_type(),
                    %error,
                    "event handler update failed"
                );
            }
        });
        let cleanup: Cleanup = Box::new(move || {
            dom::remove_event_listener(id);
            if passive {
                scheduler::current().cancel(&pending_key);
            }
        });
        Ok(cleanup)
    })
}

// =============================================================================
// Passing reactives to nested components
// =============================================================================

/// Drive properties of a nested component from host-side sources.
///
/// The target must be an upgraded component and every named property must
/// exist on it and be writable. While passed, a property is read-only on the
/// target: host writes fail and attribute changes are ignored. Cleanup makes
/// it writable again.
pub fn pass(props: Vec<(String, Reactive)>) -> Effect {
    let props = Rc::new(props);
    Rc::new(move |ctx: &EffectContext, target: NodeId| {
        let tag = dom::tag_name(target).unwrap_or_default();
        if custom_elements::validate_name(&tag).is_err() {
            return Err(Error::InvalidCustomElement {
                element: dom::describe(target),
                reason: "target is not a custom element".to_string(),
            });
        }
        if !instance::is_component(target) {
            return Err(Error::InvalidCustomElement {
                element: dom::describe(target),
                reason: "target has not been upgraded".to_string(),
            });
        }
        for (name, _) in props.iter() {
            let reason = match instance::is_mutable_property(target, name) {
                Some(true) => continue,
                Some(false) => "property is read-only",
                None => "no such property",
            };
            return Err(Error::InvalidReactives {
                component: tag,
                property: name.clone(),
                reason: reason.to_string(),
            });
        }

        let mut bindings: Vec<Cleanup> = Vec::with_capacity(props.len());
        let mut releases: Vec<Cleanup> = Vec::with_capacity(props.len());
        for (name, source) in props.iter() {
            let (writer, release) = match instance::drive_property(target, name) {
                Ok(driven) => driven,
                Err(error) => {
                    bindings.into_iter().for_each(|cleanup| cleanup());
                    releases.into_iter().for_each(|release| release());
                    return Err(error);
                }
            };
            let read_name = name.clone();
            let op = Operation::new(OperationKind::Property, name, move |_, value| {
                writer(value.clone());
                Ok(())
            })
            .with_read(move |el| instance::peek_property(el, &read_name).unwrap_or_default());
            bindings.push(bind(ctx, target, source.clone(), op));
            releases.push(release);
        }
        let cleanup: Cleanup = Box::new(move || {
            bindings.into_iter().for_each(|cleanup| cleanup());
            releases.into_iter().for_each(|release| release());
        });
        Ok(cleanup)
    })
}
