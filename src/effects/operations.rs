//! Operations - how to read, write and delete one facet of an element.

use std::fmt;
use std::rc::Rc;

use crate::component::instance;
use crate::dom::{self, NodeId, safety};
use crate::error::{Error, Result};
use crate::platform;
use crate::types::Value;

/// Facet an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Attribute,
    BooleanAttribute,
    Class,
    Style,
    Property,
    Text,
    InnerMarkup,
    Method,
}

impl OperationKind {
    /// Bring a resolved value into the form this facet stores, so it can be
    /// compared with what `read` returns.
    pub fn normalize(self, value: Value) -> Value {
        match self {
            OperationKind::Attribute
            | OperationKind::Style
            | OperationKind::Text
            | OperationKind::InnerMarkup => match value {
                Value::Null => Value::Null,
                other => Value::Str(other.to_string()),
            },
            OperationKind::BooleanAttribute | OperationKind::Class => Value::Bool(value.is_truthy()),
            OperationKind::Property | OperationKind::Method => value,
        }
    }
}

pub type ReadFn = Rc<dyn Fn(NodeId) -> Value>;
pub type WriteFn = Rc<dyn Fn(NodeId, &Value) -> Result<()>>;
pub type DeleteFn = Rc<dyn Fn(NodeId) -> Result<()>>;
pub type SuccessHook = Rc<dyn Fn(NodeId)>;
pub type FailHook = Rc<dyn Fn(NodeId, &Error)>;

/// Descriptor the effect engine drives.
#[derive(Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: String,
    read: Option<ReadFn>,
    write: WriteFn,
    delete: Option<DeleteFn>,
    on_success: Option<SuccessHook>,
    on_fail: Option<FailHook>,
}

impl Operation {
    pub fn new<W>(kind: OperationKind, name: &str, write: W) -> Self
    where
        W: Fn(NodeId, &Value) -> Result<()> + 'static,
    {
        Self {
            kind,
            name: name.to_string(),
            read: None,
            write: Rc::new(write),
            delete: None,
            on_success: None,
            on_fail: None,
        }
    }

    pub fn with_read<R>(mut self, read: R) -> Self
    where
        R: Fn(NodeId) -> Value + 'static,
    {
        self.read = Some(Rc::new(read));
        self
    }

    pub fn with_delete<D>(mut self, delete: D) -> Self
    where
        D: Fn(NodeId) -> Result<()> + 'static,
    {
        self.delete = Some(Rc::new(delete));
        self
    }

    /// Called after every write or delete that changed the element.
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(NodeId) + 'static,
    {
        self.on_success = Some(Rc::new(hook));
        self
    }

    /// Called when a write or delete fails.
    pub fn on_fail<F>(mut self, hook: F) -> Self
    where
        F: Fn(NodeId, &Error) + 'static,
    {
        self.on_fail = Some(Rc::new(hook));
        self
    }

    pub fn has_read(&self) -> bool {
        self.read.is_some()
    }

    pub fn can_delete(&self) -> bool {
        self.delete.is_some()
    }

    /// Current facet value; `Null` for operations without a read.
    pub fn read(&self, target: NodeId) -> Value {
        self.read.as_ref().map(|read| read(target)).unwrap_or_default()
    }

    pub fn write(&self, target: NodeId, value: &Value) -> Result<()> {
        (self.write)(target, value)
    }

    pub fn delete(&self, target: NodeId) -> Result<()> {
        match &self.delete {
            Some(delete) => delete(target),
            None => Ok(()),
        }
    }

    pub(crate) fn succeeded(&self, target: NodeId) {
        if let Some(hook) = &self.on_success {
            hook(target);
        }
    }

    pub(crate) fn failed(&self, target: NodeId, error: &Error) {
        if let Some(hook) = &self.on_fail {
            hook(target, error);
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("deletes", &self.can_delete())
            .finish()
    }
}

fn optional_string(value: Option<String>) -> Value {
    value.map(Value::Str).unwrap_or_default()
}

// =============================================================================
// Per-kind operations
// =============================================================================

/// Attribute value. Event handler names are rejected here, unsafe values
/// when written.
pub fn attribute(name: &str) -> Result<Operation> {
    if safety::is_event_handler_name(name) {
        return Err(Error::UnsafeAttribute {
            name: name.to_string(),
            reason: "event handler attributes cannot be bound".to_string(),
        });
    }
    let attr = name.to_string();
    let read_attr = attr.clone();
    let delete_attr = attr.clone();
    Ok(Operation::new(OperationKind::Attribute, name, move |el, value| {
        safety::safe_set_attribute(el, &attr, &value.to_string())
    })
    .with_read(move |el| optional_string(dom::get_attribute(el, &read_attr)))
    .with_delete(move |el| {
        dom::remove_attribute(el, &delete_attr);
        Ok(())
    }))
}

/// Attribute presence.
pub fn boolean_attribute(name: &str) -> Result<Operation> {
    if safety::is_event_handler_name(name) {
        return Err(Error::UnsafeAttribute {
            name: name.to_string(),
            reason: "event handler attributes cannot be bound".to_string(),
        });
    }
    let attr = name.to_string();
    let read_attr = attr.clone();
    Ok(Operation::new(OperationKind::BooleanAttribute, name, move |el, value| {
        dom::toggle_attribute(el, &attr, Some(value.is_truthy()));
        Ok(())
    })
    .with_read(move |el| Value::Bool(dom::has_attribute(el, &read_attr))))
}

/// Class token membership.
pub fn class(token: &str) -> Operation {
    let write_token = token.to_string();
    let read_token = token.to_string();
    Operation::new(OperationKind::Class, token, move |el, value| {
        dom::toggle_class(el, &write_token, Some(value.is_truthy()));
        Ok(())
    })
    .with_read(move |el| Value::Bool(dom::has_class(el, &read_token)))
}

/// Inline style property.
pub fn style(property: &str) -> Operation {
    let prop = property.to_string();
    let read_prop = prop.clone();
    let delete_prop = prop.clone();
    Operation::new(OperationKind::Style, property, move |el, value| {
        dom::set_style(el, &prop, &value.to_string());
        Ok(())
    })
    .with_read(move |el| optional_string(dom::get_style(el, &read_prop)))
    .with_delete(move |el| {
        dom::remove_style(el, &delete_prop);
        Ok(())
    })
}

/// Element property. Component properties go through their accessor.
pub fn property(name: &str) -> Operation {
    let write_name = name.to_string();
    let read_name = name.to_string();
    Operation::new(OperationKind::Property, name, move |el, value| {
        if instance::has_property(el, &write_name) {
            instance::set_property(el, &write_name, value.clone())
        } else {
            dom::set_property(el, &write_name, value.clone());
            Ok(())
        }
    })
    .with_read(move |el| {
        if instance::has_property(el, &read_name) {
            instance::peek_property(el, &read_name).unwrap_or_default()
        } else {
            dom::get_property(el, &read_name).unwrap_or_default()
        }
    })
}

/// Text content. Comment children survive writes.
pub fn text() -> Operation {
    Operation::new(OperationKind::Text, "textContent", |el, value| {
        dom::set_text(el, &value.to_string());
        Ok(())
    })
    .with_read(|el| Value::Str(dom::text_content(el)))
}

/// Attributes copied onto re-created script elements. Everything else,
/// handlers in particular, is dropped.
const SCRIPT_ATTRIBUTE_SAFELIST: &[&str] = &[
    "type",
    "src",
    "async",
    "defer",
    "nomodule",
    "crossorigin",
    "integrity",
    "referrerpolicy",
    "nonce",
    "id",
    "class",
];

/// Inner markup, optionally of the shadow root. With `allow_scripts`, script
/// elements in the new markup are re-created and handed to the platform's
/// script runner.
pub fn inner_markup(shadow: bool, allow_scripts: bool) -> Operation {
    let name = if shadow { "shadowRoot.innerHTML" } else { "innerHTML" };
    Operation::new(OperationKind::InnerMarkup, name, move |el, value| {
        let root = if shadow {
            dom::attach_shadow(el).ok_or_else(|| Error::InvalidCustomElement {
                element: dom::describe(el),
                reason: "cannot attach a shadow root".to_string(),
            })?
        } else {
            el
        };
        dom::set_inner_html(root, &value.to_string());
        if allow_scripts {
            rerun_scripts(root);
        }
        Ok(())
    })
    .with_read(move |el| {
        let root = if shadow { dom::shadow_root(el) } else { Some(el) };
        Value::Str(root.map(dom::inner_html).unwrap_or_default())
    })
}

fn rerun_scripts(root: NodeId) {
    let scripts = dom::tree::descendants(root)
        .into_iter()
        .filter(|n| dom::tag_name(*n).as_deref() == Some("script"));
    for script in scripts {
        let Some(parent) = dom::parent(script) else { continue };
        let fresh = dom::create_element("script");
        for name in dom::attribute_names(script) {
            if !SCRIPT_ATTRIBUTE_SAFELIST.contains(&name.as_str()) {
                continue;
            }
            let value = dom::get_attribute(script, &name).unwrap_or_default();
            if let Err(error) = safety::safe_set_attribute(fresh, &name, &value) {
                tracing::warn!(%error, "dropped script attribute");
            }
        }
        let body = dom::text_content(script);
        if !body.is_empty() {
            dom::append_child(fresh, dom::create_text(&body));
        }
        dom::insert_before(parent, fresh, Some(script));
        dom::remove(script);
        if !platform::run_script(fresh) {
            tracing::debug!("no script runner installed, script not executed");
        }
    }
}

/// Call a method whenever the source turns truthy.
pub fn method(name: &str, arg: Option<Value>) -> Operation {
    let method = name.to_string();
    Operation::new(OperationKind::Method, name, move |el, value| {
        if !value.is_truthy() {
            return Ok(());
        }
        match dom::call_method(el, &method, arg.clone()) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidCustomElement {
                element: dom::describe(el),
                reason: format!("has no method `{method}`"),
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::reset_dom;
    use std::cell::RefCell;

    fn element() -> NodeId {
        reset_dom();
        let el = dom::create_element("div");
        dom::append_child(dom::document(), el);
        el
    }

    #[test]
    fn test_attribute_rejects_handlers() {
        assert!(matches!(attribute("onclick"), Err(Error::UnsafeAttribute { .. })));
        assert!(matches!(boolean_attribute("onload"), Err(Error::UnsafeAttribute { .. })));
    }

    #[test]
    fn test_attribute_rejects_script_urls_synchronously() {
        let el = element();
        let op = attribute("href").unwrap();
        assert!(op.write(el, &Value::from("javascript:alert(1)")).is_err());
        assert!(!dom::has_attribute(el, "href"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(OperationKind::Attribute.normalize(Value::Int(3)), Value::from("3"));
        assert_eq!(OperationKind::Class.normalize(Value::from("x")), Value::Bool(true));
        assert_eq!(OperationKind::Property.normalize(Value::Int(3)), Value::Int(3));
    }

    #[test]
    fn test_read_write_pairs() {
        let el = element();
        let op = boolean_attribute("disabled").unwrap();
        op.write(el, &Value::Bool(true)).unwrap();
        assert_eq!(op.read(el), Value::Bool(true));

        let op = style("width");
        op.write(el, &Value::from("10px")).unwrap();
        assert_eq!(op.read(el), Value::from("10px"));
        op.delete(el).unwrap();
        assert_eq!(op.read(el), Value::Null);

        let op = property("value");
        op.write(el, &Value::Int(5)).unwrap();
        assert_eq!(op.read(el), Value::Int(5));
    }

    #[test]
    fn test_inner_markup_shadow() {
        let el = element();
        let op = inner_markup(true, false);
        assert_eq!(op.read(el), Value::from(""));
        op.write(el, &Value::from("<b>x</b>")).unwrap();
        assert_eq!(op.read(el), Value::from("<b>x</b>"));
        assert!(dom::children(el).is_empty());
    }

    #[test]
    fn test_scripts_recreated_with_safelisted_attributes() {
        let el = element();
        crate::platform::reset_platform();
        let ran = Rc::new(RefCell::new(Vec::new()));
        let r = ran.clone();
        platform::set_script_runner(move |script| r.borrow_mut().push(script));

        let op = inner_markup(false, true);
        op.write(
            el,
            &Value::from(r#"<script type="module" onload="steal()" data-x="1">run()</script>"#),
        )
        .unwrap();

        let script = dom::children(el)[0];
        assert_eq!(*ran.borrow(), vec![script]);
        assert_eq!(dom::attribute_names(script), vec!["type"]);
        assert_eq!(dom::text_content(script), "run()");
    }

    #[test]
    fn test_method() {
        let el = element();
        let op = method("focus", None);
        op.write(el, &Value::Bool(false)).unwrap();
        assert_eq!(dom::focused(), None);
        op.write(el, &Value::Bool(true)).unwrap();
        assert_eq!(dom::focused(), Some(el));
        assert!(method("explode", None).write(el, &Value::Bool(true)).is_err());
    }
}
