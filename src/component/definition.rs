//! Component definitions - name, properties, UI selection and setup.
//!
//! ```ignore
//! component("my-counter")
//!     .prop("count", parsers::as_integer(0))
//!     .select(|s| Ok(vec![("label".into(), s.first("span", "shows the count")?)]))
//!     .setup(|_ui| Ok(Effects::new().add("label", set_text("count"))))
//!     .define()?;
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::instance;
use super::ui::{Selection, Ui, UiEntry};
use crate::deferred::Deferred;
use crate::dom::{self, ElementLifecycle, NodeId, custom_elements};
use crate::effects::{self, Effect};
use crate::error::{Error, Result};
use crate::parsers::AttributeParser;
use crate::platform;
use crate::reactive::Cell;
use crate::types::Value;

/// Names that can never be component properties.
const RESERVED_PROPERTIES: &[&str] = &["constructor", "prototype", "__proto__", "toString", "valueOf"];

/// Built-in element properties a component property would shadow.
const BUILTIN_PROPERTIES: &[&str] = &[
    "id",
    "class",
    "className",
    "classList",
    "style",
    "hidden",
    "title",
    "lang",
    "dir",
    "slot",
    "part",
    "tabIndex",
    "tagName",
    "nodeName",
    "nodeType",
    "attributes",
    "children",
    "parentNode",
    "shadowRoot",
    "innerHTML",
    "outerHTML",
    "innerText",
    "textContent",
];

pub type FactoryFn = Rc<dyn Fn(&Rc<Ui>) -> Result<Cell>>;
pub type SelectFn = Rc<dyn Fn(&Selection) -> Result<Vec<(String, UiEntry)>>>;
pub type SetupFn = Rc<dyn Fn(&Rc<Ui>) -> Result<Effects>>;

// =============================================================================
// Property initializers
// =============================================================================

/// How a property's backing cell is created on connect.
#[derive(Clone)]
pub enum Initializer {
    /// Mutable cell holding a constant.
    Value(Value),
    /// Explicit cell, shared as-is.
    Cell(Cell),
    /// Mutable cell parsed from the same-named attribute; re-parsed on change.
    Parser(AttributeParser),
    /// Called once with the UI record.
    Factory(FactoryFn),
}

impl Initializer {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Rc<Ui>) -> Result<Cell> + 'static,
    {
        Initializer::Factory(Rc::new(f))
    }
}

impl From<Value> for Initializer {
    fn from(value: Value) -> Self {
        Initializer::Value(value)
    }
}

impl From<Cell> for Initializer {
    fn from(cell: Cell) -> Self {
        Initializer::Cell(cell)
    }
}

impl From<AttributeParser> for Initializer {
    fn from(parser: AttributeParser) -> Self {
        Initializer::Parser(parser)
    }
}

// =============================================================================
// Effect declarations
// =============================================================================

/// What setup declares for one UI key.
#[derive(Clone)]
pub enum EffectDeclaration {
    Single(Effect),
    List(Vec<Effect>),
    /// Effects that become available later. Must settle to `Single` or `List`.
    Deferred(Deferred<EffectDeclaration>),
}

impl From<Effect> for EffectDeclaration {
    fn from(effect: Effect) -> Self {
        EffectDeclaration::Single(effect)
    }
}

impl From<Vec<Effect>> for EffectDeclaration {
    fn from(effects: Vec<Effect>) -> Self {
        EffectDeclaration::List(effects)
    }
}

impl From<Deferred<EffectDeclaration>> for EffectDeclaration {
    fn from(deferred: Deferred<EffectDeclaration>) -> Self {
        EffectDeclaration::Deferred(deferred)
    }
}

/// Effect declarations returned by setup, keyed by UI key.
#[derive(Clone, Default)]
pub struct Effects {
    entries: Vec<(String, EffectDeclaration)>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: &str, declaration: impl Into<EffectDeclaration>) -> Self {
        self.entries.push((key.to_string(), declaration.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, EffectDeclaration)] {
        &self.entries
    }
}

// =============================================================================
// Definition
// =============================================================================

pub struct ComponentDefinition {
    name: String,
    properties: Vec<(String, Initializer)>,
    select: Option<SelectFn>,
    setup: Option<SetupFn>,
}

impl ComponentDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[(String, Initializer)] {
        &self.properties
    }

    pub fn initializer(&self, property: &str) -> Option<&Initializer> {
        self.properties
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, init)| init)
    }

    /// Attributes that drive parser-initialized properties.
    pub fn observed_attributes(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|(_, init)| matches!(init, Initializer::Parser(_)))
            .map(|(name, _)| attribute_name(name))
            .collect()
    }

    /// Property driven by an observed attribute.
    pub fn property_for_attribute(&self, attribute: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(name, init)| matches!(init, Initializer::Parser(_)) && attribute_name(name) == attribute)
            .map(|(name, _)| name.as_str())
    }

    pub(crate) fn select(&self, selection: &Selection) -> Result<Vec<(String, UiEntry)>> {
        match &self.select {
            Some(select) => select(selection),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn setup(&self, ui: &Rc<Ui>) -> Result<Effects> {
        match &self.setup {
            Some(setup) => setup(ui),
            None => Ok(Effects::new()),
        }
    }
}

/// `maxCount` -> `max-count`
pub fn attribute_name(property: &str) -> String {
    let mut out = String::with_capacity(property.len() + 2);
    for c in property.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn validate_property(component: &str, property: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidPropertyName {
        component: component.to_string(),
        property: property.to_string(),
        reason: reason.to_string(),
    };
    if property.is_empty() {
        return Err(invalid("name is empty"));
    }
    if !property.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(invalid("must start with a letter or underscore"));
    }
    if RESERVED_PROPERTIES.contains(&property) {
        return Err(invalid("name is reserved"));
    }
    if BUILTIN_PROPERTIES.contains(&property) {
        return Err(invalid("collides with a built-in element property"));
    }
    if dom::safety::is_event_handler_name(property) {
        return Err(invalid("collides with an event handler property"));
    }
    Ok(())
}

// =============================================================================
// Builder
// =============================================================================

pub struct ComponentBuilder {
    name: String,
    properties: Vec<(String, Initializer)>,
    select: Option<SelectFn>,
    setup: Option<SetupFn>,
}

/// Start a component definition.
pub fn component(name: &str) -> ComponentBuilder {
    ComponentBuilder {
        name: name.to_string(),
        properties: Vec::new(),
        select: None,
        setup: None,
    }
}

impl ComponentBuilder {
    pub fn prop(mut self, name: &str, initializer: impl Into<Initializer>) -> Self {
        self.properties.push((name.to_string(), initializer.into()));
        self
    }

    pub fn select<F>(mut self, select: F) -> Self
    where
        F: Fn(&Selection) -> Result<Vec<(String, UiEntry)>> + 'static,
    {
        self.select = Some(Rc::new(select));
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&Rc<Ui>) -> Result<Effects> + 'static,
    {
        self.setup = Some(Rc::new(setup));
        self
    }

    /// Validate without registering.
    pub fn build(self) -> Result<Rc<ComponentDefinition>> {
        custom_elements::validate_name(&self.name)?;
        for (i, (property, _)) in self.properties.iter().enumerate() {
            validate_property(&self.name, property)?;
            if self.properties[..i].iter().any(|(p, _)| p == property) {
                return Err(Error::InvalidPropertyName {
                    component: self.name.clone(),
                    property: property.clone(),
                    reason: "declared twice".to_string(),
                });
            }
        }
        Ok(Rc::new(ComponentDefinition {
            name: self.name,
            properties: self.properties,
            select: self.select,
            setup: self.setup,
        }))
    }

    /// Validate and register. Existing elements with this tag upgrade now.
    pub fn define(self) -> Result<Rc<ComponentDefinition>> {
        let definition = self.build()?;
        DEFINITIONS.with(|d| {
            d.borrow_mut()
                .insert(definition.name.clone(), definition.clone())
        });
        let lifecycle = Rc::new(ComponentLifecycle {
            definition: definition.clone(),
        });
        if let Err(e) = custom_elements::define(&definition.name, lifecycle) {
            DEFINITIONS.with(|d| d.borrow_mut().remove(&definition.name));
            return Err(e);
        }
        Ok(definition)
    }
}

thread_local! {
    static DEFINITIONS: RefCell<HashMap<String, Rc<ComponentDefinition>>> = RefCell::new(HashMap::new());
}

/// Registered definition for a tag.
pub fn definition(name: &str) -> Option<Rc<ComponentDefinition>> {
    DEFINITIONS.with(|d| d.borrow().get(name).cloned())
}

/// Forget registered definitions (for testing)
pub fn reset_definitions() {
    DEFINITIONS.with(|d| d.borrow_mut().clear());
}

// =============================================================================
// Platform bridge
// =============================================================================

struct ComponentLifecycle {
    definition: Rc<ComponentDefinition>,
}

/// Connection errors are already in the instance's diagnostics.
fn connect_logged(definition: &Rc<ComponentDefinition>, element: NodeId) {
    if let Err(error) = instance::connect_with(definition, element) {
        tracing::debug!(
            component = definition.name(),
            host = %dom::describe(element),
            %error,
            "connect from lifecycle reaction failed"
        );
    }
}

impl ElementLifecycle for ComponentLifecycle {
    fn connected(&self, element: NodeId) {
        let definition = self.definition.clone();
        if effects::is_running_effect() {
            // Bindings created now would belong to the running effect.
            platform::queue_microtask(move || {
                if dom::is_connected(element) {
                    connect_logged(&definition, element);
                }
            });
        } else {
            connect_logged(&definition, element);
        }
    }

    fn disconnected(&self, element: NodeId) {
        instance::disconnect(element);
    }

    fn attribute_changed(&self, element: NodeId, name: &str, old: Option<&str>, new: Option<&str>) {
        instance::attribute_changed(element, name, old, new);
    }

    fn observed_attributes(&self) -> Vec<String> {
        self.definition.observed_attributes()
    }
}
