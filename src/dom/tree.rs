//! Node arena - elements, text, comments and fragments.
//!
//! Nodes are addressed by [`NodeId`] and never freed or reused: a removed
//! node keeps its id and can be re-inserted, exactly like a detached DOM node.
//!
//! Every mutation follows the same shape: change the arena while holding the
//! borrow, release it, then emit mutation records and custom element
//! reactions. Callbacks therefore always see a consistent, unborrowed tree.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::custom_elements;
use super::events::{self, Event};
use super::observer::{self, MutationRecord};
use crate::types::Value;

// =============================================================================
// Node Identity
// =============================================================================

/// Stable handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Method callable on an element through [`call_method`].
pub type Method = Rc<dyn Fn(NodeId, Option<Value>) -> Option<Value>>;

// =============================================================================
// Node Storage
// =============================================================================

#[derive(Clone, Default)]
pub(crate) struct ElementData {
    pub(crate) tag: String,
    pub(crate) attributes: Vec<(String, String)>,
    properties: HashMap<String, Value>,
    methods: HashMap<String, Method>,
}

#[derive(Clone)]
pub(crate) enum NodeKind {
    Element(ElementData),
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Shadow root attached to this element.
    pub(crate) shadow_root: Option<NodeId>,
    /// Host element when this node is a shadow root.
    pub(crate) host: Option<NodeId>,
    /// Custom element upgrade flag.
    pub(crate) upgraded: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            host: None,
            upgraded: false,
        }
    }
}

struct Document {
    nodes: Vec<Node>,
    focused: Option<NodeId>,
}

impl Document {
    fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Fragment)],
            focused: None,
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.node_mut(child)?.parent.take()?;
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        Some(parent)
    }
}

thread_local! {
    static DOCUMENT: RefCell<Document> = RefCell::new(Document::new());
}

pub(crate) fn with_node<R>(id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
    DOCUMENT.with(|doc| doc.borrow().node(id).map(f))
}

fn with_element<R>(id: NodeId, f: impl FnOnce(&ElementData) -> R) -> Option<R> {
    DOCUMENT.with(|doc| doc.borrow().element(id).map(f))
}

fn with_element_mut<R>(id: NodeId, f: impl FnOnce(&mut ElementData) -> R) -> Option<R> {
    DOCUMENT.with(|doc| doc.borrow_mut().element_mut(id).map(f))
}

// =============================================================================
// Creation
// =============================================================================

/// The document root. Nodes are connected when their ancestry reaches it.
pub fn document() -> NodeId {
    NodeId(0)
}

/// Create a detached element. Tag names are lowercased.
pub fn create_element(tag: &str) -> NodeId {
    let data = ElementData {
        tag: tag.to_ascii_lowercase(),
        ..Default::default()
    };
    DOCUMENT.with(|doc| doc.borrow_mut().push(Node::new(NodeKind::Element(data))))
}

pub fn create_text(text: &str) -> NodeId {
    DOCUMENT.with(|doc| {
        doc.borrow_mut()
            .push(Node::new(NodeKind::Text(text.to_string())))
    })
}

pub fn create_comment(text: &str) -> NodeId {
    DOCUMENT.with(|doc| {
        doc.borrow_mut()
            .push(Node::new(NodeKind::Comment(text.to_string())))
    })
}

pub fn create_fragment() -> NodeId {
    DOCUMENT.with(|doc| doc.borrow_mut().push(Node::new(NodeKind::Fragment)))
}

/// Attach (or return the existing) shadow root of an element.
pub fn attach_shadow(host: NodeId) -> Option<NodeId> {
    DOCUMENT.with(|doc| {
        let mut doc = doc.borrow_mut();
        doc.element(host)?;
        if let Some(existing) = doc.node(host).and_then(|n| n.shadow_root) {
            return Some(existing);
        }
        let mut root = Node::new(NodeKind::Fragment);
        root.host = Some(host);
        let root_id = doc.push(root);
        if let Some(node) = doc.node_mut(host) {
            node.shadow_root = Some(root_id);
        }
        Some(root_id)
    })
}

// =============================================================================
// Inspection
// =============================================================================

pub fn exists(id: NodeId) -> bool {
    with_node(id, |_| ()).is_some()
}

pub fn is_element(id: NodeId) -> bool {
    with_element(id, |_| ()).is_some()
}

pub fn is_comment(id: NodeId) -> bool {
    with_node(id, |n| matches!(n.kind, NodeKind::Comment(_))).unwrap_or(false)
}

pub fn is_text(id: NodeId) -> bool {
    with_node(id, |n| matches!(n.kind, NodeKind::Text(_))).unwrap_or(false)
}

/// Lowercase tag name of an element.
pub fn tag_name(id: NodeId) -> Option<String> {
    with_element(id, |e| e.tag.clone())
}

/// Character data of a text or comment node.
pub fn node_data(id: NodeId) -> Option<String> {
    with_node(id, |n| match &n.kind {
        NodeKind::Text(s) | NodeKind::Comment(s) => Some(s.clone()),
        _ => None,
    })
    .flatten()
}

pub fn parent(id: NodeId) -> Option<NodeId> {
    with_node(id, |n| n.parent).flatten()
}

pub fn children(id: NodeId) -> Vec<NodeId> {
    with_node(id, |n| n.children.clone()).unwrap_or_default()
}

pub fn element_children(id: NodeId) -> Vec<NodeId> {
    children(id).into_iter().filter(|c| is_element(*c)).collect()
}

pub fn shadow_root(id: NodeId) -> Option<NodeId> {
    with_node(id, |n| n.shadow_root).flatten()
}

/// Host element of a shadow root.
pub fn shadow_host(id: NodeId) -> Option<NodeId> {
    with_node(id, |n| n.host).flatten()
}

/// Parent, or the host when crossing out of a shadow root.
pub fn composed_parent(id: NodeId) -> Option<NodeId> {
    with_node(id, |n| n.parent.or(n.host)).flatten()
}

/// Inclusive containment, crossing shadow boundaries upward.
pub fn contains(ancestor: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = composed_parent(id);
    }
    false
}

pub fn is_connected(id: NodeId) -> bool {
    contains(document(), id)
}

/// Light-tree descendants of `root` in document order, excluding `root`.
pub fn descendants(root: NodeId) -> Vec<NodeId> {
    DOCUMENT.with(|doc| {
        let doc = doc.borrow();
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = doc
            .node(root)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = doc.node(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    })
}

/// Inclusive subtree in document order, descending into shadow roots.
pub(crate) fn composed_subtree(root: NodeId) -> Vec<NodeId> {
    DOCUMENT.with(|doc| {
        let doc = doc.borrow();
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = doc.node(id) {
                stack.extend(node.children.iter().rev().copied());
                if let Some(shadow) = node.shadow_root {
                    stack.push(shadow);
                }
            }
        }
        out
    })
}

pub(crate) fn is_upgraded(id: NodeId) -> bool {
    with_node(id, |n| n.upgraded).unwrap_or(false)
}

pub(crate) fn set_upgraded(id: NodeId, upgraded: bool) {
    DOCUMENT.with(|doc| {
        if let Some(node) = doc.borrow_mut().node_mut(id) {
            node.upgraded = upgraded;
        }
    });
}

// =============================================================================
// Tree Mutation
// =============================================================================

/// Append `child` to `parent`, moving it if it is already in the tree.
pub fn append_child(parent: NodeId, child: NodeId) {
    insert_before(parent, child, None);
}

/// Insert `child` before `reference` (or at the end when `None`).
pub fn insert_before(parent: NodeId, child: NodeId, reference: Option<NodeId>) {
    if parent == child || contains(child, parent) {
        tracing::warn!(%parent, %child, "refusing to insert a node into its own subtree");
        return;
    }
    if !exists(parent) || !exists(child) {
        return;
    }

    // Fragments move their children, not themselves.
    let is_fragment = with_node(child, |n| {
        matches!(n.kind, NodeKind::Fragment) && n.host.is_none() && child != document()
    })
    .unwrap_or(false);
    let moving = if is_fragment {
        children(child)
    } else {
        vec![child]
    };

    for node in &moving {
        remove(*node);
    }

    DOCUMENT.with(|doc| {
        let mut doc = doc.borrow_mut();
        for node in &moving {
            if let Some(n) = doc.node_mut(*node) {
                n.parent = Some(parent);
            }
        }
        if let Some(p) = doc.node_mut(parent) {
            let at = reference
                .and_then(|r| p.children.iter().position(|c| *c == r))
                .unwrap_or(p.children.len());
            for (offset, node) in moving.iter().enumerate() {
                p.children.insert(at + offset, *node);
            }
        }
    });

    observer::record(MutationRecord::child_list(parent, moving.clone(), Vec::new()));
    if is_connected(parent) {
        for node in &moving {
            custom_elements::connected_subtree(*node);
        }
    }
}

/// Detach a node from its parent.
pub fn remove(child: NodeId) {
    let was_connected = is_connected(child);
    let Some(parent) = DOCUMENT.with(|doc| doc.borrow_mut().detach(child)) else {
        return;
    };
    if doc_focus_within(child) {
        DOCUMENT.with(|doc| doc.borrow_mut().focused = None);
    }

    observer::record(MutationRecord::child_list(parent, Vec::new(), vec![child]));
    if was_connected {
        custom_elements::disconnected_subtree(child);
    }
}

/// Remove every child of `parent`.
pub fn clear_children(parent: NodeId) {
    for child in children(parent) {
        remove(child);
    }
}

/// Replace all children of `parent` with `new_children`.
pub fn replace_children(parent: NodeId, new_children: Vec<NodeId>) {
    clear_children(parent);
    for child in new_children {
        append_child(parent, child);
    }
}

// =============================================================================
// Attributes
// =============================================================================

pub fn get_attribute(id: NodeId, name: &str) -> Option<String> {
    let name = name.to_ascii_lowercase();
    with_element(id, |e| {
        e.attributes
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
    })
    .flatten()
}

pub fn has_attribute(id: NodeId, name: &str) -> bool {
    get_attribute(id, name).is_some()
}

pub fn attribute_names(id: NodeId) -> Vec<String> {
    with_element(id, |e| e.attributes.iter().map(|(n, _)| n.clone()).collect()).unwrap_or_default()
}

/// Set an attribute without any safety check.
///
/// Runtime code writing author-controlled values goes through
/// [`super::safety::safe_set_attribute`] instead.
pub fn set_attribute(id: NodeId, name: &str, value: &str) {
    let name = name.to_ascii_lowercase();
    let old = with_element_mut(id, |e| {
        match e.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => Some(std::mem::replace(v, value.to_string())),
            None => {
                e.attributes.push((name.clone(), value.to_string()));
                None
            }
        }
    });
    let Some(old) = old else { return };
    attribute_changed(id, &name, old, Some(value.to_string()));
}

pub fn remove_attribute(id: NodeId, name: &str) {
    let name = name.to_ascii_lowercase();
    let old = with_element_mut(id, |e| {
        let pos = e.attributes.iter().position(|(n, _)| *n == name)?;
        Some(e.attributes.remove(pos).1)
    })
    .flatten();
    if let Some(old) = old {
        attribute_changed(id, &name, Some(old), None);
    }
}

/// Toggle a boolean attribute. Returns whether it is now present.
pub fn toggle_attribute(id: NodeId, name: &str, force: Option<bool>) -> bool {
    let present = has_attribute(id, name);
    let want = force.unwrap_or(!present);
    if want && !present {
        set_attribute(id, name, "");
    } else if !want && present {
        remove_attribute(id, name);
    }
    want
}

fn attribute_changed(id: NodeId, name: &str, old: Option<String>, new: Option<String>) {
    observer::record(MutationRecord::attribute(id, name, old.clone()));
    custom_elements::attribute_changed(id, name, old.as_deref(), new.as_deref());
}

// =============================================================================
// Classes
// =============================================================================

pub fn class_list(id: NodeId) -> Vec<String> {
    get_attribute(id, "class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn has_class(id: NodeId, token: &str) -> bool {
    class_list(id).iter().any(|c| c == token)
}

/// Toggle a class token. Returns whether it is now present.
pub fn toggle_class(id: NodeId, token: &str, force: Option<bool>) -> bool {
    let mut classes = class_list(id);
    let present = classes.iter().any(|c| c == token);
    let want = force.unwrap_or(!present);
    if want == present {
        return want;
    }
    if want {
        classes.push(token.to_string());
    } else {
        classes.retain(|c| c != token);
    }
    set_attribute(id, "class", &classes.join(" "));
    want
}

// =============================================================================
// Inline Styles
// =============================================================================

fn parse_style(text: &str) -> Vec<(String, String)> {
    text.split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            if prop.is_empty() {
                return None;
            }
            Some((prop.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn serialize_style(decls: &[(String, String)]) -> String {
    decls
        .iter()
        .map(|(p, v)| format!("{p}: {v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn get_style(id: NodeId, property: &str) -> Option<String> {
    let property = property.to_ascii_lowercase();
    parse_style(&get_attribute(id, "style")?)
        .into_iter()
        .find(|(p, _)| *p == property)
        .map(|(_, v)| v)
}

pub fn set_style(id: NodeId, property: &str, value: &str) {
    let property = property.to_ascii_lowercase();
    let mut decls = parse_style(&get_attribute(id, "style").unwrap_or_default());
    match decls.iter_mut().find(|(p, _)| *p == property) {
        Some((_, v)) => *v = value.to_string(),
        None => decls.push((property, value.to_string())),
    }
    set_attribute(id, "style", &serialize_style(&decls));
}

pub fn remove_style(id: NodeId, property: &str) {
    let property = property.to_ascii_lowercase();
    let Some(current) = get_attribute(id, "style") else { return };
    let mut decls = parse_style(&current);
    let before = decls.len();
    decls.retain(|(p, _)| *p != property);
    if decls.len() == before {
        return;
    }
    if decls.is_empty() {
        remove_attribute(id, "style");
    } else {
        set_attribute(id, "style", &serialize_style(&decls));
    }
}

// =============================================================================
// Properties
// =============================================================================

/// Read an element property. `id`, `hidden` and `textContent` reflect the tree.
pub fn get_property(id: NodeId, name: &str) -> Option<Value> {
    match name {
        "id" => Some(Value::Str(get_attribute(id, "id").unwrap_or_default())),
        "hidden" => Some(Value::Bool(has_attribute(id, "hidden"))),
        "textContent" => Some(Value::Str(text_content(id))),
        _ => with_element(id, |e| e.properties.get(name).cloned()).flatten(),
    }
}

pub fn set_property(id: NodeId, name: &str, value: Value) {
    match name {
        "id" => set_attribute(id, "id", &value.to_string()),
        "hidden" => {
            toggle_attribute(id, "hidden", Some(value.is_truthy()));
        }
        "textContent" => set_text_content(id, &value.to_string()),
        _ => {
            with_element_mut(id, |e| e.properties.insert(name.to_string(), value));
        }
    }
}

pub fn remove_property(id: NodeId, name: &str) {
    with_element_mut(id, |e| e.properties.remove(name));
}

// =============================================================================
// Text
// =============================================================================

/// Concatenated text of all descendant text nodes.
pub fn text_content(id: NodeId) -> String {
    if let Some(data) = node_data(id) {
        return if is_text(id) { data } else { String::new() };
    }
    descendants(id)
        .into_iter()
        .filter(|n| is_text(*n))
        .filter_map(node_data)
        .collect()
}

/// Replace all children with a single text node.
pub fn set_text_content(id: NodeId, text: &str) {
    clear_children(id);
    if !text.is_empty() {
        append_child(id, create_text(text));
    }
}

/// Replace all non-comment children with a single text node.
///
/// Comments survive so server-rendered markers stay in place.
pub fn set_text(id: NodeId, text: &str) {
    for child in children(id) {
        if !is_comment(child) {
            remove(child);
        }
    }
    append_child(id, create_text(text));
}

/// Change the data of a text or comment node.
pub fn set_node_data(id: NodeId, data: &str) {
    let (changed, parent) = DOCUMENT.with(|doc| {
        let mut doc = doc.borrow_mut();
        let Some(node) = doc.node_mut(id) else {
            return (false, None);
        };
        let changed = match &mut node.kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => {
                *s = data.to_string();
                true
            }
            _ => false,
        };
        (changed, node.parent)
    });
    if changed {
        if let Some(parent) = parent {
            observer::record(MutationRecord::character_data(parent, id));
        }
    }
}

// =============================================================================
// Methods & Focus
// =============================================================================

/// Register a callable method on an element.
pub fn define_method<F>(id: NodeId, name: &str, method: F)
where
    F: Fn(NodeId, Option<Value>) -> Option<Value> + 'static,
{
    with_element_mut(id, |e| e.methods.insert(name.to_string(), Rc::new(method)));
}

pub fn has_method(id: NodeId, name: &str) -> bool {
    matches!(name, "focus" | "blur" | "click")
        || with_element(id, |e| e.methods.contains_key(name)).unwrap_or(false)
}

/// Invoke a method. Built-ins: `focus`, `blur`, `click`.
///
/// Returns `None` when the element has no such method.
pub fn call_method(id: NodeId, name: &str, arg: Option<Value>) -> Option<Option<Value>> {
    let custom = with_element(id, |e| e.methods.get(name).cloned()).flatten();
    if let Some(method) = custom {
        return Some(method(id, arg));
    }
    match name {
        "focus" => {
            DOCUMENT.with(|doc| doc.borrow_mut().focused = Some(id));
            events::dispatch_event(id, &Event::new("focus"));
            Some(None)
        }
        "blur" => {
            let was_focused = focused() == Some(id);
            if was_focused {
                DOCUMENT.with(|doc| doc.borrow_mut().focused = None);
                events::dispatch_event(id, &Event::new("blur"));
            }
            Some(None)
        }
        "click" => {
            events::dispatch_event(id, &Event::bubbling("click"));
            Some(None)
        }
        _ => None,
    }
}

pub fn focused() -> Option<NodeId> {
    DOCUMENT.with(|doc| doc.borrow().focused)
}

fn doc_focus_within(id: NodeId) -> bool {
    focused().is_some_and(|f| contains(id, f))
}

/// Short description used in logs: `<tag#id.class>`.
pub fn describe(id: NodeId) -> String {
    let Some(tag) = tag_name(id) else {
        return id.to_string();
    };
    let mut out = format!("<{tag}");
    if let Some(el_id) = get_attribute(id, "id").filter(|s| !s.is_empty()) {
        out.push('#');
        out.push_str(&el_id);
    }
    for class in class_list(id) {
        out.push('.');
        out.push_str(&class);
    }
    out.push('>');
    out
}

/// Reset the arena (for testing)
pub fn reset_tree() {
    DOCUMENT.with(|doc| *doc.borrow_mut() = Document::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::reset_dom;

    fn setup() -> NodeId {
        reset_dom();
        let body = create_element("body");
        append_child(document(), body);
        body
    }

    #[test]
    fn test_tree_building() {
        let body = setup();
        let a = create_element("DIV");
        let b = create_element("span");
        append_child(body, a);
        insert_before(body, b, Some(a));

        assert_eq!(children(body), vec![b, a]);
        assert_eq!(tag_name(a).as_deref(), Some("div"));
        assert!(is_connected(a));

        remove(a);
        assert!(!is_connected(a));
        assert_eq!(parent(a), None);
        assert_eq!(children(body), vec![b]);
    }

    #[test]
    fn test_refuses_cycles() {
        let body = setup();
        let outer = create_element("div");
        let inner = create_element("div");
        append_child(body, outer);
        append_child(outer, inner);
        append_child(inner, outer);
        assert_eq!(parent(outer), Some(body));
    }

    #[test]
    fn test_fragment_moves_children() {
        let body = setup();
        let frag = create_fragment();
        let a = create_element("a");
        let b = create_element("b");
        append_child(frag, a);
        append_child(frag, b);
        append_child(body, frag);
        assert_eq!(children(body), vec![a, b]);
        assert!(children(frag).is_empty());
    }

    #[test]
    fn test_attributes_and_classes() {
        let body = setup();
        set_attribute(body, "Data-X", "1");
        assert_eq!(get_attribute(body, "data-x").as_deref(), Some("1"));
        assert!(toggle_attribute(body, "hidden", None));
        assert!(has_attribute(body, "hidden"));
        assert!(!toggle_attribute(body, "hidden", None));

        toggle_class(body, "active", Some(true));
        toggle_class(body, "open", None);
        assert_eq!(class_list(body), vec!["active", "open"]);
        toggle_class(body, "active", Some(false));
        assert!(!has_class(body, "active"));
    }

    #[test]
    fn test_styles_round_trip_through_attribute() {
        let body = setup();
        set_style(body, "color", "red");
        set_style(body, "display", "none");
        assert_eq!(get_attribute(body, "style").as_deref(), Some("color: red; display: none;"));
        set_style(body, "color", "blue");
        assert_eq!(get_style(body, "color").as_deref(), Some("blue"));
        remove_style(body, "color");
        remove_style(body, "display");
        assert!(!has_attribute(body, "style"));
    }

    #[test]
    fn test_set_text_keeps_comments() {
        let body = setup();
        let marker = create_comment("marker");
        append_child(body, create_text("old"));
        append_child(body, marker);
        append_child(body, create_element("b"));

        set_text(body, "new");
        let kids = children(body);
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[0], marker);
        assert_eq!(text_content(body), "new");
    }

    #[test]
    fn test_reflected_properties() {
        let body = setup();
        set_property(body, "hidden", Value::Bool(true));
        assert!(has_attribute(body, "hidden"));
        set_property(body, "id", Value::from("main"));
        assert_eq!(describe(body), "<body#main>");
        set_property(body, "count", Value::Int(3));
        assert_eq!(get_property(body, "count"), Some(Value::Int(3)));
    }

    #[test]
    fn test_methods_and_focus() {
        let body = setup();
        let input = create_element("input");
        append_child(body, input);

        assert_eq!(call_method(input, "focus", None), Some(None));
        assert_eq!(focused(), Some(input));
        remove(input);
        assert_eq!(focused(), None);

        define_method(body, "double", |_, arg| {
            arg.and_then(|v| v.as_int()).map(|n| Value::Int(n * 2))
        });
        assert_eq!(
            call_method(body, "double", Some(Value::Int(4))),
            Some(Some(Value::Int(8)))
        );
        assert_eq!(call_method(body, "missing", None), None);
    }
}
