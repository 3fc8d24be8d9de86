//! UI record - the elements a component instance binds to.
//!
//! A component's select function receives a [`Selection`] scoped to the host
//! and returns named entries. The runtime freezes them into a [`Ui`] once per
//! connection; nothing re-queries it afterwards. Entries that must follow the
//! tree are [`Collection`]s, which keep themselves up to date.

use std::cell::RefCell;

use crate::collection::Collection;
use crate::dom::{self, NodeId, custom_elements};
use crate::error::{Error, Result};

/// Key under which the host element is always available.
pub const HOST_KEY: &str = "host";

/// One resolved UI entry.
#[derive(Debug, Clone)]
pub enum UiEntry {
    Element(Option<NodeId>),
    Collection(Collection),
}

impl UiEntry {
    /// Elements this entry currently refers to.
    pub fn targets(&self) -> Vec<NodeId> {
        match self {
            UiEntry::Element(el) => el.iter().copied().collect(),
            UiEntry::Collection(collection) => collection.peek(),
        }
    }
}

/// Frozen UI record of one component instance.
#[derive(Debug, Clone)]
pub struct Ui {
    component: String,
    host: NodeId,
    entries: Vec<(String, UiEntry)>,
}

impl Ui {
    /// Build a record. The `host` key is added implicitly and may not be
    /// supplied by the caller; keys must be unique.
    pub fn new(component: &str, host: NodeId, entries: Vec<(String, UiEntry)>) -> Result<Self> {
        let mut all = vec![(HOST_KEY.to_string(), UiEntry::Element(Some(host)))];
        for (key, entry) in entries {
            if all.iter().any(|(k, _)| *k == key) {
                let reason = if key == HOST_KEY {
                    "`host` is reserved for the component's own element"
                } else {
                    "key is declared twice"
                };
                return Err(Error::InvalidUiKey {
                    component: component.to_string(),
                    key,
                    reason: reason.to_string(),
                });
            }
            all.push((key, entry));
        }
        Ok(Self {
            component: component.to_string(),
            host,
            entries: all,
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn get(&self, key: &str) -> Option<&UiEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Single element under `key` (absent for optional misses and collections).
    pub fn element(&self, key: &str) -> Option<NodeId> {
        match self.get(key)? {
            UiEntry::Element(el) => *el,
            UiEntry::Collection(_) => None,
        }
    }

    pub fn collection(&self, key: &str) -> Option<&Collection> {
        match self.get(key)? {
            UiEntry::Collection(c) => Some(c),
            UiEntry::Element(_) => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Look up a key or fail with [`Error::InvalidUiKey`].
    pub fn require(&self, key: &str) -> Result<&UiEntry> {
        self.get(key).ok_or_else(|| Error::InvalidUiKey {
            component: self.component.clone(),
            key: key.to_string(),
            reason: format!(
                "no such UI entry (known keys: {})",
                self.keys().collect::<Vec<_>>().join(", ")
            ),
        })
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Query helpers handed to a component's select function.
///
/// Every matched element that is a not-yet-upgraded custom element is
/// recorded as a dependency of the instance.
pub struct Selection {
    component: String,
    host: NodeId,
    dependencies: RefCell<Vec<String>>,
}

impl Selection {
    pub(crate) fn new(component: &str, host: NodeId) -> Self {
        Self {
            component: component.to_string(),
            host,
            dependencies: RefCell::new(Vec::new()),
        }
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    fn record_dependencies(&self, elements: &[NodeId]) {
        let mut deps = self.dependencies.borrow_mut();
        for el in elements {
            if !custom_elements::is_pending_upgrade(*el) {
                continue;
            }
            if let Some(tag) = dom::tag_name(*el) {
                if !deps.contains(&tag) && !custom_elements::is_defined(&tag) {
                    deps.push(tag);
                }
            }
        }
    }

    /// First match; fails with [`Error::MissingElement`] carrying `reason`.
    pub fn first(&self, selector: &str, reason: &str) -> Result<UiEntry> {
        match dom::query(self.host, selector)? {
            Some(el) => {
                self.record_dependencies(&[el]);
                Ok(UiEntry::Element(Some(el)))
            }
            None => Err(Error::MissingElement {
                component: self.component.clone(),
                selector: selector.to_string(),
                reason: reason.to_string(),
            }),
        }
    }

    /// First match, or an absent entry.
    pub fn first_optional(&self, selector: &str) -> Result<UiEntry> {
        let el = dom::query(self.host, selector)?;
        self.record_dependencies(&el.iter().copied().collect::<Vec<_>>());
        Ok(UiEntry::Element(el))
    }

    /// Live collection of all matches. With `required`, an empty match set
    /// at call time fails with [`Error::MissingElement`].
    pub fn all(&self, selector: &str, required: Option<&str>) -> Result<UiEntry> {
        let collection = Collection::new(self.host, selector)?;
        let members = collection.peek();
        if let Some(reason) = required {
            if members.is_empty() {
                return Err(Error::MissingElement {
                    component: self.component.clone(),
                    selector: selector.to_string(),
                    reason: reason.to_string(),
                });
            }
        }
        self.record_dependencies(&members);
        Ok(UiEntry::Collection(collection))
    }

    /// Undefined custom element tags found so far.
    pub fn dependencies(&self) -> Vec<String> {
        self.dependencies.borrow().clone()
    }
}
