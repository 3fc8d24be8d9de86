//! Collection - a lazily-observed, diffed set of elements matching a selector.
//!
//! A collection tracks the descendants of a root that match a selector. It
//! does nothing until someone is interested:
//!
//! - First subscriber (a [`Watch`] taken by an effect reading it, or an
//!   explicit [`Collection::subscribe`]) installs ONE subtree mutation
//!   observer, filtered to the attributes the selector references.
//! - Each observed batch requeries the match set and diffs it against the
//!   previous snapshot. Subscribers are notified only when elements were
//!   added or removed.
//! - Last subscriber gone: the observer is disconnected.
//!
//! Identical (root, selector) pairs share one collection, so they also share
//! one observer and one snapshot.
//!
//! # Example
//!
//! ```ignore
//! let items = Collection::new(list, "li.item")?;
//! let watch = items.subscribe(|changes| {
//!     println!("+{} -{}", changes.added.len(), changes.removed.len());
//! });
//! // ... mutations are observed ...
//! drop(watch); // observer disconnected
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use spark_signals::{Signal, signal};

use crate::dom::observer::{self, ObserveFlags, ObserverId};
use crate::dom::{NodeId, Selector};
use crate::error::Result;
use crate::reactive::{Watch, Watchable, track};

/// Current members plus the difference from the previous settled snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementChanges {
    pub current: Vec<NodeId>,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

pub type ChangeListener = Rc<dyn Fn(&ElementChanges)>;

// =============================================================================
// Shared State
// =============================================================================

#[derive(Default)]
struct State {
    snapshot: Vec<NodeId>,
    changes: ElementChanges,
    subscribers: usize,
    observer: Option<ObserverId>,
    listeners: Vec<(u64, ChangeListener)>,
    next_listener: u64,
    revision: u64,
}

struct Inner {
    root: NodeId,
    selector: Selector,
    /// Bumped on every notified change; reads subscribe effects to it.
    revision: Signal<u64>,
    state: RefCell<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(id) = self.state.get_mut().observer.take() {
            observer::disconnect(id);
        }
    }
}

thread_local! {
    /// Live collections by (root, selector text).
    static REGISTRY: RefCell<HashMap<(NodeId, String), Weak<Inner>>> = RefCell::new(HashMap::new());
}

/// Handle to a shared collection. Cloning shares it.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<Inner>,
}

impl Collection {
    /// Get or create the collection for `selector` under `root`.
    pub fn new(root: NodeId, selector: &str) -> Result<Self> {
        let key = (root, selector.to_string());
        let existing = REGISTRY.with(|r| r.borrow().get(&key).and_then(Weak::upgrade));
        if let Some(inner) = existing {
            return Ok(Self { inner });
        }

        let selector = Selector::parse(selector)?;
        let snapshot = selector.query_all(root);
        let inner = Rc::new(Inner {
            root,
            selector,
            revision: signal(0),
            state: RefCell::new(State {
                changes: ElementChanges {
                    current: snapshot.clone(),
                    ..Default::default()
                },
                snapshot,
                ..Default::default()
            }),
        });
        REGISTRY.with(|r| {
            let mut registry = r.borrow_mut();
            registry.retain(|_, weak| weak.strong_count() > 0);
            registry.insert(key, Rc::downgrade(&inner));
        });
        Ok(Self { inner })
    }

    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    pub fn selector(&self) -> &str {
        self.inner.selector.source()
    }

    /// Current matches in document order.
    ///
    /// Inside an effect this subscribes the effect (activating the observer
    /// if needed). While inactive every call requeries, so it is never stale.
    pub fn get(&self) -> Vec<NodeId> {
        self.read(|state| state.snapshot.clone())
    }

    /// Current members with the last observed diff.
    pub fn changes(&self) -> ElementChanges {
        self.read(|state| state.changes.clone())
    }

    pub fn len(&self) -> usize {
        self.read(|state| state.snapshot.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, index: usize) -> Option<NodeId> {
        self.read(|state| state.snapshot.get(index).copied())
    }

    pub fn first(&self) -> Option<NodeId> {
        self.at(0)
    }

    pub fn iter(&self) -> std::vec::IntoIter<NodeId> {
        self.get().into_iter()
    }

    pub fn contains(&self, element: NodeId) -> bool {
        self.read(|state| state.snapshot.contains(&element))
    }

    /// Current matches without subscribing anything to them.
    pub fn peek(&self) -> Vec<NodeId> {
        if self.is_observing() {
            self.inner.state.borrow().snapshot.clone()
        } else {
            self.inner.selector.query_all(self.inner.root)
        }
    }

    /// Whether the mutation observer is installed.
    pub fn is_observing(&self) -> bool {
        self.inner.state.borrow().observer.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.borrow().subscribers
    }

    /// Call `listener` on every change until the returned watch is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Watch
    where
        F: Fn(&ElementChanges) + 'static,
    {
        let id = {
            let mut state = self.inner.state.borrow_mut();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, Rc::new(listener)));
            id
        };
        let watch = self.watch();
        let inner = self.inner.clone();
        Watch::new(move || {
            inner.state.borrow_mut().listeners.retain(|(l, _)| *l != id);
            drop(watch);
        })
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        track(self);
        if !self.is_observing() {
            let current = self.inner.selector.query_all(self.inner.root);
            let mut state = self.inner.state.borrow_mut();
            state.changes.current = current.clone();
            state.snapshot = current;
        }
        self.inner.revision.get();
        f(&self.inner.state.borrow())
    }

    // -------------------------------------------------------------------------
    // Activation
    // -------------------------------------------------------------------------

    fn activate(&self) {
        let first = {
            let mut state = self.inner.state.borrow_mut();
            state.subscribers += 1;
            state.subscribers == 1
        };
        if !first {
            return;
        }

        let current = self.inner.selector.query_all(self.inner.root);
        let filter = self.inner.selector.attribute_names();
        let mut flags = ObserveFlags::CHILD_LIST | ObserveFlags::SUBTREE;
        if !filter.is_empty() {
            flags |= ObserveFlags::ATTRIBUTES;
        }
        let weak = Rc::downgrade(&self.inner);
        let id = observer::observe(self.inner.root, flags, filter, move |_records| {
            if let Some(inner) = weak.upgrade() {
                Collection { inner }.refresh();
            }
        });

        let mut state = self.inner.state.borrow_mut();
        state.changes = ElementChanges {
            current: current.clone(),
            added: Vec::new(),
            removed: Vec::new(),
        };
        state.snapshot = current;
        state.observer = Some(id);
        tracing::debug!(root = %self.inner.root, selector = self.selector(), "collection observer installed");
    }

    fn deactivate(&self) {
        let observer = {
            let mut state = self.inner.state.borrow_mut();
            state.subscribers = state.subscribers.saturating_sub(1);
            if state.subscribers > 0 {
                return;
            }
            state.observer.take()
        };
        if let Some(id) = observer {
            observer::disconnect(id);
            tracing::debug!(root = %self.inner.root, selector = self.selector(), "collection observer disconnected");
        }
    }

    /// Requery and diff. Notifies only when membership changed.
    fn refresh(&self) {
        let next = self.inner.selector.query_all(self.inner.root);
        let (changes, listeners, revision) = {
            let mut state = self.inner.state.borrow_mut();
            let previous: HashSet<NodeId> = state.snapshot.iter().copied().collect();
            let now: HashSet<NodeId> = next.iter().copied().collect();
            let added: Vec<NodeId> = next.iter().copied().filter(|n| !previous.contains(n)).collect();
            let removed: Vec<NodeId> = state
                .snapshot
                .iter()
                .copied()
                .filter(|n| !now.contains(n))
                .collect();

            state.snapshot = next.clone();
            if added.is_empty() && removed.is_empty() {
                // Reordering only: keep document order, nobody to tell.
                state.changes.current = next;
                return;
            }
            state.changes = ElementChanges {
                current: next,
                added,
                removed,
            };
            state.revision += 1;
            let listeners: Vec<ChangeListener> =
                state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (state.changes.clone(), listeners, state.revision)
        };

        tracing::trace!(
            selector = self.selector(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            "collection changed"
        );
        self.inner.revision.set(revision);
        for listener in listeners {
            listener(&changes);
        }
    }
}

impl Watchable for Collection {
    fn watch_key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn watch(&self) -> Watch {
        self.activate();
        let collection = self.clone();
        Watch::new(move || collection.deactivate())
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("root", &self.inner.root)
            .field("selector", &self.selector())
            .field("observing", &self.is_observing())
            .finish()
    }
}

impl IntoIterator for &Collection {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Forget registered collections (for testing)
pub fn reset_collections() {
    REGISTRY.with(|r| r.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, observer_count, reset_dom};
    use crate::platform::{reset_platform, run_microtasks};
    use std::cell::Cell;

    fn setup() -> NodeId {
        reset_platform();
        reset_dom();
        reset_collections();
        let list = dom::create_element("ul");
        dom::append_child(dom::document(), list);
        list
    }

    fn item(list: NodeId, class: &str) -> NodeId {
        let li = dom::create_element("li");
        dom::set_attribute(li, "class", class);
        dom::append_child(list, li);
        li
    }

    #[test]
    fn test_lazy_activation() {
        let list = setup();
        let items = Collection::new(list, "li").unwrap();
        assert_eq!(observer_count(), 0);

        let a = items.subscribe(|_| {});
        assert_eq!(observer_count(), 1);
        let b = items.subscribe(|_| {});
        assert_eq!(observer_count(), 1);

        drop(a);
        assert!(items.is_observing());
        drop(b);
        assert!(!items.is_observing());
        assert_eq!(observer_count(), 0);
    }

    #[test]
    fn test_identical_queries_share() {
        let list = setup();
        let a = Collection::new(list, "li").unwrap();
        let b = Collection::new(list, "li").unwrap();
        let _wa = a.subscribe(|_| {});
        let _wb = b.subscribe(|_| {});
        assert_eq!(observer_count(), 1);
        assert_eq!(a.subscriber_count(), 2);
    }

    #[test]
    fn test_inactive_reads_are_fresh() {
        let list = setup();
        let items = Collection::new(list, "li").unwrap();
        assert!(items.is_empty());
        let li = item(list, "x");
        assert_eq!(items.get(), vec![li]);
        assert_eq!(items.at(0), Some(li));
    }

    #[test]
    fn test_diffs_and_notifies() {
        let list = setup();
        let first = item(list, "item");
        let items = Collection::new(list, ".item").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _watch = items.subscribe(move |c| s.borrow_mut().push(c.clone()));

        let second = item(list, "item");
        item(list, "other");
        run_microtasks();
        assert_eq!(
            seen.borrow().last(),
            Some(&ElementChanges {
                current: vec![first, second],
                added: vec![second],
                removed: vec![],
            })
        );

        // Attribute change flips membership.
        dom::toggle_class(first, "item", Some(false));
        run_microtasks();
        assert_eq!(seen.borrow().last().map(|c| c.removed.clone()), Some(vec![first]));
        assert_eq!(items.get(), vec![second]);
    }

    #[test]
    fn test_no_notification_without_membership_change() {
        let list = setup();
        item(list, "item");
        let items = Collection::new(list, "li").unwrap();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let _watch = items.subscribe(move |_| c.set(c.get() + 1));

        dom::append_child(list, dom::create_text("text"));
        run_microtasks();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_invalid_selector() {
        let list = setup();
        assert!(Collection::new(list, "li:hover").is_err());
    }
}
