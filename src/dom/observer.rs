//! Mutation observation.
//!
//! Observers watch a root node (optionally its whole subtree) for child-list,
//! attribute and character-data changes. Records are buffered per observer
//! and delivered together in a single microtask, so a burst of synchronous
//! mutations reaches each callback as one batch.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;

use super::tree::{self, NodeId};
use crate::platform;

bitflags! {
    /// What an observer is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObserveFlags: u8 {
        const CHILD_LIST = 1 << 0;
        const SUBTREE = 1 << 1;
        const ATTRIBUTES = 1 << 2;
        const CHARACTER_DATA = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// One observed change.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// Parent for child-list changes, the element for attribute changes.
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
    /// Changed text or comment node for character-data records.
    pub node: Option<NodeId>,
}

impl MutationRecord {
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
            attribute_name: None,
            old_value: None,
            node: None,
        }
    }

    pub fn attribute(target: NodeId, name: &str, old_value: Option<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: Some(name.to_string()),
            old_value,
            node: None,
        }
    }

    pub fn character_data(target: NodeId, node: NodeId) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute_name: None,
            old_value: None,
            node: Some(node),
        }
    }
}

/// Handle returned by [`observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;

struct Observer {
    id: ObserverId,
    root: NodeId,
    flags: ObserveFlags,
    attribute_filter: Vec<String>,
    callback: MutationCallback,
    pending: Vec<MutationRecord>,
}

impl Observer {
    fn wants(&self, record: &MutationRecord) -> bool {
        let kind_ok = match record.kind {
            MutationKind::ChildList => self.flags.contains(ObserveFlags::CHILD_LIST),
            MutationKind::CharacterData => self.flags.contains(ObserveFlags::CHARACTER_DATA),
            MutationKind::Attributes => {
                self.flags.contains(ObserveFlags::ATTRIBUTES)
                    && (self.attribute_filter.is_empty()
                        || record
                            .attribute_name
                            .as_ref()
                            .is_some_and(|name| self.attribute_filter.contains(name)))
            }
        };
        if !kind_ok {
            return false;
        }
        record.target == self.root
            || (self.flags.contains(ObserveFlags::SUBTREE) && tree::contains(self.root, record.target))
    }
}

thread_local! {
    static OBSERVERS: RefCell<Vec<Observer>> = const { RefCell::new(Vec::new()) };
    static NEXT_OBSERVER_ID: Cell<u64> = const { Cell::new(1) };
    static DELIVERY_QUEUED: Cell<bool> = const { Cell::new(false) };
}

/// Start observing `root`.
///
/// An empty `attribute_filter` means every attribute when
/// [`ObserveFlags::ATTRIBUTES`] is set.
pub fn observe<F>(
    root: NodeId,
    flags: ObserveFlags,
    attribute_filter: Vec<String>,
    callback: F,
) -> ObserverId
where
    F: Fn(&[MutationRecord]) + 'static,
{
    let id = NEXT_OBSERVER_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        ObserverId(id)
    });
    let attribute_filter = attribute_filter
        .into_iter()
        .map(|name| name.to_ascii_lowercase())
        .collect();
    OBSERVERS.with(|observers| {
        observers.borrow_mut().push(Observer {
            id,
            root,
            flags,
            attribute_filter,
            callback: Rc::new(callback),
            pending: Vec::new(),
        })
    });
    id
}

/// Stop observing. Buffered records are dropped.
pub fn disconnect(id: ObserverId) {
    OBSERVERS.with(|observers| observers.borrow_mut().retain(|o| o.id != id));
}

/// Number of live observers.
pub fn observer_count() -> usize {
    OBSERVERS.with(|observers| observers.borrow().len())
}

/// Take the records buffered for an observer without delivering them.
pub fn take_records(id: ObserverId) -> Vec<MutationRecord> {
    OBSERVERS.with(|observers| {
        observers
            .borrow_mut()
            .iter_mut()
            .find(|o| o.id == id)
            .map(|o| std::mem::take(&mut o.pending))
            .unwrap_or_default()
    })
}

/// Buffer a record for every interested observer.
pub(crate) fn record(record: MutationRecord) {
    // Interest checks walk the tree, so decide before borrowing mutably.
    let interested: Vec<ObserverId> = OBSERVERS.with(|observers| {
        observers
            .borrow()
            .iter()
            .filter(|o| o.wants(&record))
            .map(|o| o.id)
            .collect()
    });
    if interested.is_empty() {
        return;
    }

    OBSERVERS.with(|observers| {
        for observer in observers.borrow_mut().iter_mut() {
            if interested.contains(&observer.id) {
                observer.pending.push(record.clone());
            }
        }
    });

    if !DELIVERY_QUEUED.with(|q| q.replace(true)) {
        platform::queue_microtask(deliver);
    }
}

fn deliver() {
    DELIVERY_QUEUED.with(|q| q.set(false));
    let batches: Vec<(ObserverId, MutationCallback, Vec<MutationRecord>)> =
        OBSERVERS.with(|observers| {
            observers
                .borrow_mut()
                .iter_mut()
                .filter(|o| !o.pending.is_empty())
                .map(|o| (o.id, o.callback.clone(), std::mem::take(&mut o.pending)))
                .collect()
        });

    for (id, callback, records) in batches {
        // An earlier callback in this batch may have disconnected it.
        let alive = OBSERVERS.with(|observers| observers.borrow().iter().any(|o| o.id == id));
        if alive {
            callback(&records);
        }
    }
}

/// Drop all observers (for testing)
pub fn reset_observers() {
    OBSERVERS.with(|observers| observers.borrow_mut().clear());
    DELIVERY_QUEUED.with(|q| q.set(false));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, reset_dom};
    use crate::platform::{reset_platform, run_microtasks};

    fn setup() -> NodeId {
        reset_platform();
        reset_dom();
        let body = dom::create_element("body");
        dom::append_child(dom::document(), body);
        body
    }

    fn recorder() -> (Rc<RefCell<Vec<usize>>>, impl Fn(&[MutationRecord])) {
        let batches = Rc::new(RefCell::new(Vec::new()));
        let b = batches.clone();
        (batches, move |records: &[MutationRecord]| b.borrow_mut().push(records.len()))
    }

    #[test]
    fn test_batches_in_one_microtask() {
        let body = setup();
        let (batches, callback) = recorder();
        observe(body, ObserveFlags::CHILD_LIST | ObserveFlags::SUBTREE, Vec::new(), callback);

        let list = dom::create_element("ul");
        dom::append_child(body, list);
        dom::append_child(list, dom::create_element("li"));
        dom::append_child(list, dom::create_element("li"));

        assert!(batches.borrow().is_empty());
        run_microtasks();
        assert_eq!(*batches.borrow(), vec![3]);
    }

    #[test]
    fn test_attribute_filter() {
        let body = setup();
        let (batches, callback) = recorder();
        observe(
            body,
            ObserveFlags::ATTRIBUTES | ObserveFlags::SUBTREE,
            vec!["class".into()],
            callback,
        );

        dom::set_attribute(body, "title", "ignored");
        run_microtasks();
        assert!(batches.borrow().is_empty());

        dom::toggle_class(body, "active", None);
        run_microtasks();
        assert_eq!(*batches.borrow(), vec![1]);
    }

    #[test]
    fn test_without_subtree_only_root() {
        let body = setup();
        let (batches, callback) = recorder();
        observe(body, ObserveFlags::CHILD_LIST, Vec::new(), callback);

        let div = dom::create_element("div");
        dom::append_child(body, div);
        dom::append_child(div, dom::create_element("span"));
        run_microtasks();
        assert_eq!(*batches.borrow(), vec![1]);
    }

    #[test]
    fn test_disconnect() {
        let body = setup();
        let (batches, callback) = recorder();
        let id = observe(body, ObserveFlags::CHILD_LIST, Vec::new(), callback);
        assert_eq!(observer_count(), 1);

        dom::append_child(body, dom::create_element("div"));
        disconnect(id);
        run_microtasks();
        assert!(batches.borrow().is_empty());
        assert_eq!(observer_count(), 0);
    }
}
