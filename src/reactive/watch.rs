//! Activation tracking - reference-counted subscriptions to lazy sources.
//!
//! Collections and sensors only do work (observe mutations, listen for
//! events) while somebody is interested. Interest is expressed by holding a
//! [`Watch`]: the source activates when its first watch is taken and
//! deactivates when its last watch is dropped.
//!
//! Effects do not take watches by hand. The effect engine opens a frame with
//! [`with_frame`]; any [`Watchable`] read inside the frame calls [`track`],
//! which takes one watch per source into the run's [`WatchSet`]. Each run
//! gets a fresh set and the previous run's set is released after it, so a
//! source stays active exactly while the latest run of some effect read it.
//!
//! # Example
//!
//! ```ignore
//! let set = Rc::new(RefCell::new(WatchSet::new()));
//! with_frame(&set, || {
//!     collection.get(); // activates the collection
//! });
//! drop(set); // last watch released, observer disconnected
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Release token. Dropping it (or calling [`Watch::release`]) gives up the
/// subscription exactly once.
pub struct Watch {
    release: Option<Box<dyn FnOnce()>>,
}

impl Watch {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A watch that holds nothing.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// A lazily-activated source.
pub trait Watchable {
    /// Identity used to deduplicate watches within one [`WatchSet`].
    fn watch_key(&self) -> usize;

    /// Take a new subscription.
    fn watch(&self) -> Watch;
}

/// Watches held by one consumer, at most one per source.
#[derive(Default, Debug)]
pub struct WatchSet {
    watches: HashMap<usize, Watch>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: usize) -> bool {
        self.watches.contains_key(&key)
    }

    pub fn insert(&mut self, key: usize, watch: Watch) {
        self.watches.insert(key, watch);
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Release every watch.
    pub fn clear(&mut self) {
        // Drain first so release callbacks never see a borrowed set.
        let watches: Vec<Watch> = self.watches.drain().map(|(_, w)| w).collect();
        drop(watches);
    }
}

pub type SharedWatchSet = Rc<RefCell<WatchSet>>;

thread_local! {
    static FRAMES: RefCell<Vec<SharedWatchSet>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with `set` as the innermost tracking frame.
pub fn with_frame<R>(set: &SharedWatchSet, f: impl FnOnce() -> R) -> R {
    FRAMES.with(|frames| frames.borrow_mut().push(set.clone()));
    let result = f();
    FRAMES.with(|frames| frames.borrow_mut().pop());
    result
}

/// Register interest in `source` with the innermost frame, if any.
pub fn track(source: &dyn Watchable) {
    let Some(set) = FRAMES.with(|frames| frames.borrow().last().cloned()) else {
        return;
    };
    let key = source.watch_key();
    if set.borrow().contains(key) {
        return;
    }
    let watch = source.watch();
    set.borrow_mut().insert(key, watch);
}

/// Whether a tracking frame is open.
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}
