//! Deferred results - single-threaded, settle-once handles.
//!
//! A [`Deferred`] is what the runtime hands back for work that completes
//! later on the same thread: a scheduled task, a custom element definition,
//! a setup function's asynchronous effect declarations.
//!
//! There is no executor and no polling. Callbacks registered with
//! [`Deferred::on_settle`] run synchronously when the value settles, or
//! immediately if it already has.
//!
//! ```ignore
//! let d = Deferred::new();
//! d.on_settle(|result| println!("{result:?}"));
//! d.resolve(42);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};

enum State<T> {
    Pending,
    Settled(Result<T>),
}

type SettleCallback<T> = Box<dyn FnOnce(&Result<T>)>;

struct Inner<T> {
    state: State<T>,
    callbacks: Vec<SettleCallback<T>>,
}

/// A value that settles once, either resolved or rejected.
pub struct Deferred<T: Clone + 'static> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: Clone + 'static> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Create a pending deferred.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Create an already-resolved deferred.
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// Create an already-rejected deferred.
    pub fn rejected(error: Error) -> Self {
        let deferred = Self::new();
        deferred.reject(error);
        deferred
    }

    /// Resolve. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject. Returns false if already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    /// Settle with a result. The first settle wins; later ones are ignored.
    pub fn settle(&self, result: Result<T>) -> bool {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.state, State::Settled(_)) {
                return false;
            }
            inner.state = State::Settled(result.clone());
            std::mem::take(&mut inner.callbacks)
        };
        for callback in callbacks {
            callback(&result);
        }
        true
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, State::Pending)
    }

    /// The settled result, if any.
    pub fn result(&self) -> Option<Result<T>> {
        match &self.inner.borrow().state {
            State::Pending => None,
            State::Settled(result) => Some(result.clone()),
        }
    }

    /// Run `f` once this settles (immediately if it already has).
    pub fn on_settle<F>(&self, f: F)
    where
        F: FnOnce(&Result<T>) + 'static,
    {
        let settled = match &self.inner.borrow().state {
            State::Settled(result) => Some(result.clone()),
            State::Pending => None,
        };
        match settled {
            Some(result) => f(&result),
            None => self.inner.borrow_mut().callbacks.push(Box::new(f)),
        }
    }

    /// Derive a deferred that resolves with `f(value)`.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        let mapped = Deferred::new();
        let out = mapped.clone();
        self.on_settle(move |result| {
            out.settle(result.clone().map(f));
        });
        mapped
    }
}

/// Resolve once every input resolves; reject on the first rejection.
pub fn all<T: Clone + 'static>(items: Vec<Deferred<T>>) -> Deferred<Vec<T>> {
    let combined = Deferred::new();
    if items.is_empty() {
        combined.resolve(Vec::new());
        return combined;
    }

    let slots: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; items.len()]));
    let remaining = Rc::new(RefCell::new(items.len()));

    for (i, item) in items.iter().enumerate() {
        let combined = combined.clone();
        let slots = slots.clone();
        let remaining = remaining.clone();
        item.on_settle(move |result| match result {
            Err(e) => {
                combined.reject(e.clone());
            }
            Ok(value) => {
                slots.borrow_mut()[i] = Some(value.clone());
                let left = {
                    let mut remaining = remaining.borrow_mut();
                    *remaining -= 1;
                    *remaining
                };
                if left == 0 {
                    let values = slots.borrow_mut().drain(..).flatten().collect();
                    combined.resolve(values);
                }
            }
        });
    }
    combined
}

/// Settle with whichever input settles first. The other is abandoned, not cancelled.
pub fn race<T: Clone + 'static>(a: &Deferred<T>, b: &Deferred<T>) -> Deferred<T> {
    let winner = Deferred::new();
    for side in [a, b] {
        let winner = winner.clone();
        side.on_settle(move |result| {
            winner.settle(result.clone());
        });
    }
    winner
}
