//! Scheduler - key-deduplicated work flushed once per paint cycle.
//!
//! Writes that do not need to happen synchronously (passive event handlers,
//! coalesced sensor updates) are queued here under a dedupe key. Scheduling
//! the same key again before the next flush replaces the pending thunk; the
//! task keeps its original position in the queue.
//!
//! # Frame drivers
//!
//! The scheduler does not know what a frame is. It asks a [`FrameDriver`] for
//! "call me on the next frame". [`AnimationFrameDriver`] uses the platform's
//! paint callbacks; [`ManualFrameDriver`] fires only when told to, which is
//! what deterministic tests want.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::scheduler::{self, ManualFrameDriver, Scheduler};
//!
//! let driver = ManualFrameDriver::new();
//! scheduler::install(Scheduler::new(driver.clone()));
//!
//! scheduler::schedule(Some("resize"), || Ok(()));
//! scheduler::schedule(Some("resize"), || Ok(())); // replaces the first
//! driver.fire(); // runs once
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::platform;

/// Work queued on the scheduler.
pub type Thunk = Box<dyn FnOnce() -> Result<()>>;

type FrameCallback = Box<dyn FnOnce()>;

// =============================================================================
// Frame Drivers
// =============================================================================

/// Source of "next frame" callbacks.
pub trait FrameDriver {
    fn request_frame(&self, callback: FrameCallback);
}

/// Flushes on the platform's next paint callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimationFrameDriver;

impl FrameDriver for AnimationFrameDriver {
    fn request_frame(&self, callback: FrameCallback) {
        platform::request_animation_frame(callback);
    }
}

/// Flushes only when [`ManualFrameDriver::fire`] is called.
#[derive(Clone, Default)]
pub struct ManualFrameDriver {
    pending: Rc<RefCell<Vec<FrameCallback>>>,
}

impl ManualFrameDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every callback requested so far. Returns how many ran.
    pub fn fire(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.pending.borrow_mut());
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    pub fn requested(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl FrameDriver for ManualFrameDriver {
    fn request_frame(&self, callback: FrameCallback) {
        self.pending.borrow_mut().push(callback);
    }
}

// =============================================================================
// Scheduler
// =============================================================================

struct PendingTask {
    thunk: Thunk,
    waiters: Vec<Deferred<()>>,
}

#[derive(Default)]
struct Queue {
    /// Keys in first-registration order.
    order: Vec<String>,
    tasks: HashMap<String, PendingTask>,
}

struct Shared {
    driver: Box<dyn FrameDriver>,
    queue: RefCell<Queue>,
    frame_requested: Cell<bool>,
    next_anonymous: Cell<u64>,
}

/// Frame-batched task queue. Cloning shares the queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Rc<Shared>,
}

impl Scheduler {
    /// Create a scheduler and request its priming frame, so work queued
    /// during startup is flushed on the first frame.
    pub fn new(driver: impl FrameDriver + 'static) -> Self {
        let scheduler = Self {
            shared: Rc::new(Shared {
                driver: Box::new(driver),
                queue: RefCell::new(Queue::default()),
                frame_requested: Cell::new(false),
                next_anonymous: Cell::new(0),
            }),
        };
        scheduler.request_flush();
        scheduler
    }

    /// Queue `thunk` for the next flush.
    ///
    /// With a key, a task already pending under that key is replaced (last
    /// write wins) and every caller's deferred settles with the thunk that
    /// finally runs. Without a key the task is always distinct.
    pub fn schedule<F>(&self, key: Option<&str>, thunk: F) -> Deferred<()>
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        let key = match key {
            Some(key) => key.to_string(),
            None => {
                let n = self.shared.next_anonymous.get();
                self.shared.next_anonymous.set(n + 1);
                format!("#anonymous-{n}")
            }
        };
        let deferred = Deferred::new();
        {
            let mut queue = self.shared.queue.borrow_mut();
            match queue.tasks.get_mut(&key) {
                Some(task) => {
                    tracing::trace!(key = %key, "coalesced scheduled task");
                    task.thunk = Box::new(thunk);
                    task.waiters.push(deferred.clone());
                }
                None => {
                    queue.order.push(key.clone());
                    queue.tasks.insert(
                        key,
                        PendingTask {
                            thunk: Box::new(thunk),
                            waiters: vec![deferred.clone()],
                        },
                    );
                }
            }
        }
        self.request_flush();
        deferred
    }

    /// Drop a pending task. Its deferreds reject.
    pub fn cancel(&self, key: &str) -> bool {
        let task = {
            let mut queue = self.shared.queue.borrow_mut();
            queue.order.retain(|k| k != key);
            queue.tasks.remove(key)
        };
        let Some(task) = task else {
            return false;
        };
        let error = Error::TaskFailed {
            key: key.to_string(),
            reason: "cancelled".to_string(),
        };
        for waiter in task.waiters {
            waiter.reject(error.clone());
        }
        true
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.shared.queue.borrow().tasks.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.queue.borrow().order.len()
    }

    /// Run every task queued before this call, in first-registration order.
    ///
    /// A failing task rejects only its own deferreds. Tasks scheduled while
    /// flushing wait for the next frame.
    pub fn flush(&self) -> usize {
        self.shared.frame_requested.set(false);
        let Queue { order, mut tasks } = std::mem::take(&mut *self.shared.queue.borrow_mut());
        if order.is_empty() {
            return 0;
        }
        tracing::debug!(tasks = order.len(), "flushing scheduled tasks");

        let mut ran = 0;
        for key in order {
            let Some(task) = tasks.remove(&key) else {
                continue;
            };
            ran += 1;
            match (task.thunk)() {
                Ok(()) => {
                    for waiter in task.waiters {
                        waiter.resolve(());
                    }
                }
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "scheduled task failed");
                    for waiter in task.waiters {
                        waiter.reject(error.clone());
                    }
                }
            }
        }
        ran
    }

    fn request_flush(&self) {
        if self.shared.frame_requested.replace(true) {
            return;
        }
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        self.shared.driver.request_frame(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                Scheduler { shared }.flush();
            }
        }));
    }
}

// =============================================================================
// Installed Scheduler
// =============================================================================

thread_local! {
    static SCHEDULER: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

/// Install the scheduler used by [`schedule`] on this thread.
pub fn install(scheduler: Scheduler) {
    SCHEDULER.with(|s| *s.borrow_mut() = Some(scheduler));
}

/// The installed scheduler, created on first use with [`AnimationFrameDriver`].
pub fn current() -> Scheduler {
    SCHEDULER.with(|s| {
        s.borrow_mut()
            .get_or_insert_with(|| Scheduler::new(AnimationFrameDriver))
            .clone()
    })
}

/// Queue work on the installed scheduler.
pub fn schedule<F>(key: Option<&str>, thunk: F) -> Deferred<()>
where
    F: FnOnce() -> Result<()> + 'static,
{
    current().schedule(key, thunk)
}

/// Drop the installed scheduler (for testing)
pub fn reset_scheduler() {
    SCHEDULER.with(|s| *s.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Scheduler, ManualFrameDriver) {
        let driver = ManualFrameDriver::new();
        let scheduler = Scheduler::new(driver.clone());
        (scheduler, driver)
    }

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn test_priming_frame() {
        let (scheduler, driver) = setup();
        assert_eq!(driver.requested(), 1);

        let count = counter();
        let c = count.clone();
        scheduler.schedule(None, move || {
            c.set(c.get() + 1);
            Ok(())
        });
        // Already covered by the priming request.
        assert_eq!(driver.requested(), 1);
        driver.fire();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_same_key_coalesces() {
        let (scheduler, driver) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let first = scheduler.schedule(Some("k"), move || {
            l.borrow_mut().push("first");
            Ok(())
        });
        let l = log.clone();
        let second = scheduler.schedule(Some("k"), move || {
            l.borrow_mut().push("second");
            Ok(())
        });
        assert_eq!(scheduler.pending_count(), 1);

        driver.fire();
        assert_eq!(*log.borrow(), vec!["second"]);
        assert_eq!(first.result(), Some(Ok(())));
        assert_eq!(second.result(), Some(Ok(())));
    }

    #[test]
    fn test_order_is_first_registration() {
        let (scheduler, driver) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        for key in ["a", "b", "a"] {
            let l = log.clone();
            scheduler.schedule(Some(key), move || {
                l.borrow_mut().push(key);
                Ok(())
            });
        }
        driver.fire();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_failure_is_isolated() {
        let (scheduler, driver) = setup();
        let count = counter();

        let failing = scheduler.schedule(Some("bad"), || {
            Err(Error::TaskFailed {
                key: "bad".into(),
                reason: "boom".into(),
            })
        });
        let c = count.clone();
        let fine = scheduler.schedule(Some("good"), move || {
            c.set(c.get() + 1);
            Ok(())
        });

        driver.fire();
        assert!(matches!(failing.result(), Some(Err(Error::TaskFailed { .. }))));
        assert_eq!(fine.result(), Some(Ok(())));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_work_scheduled_during_flush_waits() {
        let (scheduler, driver) = setup();
        let count = counter();

        let s = scheduler.clone();
        let c = count.clone();
        scheduler.schedule(Some("outer"), move || {
            let c = c.clone();
            s.schedule(Some("inner"), move || {
                c.set(c.get() + 1);
                Ok(())
            });
            Ok(())
        });

        driver.fire();
        assert_eq!(count.get(), 0);
        assert!(scheduler.is_pending("inner"));
        driver.fire();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cancel() {
        let (scheduler, driver) = setup();
        let count = counter();
        let c = count.clone();
        let pending = scheduler.schedule(Some("k"), move || {
            c.set(1);
            Ok(())
        });
        assert!(scheduler.cancel("k"));
        assert!(!scheduler.cancel("k"));
        driver.fire();
        assert_eq!(count.get(), 0);
        assert!(matches!(pending.result(), Some(Err(_))));
    }

    #[test]
    fn test_installed_scheduler_uses_platform_frames() {
        platform::reset_platform();
        reset_scheduler();
        let count = counter();
        let c = count.clone();
        schedule(Some("k"), move || {
            c.set(c.get() + 1);
            Ok(())
        });
        assert_eq!(count.get(), 0);
        platform::render_frame();
        assert_eq!(count.get(), 1);
        reset_scheduler();
    }
}
