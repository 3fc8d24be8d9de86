//! Host Platform - Clock, microtasks, paint callbacks and timers.
//!
//! The runtime never blocks. Work that must happen "later" is queued here and
//! run by whoever drives the host loop:
//!
//! - Microtasks: mutation-observer delivery, deferred component connection.
//!   Drained by [`run_microtasks`].
//! - Paint callbacks: the scheduler's once-per-frame flush. Run by [`render_frame`].
//! - Timers: the bounded wait for nested component definitions. Fired by
//!   [`advance_time`] against a virtual millisecond clock.
//!
//! # Example
//!
//! ```ignore
//! use spark_elements::platform;
//!
//! // One turn of a host loop
//! platform::advance_time(16);
//! platform::render_frame();
//!
//! // Or, in tests: run everything that is ready
//! platform::run_until_idle();
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use spark_signals::flush_sync;

use crate::dom::NodeId;

type Task = Box<dyn FnOnce()>;

/// Upper bound on frames rendered by [`run_until_idle`].
const MAX_IDLE_FRAMES: usize = 64;

/// Handle for a pending paint callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

/// Handle for a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Runs a (re-created) script element. Installed by the embedder.
pub type ScriptRunner = Rc<dyn Fn(NodeId)>;

// =============================================================================
// State
// =============================================================================

thread_local! {
    /// Virtual clock in milliseconds.
    static CLOCK: Cell<u64> = const { Cell::new(0) };

    /// Id counter shared by frames and timers.
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };

    static MICROTASKS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());

    /// Set while microtasks drain so nested drains return early.
    static DRAINING: Cell<bool> = const { Cell::new(false) };

    static FRAMES: RefCell<Vec<(FrameId, Task)>> = RefCell::new(Vec::new());

    /// Timers ordered by (due time, id).
    static TIMERS: RefCell<BTreeMap<(u64, u64), Task>> = RefCell::new(BTreeMap::new());

    /// Timer id -> due time, for `clear_timeout`.
    static TIMER_DUE: RefCell<HashMap<u64, u64>> = RefCell::new(HashMap::new());

    static SCRIPT_RUNNER: RefCell<Option<ScriptRunner>> = const { RefCell::new(None) };
}

fn next_id() -> u64 {
    NEXT_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

/// Current virtual time in milliseconds.
pub fn now() -> u64 {
    CLOCK.with(|c| c.get())
}

// =============================================================================
// Microtasks
// =============================================================================

/// Queue work to run after the current synchronous work completes.
pub fn queue_microtask<F>(f: F)
where
    F: FnOnce() + 'static,
{
    MICROTASKS.with(|q| q.borrow_mut().push_back(Box::new(f)));
}

pub fn has_pending_microtasks() -> bool {
    MICROTASKS.with(|q| !q.borrow().is_empty())
}

/// Drain the microtask queue, including microtasks queued while draining.
///
/// Pending reactive effects are flushed after each drain.
pub fn run_microtasks() {
    if DRAINING.with(|d| d.replace(true)) {
        return;
    }

    loop {
        while let Some(task) = MICROTASKS.with(|q| q.borrow_mut().pop_front()) {
            task();
        }
        flush_sync();
        if !has_pending_microtasks() {
            break;
        }
    }

    DRAINING.with(|d| d.set(false));
}

// =============================================================================
// Paint callbacks
// =============================================================================

/// Run `f` on the next rendered frame.
pub fn request_animation_frame<F>(f: F) -> FrameId
where
    F: FnOnce() + 'static,
{
    let id = FrameId(next_id());
    FRAMES.with(|frames| frames.borrow_mut().push((id, Box::new(f))));
    id
}

pub fn cancel_animation_frame(id: FrameId) {
    FRAMES.with(|frames| frames.borrow_mut().retain(|(frame_id, _)| *frame_id != id));
}

pub fn has_pending_frame() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Render one frame: run every paint callback requested before the frame
/// started, draining microtasks after each. Returns the callback count.
///
/// Callbacks requested during the frame wait for the next one.
pub fn render_frame() -> usize {
    run_microtasks();
    let callbacks = FRAMES.with(|frames| std::mem::take(&mut *frames.borrow_mut()));
    let count = callbacks.len();
    for (_, callback) in callbacks {
        callback();
        run_microtasks();
    }
    count
}

// =============================================================================
// Timers
// =============================================================================

/// Run `f` once `delay_ms` of virtual time has passed.
pub fn set_timeout<F>(delay_ms: u64, f: F) -> TimerId
where
    F: FnOnce() + 'static,
{
    let id = next_id();
    let due = now() + delay_ms;
    TIMERS.with(|timers| timers.borrow_mut().insert((due, id), Box::new(f)));
    TIMER_DUE.with(|index| index.borrow_mut().insert(id, due));
    TimerId(id)
}

pub fn clear_timeout(id: TimerId) {
    if let Some(due) = TIMER_DUE.with(|index| index.borrow_mut().remove(&id.0)) {
        TIMERS.with(|timers| timers.borrow_mut().remove(&(due, id.0)));
    }
}

pub fn pending_timer_count() -> usize {
    TIMERS.with(|timers| timers.borrow().len())
}

/// Advance the clock, firing due timers in order.
pub fn advance_time(ms: u64) {
    let target = now() + ms;
    loop {
        let next = TIMERS.with(|timers| {
            let mut timers = timers.borrow_mut();
            let key = timers.keys().next().copied()?;
            if key.0 > target {
                return None;
            }
            timers.remove(&key).map(|task| (key, task))
        });
        let Some(((due, id), task)) = next else { break };
        TIMER_DUE.with(|index| index.borrow_mut().remove(&id));
        CLOCK.with(|c| c.set(due));
        task();
        run_microtasks();
    }
    CLOCK.with(|c| c.set(target));
}

// =============================================================================
// Loop helpers
// =============================================================================

/// Run microtasks and render frames until nothing is pending.
///
/// Timers are not advanced. Frame rendering is bounded so work that keeps
/// rescheduling itself cannot spin forever.
pub fn run_until_idle() {
    run_microtasks();
    for _ in 0..MAX_IDLE_FRAMES {
        if !has_pending_frame() {
            break;
        }
        render_frame();
    }
}

// =============================================================================
// Script execution hook
// =============================================================================

/// Install the function that executes script elements.
pub fn set_script_runner<F>(runner: F)
where
    F: Fn(NodeId) + 'static,
{
    SCRIPT_RUNNER.with(|r| *r.borrow_mut() = Some(Rc::new(runner)));
}

/// Execute a script element. Returns false when no runner is installed.
pub fn run_script(script: NodeId) -> bool {
    let runner = SCRIPT_RUNNER.with(|r| r.borrow().clone());
    match runner {
        Some(runner) => {
            runner(script);
            true
        }
        None => false,
    }
}

/// Reset all platform state (for testing)
pub fn reset_platform() {
    CLOCK.with(|c| c.set(0));
    MICROTASKS.with(|q| q.borrow_mut().clear());
    DRAINING.with(|d| d.set(false));
    FRAMES.with(|frames| frames.borrow_mut().clear());
    TIMERS.with(|timers| timers.borrow_mut().clear());
    TIMER_DUE.with(|index| index.borrow_mut().clear());
    SCRIPT_RUNNER.with(|r| *r.borrow_mut() = None);
}
