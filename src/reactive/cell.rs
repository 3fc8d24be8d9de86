//! Cell - the reactive value behind a component property.
//!
//! Three shapes, matching what a property can be backed by:
//!
//! - `Mutable` - a `spark-signals` signal; readable and writable
//! - `Derived` - a getter recomputed on read; read-only
//! - `Sensor` - an event-driven value; read-only
//!
//! Reads inside a `spark-signals` effect are tracked by the signals core as
//! usual. Sensor reads additionally activate the sensor's listeners through
//! the watch frame of the running effect.

use std::fmt;
use std::rc::Rc;

use spark_signals::{Signal, derived, signal};

use crate::sensor::Sensor;
use crate::types::Value;

#[derive(Clone)]
pub enum Cell {
    Mutable(Signal<Value>),
    Derived(Rc<dyn Fn() -> Value>),
    Sensor(Sensor),
}

impl Cell {
    /// Mutable cell with an initial value.
    pub fn state(initial: impl Into<Value>) -> Self {
        Cell::Mutable(signal(initial.into()))
    }

    /// Read-only cell recomputed on every read.
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Cell::Derived(Rc::new(f))
    }

    /// Read-only cell memoized by the signals core.
    pub fn memo<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        let memo = derived(f);
        Cell::Derived(Rc::new(move || memo.get()))
    }

    pub fn get(&self) -> Value {
        match self {
            Cell::Mutable(signal) => signal.get(),
            Cell::Derived(getter) => getter(),
            Cell::Sensor(sensor) => sensor.get(),
        }
    }

    /// Write if mutable. Returns false for read-only cells.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        match self {
            Cell::Mutable(signal) => {
                signal.set(value.into());
                true
            }
            Cell::Derived(_) | Cell::Sensor(_) => false,
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, Cell::Mutable(_))
    }
}

impl From<Signal<Value>> for Cell {
    fn from(signal: Signal<Value>) -> Self {
        Cell::Mutable(signal)
    }
}

impl From<Sensor> for Cell {
    fn from(sensor: Sensor) -> Self {
        Cell::Sensor(sensor)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Mutable(_) => f.write_str("Cell::Mutable"),
            Cell::Derived(_) => f.write_str("Cell::Derived"),
            Cell::Sensor(_) => f.write_str("Cell::Sensor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_reads_and_writes() {
        let cell = Cell::state(1);
        assert!(cell.is_mutable());
        assert_eq!(cell.get(), Value::Int(1));
        assert!(cell.set(2));
        assert_eq!(cell.get(), Value::Int(2));
    }

    #[test]
    fn test_derived_is_read_only() {
        let source = Cell::state("a");
        let s = source.clone();
        let upper = Cell::derived(move || Value::from(s.get().to_string().to_uppercase()));
        assert!(!upper.is_mutable());
        assert!(!upper.set("x"));
        assert_eq!(upper.get(), Value::from("A"));
        source.set("b");
        assert_eq!(upper.get(), Value::from("B"));
    }

    #[test]
    fn test_memo_follows_source() {
        let count = signal(Value::Int(2));
        let c = count.clone();
        let doubled = Cell::memo(move || Value::Int(c.get().as_int().unwrap_or(0) * 2));
        assert_eq!(doubled.get(), Value::Int(4));
        count.set(Value::Int(5));
        assert_eq!(doubled.get(), Value::Int(10));
    }
}
