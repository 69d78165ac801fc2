//! Committed and pending signal values.
//!
//! The [`SignalStore`] exclusively owns value storage. Every signal has a
//! *current* value, the one all readers observe, and a *next* value that
//! writers fill in before [`commit`](SignalStore::commit) publishes it. The
//! store also remembers the value each changed signal had before the running
//! delta cycle and before the running time point, which is what waiters and
//! tracers compare against.

use std::collections::BTreeMap;
use tessel_common::Value;
use tessel_netlist::{Netlist, SignalId};

/// Double-buffered signal values with change tracking.
#[derive(Debug, Clone)]
pub struct SignalStore {
    current: Vec<Value>,
    next: Vec<Value>,
    delta_before: BTreeMap<SignalId, Value>,
    point_before: BTreeMap<SignalId, Value>,
}

impl SignalStore {
    /// Creates a store holding every signal's initial value.
    pub fn new(netlist: &Netlist) -> Self {
        let current: Vec<Value> = netlist.signals.values().map(|s| s.initial_value()).collect();
        Self {
            next: current.clone(),
            current,
            delta_before: BTreeMap::new(),
            point_before: BTreeMap::new(),
        }
    }

    /// Returns the number of signals.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns `true` if the store holds no signals.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Returns the committed value of a signal.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a signal of the netlist the store was built from.
    pub fn current(&self, id: SignalId) -> &Value {
        &self.current[id.index()]
    }

    /// Sets the pending value of a signal without publishing it.
    ///
    /// The value must already have the signal's width.
    pub fn set_next(&mut self, id: SignalId, value: Value) {
        debug_assert_eq!(
            value.width(),
            self.current[id.index()].width(),
            "width mismatch writing {id}"
        );
        self.next[id.index()] = value;
    }

    /// Publishes the pending value of a signal.
    ///
    /// Returns `true` if the committed value changed.
    pub fn commit(&mut self, id: SignalId) -> bool {
        let i = id.index();
        if self.next[i] == self.current[i] {
            return false;
        }
        let old = std::mem::replace(&mut self.current[i], self.next[i].clone());
        self.point_before.entry(id).or_insert_with(|| old.clone());
        self.delta_before.entry(id).or_insert(old);
        true
    }

    /// Sets and publishes a value in one step. Returns `true` on change.
    pub fn write(&mut self, id: SignalId, value: Value) -> bool {
        self.set_next(id, value);
        self.commit(id)
    }

    /// Returns the signals changed in the running delta cycle, each with
    /// its value before the delta, and starts a new delta.
    pub fn take_delta_changes(&mut self) -> BTreeMap<SignalId, Value> {
        std::mem::take(&mut self.delta_before)
    }

    /// Returns the signals changed in the running time point, each with its
    /// value before the time point, and starts a new time point.
    pub fn take_point_changes(&mut self) -> BTreeMap<SignalId, Value> {
        self.delta_before.clear();
        std::mem::take(&mut self.point_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_netlist::{NetlistBuilder, Shape};

    fn store() -> (SignalStore, SignalId, SignalId) {
        let mut b = NetlistBuilder::new();
        let a = b.signal("a", Shape::unsigned(4));
        let r = b.register("r", Shape::unsigned(4), Value::from_u64(5, 4));
        (SignalStore::new(b.netlist()), a, r)
    }

    #[test]
    fn initial_values() {
        let (s, a, r) = store();
        assert_eq!(s.len(), 2);
        assert_eq!(s.current(a), &Value::unknown(4));
        assert_eq!(s.current(r).to_u64(), Some(5));
    }

    #[test]
    fn next_is_invisible_until_commit() {
        let (mut s, a, _) = store();
        s.set_next(a, Value::from_u64(3, 4));
        assert_eq!(s.current(a), &Value::unknown(4));
        assert!(s.commit(a));
        assert_eq!(s.current(a).to_u64(), Some(3));
        assert!(!s.commit(a));
    }

    #[test]
    fn unchanged_write_is_not_recorded() {
        let (mut s, _, r) = store();
        assert!(!s.write(r, Value::from_u64(5, 4)));
        assert!(s.take_delta_changes().is_empty());
        assert!(s.take_point_changes().is_empty());
    }

    #[test]
    fn changes_keep_oldest_value() {
        let (mut s, _, r) = store();
        s.write(r, Value::from_u64(6, 4));
        let delta = s.take_delta_changes();
        assert_eq!(delta[&r].to_u64(), Some(5));

        s.write(r, Value::from_u64(7, 4));
        let delta = s.take_delta_changes();
        assert_eq!(delta[&r].to_u64(), Some(6));

        let point = s.take_point_changes();
        assert_eq!(point[&r].to_u64(), Some(5));
        assert!(s.take_point_changes().is_empty());
    }
}
