//! Testbench processes.
//!
//! A process is a state machine the scheduler resumes until it returns a
//! [`Wait`] describing when it wants to run next. Processes observe only
//! committed signal values; their writes are staged in the running delta
//! cycle and committed together once every runnable process has yielded.
//!
//! Three kinds of process come with the simulator: any closure taking a
//! [`ProcessContext`], the [`ClockProcess`] generator behind
//! [`Simulator::add_clock`](crate::Simulator::add_clock), and declarative
//! [`Script`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tessel_common::{Period, Value};
use tessel_netlist::{DomainId, Edge, Netlist, SignalId};

use crate::store::SignalStore;

/// A failure reported by a process. Aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProcessFault {
    /// Description of what went wrong.
    pub message: String,
}

impl ProcessFault {
    /// Creates a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Condition on the values of the signals a [`Wait::Change`] watches.
pub enum Predicate {
    /// Any change.
    Any,
    /// A changed signal now equals the value, zero-extended or truncated to
    /// the signal's width.
    Equals(Value),
    /// Bit 0 of a changed signal went from `0` to `1`.
    Rising,
    /// Bit 0 of a changed signal went from `1` to `0`.
    Falling,
    /// Every watched signal is fully known.
    Known,
    /// Custom test over the current values of all watched signals, in order.
    Custom(Box<dyn Fn(&[&Value]) -> bool>),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Any => f.write_str("Any"),
            Predicate::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Predicate::Rising => f.write_str("Rising"),
            Predicate::Falling => f.write_str("Falling"),
            Predicate::Known => f.write_str("Known"),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Predicate {
    /// Checks the predicate after a delta cycle. `before` maps the signals
    /// changed in that delta to their previous values.
    pub(crate) fn holds(
        &self,
        watched: &[SignalId],
        store: &SignalStore,
        before: &BTreeMap<SignalId, Value>,
    ) -> bool {
        let mut changed = watched
            .iter()
            .filter_map(|id| before.get(id).map(|old| (store.current(*id), old)));
        match self {
            Predicate::Any => changed.next().is_some(),
            Predicate::Equals(target) => {
                changed.any(|(now, _)| *now == target.resize(now.width(), false))
            }
            Predicate::Rising => {
                changed.any(|(now, old)| Edge::Posedge.matches(old.get(0), now.get(0)))
            }
            Predicate::Falling => {
                changed.any(|(now, old)| Edge::Negedge.matches(old.get(0), now.get(0)))
            }
            Predicate::Known => {
                changed.next().is_some()
                    && watched.iter().all(|id| store.current(*id).is_fully_known())
            }
            Predicate::Custom(test) => {
                if changed.next().is_none() {
                    return false;
                }
                let values: Vec<&Value> = watched.iter().map(|id| store.current(*id)).collect();
                test(&values)
            }
        }
    }
}

/// What a process waits for before it is resumed again.
#[derive(Debug)]
pub enum Wait {
    /// Resume after simulated time has advanced by the period.
    Delay(Period),
    /// Resume after a delta cycle in which one of `signals` changed and the
    /// predicate holds.
    Change {
        /// The watched signals.
        signals: Vec<SignalId>,
        /// The condition to wait for.
        predicate: Predicate,
    },
    /// Resume after the next active edge of the domain.
    Tick(DomainId),
    /// Resume once the writes of this delta have settled.
    Settle,
    /// Retire the process.
    Done,
}

impl Wait {
    /// Waits for any change of the given signals.
    pub fn changed(signals: impl IntoIterator<Item = SignalId>) -> Self {
        Wait::Change {
            signals: signals.into_iter().collect(),
            predicate: Predicate::Any,
        }
    }

    /// Waits until `signal` changes to `value`.
    pub fn until(signal: SignalId, value: Value) -> Self {
        Wait::Change {
            signals: vec![signal],
            predicate: Predicate::Equals(value),
        }
    }
}

/// Resumable testbench logic.
pub trait Process {
    /// Runs until the next suspension point.
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Wait, ProcessFault>;
}

impl<F> Process for F
where
    F: FnMut(&mut ProcessContext<'_>) -> Result<Wait, ProcessFault>,
{
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Wait, ProcessFault> {
        self(ctx)
    }
}

/// A write staged by a process in the running delta cycle.
#[derive(Debug, Clone)]
pub(crate) struct Staged {
    pub value: Value,
    pub process: usize,
}

/// A drive rule broken by a process. Reported in place of any fault the
/// process returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Violation {
    Undeclared(SignalId),
    Conflict { signal: SignalId, other: usize },
}

/// The view a process has of the simulation while it runs.
pub struct ProcessContext<'a> {
    netlist: &'a Netlist,
    store: &'a SignalStore,
    staged: &'a mut BTreeMap<SignalId, Staged>,
    drives: &'a BTreeSet<SignalId>,
    edged: &'a [DomainId],
    name: &'a str,
    index: usize,
    now: Period,
    violation: Option<Violation>,
}

impl<'a> ProcessContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        netlist: &'a Netlist,
        store: &'a SignalStore,
        staged: &'a mut BTreeMap<SignalId, Staged>,
        drives: &'a BTreeSet<SignalId>,
        edged: &'a [DomainId],
        name: &'a str,
        index: usize,
        now: Period,
    ) -> Self {
        Self {
            netlist,
            store,
            staged,
            drives,
            edged,
            name,
            index,
            now,
            violation: None,
        }
    }

    pub(crate) fn into_violation(self) -> Option<Violation> {
        self.violation
    }

    /// Current simulated time.
    pub fn now(&self) -> Period {
        self.now
    }

    /// Name the process was registered under.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Looks up a signal by name.
    pub fn signal(&self, name: &str) -> Result<SignalId, ProcessFault> {
        self.netlist
            .find_signal(name)
            .ok_or_else(|| ProcessFault::new(format!("unknown signal `{name}`")))
    }

    /// Returns the committed value of a signal.
    ///
    /// Writes staged in the running delta are not visible until committed.
    pub fn get(&self, signal: SignalId) -> &Value {
        self.store.current(signal)
    }

    /// Returns the committed value as an unsigned integer, `None` if it has
    /// unknown bits or does not fit.
    pub fn get_u64(&self, signal: SignalId) -> Option<u64> {
        self.get(signal).to_u64()
    }

    /// Returns the committed value as a two's complement integer.
    pub fn get_i64(&self, signal: SignalId) -> Option<i64> {
        self.get(signal).to_i64()
    }

    /// Returns `true` if the domain showed its active edge in the delta
    /// cycle that woke this process.
    pub fn edged(&self, domain: DomainId) -> bool {
        self.edged.contains(&domain)
    }

    /// Stages a write, zero-extending or truncating `value` to the signal's
    /// width.
    ///
    /// Fails if the signal was not declared as driven by this process, or
    /// if another process already wrote it in this delta cycle.
    pub fn set(&mut self, signal: SignalId, value: Value) -> Result<(), ProcessFault> {
        let Some(decl) = self.netlist.signals.try_get(signal) else {
            return Err(ProcessFault::new(format!("unknown signal {signal}")));
        };
        if !self.drives.contains(&signal) {
            self.violation = Some(Violation::Undeclared(signal));
            return Err(ProcessFault::new(format!(
                "`{}` is not driven by this process",
                decl.name
            )));
        }
        if let Some(prior) = self.staged.get(&signal) {
            if prior.process != self.index {
                self.violation = Some(Violation::Conflict {
                    signal,
                    other: prior.process,
                });
                return Err(ProcessFault::new(format!(
                    "`{}` was already written in this delta",
                    decl.name
                )));
            }
        }
        let value = value.resize(decl.shape.width, false);
        self.staged.insert(
            signal,
            Staged {
                value,
                process: self.index,
            },
        );
        Ok(())
    }

    /// Stages an unsigned integer write.
    pub fn set_u64(&mut self, signal: SignalId, value: u64) -> Result<(), ProcessFault> {
        let width = self.width(signal)?;
        self.set(signal, Value::from_u64(value, width))
    }

    /// Stages a two's complement integer write.
    pub fn set_i64(&mut self, signal: SignalId, value: i64) -> Result<(), ProcessFault> {
        let width = self.width(signal)?;
        self.set(signal, Value::from_i64(value, width))
    }

    /// Builds a fault carrying `message`.
    pub fn fail(&self, message: impl Into<String>) -> ProcessFault {
        ProcessFault::new(message)
    }

    /// Fails with `message` unless `condition` holds.
    pub fn check(&self, condition: bool, message: impl Into<String>) -> Result<(), ProcessFault> {
        if condition {
            Ok(())
        } else {
            Err(self.fail(message))
        }
    }

    fn width(&self, signal: SignalId) -> Result<u32, ProcessFault> {
        self.netlist
            .signals
            .try_get(signal)
            .map(|decl| decl.shape.width)
            .ok_or_else(|| ProcessFault::new(format!("unknown signal {signal}")))
    }

    fn matches(&self, signal: SignalId, expected: &Value) -> bool {
        let now = self.get(signal);
        *now == expected.resize(now.width(), false)
    }
}

/// Toggles a 1-bit clock signal every half period.
///
/// The clock starts low at time zero and rises for the first time after
/// `phase`.
#[derive(Debug, Clone)]
pub struct ClockProcess {
    signal: SignalId,
    half: Period,
    phase: Period,
    level: Option<bool>,
}

impl ClockProcess {
    /// A clock on `signal` with the given period. `phase` defaults to half
    /// the period.
    pub fn new(signal: SignalId, period: Period, phase: Option<Period>) -> Self {
        let half = period / 2;
        Self {
            signal,
            half,
            phase: phase.unwrap_or(half),
            level: None,
        }
    }
}

impl Process for ClockProcess {
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Wait, ProcessFault> {
        if self.half.is_zero() {
            return Err(ctx.fail("clock period must be at least 2 fs"));
        }
        let next = match self.level {
            None if !self.phase.is_zero() => {
                ctx.set(self.signal, Value::from_bool(false))?;
                self.level = Some(false);
                return Ok(Wait::Delay(self.phase));
            }
            None => true,
            Some(level) => !level,
        };
        ctx.set(self.signal, Value::from_bool(next))?;
        self.level = Some(next);
        Ok(Wait::Delay(self.half))
    }
}

/// One step of a [`Script`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Write a value to a signal.
    Set(SignalId, Value),
    /// Let simulated time advance.
    Delay(Period),
    /// Wait for the given number of active edges of a domain.
    Tick(DomainId, u32),
    /// Wait until the preceding writes have settled.
    Settle,
    /// Wait until a signal holds a value.
    WaitFor(SignalId, Value),
    /// Fail unless a signal holds a value.
    Expect(SignalId, Value),
}

/// A testbench given as a fixed list of commands.
///
/// ```
/// use tessel_common::{Period, Value};
/// use tessel_netlist::SignalId;
/// use tessel_sim::Script;
///
/// let a = SignalId::from_raw(0);
/// let script = Script::new()
///     .set(a, Value::from_u64(1, 1))
///     .delay(Period::from_ns(10))
///     .expect(a, Value::from_u64(1, 1));
/// assert_eq!(script.drives().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    commands: Vec<Command>,
    pc: usize,
    ticks_left: u32,
}

impl Script {
    /// Creates an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn push(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Appends [`Command::Set`].
    pub fn set(self, signal: SignalId, value: Value) -> Self {
        self.push(Command::Set(signal, value))
    }

    /// Appends [`Command::Delay`].
    pub fn delay(self, period: Period) -> Self {
        self.push(Command::Delay(period))
    }

    /// Appends [`Command::Tick`].
    pub fn tick(self, domain: DomainId, count: u32) -> Self {
        self.push(Command::Tick(domain, count))
    }

    /// Appends [`Command::Settle`].
    pub fn settle(self) -> Self {
        self.push(Command::Settle)
    }

    /// Appends [`Command::WaitFor`].
    pub fn wait_for(self, signal: SignalId, value: Value) -> Self {
        self.push(Command::WaitFor(signal, value))
    }

    /// Appends [`Command::Expect`].
    pub fn expect(self, signal: SignalId, value: Value) -> Self {
        self.push(Command::Expect(signal, value))
    }

    /// Returns the signals the script writes.
    pub fn drives(&self) -> BTreeSet<SignalId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Set(signal, _) => Some(*signal),
                _ => None,
            })
            .collect()
    }
}

impl Process for Script {
    fn resume(&mut self, ctx: &mut ProcessContext<'_>) -> Result<Wait, ProcessFault> {
        while let Some(command) = self.commands.get(self.pc) {
            match command {
                Command::Set(signal, value) => {
                    ctx.set(*signal, value.clone())?;
                    self.pc += 1;
                }
                Command::Delay(period) => {
                    self.pc += 1;
                    return Ok(Wait::Delay(*period));
                }
                Command::Tick(domain, count) => {
                    if self.ticks_left == 0 {
                        self.ticks_left = *count;
                    }
                    if self.ticks_left == 0 {
                        self.pc += 1;
                        continue;
                    }
                    self.ticks_left -= 1;
                    if self.ticks_left == 0 {
                        self.pc += 1;
                    }
                    return Ok(Wait::Tick(*domain));
                }
                Command::Settle => {
                    self.pc += 1;
                    return Ok(Wait::Settle);
                }
                Command::WaitFor(signal, value) => {
                    if !ctx.matches(*signal, value) {
                        return Ok(Wait::until(*signal, value.clone()));
                    }
                    self.pc += 1;
                }
                Command::Expect(signal, value) => {
                    if !ctx.matches(*signal, value) {
                        let name = &ctx.netlist.signal(*signal).name;
                        return Err(ctx.fail(format!(
                            "expected `{name}` = {value}, found {}",
                            ctx.get(*signal)
                        )));
                    }
                    self.pc += 1;
                }
            }
        }
        Ok(Wait::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_netlist::{NetlistBuilder, Shape};

    struct Harness {
        netlist: Netlist,
        store: SignalStore,
        staged: BTreeMap<SignalId, Staged>,
        drives: BTreeSet<SignalId>,
    }

    impl Harness {
        fn new() -> Self {
            let mut b = NetlistBuilder::new();
            b.signal("a", Shape::unsigned(4));
            b.signal("b", Shape::bit());
            let netlist = b.build().unwrap();
            let store = SignalStore::new(&netlist);
            Self {
                netlist,
                store,
                staged: BTreeMap::new(),
                drives: [SignalId::from_raw(0)].into_iter().collect(),
            }
        }

        fn resume(
            &mut self,
            index: usize,
            process: &mut dyn Process,
        ) -> (Result<Wait, ProcessFault>, Option<Violation>) {
            let mut ctx = ProcessContext::new(
                &self.netlist,
                &self.store,
                &mut self.staged,
                &self.drives,
                &[],
                "p",
                index,
                Period::ZERO,
            );
            let result = process.resume(&mut ctx);
            (result, ctx.into_violation())
        }
    }

    #[test]
    fn set_resizes_and_stages() {
        let mut h = Harness::new();
        let a = SignalId::from_raw(0);
        let mut p = |ctx: &mut ProcessContext<'_>| -> Result<Wait, ProcessFault> {
            ctx.set(a, Value::from_u64(0x1f, 5))?;
            assert!(ctx.get(a).has_unknown());
            Ok(Wait::Settle)
        };
        let (result, violation) = h.resume(0, &mut p);
        assert!(matches!(result, Ok(Wait::Settle)));
        assert!(violation.is_none());
        assert_eq!(h.staged[&a].value.to_u64(), Some(0xf));
    }

    #[test]
    fn undeclared_drive_is_a_violation() {
        let mut h = Harness::new();
        let b = SignalId::from_raw(1);
        let mut p = |ctx: &mut ProcessContext<'_>| -> Result<Wait, ProcessFault> {
            ctx.set_u64(b, 1)?;
            Ok(Wait::Done)
        };
        let (result, violation) = h.resume(0, &mut p);
        assert!(result.is_err());
        assert_eq!(violation, Some(Violation::Undeclared(b)));
    }

    #[test]
    fn second_writer_conflicts() {
        let mut h = Harness::new();
        let a = SignalId::from_raw(0);
        let mut p = |ctx: &mut ProcessContext<'_>| -> Result<Wait, ProcessFault> {
            ctx.set_u64(a, 1)?;
            ctx.set_u64(a, 2)?;
            Ok(Wait::Done)
        };
        let (_, violation) = h.resume(0, &mut p);
        assert!(violation.is_none());
        assert_eq!(h.staged[&a].value.to_u64(), Some(2));

        let (_, violation) = h.resume(1, &mut p);
        assert_eq!(violation, Some(Violation::Conflict { signal: a, other: 0 }));
    }

    #[test]
    fn clock_starts_low_then_toggles() {
        let mut h = Harness::new();
        h.drives.insert(SignalId::from_raw(1));
        let b = SignalId::from_raw(1);
        let mut clock = ClockProcess::new(b, Period::from_ns(10), None);

        let (wait, _) = h.resume(0, &mut clock);
        assert!(matches!(wait, Ok(Wait::Delay(p)) if p == Period::from_ns(5)));
        assert_eq!(h.staged[&b].value, Value::from_bool(false));

        let (wait, _) = h.resume(0, &mut clock);
        assert!(matches!(wait, Ok(Wait::Delay(p)) if p == Period::from_ns(5)));
        assert_eq!(h.staged[&b].value, Value::from_bool(true));

        h.resume(0, &mut clock);
        assert_eq!(h.staged[&b].value, Value::from_bool(false));
    }

    #[test]
    fn zero_phase_clock_starts_high() {
        let mut h = Harness::new();
        let b = SignalId::from_raw(1);
        h.drives.insert(b);
        let mut clock = ClockProcess::new(b, Period::from_ns(2), Some(Period::ZERO));
        let (wait, _) = h.resume(0, &mut clock);
        assert!(matches!(wait, Ok(Wait::Delay(p)) if p == Period::from_ns(1)));
        assert_eq!(h.staged[&b].value, Value::from_bool(true));
    }

    #[test]
    fn degenerate_clock_period_faults() {
        let mut h = Harness::new();
        let b = SignalId::from_raw(1);
        h.drives.insert(b);
        let mut clock = ClockProcess::new(b, Period::from_fs(1), None);
        let (wait, _) = h.resume(0, &mut clock);
        assert!(wait.is_err());
    }

    #[test]
    fn script_steps_through_commands() {
        let mut h = Harness::new();
        let a = SignalId::from_raw(0);
        let domain = DomainId::from_raw(0);
        let mut script = Script::new()
            .set(a, Value::from_u64(3, 4))
            .tick(domain, 2)
            .settle()
            .delay(Period::from_ns(1));

        assert!(matches!(h.resume(0, &mut script).0, Ok(Wait::Tick(d)) if d == domain));
        assert!(matches!(h.resume(0, &mut script).0, Ok(Wait::Tick(_))));
        assert!(matches!(h.resume(0, &mut script).0, Ok(Wait::Settle)));
        assert!(matches!(h.resume(0, &mut script).0, Ok(Wait::Delay(_))));
        assert!(matches!(h.resume(0, &mut script).0, Ok(Wait::Done)));
    }

    #[test]
    fn script_expect_mismatch_faults() {
        let mut h = Harness::new();
        let a = SignalId::from_raw(0);
        h.store.write(a, Value::from_u64(4, 4));
        let mut script = Script::new().expect(a, Value::from_u64(5, 4));
        let err = h.resume(0, &mut script).0.unwrap_err();
        assert_eq!(err.message, "expected `a` = 0101, found 0100");
    }

    #[test]
    fn script_wait_for_blocks_until_value() {
        let mut h = Harness::new();
        let a = SignalId::from_raw(0);
        let mut script = Script::new().wait_for(a, Value::from_u64(7, 4));
        assert!(matches!(
            h.resume(0, &mut script).0,
            Ok(Wait::Change { predicate: Predicate::Equals(_), .. })
        ));
        h.store.write(a, Value::from_u64(7, 4));
        assert!(matches!(h.resume(0, &mut script).0, Ok(Wait::Done)));
    }

    #[test]
    fn predicates() {
        let mut h = Harness::new();
        let a = SignalId::from_raw(0);
        let b = SignalId::from_raw(1);
        h.store.write(b, Value::from_bool(false));
        h.store.take_delta_changes();

        h.store.write(b, Value::from_bool(true));
        let before = h.store.take_delta_changes();
        assert!(Predicate::Rising.holds(&[b], &h.store, &before));
        assert!(!Predicate::Falling.holds(&[b], &h.store, &before));
        assert!(Predicate::Any.holds(&[a, b], &h.store, &before));
        assert!(!Predicate::Any.holds(&[a], &h.store, &before));
        assert!(Predicate::Equals(Value::from_u64(1, 1)).holds(&[b], &h.store, &before));
        assert!(!Predicate::Known.holds(&[a, b], &h.store, &before));
        let custom = Predicate::Custom(Box::new(|v: &[&Value]| v[0].to_u64() == Some(1)));
        assert!(custom.holds(&[b], &h.store, &before));
        assert_eq!(format!("{custom:?}"), "Custom(..)");
    }
}
