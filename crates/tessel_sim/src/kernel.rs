//! Simulation kernel: process scheduling and the delta-cycle loop.
//!
//! [`Simulator`] owns a validated netlist, the signal store, and every
//! registered process. Time advances in *time points*; within a time point
//! the kernel runs *delta cycles* until nothing is runnable:
//!
//! 1. run the runnable processes one at a time in tie-break order, staging
//!    their writes;
//! 2. commit the staged writes and settle combinational logic;
//! 3. apply synchronous updates for domains whose clock showed its active
//!    edge, settling again after each pass;
//! 4. wake processes waiting for settling, for an edge that occurred, or
//!    for a change that occurred.
//!
//! Timed wake-ups due at the time point are released one class at a time
//! whenever nothing else is runnable. Once the time point is quiet, every
//! signal that ends it with a different value than it started with is
//! reported to the tracer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, trace};
use tessel_common::{Period, Value};
use tessel_config::{SimulationConfig, TieBreak};
use tessel_netlist::{DomainId, Driver, Netlist, NetlistError, SignalId};

use crate::domain::ClockController;
use crate::error::SimError;
use crate::events::{Event, EventClass, EventQueue};
use crate::process::{ClockProcess, Process, ProcessContext, Staged, Violation, Wait};
use crate::settle::Settler;
use crate::store::SignalStore;
use crate::tracer::{TraceSignal, Tracer};

/// Role of a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    /// Keeps [`Simulator::run`] going until it returns [`Wait::Done`].
    Testbench,
    /// Runs alongside testbenches without keeping the simulation alive.
    Background,
    /// A clock generator; its timed wake-ups run ahead of all others.
    Clock,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Nothing is scheduled any more.
    Idle,
    /// Every testbench process has finished.
    Finished,
    /// The time bound was reached.
    TimeLimit,
    /// The step bound was reached.
    StepLimit,
    /// The [`CancelToken`] was triggered.
    Cancelled,
}

/// Requests that a running simulation stop at the next time-point boundary.
///
/// Clones share the same flag, so a token can be handed to another thread
/// while the simulation runs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum State {
    Runnable,
    /// A timed wake-up is queued.
    Sleeping,
    Parked(Wait),
    Retired,
}

struct ProcessSlot {
    name: String,
    kind: ProcessKind,
    drives: BTreeSet<SignalId>,
    body: Box<dyn Process>,
    state: State,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunLimits {
    deadline: Option<u64>,
    steps: Option<u64>,
    stop_when_finished: bool,
}

/// The simulator.
///
/// Construct with [`Simulator::new`], register processes and an optional
/// tracer, then advance with [`run`](Self::run) and friends. The first run
/// call starts the simulation: it settles the initial state and resumes
/// every process at time zero.
pub struct Simulator {
    netlist: Netlist,
    store: SignalStore,
    settler: Settler,
    clocks: ClockController,
    queue: EventQueue,
    processes: Vec<ProcessSlot>,
    runnable: Vec<usize>,
    /// Domains that showed an edge in the most recent delta cycle.
    last_edged: Vec<DomainId>,
    tracer: Option<Box<dyn Tracer>>,
    now: Period,
    started: bool,
    steps: u64,
    tie_break: TieBreak,
    max_deltas: u32,
    cancel: CancelToken,
}

impl Simulator {
    /// Validates `netlist` and creates a simulator with default limits.
    pub fn new(netlist: Netlist) -> Result<Self, SimError> {
        Self::with_config(netlist, &SimulationConfig::default())
    }

    /// Validates `netlist` and creates a simulator with the given limits and
    /// tie-break rule. Run bounds in `config` are not applied here; see
    /// [`run_bounded`](Self::run_bounded).
    pub fn with_config(netlist: Netlist, config: &SimulationConfig) -> Result<Self, SimError> {
        netlist.validate()?;
        let store = SignalStore::new(&netlist);
        let settler = Settler::new(&netlist, config.settle_iteration_cap);
        let clocks = ClockController::new(&netlist);
        debug!(
            "simulator created: {} signals, {} domains, {} combinational and {} synchronous bindings",
            netlist.signals.len(),
            netlist.domains.len(),
            netlist.comb.len(),
            netlist.sync.len()
        );
        Ok(Self {
            netlist,
            store,
            settler,
            clocks,
            queue: EventQueue::new(),
            processes: Vec::new(),
            runnable: Vec::new(),
            last_edged: Vec::new(),
            tracer: None,
            now: Period::ZERO,
            started: false,
            steps: 0,
            tie_break: config.tie_break,
            max_deltas: config.max_deltas,
            cancel: CancelToken::new(),
        })
    }

    /// Registers a testbench process that may write the signals in `drives`.
    ///
    /// Returns the process index, which is also its creation order.
    pub fn add_testbench(
        &mut self,
        name: impl Into<String>,
        drives: impl IntoIterator<Item = SignalId>,
        process: impl Process + 'static,
    ) -> Result<usize, SimError> {
        self.add_process(name.into(), ProcessKind::Testbench, drives, Box::new(process))
    }

    /// Registers a background process. Background processes do not keep
    /// [`run`](Self::run) going.
    pub fn add_background(
        &mut self,
        name: impl Into<String>,
        drives: impl IntoIterator<Item = SignalId>,
        process: impl Process + 'static,
    ) -> Result<usize, SimError> {
        self.add_process(name.into(), ProcessKind::Background, drives, Box::new(process))
    }

    /// Drives the clock of `domain` with a [`ClockProcess`].
    ///
    /// The clock starts low and first rises after `phase`, half a period by
    /// default.
    pub fn add_clock(
        &mut self,
        domain: DomainId,
        period: Period,
        phase: Option<Period>,
    ) -> Result<usize, SimError> {
        let Some(d) = self.netlist.domains.try_get(domain) else {
            return Err(NetlistError::UnknownDomain {
                id: domain.as_raw(),
                context: "clock generator".into(),
            }
            .into());
        };
        let clock = d.clock;
        let name = format!("{}.clock", d.name);
        let process = ClockProcess::new(clock, period, phase);
        self.add_process(name, ProcessKind::Clock, [clock], Box::new(process))
    }

    fn add_process(
        &mut self,
        name: String,
        kind: ProcessKind,
        drives: impl IntoIterator<Item = SignalId>,
        body: Box<dyn Process>,
    ) -> Result<usize, SimError> {
        if self.started {
            return Err(SimError::AlreadyStarted);
        }
        let drives: BTreeSet<SignalId> = drives.into_iter().collect();
        for &signal in &drives {
            let Some(decl) = self.netlist.signals.try_get(signal) else {
                return Err(SimError::UnknownSignal {
                    name: signal.to_string(),
                });
            };
            if let Some(driver) = self.netlist.driver(signal) {
                let first = match driver {
                    Driver::Comb(binding) => format!("combinational binding {binding}"),
                    Driver::Sync(domain) => format!("domain `{}`", self.netlist.domains[domain].name),
                };
                return Err(SimError::DriverConflict {
                    signal: decl.name.clone(),
                    first,
                    second: format!("process `{name}`"),
                });
            }
        }
        let index = self.processes.len();
        debug!("registered {kind:?} process `{name}` as #{index}");
        self.processes.push(ProcessSlot {
            name,
            kind,
            drives,
            body,
            state: State::Runnable,
        });
        Ok(index)
    }

    /// Attaches a tracer. Only one tracer may be attached, before the
    /// simulation starts.
    pub fn set_tracer(&mut self, tracer: impl Tracer + 'static) -> Result<(), SimError> {
        if self.tracer.is_some() || self.started {
            return Err(SimError::TracerAlreadySet);
        }
        self.tracer = Some(Box::new(tracer));
        Ok(())
    }

    /// Returns a token that stops the simulation at the next time-point
    /// boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current simulated time.
    pub fn now(&self) -> Period {
        self.now
    }

    /// Number of time points simulated so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The simulated netlist.
    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    /// Committed value of a signal.
    ///
    /// # Panics
    ///
    /// Panics if `signal` is not part of the netlist.
    pub fn get(&self, signal: SignalId) -> &Value {
        self.store.current(signal)
    }

    /// Looks up a signal by its hierarchical name.
    pub fn find_signal(&self, name: &str) -> Result<SignalId, SimError> {
        self.netlist
            .find_signal(name)
            .ok_or_else(|| SimError::UnknownSignal { name: name.into() })
    }

    /// Runs until every testbench has finished or nothing is scheduled.
    pub fn run(&mut self) -> Result<StopReason, SimError> {
        self.drive(RunLimits {
            stop_when_finished: true,
            ..RunLimits::default()
        })
    }

    /// Runs every time point up to and including `deadline`, then leaves
    /// simulated time at `deadline`.
    pub fn run_until(&mut self, deadline: Period) -> Result<StopReason, SimError> {
        self.drive(RunLimits {
            deadline: Some(deadline.as_fs()),
            ..RunLimits::default()
        })
    }

    /// Runs for `duration` of simulated time from now. Deadlines past
    /// [`Period::MAX`] are clamped to it.
    pub fn run_for(&mut self, duration: Period) -> Result<StopReason, SimError> {
        self.run_until(self.now.saturating_add(duration))
    }

    /// Runs at most `steps` time points.
    pub fn run_steps(&mut self, steps: u64) -> Result<StopReason, SimError> {
        self.drive(RunLimits {
            steps: Some(steps),
            ..RunLimits::default()
        })
    }

    /// Like [`run`](Self::run), additionally bounded by an optional deadline
    /// and an optional number of time points.
    pub fn run_bounded(
        &mut self,
        deadline: Option<Period>,
        steps: Option<u64>,
    ) -> Result<StopReason, SimError> {
        self.drive(RunLimits {
            deadline: deadline.map(Period::as_fs),
            steps,
            stop_when_finished: true,
        })
    }

    /// Reports the end of the simulation to the tracer and detaches it.
    pub fn finish(&mut self) -> Result<(), SimError> {
        if let Some(mut tracer) = self.tracer.take() {
            tracer.finish(self.now)?;
        }
        info!("simulation finished at {} after {} time points", self.now, self.steps);
        Ok(())
    }

    fn drive(&mut self, limits: RunLimits) -> Result<StopReason, SimError> {
        let mut taken = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                info!("simulation cancelled at {}", self.now);
                return Ok(StopReason::Cancelled);
            }
            if limits.stop_when_finished && self.started && !self.has_active_testbench() {
                return Ok(StopReason::Finished);
            }
            if limits.steps.is_some_and(|max| taken >= max) {
                return Ok(StopReason::StepLimit);
            }
            let Some(next) = self.next_time() else {
                if let Some(deadline) = limits.deadline {
                    self.now = self.now.max(Period::from_fs(deadline));
                }
                return Ok(StopReason::Idle);
            };
            if let Some(deadline) = limits.deadline {
                if next > deadline {
                    self.now = self.now.max(Period::from_fs(deadline));
                    return Ok(StopReason::TimeLimit);
                }
            }
            self.step(next)?;
            taken += 1;
        }
    }

    fn has_active_testbench(&self) -> bool {
        self.processes
            .iter()
            .any(|p| p.kind == ProcessKind::Testbench && !matches!(p.state, State::Retired))
    }

    fn next_time(&self) -> Option<u64> {
        if !self.started || !self.runnable.is_empty() {
            Some(self.now.as_fs())
        } else {
            self.queue.peek_time()
        }
    }

    /// Settles the initial state and makes every process runnable.
    fn start(&mut self) -> Result<(), SimError> {
        self.started = true;
        self.settler.settle_all(&self.netlist, &mut self.store, 0)?;
        self.clocks.prime(&self.store);
        let outcome = self.clocks.apply(&self.netlist, &mut self.store)?;
        if !outcome.changed.is_empty() {
            self.settler
                .settle(&self.netlist, &mut self.store, outcome.changed, 0)?;
        }
        self.store.take_point_changes();

        if let Some(tracer) = self.tracer.as_mut() {
            tracer.declare(&TraceSignal::collect(&self.netlist, &self.store))?;
        }
        self.runnable = (0..self.processes.len()).collect();
        info!(
            "simulation started with {} processes",
            self.processes.len()
        );
        Ok(())
    }

    /// Simulates one time point.
    fn step(&mut self, time_fs: u64) -> Result<(), SimError> {
        if !self.started {
            self.start()?;
        }
        self.now = Period::from_fs(time_fs);
        self.last_edged.clear();
        trace!("time point {}", self.now);

        let mut deltas = 0u32;
        loop {
            if self.runnable.is_empty() {
                let group = self.queue.pop_group(time_fs);
                if group.is_empty() {
                    break;
                }
                for event in group {
                    self.processes[event.process].state = State::Runnable;
                    self.runnable.push(event.process);
                }
            }
            self.count_delta(&mut deltas)?;
            self.delta(&mut deltas)?;
        }

        let changes = self.store.take_point_changes();
        if let Some(tracer) = self.tracer.as_mut() {
            for (signal, before) in changes {
                let value = self.store.current(signal);
                if *value != before {
                    tracer.change(self.now, signal, value)?;
                }
            }
        }
        self.steps += 1;
        Ok(())
    }

    fn count_delta(&self, deltas: &mut u32) -> Result<(), SimError> {
        *deltas += 1;
        if *deltas > self.max_deltas {
            return Err(SimError::DeltaLimit {
                time_fs: self.now.as_fs(),
                max_deltas: self.max_deltas,
            });
        }
        Ok(())
    }

    fn tie_key(&self, index: usize) -> usize {
        match self.tie_break {
            TieBreak::Creation => index,
            TieBreak::ReverseCreation => usize::MAX - index,
        }
    }

    /// Runs one delta cycle.
    fn delta(&mut self, deltas: &mut u32) -> Result<(), SimError> {
        let mut order = std::mem::take(&mut self.runnable);
        order.sort_by_key(|&i| self.tie_key(i));
        order.dedup();

        let mut staged: BTreeMap<SignalId, Staged> = BTreeMap::new();
        let mut suspended: Vec<(usize, Wait)> = Vec::with_capacity(order.len());
        let previous_edges = std::mem::take(&mut self.last_edged);
        for &index in &order {
            let ProcessSlot {
                name,
                drives,
                body,
                ..
            } = &mut self.processes[index];
            let mut ctx = ProcessContext::new(
                &self.netlist,
                &self.store,
                &mut staged,
                drives,
                &previous_edges,
                name,
                index,
                self.now,
            );
            let result = body.resume(&mut ctx);
            if let Some(violation) = ctx.into_violation() {
                return Err(self.violation_error(index, violation));
            }
            match result {
                Ok(wait) => suspended.push((index, wait)),
                Err(fault) => {
                    return Err(SimError::ProcessFault {
                        process: self.processes[index].name.clone(),
                        index,
                        time_fs: self.now.as_fs(),
                        message: fault.message,
                    })
                }
            }
        }

        let time_fs = self.now.as_fs();
        let mut changed = Vec::new();
        for (signal, write) in staged {
            self.store.set_next(signal, write.value);
            if self.store.commit(signal) {
                changed.push(signal);
            }
        }
        self.settler
            .settle(&self.netlist, &mut self.store, changed, time_fs)?;

        let mut edged = Vec::new();
        loop {
            let outcome = self.clocks.apply(&self.netlist, &mut self.store)?;
            edged.extend(outcome.edged);
            if outcome.changed.is_empty() {
                break;
            }
            self.settler
                .settle(&self.netlist, &mut self.store, outcome.changed, time_fs)?;
            self.count_delta(deltas)?;
        }
        edged.sort();
        edged.dedup();

        self.wake(&edged);
        for (index, wait) in suspended {
            self.suspend(index, wait);
        }
        self.last_edged = edged;
        Ok(())
    }

    /// Wakes parked processes whose condition was met in the delta just run.
    fn wake(&mut self, edged: &[DomainId]) {
        let before = self.store.take_delta_changes();
        for (index, slot) in self.processes.iter_mut().enumerate() {
            let State::Parked(wait) = &slot.state else {
                continue;
            };
            let ready = match wait {
                Wait::Settle => true,
                Wait::Tick(domain) => edged.contains(domain),
                Wait::Change { signals, predicate } => {
                    predicate.holds(signals, &self.store, &before)
                }
                Wait::Delay(_) | Wait::Done => false,
            };
            if ready {
                trace!("waking process `{}`", slot.name);
                slot.state = State::Runnable;
                self.runnable.push(index);
            }
        }
    }

    /// Records what a process waits for after it yielded.
    fn suspend(&mut self, index: usize, wait: Wait) {
        let key = self.tie_key(index);
        let slot = &mut self.processes[index];
        match wait {
            Wait::Delay(period) => {
                slot.state = State::Sleeping;
                // A wake-up past the end of representable time never comes.
                let Some(at) = self.now.checked_add(period) else {
                    debug!("process `{}` delayed past {}; it will not wake", slot.name, Period::MAX);
                    return;
                };
                let class = if slot.kind == ProcessKind::Clock {
                    EventClass::ClockEdge
                } else {
                    EventClass::Wake
                };
                self.queue.push(Event {
                    time_fs: at.as_fs(),
                    class,
                    key,
                    process: index,
                });
            }
            Wait::Settle => {
                slot.state = State::Runnable;
                self.runnable.push(index);
            }
            Wait::Done => {
                debug!("process `{}` finished at {}", slot.name, self.now);
                slot.state = State::Retired;
            }
            wait @ (Wait::Tick(_) | Wait::Change { .. }) => {
                slot.state = State::Parked(wait);
            }
        }
    }

    fn violation_error(&self, index: usize, violation: Violation) -> SimError {
        let process = &self.processes[index].name;
        match violation {
            Violation::Undeclared(signal) => SimError::UndeclaredDrive {
                process: process.clone(),
                signal: self.netlist.signal(signal).name.clone(),
            },
            Violation::Conflict { signal, other } => SimError::DriverConflict {
                signal: self.netlist.signal(signal).name.clone(),
                first: format!("process `{}`", self.processes[other].name),
                second: format!("process `{process}`"),
            },
        }
    }
}
