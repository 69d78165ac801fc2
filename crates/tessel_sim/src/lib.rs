//! Event-driven logic simulator for Tessel netlists.
//!
//! This crate executes an elaborated [`Netlist`] with three-state logic
//! (`0`, `1`, unknown), combinational settling to a fixed point, clock-edge
//! updates of synchronous bindings, and cooperatively scheduled testbench
//! processes. Runs are deterministic: the same netlist driven by the same
//! processes produces the same trace, change for change.
//!
//! # Architecture
//!
//! The [`SignalStore`] owns every signal value. The [`Settler`] drives
//! combinational bindings to a fixed point in dependency order, and the
//! [`ClockController`] applies synchronous bindings and resets when a
//! domain's clock shows its active edge. The [`Simulator`] schedules
//! [`Process`]es over delta cycles and time points and reports committed
//! changes to a [`Tracer`].
//!
//! # Usage
//!
//! ```
//! use tessel_common::{Period, Value};
//! use tessel_config::SimConfig;
//! use tessel_netlist::{Edge, Expr, NetlistBuilder, Shape};
//! use tessel_sim::{simulate, StopReason};
//!
//! let mut b = NetlistBuilder::new();
//! let clk = b.signal("clk", Shape::bit());
//! let sync = b.domain("sync", clk, Edge::Posedge);
//! let count = b.register("count", Shape::unsigned(4), Value::zero(4));
//! b.sync(sync, count, Expr::signal(count) + Expr::constant(1, 4));
//! let netlist = b.build().unwrap();
//!
//! let mut config = SimConfig::default();
//! config.simulation.time_limit = Some(Period::from_ns(100));
//! let summary = simulate(&netlist, &config, |sim| {
//!     sim.add_clock(sync, Period::from_ns(10), None)?;
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(summary.stop, StopReason::Finished);
//! ```
//!
//! # Modules
//!
//! - `error`: Simulation error types
//! - `store`: Committed and pending signal values
//! - `evaluator`: Expression evaluation
//! - `settle`: Combinational settling
//! - `domain`: Clock edges, synchronous updates and resets
//! - `process`: Process trait, clock generator and scripted testbenches
//! - `events`: Timed wake-up queue
//! - `kernel`: The simulator and its delta-cycle loop
//! - `tracer`: Waveform output (VCD, in-memory, digest)

#![warn(missing_docs)]

pub mod domain;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod kernel;
pub mod process;
pub mod settle;
pub mod store;
pub mod tracer;

use std::fs::File;
use std::io::BufWriter;

use log::info;
use tessel_common::Period;
use tessel_config::SimConfig;
use tessel_netlist::Netlist;

pub use domain::{ClockController, EdgeOutcome};
pub use error::SimError;
pub use evaluator::{eval_expr, EvalContext, Evaluated};
pub use events::{Event, EventClass, EventQueue};
pub use kernel::{CancelToken, ProcessKind, Simulator, StopReason};
pub use process::{
    ClockProcess, Command, Predicate, Process, ProcessContext, ProcessFault, Script, Wait,
};
pub use settle::Settler;
pub use store::SignalStore;
pub use tracer::{
    DigestTracer, MemoryTracer, TraceDigest, TraceEvent, TraceLog, TraceSignal, Tracer,
    VcdTracer,
};

/// Outcome of a [`simulate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSummary {
    /// Simulated time when the run stopped.
    pub final_time: Period,
    /// Why the run stopped.
    pub stop: StopReason,
    /// Number of time points simulated.
    pub steps: u64,
}

/// High-level entry point: simulates a netlist under a configuration.
///
/// Creates a [`Simulator`] with the configured limits, attaches a VCD writer
/// when `config.trace.path` is set, lets `setup` register processes, then
/// runs until every testbench has finished, nothing is scheduled, or a
/// configured time or step limit is reached.
pub fn simulate(
    netlist: &Netlist,
    config: &SimConfig,
    setup: impl FnOnce(&mut Simulator) -> Result<(), SimError>,
) -> Result<SimSummary, SimError> {
    let mut sim = Simulator::with_config(netlist.clone(), &config.simulation)?;

    if let Some(path) = &config.trace.path {
        let file = File::create(path)?;
        sim.set_tracer(VcdTracer::new(BufWriter::new(file), config.trace.timescale))?;
        info!("writing VCD trace to {}", path.display());
    }

    setup(&mut sim)?;
    let stop = sim.run_bounded(config.simulation.time_limit, config.simulation.step_limit)?;
    sim.finish()?;
    Ok(SimSummary {
        final_time: sim.now(),
        stop,
        steps: sim.steps(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_common::Value;
    use tessel_netlist::{Edge, Expr, NetlistBuilder, Shape};

    fn blinker() -> Netlist {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let sync = b.domain("sync", clk, Edge::Posedge);
        let led = b.register("led", Shape::bit(), Value::zero(1));
        b.sync(sync, led, !Expr::signal(led));
        b.build().unwrap()
    }

    #[test]
    fn simulate_with_step_limit() {
        let netlist = blinker();
        let sync = netlist.find_domain("sync").unwrap();
        let mut config = SimConfig::default();
        config.simulation.step_limit = Some(3);
        let summary = simulate(&netlist, &config, |sim| {
            sim.add_clock(sync, Period::from_ns(10), None)?;
            sim.add_testbench("wait", [], |_: &mut ProcessContext<'_>| -> Result<Wait, ProcessFault> {
                Ok(Wait::Delay(Period::from_us(1)))
            })?;
            Ok(())
        })
        .unwrap();
        assert_eq!(summary.stop, StopReason::StepLimit);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.final_time, Period::from_ns(10));
    }

    #[test]
    fn simulate_with_time_limit() {
        let netlist = blinker();
        let sync = netlist.find_domain("sync").unwrap();
        let led = netlist.find_signal("led").unwrap();
        let mut config = SimConfig::default();
        config.simulation.time_limit = Some(Period::from_ns(30));
        let summary = simulate(&netlist, &config, |sim| {
            sim.add_clock(sync, Period::from_ns(10), None)?;
            sim.add_testbench("watch", [], move |ctx: &mut ProcessContext<'_>| -> Result<Wait, ProcessFault> {
                if ctx.now() > Period::ZERO {
                    ctx.check(ctx.get_u64(led).is_some(), "led should be known")?;
                }
                Ok(Wait::Delay(Period::from_ns(10)))
            })?;
            Ok(())
        })
        .unwrap();
        assert_eq!(summary.stop, StopReason::TimeLimit);
        assert_eq!(summary.final_time, Period::from_ns(30));
    }

    #[test]
    fn simulate_propagates_setup_errors() {
        let netlist = blinker();
        let led = netlist.find_signal("led").unwrap();
        let err = simulate(&netlist, &SimConfig::default(), |sim| {
            sim.add_testbench("bad", [led], Script::new())?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, SimError::DriverConflict { .. }));
    }

    #[test]
    fn simulate_writes_vcd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blink.vcd");
        let netlist = blinker();
        let sync = netlist.find_domain("sync").unwrap();
        let mut config = SimConfig::default();
        config.simulation.time_limit = Some(Period::from_ns(20));
        config.trace.path = Some(path.clone());
        config.trace.timescale = Period::from_ns(1);
        simulate(&netlist, &config, |sim| {
            sim.add_clock(sync, Period::from_ns(10), None)?;
            sim.add_testbench("idle", [], |_: &mut ProcessContext<'_>| -> Result<Wait, ProcessFault> {
                Ok(Wait::Delay(Period::from_ns(100)))
            })?;
            Ok(())
        })
        .unwrap();

        let vcd = std::fs::read_to_string(&path).unwrap();
        assert!(vcd.contains("$timescale 1ns $end"));
        assert!(vcd.contains("$var wire 1 ! clk $end"));
        assert!(vcd.contains("$var wire 1 \" led $end"));
        assert!(vcd.contains("#5\n1!\n1\"\n"));
        assert!(vcd.ends_with("#20\n0!\n"));
    }
}
