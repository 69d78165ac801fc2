//! Simulation error types.
//!
//! All errors that can occur during simulator construction or execution are
//! represented as variants of [`SimError`]. None of them is recoverable
//! within a run: the simulator stops at the first one.

use std::io;
use tessel_netlist::NetlistError;

/// Errors that can occur during simulation setup or execution.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The netlist failed validation.
    #[error("elaboration error: {0}")]
    Elaboration(#[from] NetlistError),

    /// Combinational logic kept changing past the settle iteration cap.
    #[error("combinational loop at {time_fs} fs through {}", signals.join(", "))]
    CombinationalLoop {
        /// Time in femtoseconds when settling gave up.
        time_fs: u64,
        /// Signals driven by bindings that were evaluated repeatedly, by ID.
        signals: Vec<String>,
    },

    /// Too many delta cycles at a single time point.
    #[error("delta cycle limit exceeded at {time_fs} fs (max {max_deltas} deltas)")]
    DeltaLimit {
        /// Time in femtoseconds where the limit was hit.
        time_fs: u64,
        /// The configured maximum.
        max_deltas: u32,
    },

    /// Two drivers wrote the same signal.
    #[error("signal `{signal}` is driven by both {first} and {second}")]
    DriverConflict {
        /// Name of the contested signal.
        signal: String,
        /// The driver that claimed the signal first.
        first: String,
        /// The driver that collided with it.
        second: String,
    },

    /// A process wrote a signal it did not declare as driven.
    #[error("process `{process}` drives undeclared signal `{signal}`")]
    UndeclaredDrive {
        /// Name of the process.
        process: String,
        /// Name of the signal.
        signal: String,
    },

    /// A process reported a failure.
    #[error("process `{process}` (#{index}) failed at {time_fs} fs: {message}")]
    ProcessFault {
        /// Name of the process.
        process: String,
        /// Registration index of the process.
        index: usize,
        /// Time in femtoseconds of the failure.
        time_fs: u64,
        /// The fault message.
        message: String,
    },

    /// An I/O error occurred while writing trace output.
    #[error("trace I/O error: {0}")]
    Trace(#[from] io::Error),

    /// A tracer is already attached, or the simulation has already started.
    #[error("a tracer can only be attached once, before the simulation starts")]
    TracerAlreadySet,

    /// A process was registered after the simulation started.
    #[error("processes must be registered before the simulation starts")]
    AlreadyStarted,

    /// A signal name or ID does not exist in the netlist.
    #[error("unknown signal `{name}`")]
    UnknownSignal {
        /// The name or ID that failed to resolve.
        name: String,
    },
}
