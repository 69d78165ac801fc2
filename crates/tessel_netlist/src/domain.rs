//! Clock domains: a clock signal, its active edge, and an optional reset.

use crate::ids::SignalId;
use serde::{Deserialize, Serialize};
use tessel_common::Logic;

/// The clock transition that triggers a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    /// A `0 -> 1` transition.
    Posedge,
    /// A `1 -> 0` transition.
    Negedge,
}

impl Edge {
    /// Returns `true` if going from `before` to `after` is this edge.
    ///
    /// Only transitions between known levels count; a clock passing through
    /// an unknown level never triggers.
    pub fn matches(self, before: Logic, after: Logic) -> bool {
        match self {
            Edge::Posedge => before == Logic::Zero && after == Logic::One,
            Edge::Negedge => before == Logic::One && after == Logic::Zero,
        }
    }
}

/// When a domain's reset takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResetKind {
    /// Sampled at the active clock edge only.
    Sync,
    /// Applied as soon as the reset becomes asserted and held while it stays
    /// asserted, as well as at clock edges.
    Async,
}

/// A domain's reset input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reset {
    /// The 1-bit reset signal.
    pub signal: SignalId,
    /// Whether a high level asserts the reset.
    pub active_high: bool,
    /// Synchronous or asynchronous behavior.
    pub kind: ResetKind,
}

impl Reset {
    /// An active-high reset of the given kind.
    pub fn new(signal: SignalId, kind: ResetKind) -> Self {
        Self {
            signal,
            active_high: true,
            kind,
        }
    }

    /// Makes the reset assert on a low level.
    pub fn active_low(mut self) -> Self {
        self.active_high = false;
        self
    }

    /// Maps the reset signal's level to asserted (`One`), deasserted
    /// (`Zero`) or unknown.
    pub fn asserted(&self, level: Logic) -> Logic {
        if self.active_high {
            level
        } else {
            !level
        }
    }
}

/// A clock domain.
///
/// Every synchronous binding belongs to exactly one domain and updates its
/// target when the domain's clock shows the active edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain name, unique within the netlist.
    pub name: String,
    /// The 1-bit clock signal.
    pub clock: SignalId,
    /// The clock transition that triggers updates.
    pub edge: Edge,
    /// Optional reset input.
    pub reset: Option<Reset>,
}

impl Domain {
    /// Creates a domain without a reset.
    pub fn new(name: impl Into<String>, clock: SignalId, edge: Edge) -> Self {
        Self {
            name: name.into(),
            clock,
            edge,
            reset: None,
        }
    }

    /// Adds a reset input.
    pub fn with_reset(mut self, reset: Reset) -> Self {
        self.reset = Some(reset);
        self
    }
}
