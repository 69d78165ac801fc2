//! Combinational settling.
//!
//! The [`Settler`] re-evaluates combinational bindings whose operands changed
//! until no committed value changes any more. Dirty bindings are kept in a
//! set ordered by `(rank, binding)`, where the rank comes from the
//! [`BindingGraph`], so acyclic logic evaluates each binding at most once per
//! settle no matter in which order the bindings were declared.

use std::collections::BTreeSet;

use log::trace;
use tessel_netlist::{BindingGraph, BindingId, Netlist, SignalId};

use crate::error::SimError;
use crate::evaluator::{eval_expr, EvalContext};
use crate::store::SignalStore;

/// Drives combinational bindings to a fixed point.
#[derive(Debug, Clone)]
pub struct Settler {
    graph: BindingGraph,
    cap: u32,
    counts: Vec<u32>,
}

impl Settler {
    /// Builds the binding graph for `netlist`.
    ///
    /// `cap` bounds how often a single binding may be evaluated in one
    /// settle before the run is declared a combinational loop.
    pub fn new(netlist: &Netlist, cap: u32) -> Self {
        Self {
            graph: BindingGraph::build(netlist),
            cap,
            counts: vec![0; netlist.comb.len()],
        }
    }

    /// Returns the binding dependency graph.
    pub fn graph(&self) -> &BindingGraph {
        &self.graph
    }

    /// Evaluates every combinational binding, then settles.
    ///
    /// Used once at start-up so that every driven signal reflects its
    /// expression before time advances.
    pub fn settle_all(
        &mut self,
        netlist: &Netlist,
        store: &mut SignalStore,
        time_fs: u64,
    ) -> Result<usize, SimError> {
        let dirty = netlist
            .comb
            .ids()
            .map(|b| (self.graph.rank(b), b))
            .collect();
        self.run(netlist, store, dirty, time_fs)
    }

    /// Settles after the signals in `changed` were committed.
    ///
    /// Returns the number of binding evaluations performed.
    pub fn settle(
        &mut self,
        netlist: &Netlist,
        store: &mut SignalStore,
        changed: impl IntoIterator<Item = SignalId>,
        time_fs: u64,
    ) -> Result<usize, SimError> {
        let mut dirty = BTreeSet::new();
        for signal in changed {
            self.mark_readers(signal, &mut dirty);
        }
        self.run(netlist, store, dirty, time_fs)
    }

    fn mark_readers(&self, signal: SignalId, dirty: &mut BTreeSet<(u32, BindingId)>) {
        for reader in self.graph.readers(signal) {
            dirty.insert((self.graph.rank(*reader), *reader));
        }
    }

    fn run(
        &mut self,
        netlist: &Netlist,
        store: &mut SignalStore,
        mut dirty: BTreeSet<(u32, BindingId)>,
        time_fs: u64,
    ) -> Result<usize, SimError> {
        self.counts.iter_mut().for_each(|c| *c = 0);
        let mut evaluations = 0;

        while let Some((_, binding)) = dirty.pop_first() {
            let count = {
                let c = &mut self.counts[binding.index()];
                *c += 1;
                *c
            };
            if count > self.cap {
                return Err(self.loop_error(netlist, time_fs));
            }
            evaluations += 1;

            let comb = &netlist.comb[binding];
            let width = netlist.signal(comb.target).shape.width;
            let value = {
                let ctx = EvalContext { netlist, store };
                eval_expr(&ctx, &comb.expr)?.resized(width)
            };
            store.set_next(comb.target, value);
            if store.commit(comb.target) {
                trace!(
                    "settle {} = {}",
                    netlist.signal(comb.target).name,
                    store.current(comb.target)
                );
                self.mark_readers(comb.target, &mut dirty);
            }
        }

        Ok(evaluations)
    }

    /// Names the targets of every binding evaluated more than once, by ID.
    fn loop_error(&self, netlist: &Netlist, time_fs: u64) -> SimError {
        let mut targets: Vec<SignalId> = netlist
            .comb
            .iter()
            .filter(|(id, _)| self.counts[id.index()] > 1)
            .map(|(_, b)| b.target)
            .collect();
        targets.sort();
        SimError::CombinationalLoop {
            time_fs,
            signals: targets
                .into_iter()
                .map(|s| netlist.signal(s).name.clone())
                .collect(),
        }
    }
}
