//! Dependency graph over combinational bindings.
//!
//! Binding `a` precedes binding `b` when `b` reads the signal `a` drives.
//! Strongly connected components of this graph are ranked in topological
//! order; settling always evaluates the lowest-ranked dirty binding first,
//! so acyclic logic evaluates each binding at most once per settle.

use crate::ids::{BindingId, SignalId};
use crate::netlist::Netlist;
use log::{debug, warn};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Static scheduling information for combinational bindings.
#[derive(Debug, Clone)]
pub struct BindingGraph {
    /// Topological rank of each binding's component, indexed by binding.
    ranks: Vec<u32>,
    /// Bindings reading each signal, indexed by signal, in binding order.
    readers: Vec<Vec<BindingId>>,
    /// Components that form feedback loops.
    cycles: Vec<Vec<BindingId>>,
}

impl BindingGraph {
    /// Builds the graph for a validated netlist.
    ///
    /// Logs a warning for each combinational feedback loop. Loops are not an
    /// error here; they only fail a run if they keep oscillating.
    pub fn build(netlist: &Netlist) -> Self {
        let mut readers: Vec<Vec<BindingId>> = vec![Vec::new(); netlist.signals.len()];
        let mut driver_of: Vec<Option<BindingId>> = vec![None; netlist.signals.len()];
        for (id, binding) in netlist.comb.iter() {
            driver_of[binding.target.index()] = Some(id);
            for operand in binding.expr.operands() {
                readers[operand.index()].push(id);
            }
        }

        let mut graph: DiGraph<BindingId, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = netlist.comb.ids().map(|id| graph.add_node(id)).collect();
        for (signal, signal_readers) in readers.iter().enumerate() {
            if let Some(writer) = driver_of[signal] {
                for reader in signal_readers {
                    graph.add_edge(nodes[writer.index()], nodes[reader.index()], ());
                }
            }
        }

        // Tarjan yields components in reverse topological order.
        let components = tarjan_scc(&graph);
        let count = components.len() as u32;
        let mut ranks = vec![0; netlist.comb.len()];
        let mut cycles = Vec::new();
        for (i, component) in components.iter().enumerate() {
            let rank = count - 1 - i as u32;
            let mut members: Vec<BindingId> = component.iter().map(|n| graph[*n]).collect();
            members.sort();
            for member in &members {
                ranks[member.index()] = rank;
            }
            let looped = members.len() > 1 || graph.contains_edge(component[0], component[0]);
            if looped {
                let names: Vec<&str> = members
                    .iter()
                    .map(|b| netlist.signal(netlist.comb[*b].target).name.as_str())
                    .collect();
                warn!("combinational loop through {}", names.join(", "));
                cycles.push(members);
            }
        }
        debug!(
            "ranked {} combinational bindings into {} components",
            netlist.comb.len(),
            count
        );
        cycles.sort();

        Self {
            ranks,
            readers,
            cycles,
        }
    }

    /// Returns the topological rank of a binding's component.
    pub fn rank(&self, binding: BindingId) -> u32 {
        self.ranks[binding.index()]
    }

    /// Returns the combinational bindings that read `signal`.
    pub fn readers(&self, signal: SignalId) -> &[BindingId] {
        &self.readers[signal.index()]
    }

    /// Returns every combinational feedback loop, each sorted by binding ID.
    pub fn cycles(&self) -> &[Vec<BindingId>] {
        &self.cycles
    }
}
