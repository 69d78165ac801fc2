//! Domain clock controller.
//!
//! Watches each domain's clock signal for its active edge and applies the
//! domain's synchronous bindings when one occurs. All bindings of all edged
//! domains are evaluated against the pre-edge values and committed as one
//! batch, so registers that read each other swap cleanly.
//!
//! Resets override binding results for signals that declare a reset value.
//! A synchronous reset is sampled at the edge only; an asynchronous reset is
//! additionally applied whenever it is asserted. An unknown reset level
//! merges the reset value with whatever the signal would otherwise hold.

use std::collections::BTreeMap;

use log::debug;
use tessel_common::{Logic, Value};
use tessel_netlist::{DomainId, Edge, Netlist, Reset, ResetKind, SignalId};

use crate::error::SimError;
use crate::evaluator::{eval_expr, EvalContext};
use crate::store::SignalStore;

#[derive(Debug, Clone)]
struct DomainState {
    id: DomainId,
    clock: SignalId,
    edge: Edge,
    reset: Option<Reset>,
    /// Clock level observed at the end of the previous pass.
    last: Logic,
    /// Indices into [`Netlist::sync`].
    bindings: Vec<usize>,
    /// Signals of this domain that declare a reset value.
    reset_targets: Vec<SignalId>,
}

/// What one controller pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeOutcome {
    /// Domains whose clock showed the active edge, by ID.
    pub edged: Vec<DomainId>,
    /// Signals whose committed value changed, by ID.
    pub changed: Vec<SignalId>,
}

impl EdgeOutcome {
    /// Returns `true` if the pass neither saw an edge nor changed a signal.
    pub fn is_quiet(&self) -> bool {
        self.edged.is_empty() && self.changed.is_empty()
    }
}

/// Detects clock edges and applies synchronous updates and resets.
#[derive(Debug, Clone)]
pub struct ClockController {
    domains: Vec<DomainState>,
}

impl ClockController {
    /// Collects the synchronous bindings and reset targets of every domain.
    pub fn new(netlist: &Netlist) -> Self {
        let mut domains: Vec<DomainState> = netlist
            .domains
            .iter()
            .map(|(id, d)| DomainState {
                id,
                clock: d.clock,
                edge: d.edge,
                reset: d.reset,
                last: Logic::X,
                bindings: Vec::new(),
                reset_targets: Vec::new(),
            })
            .collect();
        for (index, binding) in netlist.sync.iter().enumerate() {
            domains[binding.domain.index()].bindings.push(index);
        }
        for (id, decl) in netlist.signals.iter() {
            if let (Some(domain), Some(_)) = (decl.domain, &decl.reset) {
                domains[domain.index()].reset_targets.push(id);
            }
        }
        Self { domains }
    }

    /// Records the current clock levels without reporting edges.
    pub fn prime(&mut self, store: &SignalStore) {
        for state in &mut self.domains {
            state.last = store.current(state.clock).get(0);
        }
    }

    /// Runs one pass: detects edges since the previous pass, evaluates the
    /// bindings of edged domains, applies resets, and commits the results.
    pub fn apply(
        &mut self,
        netlist: &Netlist,
        store: &mut SignalStore,
    ) -> Result<EdgeOutcome, SimError> {
        let mut edged = Vec::new();
        for state in &mut self.domains {
            let level = store.current(state.clock).get(0);
            if state.edge.matches(state.last, level) {
                edged.push(state.id);
            }
            state.last = level;
        }

        let mut writes: BTreeMap<SignalId, Value> = BTreeMap::new();
        let ctx = EvalContext {
            netlist,
            store: &*store,
        };
        for state in &self.domains {
            let is_edged = edged.contains(&state.id);
            if is_edged {
                for &index in &state.bindings {
                    let binding = &netlist.sync[index];
                    let width = netlist.signal(binding.target).shape.width;
                    let value = eval_expr(&ctx, &binding.expr)?.resized(width);
                    writes.insert(binding.target, value);
                }
            }

            let Some(reset) = state.reset else {
                continue;
            };
            if !is_edged && reset.kind == ResetKind::Sync {
                continue;
            }
            let asserted = reset.asserted(store.current(reset.signal).get(0));
            if asserted == Logic::Zero {
                continue;
            }
            for &target in &state.reset_targets {
                let Some(reset_value) = &netlist.signal(target).reset else {
                    continue;
                };
                let value = if asserted == Logic::One {
                    reset_value.clone()
                } else {
                    let otherwise = writes
                        .get(&target)
                        .unwrap_or_else(|| store.current(target));
                    otherwise.merge(reset_value)
                };
                writes.insert(target, value);
            }
        }

        for name in edged.iter().map(|d| &netlist.domains[*d].name) {
            debug!("active edge in domain `{name}`");
        }

        let mut changed = Vec::new();
        for (target, value) in writes {
            store.set_next(target, value);
            if store.commit(target) {
                changed.push(target);
            }
        }
        Ok(EdgeOutcome { edged, changed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_netlist::{Expr, NetlistBuilder, Shape};

    struct Bench {
        netlist: Netlist,
        store: SignalStore,
        ctrl: ClockController,
        clk: SignalId,
    }

    impl Bench {
        fn new(netlist: Netlist) -> Self {
            let clk = netlist.find_signal("clk").unwrap();
            let mut store = SignalStore::new(&netlist);
            store.write(clk, Value::from_bool(false));
            let mut ctrl = ClockController::new(&netlist);
            ctrl.prime(&store);
            Self {
                netlist,
                store,
                ctrl,
                clk,
            }
        }

        fn drive(&mut self, name: &str, value: Value) -> EdgeOutcome {
            let id = self.netlist.find_signal(name).unwrap();
            self.store.write(id, value);
            self.ctrl.apply(&self.netlist, &mut self.store).unwrap()
        }

        fn clock(&mut self, level: bool) -> EdgeOutcome {
            let clk = self.clk;
            self.store.write(clk, Value::from_bool(level));
            self.ctrl.apply(&self.netlist, &mut self.store).unwrap()
        }

        fn get(&self, name: &str) -> &Value {
            self.store.current(self.netlist.find_signal(name).unwrap())
        }
    }

    #[test]
    fn registers_swap_on_edge() {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let d = b.domain("sync", clk, Edge::Posedge);
        let x = b.register("x", Shape::unsigned(4), Value::from_u64(1, 4));
        let y = b.register("y", Shape::unsigned(4), Value::from_u64(2, 4));
        b.sync(d, x, Expr::signal(y));
        b.sync(d, y, Expr::signal(x));
        let mut bench = Bench::new(b.build().unwrap());

        let out = bench.clock(true);
        assert_eq!(out.edged, vec![d]);
        assert_eq!(out.changed, vec![x, y]);
        assert_eq!(bench.get("x").to_u64(), Some(2));
        assert_eq!(bench.get("y").to_u64(), Some(1));

        assert!(bench.clock(false).is_quiet());
    }

    #[test]
    fn negedge_domain() {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let d = b.domain("neg", clk, Edge::Negedge);
        let q = b.register("q", Shape::bit(), Value::zero(1));
        b.sync(d, q, !Expr::signal(q));
        let mut bench = Bench::new(b.build().unwrap());

        assert!(bench.clock(true).edged.is_empty());
        assert_eq!(bench.clock(false).edged, vec![d]);
        assert_eq!(bench.get("q"), &Value::from_bool(true));
    }

    #[test]
    fn unknown_clock_is_not_an_edge() {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let d = b.domain("sync", clk, Edge::Posedge);
        let q = b.register("q", Shape::bit(), Value::zero(1));
        b.sync(d, q, Expr::constant(1, 1));
        let mut bench = Bench::new(b.build().unwrap());

        assert!(bench.drive("clk", Value::unknown(1)).edged.is_empty());
        assert!(bench.clock(true).edged.is_empty());
        assert_eq!(bench.get("q"), &Value::from_bool(false));
    }

    fn counter_with_reset(kind: ResetKind) -> Netlist {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let rst = b.register("rst", Shape::bit(), Value::zero(1));
        let d = b.domain_with_reset("sync", clk, Edge::Posedge, Reset::new(rst, kind));
        let count = b.register("count", Shape::unsigned(4), Value::zero(4));
        b.sync(d, count, Expr::signal(count) + Expr::constant(1, 4));
        b.build().unwrap()
    }

    #[test]
    fn sync_reset_wins_at_edge_only() {
        let mut bench = Bench::new(counter_with_reset(ResetKind::Sync));
        bench.clock(true);
        bench.clock(false);
        bench.clock(true);
        assert_eq!(bench.get("count").to_u64(), Some(2));

        let out = bench.drive("rst", Value::from_bool(true));
        assert!(out.is_quiet());
        assert_eq!(bench.get("count").to_u64(), Some(2));

        bench.clock(false);
        bench.clock(true);
        assert_eq!(bench.get("count").to_u64(), Some(0));
    }

    #[test]
    fn async_reset_applies_immediately() {
        let mut bench = Bench::new(counter_with_reset(ResetKind::Async));
        bench.clock(true);
        assert_eq!(bench.get("count").to_u64(), Some(1));

        let out = bench.drive("rst", Value::from_bool(true));
        assert!(out.edged.is_empty());
        assert_eq!(bench.get("count").to_u64(), Some(0));

        bench.clock(false);
        bench.clock(true);
        assert_eq!(bench.get("count").to_u64(), Some(0));
    }

    #[test]
    fn unknown_reset_merges() {
        let mut bench = Bench::new(counter_with_reset(ResetKind::Sync));
        bench.clock(true);
        bench.clock(false);
        bench.drive("rst", Value::unknown(1));
        bench.clock(true);
        // Binding gives 2 (0010), reset gives 0 (0000): bit 1 disagrees.
        assert_eq!(bench.get("count").to_string(), "00x0");
    }

    #[test]
    fn signals_without_reset_value_ignore_reset() {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let rst = b.register("rst", Shape::bit(), Value::from_bool(true));
        let d = b.domain_with_reset(
            "sync",
            clk,
            Edge::Posedge,
            Reset::new(rst, ResetKind::Sync),
        );
        let free = b.signal("free", Shape::bit());
        b.sync(d, free, Expr::constant(1, 1));
        let mut bench = Bench::new(b.build().unwrap());
        bench.clock(true);
        assert_eq!(bench.get("free"), &Value::from_bool(true));
    }

    #[test]
    fn active_low_reset() {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let rst_n = b.register("rst_n", Shape::bit(), Value::from_bool(true));
        let d = b.domain_with_reset(
            "sync",
            clk,
            Edge::Posedge,
            Reset::new(rst_n, ResetKind::Async).active_low(),
        );
        let q = b.register("q", Shape::bit(), Value::zero(1));
        b.sync(d, q, Expr::constant(1, 1));
        let mut bench = Bench::new(b.build().unwrap());
        bench.clock(true);
        assert_eq!(bench.get("q"), &Value::from_bool(true));
        bench.drive("rst_n", Value::from_bool(false));
        assert_eq!(bench.get("q"), &Value::from_bool(false));
    }
}
