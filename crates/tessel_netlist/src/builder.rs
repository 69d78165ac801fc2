//! Incremental construction of a [`Netlist`].

use crate::binding::{CombBinding, SyncBinding};
use crate::domain::{Domain, Edge, Reset};
use crate::error::NetlistError;
use crate::expr::Expr;
use crate::ids::{BindingId, DomainId, SignalId};
use crate::netlist::Netlist;
use crate::shape::Shape;
use crate::signal::SignalDecl;
use tessel_common::Value;

/// Builds a netlist one declaration at a time.
///
/// Assigning a signal with [`sync`](Self::sync) places it in that domain,
/// so callers never set [`SignalDecl::domain`] by hand. The finished netlist
/// is validated by [`build`](Self::build).
///
/// ```
/// use tessel_netlist::{Edge, Expr, NetlistBuilder, Shape};
/// use tessel_common::Value;
///
/// let mut b = NetlistBuilder::new();
/// let clk = b.signal("clk", Shape::bit());
/// let sync = b.domain("sync", clk, Edge::Posedge);
/// let q = b.register("q", Shape::bit(), Value::zero(1));
/// b.sync(sync, q, !Expr::signal(q));
/// let netlist = b.build().unwrap();
/// assert_eq!(netlist.signals.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct NetlistBuilder {
    netlist: Netlist,
}

impl NetlistBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a signal without a reset value.
    pub fn signal(&mut self, name: impl Into<String>, shape: Shape) -> SignalId {
        self.netlist.signals.alloc(SignalDecl::new(name, shape))
    }

    /// Declares a signal with a reset value.
    pub fn register(&mut self, name: impl Into<String>, shape: Shape, reset: Value) -> SignalId {
        self.netlist
            .signals
            .alloc(SignalDecl::new(name, shape).with_reset(reset))
    }

    /// Adds a declaration as is.
    pub fn declare(&mut self, decl: SignalDecl) -> SignalId {
        self.netlist.signals.alloc(decl)
    }

    /// Declares a clock domain without a reset.
    pub fn domain(&mut self, name: impl Into<String>, clock: SignalId, edge: Edge) -> DomainId {
        self.netlist.domains.alloc(Domain::new(name, clock, edge))
    }

    /// Declares a clock domain with a reset input.
    pub fn domain_with_reset(
        &mut self,
        name: impl Into<String>,
        clock: SignalId,
        edge: Edge,
        reset: Reset,
    ) -> DomainId {
        self.netlist
            .domains
            .alloc(Domain::new(name, clock, edge).with_reset(reset))
    }

    /// Drives `target` combinationally from `expr`.
    pub fn comb(&mut self, target: SignalId, expr: Expr) -> BindingId {
        self.netlist.comb.alloc(CombBinding { target, expr })
    }

    /// Updates `target` from `expr` on each active edge of `domain`.
    pub fn sync(&mut self, domain: DomainId, target: SignalId, expr: Expr) {
        if let Some(decl) = self.netlist.signals.try_get(target) {
            if decl.domain.is_none() {
                self.netlist.signals[target].domain = Some(domain);
            }
        }
        self.netlist.sync.push(SyncBinding {
            target,
            domain,
            expr,
        });
    }

    /// Returns the netlist built so far without validating it.
    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    /// Validates and returns the netlist.
    pub fn build(self) -> Result<Netlist, NetlistError> {
        self.netlist.validate()?;
        Ok(self.netlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResetKind;

    #[test]
    fn sync_assigns_domain() {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let rst = b.signal("rst", Shape::bit());
        let d = b.domain_with_reset("sync", clk, Edge::Posedge, Reset::new(rst, ResetKind::Async));
        let q = b.register("q", Shape::unsigned(2), Value::zero(2));
        b.sync(d, q, Expr::signal(q) + Expr::constant(1, 2));
        let n = b.build().unwrap();
        assert_eq!(n.signal(q).domain, Some(d));
        assert_eq!(n.sync.len(), 1);
        assert_eq!(n.domains[d].reset.map(|r| r.kind), Some(ResetKind::Async));
    }

    #[test]
    fn two_domains_driving_one_signal_fail() {
        let mut b = NetlistBuilder::new();
        let clk = b.signal("clk", Shape::bit());
        let a = b.domain("a", clk, Edge::Posedge);
        let n = b.domain("n", clk, Edge::Negedge);
        let q = b.signal("q", Shape::bit());
        b.sync(a, q, Expr::constant(1, 1));
        b.sync(n, q, Expr::constant(0, 1));
        assert_eq!(
            b.build(),
            Err(NetlistError::DomainMismatch {
                signal: "q".into(),
                declared: "a".into(),
                driven: "n".into()
            })
        );
    }

    #[test]
    fn build_reports_shape_errors() {
        let mut b = NetlistBuilder::new();
        let a = b.signal("a", Shape::unsigned(4));
        let y = b.signal("y", Shape::unsigned(2));
        b.comb(y, Expr::signal(a).slice(3, 6));
        assert!(matches!(
            b.build(),
            Err(NetlistError::InvalidSlice { start: 3, stop: 6, width: 4 })
        ));
    }
}
