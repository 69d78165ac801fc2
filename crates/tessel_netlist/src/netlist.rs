//! The flat netlist container and its validation.

use crate::arena::Arena;
use crate::binding::{CombBinding, Driver, SyncBinding};
use crate::domain::Domain;
use crate::error::NetlistError;
use crate::expr::Expr;
use crate::ids::{BindingId, DomainId, SignalId};
use crate::signal::SignalDecl;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A fully elaborated design ready for simulation.
///
/// The netlist is immutable once validated; the simulator only ever refers
/// to its entities by ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Netlist {
    /// All declared signals.
    pub signals: Arena<SignalId, SignalDecl>,
    /// All clock domains.
    pub domains: Arena<DomainId, Domain>,
    /// Combinational bindings.
    pub comb: Arena<BindingId, CombBinding>,
    /// Synchronous bindings, in declaration order.
    pub sync: Vec<SyncBinding>,
}

impl Netlist {
    /// Creates an empty netlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the declaration of a signal.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not declared in this netlist.
    pub fn signal(&self, id: SignalId) -> &SignalDecl {
        &self.signals[id]
    }

    /// Finds a signal by its hierarchical name.
    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signals
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(id, _)| id)
    }

    /// Finds a domain by name.
    pub fn find_domain(&self, name: &str) -> Option<DomainId> {
        self.domains
            .iter()
            .find(|(_, d)| d.name == name)
            .map(|(id, _)| id)
    }

    /// Returns the binding driving `signal`, if any.
    ///
    /// Only meaningful on a validated netlist, where each signal has at most
    /// one driver.
    pub fn driver(&self, signal: SignalId) -> Option<Driver> {
        if let Some((id, _)) = self.comb.iter().find(|(_, b)| b.target == signal) {
            return Some(Driver::Comb(id));
        }
        self.sync
            .iter()
            .find(|b| b.target == signal)
            .map(|b| Driver::Sync(b.domain))
    }

    /// Returns a human-readable name for a domain, `comb` for none.
    pub fn domain_label(&self, domain: Option<DomainId>) -> String {
        match domain.and_then(|d| self.domains.try_get(d)) {
            Some(d) => d.name.clone(),
            None => "comb".to_string(),
        }
    }

    /// Checks the netlist for structural errors.
    ///
    /// Verifies that names are unique, every ID resolves, clock and reset
    /// signals are one bit wide, reset values match their signals' widths,
    /// every expression has a valid shape, each signal has at most one
    /// driving binding, and synchronous bindings drive signals of their own
    /// domain.
    pub fn validate(&self) -> Result<(), NetlistError> {
        self.check_names()?;

        for (_, sig) in self.signals.iter() {
            if let Some(reset) = &sig.reset {
                if reset.width() != sig.shape.width {
                    return Err(NetlistError::ResetWidth {
                        signal: sig.name.clone(),
                        expected: sig.shape.width,
                        found: reset.width(),
                    });
                }
            }
            if let Some(domain) = sig.domain {
                self.check_domain(domain, &format!("signal `{}`", sig.name))?;
            }
        }

        for (_, domain) in self.domains.iter() {
            let context = format!("domain `{}`", domain.name);
            self.check_one_bit(domain.clock, &context)?;
            if let Some(reset) = &domain.reset {
                self.check_one_bit(reset.signal, &context)?;
            }
        }

        let mut driven = HashSet::new();
        for (id, binding) in self.comb.iter() {
            let context = format!("combinational binding {id}");
            self.check_binding(binding.target, None, &binding.expr, &context)?;
            self.check_single_driver(binding.target, &mut driven)?;
        }
        for (index, binding) in self.sync.iter().enumerate() {
            let context = format!("synchronous binding #{index}");
            self.check_domain(binding.domain, &context)?;
            self.check_binding(binding.target, Some(binding.domain), &binding.expr, &context)?;
            self.check_single_driver(binding.target, &mut driven)?;
        }

        Ok(())
    }

    fn check_names(&self) -> Result<(), NetlistError> {
        let mut seen = HashSet::new();
        for sig in self.signals.values() {
            if !seen.insert(sig.name.as_str()) {
                return Err(NetlistError::DuplicateName {
                    kind: "signal",
                    name: sig.name.clone(),
                });
            }
        }
        let mut seen = HashSet::new();
        for domain in self.domains.values() {
            if !seen.insert(domain.name.as_str()) {
                return Err(NetlistError::DuplicateName {
                    kind: "domain",
                    name: domain.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_signal(&self, id: SignalId, context: &str) -> Result<&SignalDecl, NetlistError> {
        self.signals
            .try_get(id)
            .ok_or_else(|| NetlistError::DanglingSignal {
                id: id.as_raw(),
                context: context.to_string(),
            })
    }

    fn check_domain(&self, id: DomainId, context: &str) -> Result<&Domain, NetlistError> {
        self.domains
            .try_get(id)
            .ok_or_else(|| NetlistError::UnknownDomain {
                id: id.as_raw(),
                context: context.to_string(),
            })
    }

    fn check_one_bit(&self, id: SignalId, context: &str) -> Result<(), NetlistError> {
        let sig = self.check_signal(id, context)?;
        if sig.shape.width != 1 {
            return Err(NetlistError::WidthMismatch {
                signal: sig.name.clone(),
                expected: 1,
                found: sig.shape.width,
            });
        }
        Ok(())
    }

    fn check_binding(
        &self,
        target: SignalId,
        domain: Option<DomainId>,
        expr: &Expr,
        context: &str,
    ) -> Result<(), NetlistError> {
        let sig = self.check_signal(target, context)?;
        expr.shape(&self.signals).map_err(|e| match e {
            NetlistError::DanglingSignal { id, .. } => NetlistError::DanglingSignal {
                id,
                context: context.to_string(),
            },
            other => other,
        })?;
        if sig.domain != domain {
            return Err(NetlistError::DomainMismatch {
                signal: sig.name.clone(),
                declared: self.domain_label(sig.domain),
                driven: self.domain_label(domain),
            });
        }
        Ok(())
    }

    fn check_single_driver(
        &self,
        target: SignalId,
        driven: &mut HashSet<SignalId>,
    ) -> Result<(), NetlistError> {
        if !driven.insert(target) {
            return Err(NetlistError::MultipleDrivers {
                signal: self.signals[target].name.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Edge, Reset, ResetKind};
    use crate::shape::Shape;
    use tessel_common::Value;

    fn counter() -> Netlist {
        let mut n = Netlist::new();
        let clk = n.signals.alloc(SignalDecl::new("clk", Shape::bit()));
        let rst = n.signals.alloc(SignalDecl::new("rst", Shape::bit()));
        let sync = n
            .domains
            .alloc(Domain::new("sync", clk, Edge::Posedge).with_reset(Reset::new(rst, ResetKind::Sync)));
        let mut count = SignalDecl::new("count", Shape::unsigned(4)).with_reset(Value::zero(4));
        count.domain = Some(sync);
        let count = n.signals.alloc(count);
        let wrap = n.signals.alloc(SignalDecl::new("wrap", Shape::bit()));
        n.sync.push(SyncBinding {
            target: count,
            domain: sync,
            expr: Expr::signal(count) + Expr::constant(1, 4),
        });
        n.comb.alloc(CombBinding {
            target: wrap,
            expr: Expr::signal(count).equals(Expr::constant(15, 4)),
        });
        n
    }

    #[test]
    fn valid_netlist_passes() {
        let n = counter();
        assert_eq!(n.validate(), Ok(()));
        assert_eq!(n.find_signal("wrap"), Some(SignalId::from_raw(3)));
        assert_eq!(n.find_domain("sync"), Some(DomainId::from_raw(0)));
    }

    #[test]
    fn driver_lookup() {
        let n = counter();
        assert_eq!(
            n.driver(SignalId::from_raw(2)),
            Some(Driver::Sync(DomainId::from_raw(0)))
        );
        assert_eq!(
            n.driver(SignalId::from_raw(3)),
            Some(Driver::Comb(BindingId::from_raw(0)))
        );
        assert_eq!(n.driver(SignalId::from_raw(0)), None);
    }

    #[test]
    fn duplicate_signal_name() {
        let mut n = counter();
        n.signals.alloc(SignalDecl::new("clk", Shape::bit()));
        assert_eq!(
            n.validate(),
            Err(NetlistError::DuplicateName {
                kind: "signal",
                name: "clk".into()
            })
        );
    }

    #[test]
    fn wide_clock_rejected() {
        let mut n = counter();
        n.signals[SignalId::from_raw(0)].shape = Shape::unsigned(2);
        assert!(matches!(
            n.validate(),
            Err(NetlistError::WidthMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn reset_width_checked() {
        let mut n = counter();
        n.signals[SignalId::from_raw(2)].reset = Some(Value::zero(3));
        assert_eq!(
            n.validate(),
            Err(NetlistError::ResetWidth {
                signal: "count".into(),
                expected: 4,
                found: 3
            })
        );
    }

    #[test]
    fn second_driver_rejected() {
        let mut n = counter();
        n.comb.alloc(CombBinding {
            target: SignalId::from_raw(3),
            expr: Expr::constant(0, 1),
        });
        assert_eq!(
            n.validate(),
            Err(NetlistError::MultipleDrivers {
                signal: "wrap".into()
            })
        );
    }

    #[test]
    fn comb_binding_cannot_drive_register() {
        let mut n = counter();
        n.comb.alloc(CombBinding {
            target: SignalId::from_raw(2),
            expr: Expr::constant(0, 4),
        });
        assert_eq!(
            n.validate(),
            Err(NetlistError::DomainMismatch {
                signal: "count".into(),
                declared: "sync".into(),
                driven: "comb".into()
            })
        );
    }

    #[test]
    fn dangling_operand_names_binding() {
        let mut n = counter();
        n.comb[BindingId::from_raw(0)].expr = Expr::signal(SignalId::from_raw(40));
        assert_eq!(
            n.validate(),
            Err(NetlistError::DanglingSignal {
                id: 40,
                context: "combinational binding comb#0".into()
            })
        );
    }

    #[test]
    fn unknown_domain_rejected() {
        let mut n = counter();
        n.sync[0].domain = DomainId::from_raw(5);
        assert!(matches!(
            n.validate(),
            Err(NetlistError::UnknownDomain { id: 5, .. })
        ));
    }

    #[test]
    fn serde_roundtrip() {
        let n = counter();
        let json = serde_json::to_string(&n).unwrap();
        let back: Netlist = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
        assert_eq!(back.validate(), Ok(()));
    }

    #[test]
    fn malformed_reset_value_fails_to_load() {
        let mut json = serde_json::to_value(counter()).unwrap();
        json["signals"][2]["reset"]["width"] = serde_json::json!(70);
        let err = serde_json::from_value::<Netlist>(json).unwrap_err();
        assert!(err.to_string().contains("malformed 70-bit value"), "{err}");
    }
}
