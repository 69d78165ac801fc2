//! Bindings connect an expression to the signal it drives.

use crate::expr::Expr;
use crate::ids::{BindingId, DomainId, SignalId};
use serde::{Deserialize, Serialize};

/// Continuously drives `target` with the value of `expr`.
///
/// Re-evaluated whenever one of the expression's operands changes. The
/// result is resized to the target's width using the expression's own
/// signedness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombBinding {
    /// The driven signal.
    pub target: SignalId,
    /// The driving expression.
    pub expr: Expr,
}

/// Updates `target` with the value of `expr` at each active edge of `domain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBinding {
    /// The driven signal.
    pub target: SignalId,
    /// The clock domain that triggers the update.
    pub domain: DomainId,
    /// The next-state expression, evaluated against pre-edge values.
    pub expr: Expr,
}

/// What drives a signal inside the netlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Driver {
    /// A combinational binding.
    Comb(BindingId),
    /// A synchronous binding of the given domain.
    Sync(DomainId),
}
