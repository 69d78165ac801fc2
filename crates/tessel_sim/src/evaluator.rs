//! Expression evaluator.
//!
//! [`eval_expr`] recursively evaluates a netlist [`Expr`] into a [`Value`],
//! reading committed signal values from the [`SignalStore`]. Result widths
//! follow the shape rules of [`UnaryOp::result_shape`] and
//! [`BinaryOp::result_shape`]; operands are extended to the width an
//! operator works at according to their own signedness.
//!
//! Unknown bits propagate pessimistically: bitwise operators follow the
//! [`Logic`] truth tables, arithmetic with any unknown operand bit is fully
//! unknown, and a multiplexer with an unknown select merges both arms.

use std::cmp::Ordering;

use tessel_common::{Logic, Value};
use tessel_netlist::{BinaryOp, Expr, Netlist, Shape, UnaryOp};

use crate::error::SimError;
use crate::store::SignalStore;

/// Context for expression evaluation: signal shapes and committed values.
pub struct EvalContext<'a> {
    /// The netlist, for signal shapes.
    pub netlist: &'a Netlist,
    /// The committed signal values.
    pub store: &'a SignalStore,
}

/// A value together with its signedness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluated {
    /// The computed bits.
    pub value: Value,
    /// Whether the bits are read as two's complement.
    pub signed: bool,
}

impl Evaluated {
    fn new(value: Value, signed: bool) -> Self {
        Self { value, signed }
    }

    fn unsigned(value: Value) -> Self {
        Self::new(value, false)
    }

    /// Returns the shape of the value.
    pub fn shape(&self) -> Shape {
        Shape {
            width: self.value.width(),
            signed: self.signed,
        }
    }

    /// Converts to `width` bits, extending according to signedness.
    ///
    /// This is how a result is assigned to a signal of a different width.
    pub fn resized(&self, width: u32) -> Value {
        self.value.resize(width, self.signed)
    }
}

/// Evaluates an expression against the committed signal values.
///
/// Only fails on expressions a validated netlist cannot contain.
pub fn eval_expr(ctx: &EvalContext<'_>, expr: &Expr) -> Result<Evaluated, SimError> {
    match expr {
        Expr::Const { value, signed } => Ok(Evaluated::new(value.clone(), *signed)),
        Expr::Signal(id) => {
            let decl = ctx.netlist.signals.try_get(*id).ok_or_else(|| {
                SimError::UnknownSignal {
                    name: id.to_string(),
                }
            })?;
            Ok(Evaluated::new(
                ctx.store.current(*id).clone(),
                decl.shape.signed,
            ))
        }
        Expr::Slice { expr, start, stop } => {
            let inner = eval_expr(ctx, expr)?;
            Ok(Evaluated::unsigned(inner.value.slice(*start, *stop)))
        }
        Expr::Concat(parts) => {
            let values = parts
                .iter()
                .map(|p| eval_expr(ctx, p).map(|e| e.value))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Evaluated::unsigned(Value::concat(&values)))
        }
        Expr::Replicate { expr, count } => {
            let inner = eval_expr(ctx, expr)?;
            Ok(Evaluated::unsigned(inner.value.replicate(*count)))
        }
        Expr::Mux {
            select,
            if_true,
            if_false,
        } => {
            let select = eval_expr(ctx, select)?.value.reduce_or();
            let a = eval_expr(ctx, if_true)?;
            let b = eval_expr(ctx, if_false)?;
            let shape = a.shape().unify(b.shape());
            let a = a.resized(shape.width);
            let b = b.resized(shape.width);
            let value = match select {
                Logic::One => a,
                Logic::Zero => b,
                Logic::X => a.merge(&b),
            };
            Ok(Evaluated::new(value, shape.signed))
        }
        Expr::Unary { op, operand } => {
            let operand = eval_expr(ctx, operand)?;
            Ok(eval_unary(*op, &operand))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval_expr(ctx, lhs)?;
            let rhs = eval_expr(ctx, rhs)?;
            eval_binary(*op, &lhs, &rhs)
        }
    }
}

fn eval_unary(op: UnaryOp, operand: &Evaluated) -> Evaluated {
    let shape = op.result_shape(operand.shape());
    let value = match op {
        UnaryOp::Not => !&operand.value,
        UnaryOp::Neg => operand.resized(shape.width).wrapping_neg(),
        UnaryOp::ReduceOr => bit(operand.value.reduce_or()),
        UnaryOp::ReduceAnd => bit(operand.value.reduce_and()),
        UnaryOp::ReduceXor => bit(operand.value.reduce_xor()),
        UnaryOp::AsSigned | UnaryOp::AsUnsigned => operand.value.clone(),
    };
    Evaluated::new(value, shape.signed)
}

fn eval_binary(op: BinaryOp, lhs: &Evaluated, rhs: &Evaluated) -> Result<Evaluated, SimError> {
    let shape = op.result_shape(lhs.shape(), rhs.shape())?;
    let width = shape.width;
    let value = match op {
        BinaryOp::And => &lhs.resized(width) & &rhs.resized(width),
        BinaryOp::Or => &lhs.resized(width) | &rhs.resized(width),
        BinaryOp::Xor => &lhs.resized(width) ^ &rhs.resized(width),
        BinaryOp::Add => lhs.resized(width).wrapping_add(&rhs.resized(width)),
        BinaryOp::Sub => lhs.resized(width).wrapping_sub(&rhs.resized(width)),
        BinaryOp::Mul => lhs.resized(width).wrapping_mul(&rhs.resized(width)),
        BinaryOp::FloorDiv | BinaryOp::Mod => {
            // One spare bit keeps mixed signedness and `MIN / -1` exact.
            let common = lhs.value.width().max(rhs.value.width()) + 1;
            let (quotient, remainder) = lhs
                .resized(common)
                .div_rem_floor(&rhs.resized(common), shape.signed);
            let result = if op == BinaryOp::FloorDiv {
                quotient
            } else {
                remainder
            };
            result.resize(width, shape.signed)
        }
        BinaryOp::Shl => match shift_amount(&rhs.value) {
            Some(amount) => lhs.resized(width).shl(amount),
            None => Value::unknown(width),
        },
        BinaryOp::Shr => match shift_amount(&rhs.value) {
            Some(amount) => lhs.value.shr(amount, lhs.signed),
            None => Value::unknown(width),
        },
        BinaryOp::Eq | BinaryOp::Ne => {
            let common = lhs.shape().unify(rhs.shape()).width;
            let eq = lhs.resized(common).eq_logic(&rhs.resized(common));
            bit(if op == BinaryOp::Eq { eq } else { !eq })
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let common = lhs.shape().unify(rhs.shape());
            let ordering = lhs
                .resized(common.width)
                .compare(&rhs.resized(common.width), common.signed);
            bit(match ordering {
                Some(ord) => Logic::from_bool(compare_holds(op, ord)),
                None => Logic::X,
            })
        }
    };
    Ok(Evaluated::new(value, shape.signed))
}

/// The shift distance, or `None` when any bit of it is unknown. Known amounts
/// too large for a `u64` saturate, which shifts every bit out.
fn shift_amount(amount: &Value) -> Option<u64> {
    if amount.has_unknown() {
        return None;
    }
    Some(amount.to_u64().unwrap_or(u64::MAX))
}

fn compare_holds(op: BinaryOp, ord: Ordering) -> bool {
    match op {
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    }
}

fn bit(level: Logic) -> Value {
    let mut v = Value::zero(1);
    v.set(0, level);
    v
}
