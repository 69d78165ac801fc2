//! Expression trees driving combinational and synchronous bindings.
//!
//! An [`Expr`] is a pure function of signal values. Every node has a [`Shape`]
//! derived from its operands by the rules in [`UnaryOp::result_shape`] and
//! [`BinaryOp::result_shape`]; validation and evaluation share these rules so
//! that a validated netlist never produces a value of an unexpected width.

use crate::arena::Arena;
use crate::error::NetlistError;
use crate::ids::SignalId;
use crate::shape::Shape;
use crate::signal::SignalDecl;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessel_common::Value;

/// Widest supported left-shift amount operand, in bits.
///
/// A left shift widens its result by `2^width - 1` bits.
pub const MAX_SHIFT_AMOUNT_WIDTH: u32 = 16;

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Bitwise NOT.
    Not,
    /// Arithmetic negation.
    Neg,
    /// OR of all bits; `1` if any bit is set.
    ReduceOr,
    /// AND of all bits.
    ReduceAnd,
    /// XOR of all bits (parity).
    ReduceXor,
    /// Reinterprets the bits as signed.
    AsSigned,
    /// Reinterprets the bits as unsigned.
    AsUnsigned,
}

impl UnaryOp {
    /// Returns the shape of the result for an operand of shape `operand`.
    pub fn result_shape(self, operand: Shape) -> Shape {
        match self {
            UnaryOp::Not => operand,
            UnaryOp::Neg => Shape::signed(operand.width + 1),
            UnaryOp::ReduceOr | UnaryOp::ReduceAnd | UnaryOp::ReduceXor => Shape::bit(),
            UnaryOp::AsSigned => Shape::signed(operand.width),
            UnaryOp::AsUnsigned => Shape::unsigned(operand.width),
        }
    }
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division rounding towards negative infinity.
    FloorDiv,
    /// Remainder with the sign of the divisor.
    Mod,
    /// Left shift; widens the result to hold every shifted bit.
    Shl,
    /// Right shift; arithmetic for signed operands.
    Shr,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl BinaryOp {
    /// Returns the shape of the result for operands of shapes `lhs` and `rhs`.
    ///
    /// Fails for a left shift whose amount is wider than
    /// [`MAX_SHIFT_AMOUNT_WIDTH`], and for results wider than `u32::MAX` bits.
    pub fn result_shape(self, lhs: Shape, rhs: Shape) -> Result<Shape, NetlistError> {
        let signed = lhs.signed || rhs.signed;
        let shape = match self {
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => lhs.unify(rhs),
            BinaryOp::Add | BinaryOp::Sub => {
                let common = lhs.unify(rhs);
                Shape {
                    width: widen(common.width, 1, "addition")?,
                    signed: common.signed,
                }
            }
            BinaryOp::Mul => Shape {
                width: widen(lhs.width, rhs.width, "multiplication")?,
                signed,
            },
            BinaryOp::FloorDiv => Shape {
                width: widen(lhs.width, u32::from(rhs.signed), "division")?,
                signed,
            },
            BinaryOp::Mod => Shape {
                width: rhs.width,
                signed,
            },
            BinaryOp::Shl => {
                if rhs.width > MAX_SHIFT_AMOUNT_WIDTH {
                    return Err(NetlistError::ShiftTooWide {
                        width: rhs.width,
                        max: MAX_SHIFT_AMOUNT_WIDTH,
                    });
                }
                Shape {
                    width: widen(lhs.width, (1u32 << rhs.width) - 1, "left shift")?,
                    signed: lhs.signed,
                }
            }
            BinaryOp::Shr => lhs,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => Shape::bit(),
        };
        Ok(shape)
    }
}

fn widen(width: u32, extra: u32, context: &'static str) -> Result<u32, NetlistError> {
    width
        .checked_add(extra)
        .ok_or(NetlistError::WidthOverflow { context })
}

/// An expression over signal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A literal value.
    Const {
        /// The bits of the literal.
        value: Value,
        /// Whether the literal is read as signed.
        signed: bool,
    },
    /// The committed value of a signal.
    Signal(SignalId),
    /// Bits `start..stop` of the operand.
    Slice {
        /// The sliced operand.
        expr: Box<Expr>,
        /// First bit, inclusive.
        start: u32,
        /// Last bit, exclusive.
        stop: u32,
    },
    /// Concatenation; the first part lands in the least significant bits.
    Concat(Vec<Expr>),
    /// The operand repeated `count` times.
    Replicate {
        /// The repeated operand.
        expr: Box<Expr>,
        /// Number of copies.
        count: u32,
    },
    /// Two-way multiplexer: `if_true` when any bit of `select` is set.
    Mux {
        /// The select operand.
        select: Box<Expr>,
        /// Result when the select is non-zero.
        if_true: Box<Expr>,
        /// Result when the select is zero.
        if_false: Box<Expr>,
    },
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// A reference to a signal.
    pub fn signal(id: SignalId) -> Expr {
        Expr::Signal(id)
    }

    /// An unsigned literal holding the low `width` bits of `value`.
    pub fn constant(value: u64, width: u32) -> Expr {
        Expr::Const {
            value: Value::from_u64(value, width),
            signed: false,
        }
    }

    /// A signed literal holding `value` truncated or extended to `width`.
    pub fn signed_constant(value: i64, width: u32) -> Expr {
        Expr::Const {
            value: Value::from_i64(value, width),
            signed: true,
        }
    }

    /// An unsigned literal with an arbitrary value.
    pub fn value(value: Value) -> Expr {
        Expr::Const {
            value,
            signed: false,
        }
    }

    /// Applies a unary operator.
    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Applies a binary operator.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Equality comparison, a 1-bit result.
    pub fn equals(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, self, rhs)
    }

    /// Bits `start..stop`.
    pub fn slice(self, start: u32, stop: u32) -> Expr {
        Expr::Slice {
            expr: Box::new(self),
            start,
            stop,
        }
    }

    /// Concatenation, first part least significant.
    pub fn concat(parts: Vec<Expr>) -> Expr {
        Expr::Concat(parts)
    }

    /// `if_true` when `select` is non-zero, else `if_false`.
    pub fn mux(select: Expr, if_true: Expr, if_false: Expr) -> Expr {
        Expr::Mux {
            select: Box::new(select),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Computes the shape of this expression.
    ///
    /// Fails if the expression refers to an undeclared signal, slices out of
    /// range, shifts by an over-wide amount or is wider than `u32::MAX` bits.
    pub fn shape(&self, signals: &Arena<SignalId, SignalDecl>) -> Result<Shape, NetlistError> {
        match self {
            Expr::Const { value, signed } => Ok(Shape {
                width: value.width(),
                signed: *signed,
            }),
            Expr::Signal(id) => signals
                .try_get(*id)
                .map(|decl| decl.shape)
                .ok_or_else(|| NetlistError::DanglingSignal {
                    id: id.as_raw(),
                    context: "expression".into(),
                }),
            Expr::Slice { expr, start, stop } => {
                let width = expr.shape(signals)?.width;
                if start > stop || *stop > width {
                    return Err(NetlistError::InvalidSlice {
                        start: *start,
                        stop: *stop,
                        width,
                    });
                }
                Ok(Shape::unsigned(stop - start))
            }
            Expr::Concat(parts) => {
                let mut width = 0;
                for part in parts {
                    width = widen(width, part.shape(signals)?.width, "concatenation")?;
                }
                Ok(Shape::unsigned(width))
            }
            Expr::Replicate { expr, count } => {
                let width = expr.shape(signals)?.width;
                width
                    .checked_mul(*count)
                    .map(Shape::unsigned)
                    .ok_or(NetlistError::WidthOverflow {
                        context: "replication",
                    })
            }
            Expr::Mux {
                select,
                if_true,
                if_false,
            } => {
                select.shape(signals)?;
                Ok(if_true.shape(signals)?.unify(if_false.shape(signals)?))
            }
            Expr::Unary { op, operand } => Ok(op.result_shape(operand.shape(signals)?)),
            Expr::Binary { op, lhs, rhs } => {
                op.result_shape(lhs.shape(signals)?, rhs.shape(signals)?)
            }
        }
    }

    /// Calls `f` for every signal reference, in tree order, repeats included.
    pub fn visit_signals(&self, f: &mut impl FnMut(SignalId)) {
        match self {
            Expr::Const { .. } => {}
            Expr::Signal(id) => f(*id),
            Expr::Slice { expr, .. } | Expr::Replicate { expr, .. } => expr.visit_signals(f),
            Expr::Concat(parts) => parts.iter().for_each(|p| p.visit_signals(f)),
            Expr::Mux {
                select,
                if_true,
                if_false,
            } => {
                select.visit_signals(f);
                if_true.visit_signals(f);
                if_false.visit_signals(f);
            }
            Expr::Unary { operand, .. } => operand.visit_signals(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_signals(f);
                rhs.visit_signals(f);
            }
        }
    }

    /// Returns the distinct signals this expression reads, in ID order.
    pub fn operands(&self) -> BTreeSet<SignalId> {
        let mut out = BTreeSet::new();
        self.visit_signals(&mut |id| {
            out.insert(id);
        });
        out
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:ident) => {
        impl std::ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary(BinaryOp::$op, self, rhs)
            }
        }
    };
}

impl_binary_operator!(BitAnd, bitand, And);
impl_binary_operator!(BitOr, bitor, Or);
impl_binary_operator!(BitXor, bitxor, Xor);
impl_binary_operator!(Add, add, Add);
impl_binary_operator!(Sub, sub, Sub);
impl_binary_operator!(Mul, mul, Mul);

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::unary(UnaryOp::Not, self)
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decls(shapes: &[Shape]) -> (Arena<SignalId, SignalDecl>, Vec<SignalId>) {
        let mut arena = Arena::new();
        let ids = shapes
            .iter()
            .enumerate()
            .map(|(i, s)| arena.alloc(SignalDecl::new(format!("s{i}"), *s)))
            .collect();
        (arena, ids)
    }

    fn binary_shape(op: BinaryOp, a: Shape, b: Shape) -> Shape {
        op.result_shape(a, b).unwrap()
    }

    #[test]
    fn bitwise_shapes() {
        let u4 = Shape::unsigned(4);
        let u8 = Shape::unsigned(8);
        let s4 = Shape::signed(4);
        assert_eq!(binary_shape(BinaryOp::And, u4, u8), u8);
        assert_eq!(binary_shape(BinaryOp::Xor, s4, u4), Shape::signed(5));
    }

    #[test]
    fn arithmetic_shapes() {
        let u4 = Shape::unsigned(4);
        let u8 = Shape::unsigned(8);
        let s4 = Shape::signed(4);
        assert_eq!(binary_shape(BinaryOp::Add, u4, u8), Shape::unsigned(9));
        assert_eq!(binary_shape(BinaryOp::Sub, s4, u4), Shape::signed(6));
        assert_eq!(binary_shape(BinaryOp::Mul, u4, s4), Shape::signed(8));
        assert_eq!(binary_shape(BinaryOp::FloorDiv, u8, u4), Shape::unsigned(8));
        assert_eq!(binary_shape(BinaryOp::FloorDiv, u8, s4), Shape::signed(9));
        assert_eq!(binary_shape(BinaryOp::Mod, u8, u4), Shape::unsigned(4));
    }

    #[test]
    fn shift_shapes() {
        let u4 = Shape::unsigned(4);
        assert_eq!(
            binary_shape(BinaryOp::Shl, u4, Shape::unsigned(2)),
            Shape::unsigned(7)
        );
        assert_eq!(binary_shape(BinaryOp::Shr, Shape::signed(6), u4), Shape::signed(6));
        assert_eq!(
            BinaryOp::Shl.result_shape(u4, Shape::unsigned(17)),
            Err(NetlistError::ShiftTooWide { width: 17, max: 16 })
        );
    }

    #[test]
    fn comparison_and_reduction_shapes() {
        let s8 = Shape::signed(8);
        assert_eq!(binary_shape(BinaryOp::Lt, s8, s8), Shape::bit());
        assert_eq!(UnaryOp::ReduceXor.result_shape(s8), Shape::bit());
        assert_eq!(UnaryOp::Neg.result_shape(Shape::unsigned(4)), Shape::signed(5));
        assert_eq!(UnaryOp::AsUnsigned.result_shape(s8), Shape::unsigned(8));
    }

    #[test]
    fn structural_shapes() {
        let (arena, ids) = decls(&[Shape::unsigned(8), Shape::signed(3)]);
        let a = Expr::signal(ids[0]);
        let b = Expr::signal(ids[1]);
        assert_eq!(a.clone().slice(2, 6).shape(&arena), Ok(Shape::unsigned(4)));
        assert_eq!(
            Expr::concat(vec![a.clone(), b.clone()]).shape(&arena),
            Ok(Shape::unsigned(11))
        );
        let rep = Expr::Replicate {
            expr: Box::new(b.clone()),
            count: 3,
        };
        assert_eq!(rep.shape(&arena), Ok(Shape::unsigned(9)));
        let mux = Expr::mux(Expr::constant(1, 1), a, b);
        assert_eq!(mux.shape(&arena), Ok(Shape::signed(9)));
    }

    #[test]
    fn invalid_slice_rejected() {
        let (arena, ids) = decls(&[Shape::unsigned(4)]);
        let e = Expr::signal(ids[0]).slice(2, 5);
        assert_eq!(
            e.shape(&arena),
            Err(NetlistError::InvalidSlice {
                start: 2,
                stop: 5,
                width: 4
            })
        );
    }

    #[test]
    fn oversized_results_rejected() {
        let (arena, ids) = decls(&[Shape::unsigned(8)]);
        let rep = Expr::Replicate {
            expr: Box::new(Expr::signal(ids[0])),
            count: u32::MAX,
        };
        assert_eq!(
            rep.shape(&arena),
            Err(NetlistError::WidthOverflow {
                context: "replication"
            })
        );
        let huge = Expr::Replicate {
            expr: Box::new(Expr::constant(0, 1)),
            count: u32::MAX,
        };
        let cat = Expr::concat(vec![huge, Expr::signal(ids[0])]);
        assert_eq!(
            cat.shape(&arena),
            Err(NetlistError::WidthOverflow {
                context: "concatenation"
            })
        );
        assert_eq!(
            BinaryOp::Mul.result_shape(Shape::unsigned(u32::MAX), Shape::bit()),
            Err(NetlistError::WidthOverflow {
                context: "multiplication"
            })
        );
    }

    #[test]
    fn dangling_reference_rejected() {
        let (arena, _) = decls(&[Shape::bit()]);
        let e = !Expr::signal(SignalId::from_raw(3));
        assert!(matches!(
            e.shape(&arena),
            Err(NetlistError::DanglingSignal { id: 3, .. })
        ));
    }

    #[test]
    fn operands_are_distinct_and_sorted() {
        let a = SignalId::from_raw(2);
        let b = SignalId::from_raw(0);
        let e = (Expr::signal(a) & Expr::signal(b)) | Expr::signal(a);
        let ops: Vec<SignalId> = e.operands().into_iter().collect();
        assert_eq!(ops, vec![b, a]);
    }

    #[test]
    fn serde_roundtrip() {
        let e = Expr::mux(
            Expr::signal(SignalId::from_raw(0)),
            Expr::signed_constant(-1, 4),
            Expr::constant(5, 4) + Expr::constant(1, 4),
        );
        let json = serde_json::to_string(&e).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }
}
