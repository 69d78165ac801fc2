//! Bit widths and signedness of signals and expressions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The width and signedness of a value.
///
/// Signedness only affects how a value is extended to a wider width and how
/// arithmetic and comparisons interpret its bits; storage is always a plain
/// bit-vector.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Shape {
    /// Number of bits.
    pub width: u32,
    /// Whether the bits are read as two's complement.
    pub signed: bool,
}

impl Shape {
    /// An unsigned shape of the given width.
    pub const fn unsigned(width: u32) -> Self {
        Self {
            width,
            signed: false,
        }
    }

    /// A signed shape of the given width.
    pub const fn signed(width: u32) -> Self {
        Self {
            width,
            signed: true,
        }
    }

    /// The shape of a single-bit unsigned value.
    pub const fn bit() -> Self {
        Self::unsigned(1)
    }

    /// The smallest shape that can represent every value of both operands.
    ///
    /// Equal signedness keeps the wider width. With mixed signedness the
    /// unsigned operand needs one extra bit to stay non-negative, and the
    /// result is signed.
    pub fn unify(self, other: Shape) -> Shape {
        match (self.signed, other.signed) {
            (true, false) => Shape::signed(self.width.max(other.width + 1)),
            (false, true) => Shape::signed((self.width + 1).max(other.width)),
            (signed, _) => Shape {
                width: self.width.max(other.width),
                signed,
            },
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signed {
            write!(f, "signed({})", self.width)
        } else {
            write!(f, "unsigned({})", self.width)
        }
    }
}
