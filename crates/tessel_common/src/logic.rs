//! Single-bit logic levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// One bit: driven low, driven high, or unknown.
///
/// Unknown stands for uninitialized registers and anything computed from
/// them. Operators are pessimistic: a controlling operand (`0` for AND, `1`
/// for OR) decides the result even when the other side is unknown, and any
/// other combination with an unknown is unknown.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Logic {
    /// Driven low.
    Zero,
    /// Driven high.
    One,
    /// Unknown level.
    X,
}

impl Logic {
    /// Parses `0`, `1`, `x` or `X`.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'X' => Some(Logic::X),
            _ => None,
        }
    }

    /// The known level for `b`.
    pub fn from_bool(b: bool) -> Self {
        if b {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// `Some(level)` for a known bit.
    pub fn to_bool(self) -> Option<bool> {
        match self {
            Logic::Zero => Some(false),
            Logic::One => Some(true),
            Logic::X => None,
        }
    }

    /// Whether the bit is `0` or `1`.
    pub fn is_known(self) -> bool {
        self != Logic::X
    }

    /// Lifts a boolean function to logic levels: known operands map through
    /// `f`, any unknown operand gives `X`.
    fn lift(self, rhs: Logic, f: impl FnOnce(bool, bool) -> bool) -> Logic {
        match (self.to_bool(), rhs.to_bool()) {
            (Some(a), Some(b)) => Logic::from_bool(f(a, b)),
            _ => Logic::X,
        }
    }
}

impl From<bool> for Logic {
    fn from(b: bool) -> Self {
        Logic::from_bool(b)
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
        };
        write!(f, "{c}")
    }
}

impl BitAnd for Logic {
    type Output = Logic;

    fn bitand(self, rhs: Logic) -> Logic {
        if self == Logic::Zero || rhs == Logic::Zero {
            return Logic::Zero;
        }
        self.lift(rhs, |a, b| a && b)
    }
}

impl BitOr for Logic {
    type Output = Logic;

    fn bitor(self, rhs: Logic) -> Logic {
        if self == Logic::One || rhs == Logic::One {
            return Logic::One;
        }
        self.lift(rhs, |a, b| a || b)
    }
}

impl BitXor for Logic {
    type Output = Logic;

    fn bitxor(self, rhs: Logic) -> Logic {
        self.lift(rhs, |a, b| a != b)
    }
}

impl Not for Logic {
    type Output = Logic;

    fn not(self) -> Logic {
        match self.to_bool() {
            Some(b) => Logic::from_bool(!b),
            None => Logic::X,
        }
    }
}
