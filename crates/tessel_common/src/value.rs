//! Fixed-width bit-vectors with an explicit unknown mask.

use crate::logic::Logic;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// Number of bits packed per storage word.
const WORD_BITS: u32 = 64;

/// A fixed-width vector of [`Logic`] bits.
///
/// Storage is two packed word vectors: `bits` holds the level of each bit and
/// `unknown` flags bits whose level is indeterminate. Two invariants hold after
/// every operation: a bit flagged unknown has its level bit cleared, and no bit
/// at or above `width` is set in either vector. They make derived equality
/// and hashing agree with bit-level equality.
///
/// Bit 0 is the least significant bit. Width conversions are always explicit,
/// see [`Value::resize`].
///
/// Deserialization checks both invariants and the word counts, so a
/// malformed value cannot enter a netlist through serde.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawValue")]
pub struct Value {
    width: u32,
    bits: Vec<u64>,
    unknown: Vec<u64>,
}

/// Unchecked serde image of a [`Value`].
#[derive(Deserialize)]
struct RawValue {
    width: u32,
    bits: Vec<u64>,
    unknown: Vec<u64>,
}

impl TryFrom<RawValue> for Value {
    type Error = String;

    fn try_from(raw: RawValue) -> Result<Self, Self::Error> {
        let value = Value {
            width: raw.width,
            bits: raw.bits,
            unknown: raw.unknown,
        };
        if value.is_well_formed() {
            Ok(value)
        } else {
            Err(format!(
                "malformed {}-bit value: expected {} storage words per plane with no bits set above the width or under the unknown mask",
                value.width,
                word_count(value.width)
            ))
        }
    }
}

impl Value {
    /// Creates a value of the given width with every bit `Zero`.
    pub fn zero(width: u32) -> Self {
        let n = word_count(width);
        Self {
            width,
            bits: vec![0; n],
            unknown: vec![0; n],
        }
    }

    /// Creates a value of the given width with every bit `One`.
    pub fn ones(width: u32) -> Self {
        let mut v = Self::zero(width);
        v.bits.iter_mut().for_each(|w| *w = u64::MAX);
        v.normalize();
        v
    }

    /// Creates a value of the given width with every bit unknown.
    pub fn unknown(width: u32) -> Self {
        let mut v = Self::zero(width);
        v.unknown.iter_mut().for_each(|w| *w = u64::MAX);
        v.normalize();
        v
    }

    /// Creates a value from the low `width` bits of `value`, zero-extended.
    pub fn from_u64(value: u64, width: u32) -> Self {
        let mut v = Self::zero(width);
        if let Some(w) = v.bits.first_mut() {
            *w = value;
        }
        v.normalize();
        v
    }

    /// Creates a value from the two's complement encoding of `value`,
    /// sign-extended or truncated to `width`.
    pub fn from_i64(value: i64, width: u32) -> Self {
        let fill = if value < 0 { u64::MAX } else { 0 };
        let mut v = Self::zero(width);
        for (i, w) in v.bits.iter_mut().enumerate() {
            *w = if i == 0 { value as u64 } else { fill };
        }
        v.normalize();
        v
    }

    /// Creates a single-bit value.
    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(u64::from(value), 1)
    }

    /// Parses a binary string like `"10x1"`, most significant bit first.
    ///
    /// Underscores are ignored as digit separators. Returns `None` if any
    /// other character is not `0`, `1`, `x` or `X`.
    pub fn from_binary_str(s: &str) -> Option<Self> {
        let digits: Vec<char> = s.chars().filter(|c| *c != '_').collect();
        let mut v = Self::zero(digits.len() as u32);
        for (i, c) in digits.iter().rev().enumerate() {
            v.set(i as u32, Logic::from_char(*c)?);
        }
        Some(v)
    }

    /// Returns the number of bits in this value.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn get(&self, index: u32) -> Logic {
        assert!(
            index < self.width,
            "index {index} out of bounds for width {}",
            self.width
        );
        let (word, mask) = locate(index);
        if self.unknown[word] & mask != 0 {
            Logic::X
        } else if self.bits[word] & mask != 0 {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// Sets the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn set(&mut self, index: u32, value: Logic) {
        assert!(
            index < self.width,
            "index {index} out of bounds for width {}",
            self.width
        );
        let (word, mask) = locate(index);
        self.bits[word] &= !mask;
        self.unknown[word] &= !mask;
        match value {
            Logic::Zero => {}
            Logic::One => self.bits[word] |= mask,
            Logic::X => self.unknown[word] |= mask,
        }
    }

    /// Returns `true` if no bit is unknown.
    pub fn is_fully_known(&self) -> bool {
        self.unknown.iter().all(|w| *w == 0)
    }

    /// Returns `true` if at least one bit is unknown.
    pub fn has_unknown(&self) -> bool {
        !self.is_fully_known()
    }

    /// Returns `true` if every bit is a known `Zero`.
    pub fn is_zero(&self) -> bool {
        self.is_fully_known() && self.bits.iter().all(|w| *w == 0)
    }

    /// Converts to `u64` if every bit is known and the value fits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.has_unknown() || self.bits.iter().skip(1).any(|w| *w != 0) {
            return None;
        }
        Some(self.bits.first().copied().unwrap_or(0))
    }

    /// Interprets the value as two's complement and converts to `i64`.
    ///
    /// Returns `None` if any bit is unknown or the width exceeds 64.
    pub fn to_i64(&self) -> Option<i64> {
        if self.width > WORD_BITS || self.has_unknown() {
            return None;
        }
        if self.width == 0 {
            return Some(0);
        }
        let raw = self.bits[0];
        let shift = WORD_BITS - self.width;
        Some(((raw << shift) as i64) >> shift)
    }

    /// Converts to another width.
    ///
    /// Truncation drops the high bits. Extension fills with zeros, or with
    /// copies of the most significant bit when `signed` is set; an unknown
    /// sign bit extends as unknown.
    pub fn resize(&self, width: u32, signed: bool) -> Value {
        let mut out = Value::zero(width);
        let copied = word_count(width.min(self.width));
        out.bits[..copied].copy_from_slice(&self.bits[..copied]);
        out.unknown[..copied].copy_from_slice(&self.unknown[..copied]);
        if signed && width > self.width && self.width > 0 {
            let fill = self.get(self.width - 1);
            if fill != Logic::Zero {
                for i in self.width..width {
                    out.set(i, fill);
                }
            }
        }
        out.normalize();
        out
    }

    /// Extracts bits `start..stop` as a new value of width `stop - start`.
    ///
    /// # Panics
    ///
    /// Panics if `start > stop` or `stop > self.width()`.
    pub fn slice(&self, start: u32, stop: u32) -> Value {
        assert!(
            start <= stop && stop <= self.width,
            "slice {start}..{stop} out of bounds for width {}",
            self.width
        );
        let mut out = Value::zero(stop - start);
        for i in start..stop {
            out.set(i - start, self.get(i));
        }
        out
    }

    /// Concatenates values, the first part occupying the least significant bits.
    pub fn concat(parts: &[Value]) -> Value {
        let total: u32 = parts.iter().map(Value::width).sum();
        let mut out = Value::zero(total);
        let mut offset = 0;
        for part in parts {
            for i in 0..part.width {
                out.set(offset + i, part.get(i));
            }
            offset += part.width;
        }
        out
    }

    /// Repeats this value `count` times.
    pub fn replicate(&self, count: u32) -> Value {
        let parts = vec![self.clone(); count as usize];
        Value::concat(&parts)
    }

    /// Combines two equally wide values bit by bit: bits that are known and
    /// equal in both are kept, all others become unknown.
    ///
    /// This is the result of a multiplexer whose select input is unknown.
    pub fn merge(&self, other: &Value) -> Value {
        assert_eq!(self.width, other.width, "Value width mismatch in merge");
        let mut out = Value::zero(self.width);
        for i in 0..self.bits.len() {
            let unknown = self.unknown[i] | other.unknown[i] | (self.bits[i] ^ other.bits[i]);
            out.unknown[i] = unknown;
            out.bits[i] = self.bits[i] & !unknown;
        }
        out.normalize();
        out
    }

    /// Equality with unknown propagation.
    ///
    /// `Zero` as soon as one bit position is known in both operands and
    /// differs, otherwise `X` if any bit is unknown, otherwise `One`.
    pub fn eq_logic(&self, other: &Value) -> Logic {
        assert_eq!(self.width, other.width, "Value width mismatch in eq");
        let differs = (0..self.bits.len()).any(|i| {
            (self.bits[i] ^ other.bits[i]) & !self.unknown[i] & !other.unknown[i] != 0
        });
        if differs {
            Logic::Zero
        } else if self.has_unknown() || other.has_unknown() {
            Logic::X
        } else {
            Logic::One
        }
    }

    /// Compares two fully known, equally wide values.
    ///
    /// Returns `None` if either operand has unknown bits.
    pub fn compare(&self, other: &Value, signed: bool) -> Option<Ordering> {
        assert_eq!(self.width, other.width, "Value width mismatch in compare");
        if self.has_unknown() || other.has_unknown() {
            return None;
        }
        if signed && self.width > 0 {
            let sa = self.get(self.width - 1) == Logic::One;
            let sb = other.get(other.width - 1) == Logic::One;
            if sa != sb {
                return Some(if sa { Ordering::Less } else { Ordering::Greater });
            }
        }
        Some(compare_words(&self.bits, &other.bits))
    }

    /// Wrapping addition at the operands' common width.
    ///
    /// Any unknown operand bit makes the whole result unknown.
    pub fn wrapping_add(&self, rhs: &Value) -> Value {
        self.add_with(rhs, false, false)
    }

    /// Wrapping subtraction at the operands' common width.
    pub fn wrapping_sub(&self, rhs: &Value) -> Value {
        self.add_with(rhs, true, true)
    }

    /// Two's complement negation at this value's width.
    pub fn wrapping_neg(&self) -> Value {
        Value::zero(self.width).wrapping_sub(self)
    }

    /// Wrapping multiplication at the operands' common width.
    pub fn wrapping_mul(&self, rhs: &Value) -> Value {
        assert_eq!(self.width, rhs.width, "Value width mismatch in mul");
        if self.has_unknown() || rhs.has_unknown() {
            return Value::unknown(self.width);
        }
        let n = self.bits.len();
        let mut out = Value::zero(self.width);
        for i in 0..n {
            let mut carry: u128 = 0;
            for j in 0..(n - i) {
                let k = i + j;
                let t = u128::from(self.bits[i]) * u128::from(rhs.bits[j])
                    + u128::from(out.bits[k])
                    + carry;
                out.bits[k] = t as u64;
                carry = t >> WORD_BITS;
            }
        }
        out.normalize();
        out
    }

    /// Floor division and modulo at the operands' common width.
    ///
    /// Signed operands round the quotient towards negative infinity and give
    /// the remainder the sign of the divisor. Division by zero yields zero for
    /// both results; any unknown operand bit yields all-unknown results.
    pub fn div_rem_floor(&self, rhs: &Value, signed: bool) -> (Value, Value) {
        assert_eq!(self.width, rhs.width, "Value width mismatch in div");
        let width = self.width;
        if self.has_unknown() || rhs.has_unknown() {
            return (Value::unknown(width), Value::unknown(width));
        }
        if rhs.is_zero() {
            return (Value::zero(width), Value::zero(width));
        }
        if !signed {
            return divmod_unsigned(self, rhs);
        }

        // One extra bit so that the magnitude of the most negative value fits.
        let wide = width + 1;
        let a = self.resize(wide, true);
        let b = rhs.resize(wide, true);
        let a_neg = a.get(wide - 1) == Logic::One;
        let b_neg = b.get(wide - 1) == Logic::One;
        let a_mag = if a_neg { a.wrapping_neg() } else { a };
        let b_mag = if b_neg { b.wrapping_neg() } else { b.clone() };
        let (q_mag, r_mag) = divmod_unsigned(&a_mag, &b_mag);
        let mut q = if a_neg != b_neg { q_mag.wrapping_neg() } else { q_mag };
        let mut r = if a_neg { r_mag.wrapping_neg() } else { r_mag };
        if !r.is_zero() && a_neg != b_neg {
            q = q.wrapping_sub(&Value::from_u64(1, wide));
            r = r.wrapping_add(&b);
        }
        (q.resize(width, true), r.resize(width, true))
    }

    /// Shifts towards the most significant bit, keeping the width.
    pub fn shl(&self, amount: u64) -> Value {
        let mut out = Value::zero(self.width);
        if amount >= u64::from(self.width) {
            return out;
        }
        let amount = amount as u32;
        for i in amount..self.width {
            out.set(i, self.get(i - amount));
        }
        out
    }

    /// Shifts towards the least significant bit, keeping the width.
    ///
    /// Vacated bits are zero, or copies of the sign bit when `signed`.
    pub fn shr(&self, amount: u64, signed: bool) -> Value {
        let fill = if signed && self.width > 0 {
            self.get(self.width - 1)
        } else {
            Logic::Zero
        };
        let mut out = Value::zero(self.width);
        for i in 0..self.width {
            let src = u64::from(i).saturating_add(amount);
            let bit = if src < u64::from(self.width) {
                self.get(src as u32)
            } else {
                fill
            };
            out.set(i, bit);
        }
        out
    }

    /// OR of all bits. `Zero` for an empty value.
    pub fn reduce_or(&self) -> Logic {
        if self.bits.iter().any(|w| *w != 0) {
            Logic::One
        } else if self.has_unknown() {
            Logic::X
        } else {
            Logic::Zero
        }
    }

    /// AND of all bits. `One` for an empty value.
    pub fn reduce_and(&self) -> Logic {
        let has_zero = (0..self.bits.len()).any(|i| {
            let valid = if i + 1 == self.bits.len() {
                top_mask(self.width)
            } else {
                u64::MAX
            };
            !self.bits[i] & !self.unknown[i] & valid != 0
        });
        if has_zero {
            Logic::Zero
        } else if self.has_unknown() {
            Logic::X
        } else {
            Logic::One
        }
    }

    /// XOR of all bits. `Zero` for an empty value.
    pub fn reduce_xor(&self) -> Logic {
        if self.has_unknown() {
            return Logic::X;
        }
        let ones: u32 = self.bits.iter().map(|w| w.count_ones()).sum();
        Logic::from_bool(ones % 2 == 1)
    }

    fn add_with(&self, rhs: &Value, invert_rhs: bool, carry_in: bool) -> Value {
        assert_eq!(self.width, rhs.width, "Value width mismatch in add");
        if self.has_unknown() || rhs.has_unknown() {
            return Value::unknown(self.width);
        }
        let mut out = Value::zero(self.width);
        let mut carry = carry_in;
        for i in 0..self.bits.len() {
            let b = if invert_rhs { !rhs.bits[i] } else { rhs.bits[i] };
            let (s1, c1) = self.bits[i].overflowing_add(b);
            let (s2, c2) = s1.overflowing_add(u64::from(carry));
            out.bits[i] = s2;
            carry = c1 || c2;
        }
        out.normalize();
        out
    }

    /// Restores the storage invariants after word-level manipulation.
    /// Checks the storage invariants: one word per 64 bits in both planes,
    /// no level bit under the unknown mask, nothing set above `width`.
    pub fn is_well_formed(&self) -> bool {
        let words = word_count(self.width);
        if self.bits.len() != words || self.unknown.len() != words {
            return false;
        }
        let above = !top_mask(self.width);
        let top_clear = |plane: &[u64]| plane.last().map_or(true, |w| w & above == 0);
        top_clear(&self.bits)
            && top_clear(&self.unknown)
            && self.bits.iter().zip(&self.unknown).all(|(b, u)| b & u == 0)
    }

    fn normalize(&mut self) {
        for (b, u) in self.bits.iter_mut().zip(self.unknown.iter()) {
            *b &= !*u;
        }
        let mask = top_mask(self.width);
        if let Some(last) = self.bits.last_mut() {
            *last &= mask;
        }
        if let Some(last) = self.unknown.last_mut() {
            *last &= mask;
        }
    }
}

/// Unsigned long division of two known values of equal width, `b != 0`.
fn divmod_unsigned(a: &Value, b: &Value) -> (Value, Value) {
    let width = a.width;
    let b_wide = b.resize(width + 1, false);
    let mut q = Value::zero(width);
    let mut r = Value::zero(width + 1);
    for i in (0..width).rev() {
        r = r.shl(1);
        if a.get(i) == Logic::One {
            r.set(0, Logic::One);
        }
        if r.compare(&b_wide, false) != Some(Ordering::Less) {
            r = r.wrapping_sub(&b_wide);
            q.set(i, Logic::One);
        }
    }
    (q, r.resize(width, false))
}

fn compare_words(a: &[u64], b: &[u64]) -> Ordering {
    for (x, y) in a.iter().rev().zip(b.iter().rev()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn word_count(width: u32) -> usize {
    width.div_ceil(WORD_BITS) as usize
}

fn top_mask(width: u32) -> u64 {
    match width % WORD_BITS {
        0 => u64::MAX,
        r => (1u64 << r) - 1,
    }
}

fn locate(index: u32) -> (usize, u64) {
    ((index / WORD_BITS) as usize, 1u64 << (index % WORD_BITS))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.width).rev() {
            write!(f, "{}", self.get(i))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}'b{self})", self.width)
    }
}

impl BitAnd for &Value {
    type Output = Value;

    fn bitand(self, rhs: Self) -> Value {
        assert_eq!(self.width, rhs.width, "Value width mismatch in AND");
        let mut out = Value::zero(self.width);
        for i in 0..self.bits.len() {
            let zero_a = !self.bits[i] & !self.unknown[i];
            let zero_b = !rhs.bits[i] & !rhs.unknown[i];
            let one = self.bits[i] & rhs.bits[i];
            out.bits[i] = one;
            out.unknown[i] = !(one | zero_a | zero_b);
        }
        out.normalize();
        out
    }
}

impl BitOr for &Value {
    type Output = Value;

    fn bitor(self, rhs: Self) -> Value {
        assert_eq!(self.width, rhs.width, "Value width mismatch in OR");
        let mut out = Value::zero(self.width);
        for i in 0..self.bits.len() {
            let zero = !self.bits[i] & !self.unknown[i] & !rhs.bits[i] & !rhs.unknown[i];
            let one = self.bits[i] | rhs.bits[i];
            out.bits[i] = one;
            out.unknown[i] = !(one | zero);
        }
        out.normalize();
        out
    }
}

impl BitXor for &Value {
    type Output = Value;

    fn bitxor(self, rhs: Self) -> Value {
        assert_eq!(self.width, rhs.width, "Value width mismatch in XOR");
        let mut out = Value::zero(self.width);
        for i in 0..self.bits.len() {
            out.unknown[i] = self.unknown[i] | rhs.unknown[i];
            out.bits[i] = self.bits[i] ^ rhs.bits[i];
        }
        out.normalize();
        out
    }
}

impl Not for &Value {
    type Output = Value;

    fn not(self) -> Value {
        let mut out = Value::zero(self.width);
        for i in 0..self.bits.len() {
            out.unknown[i] = self.unknown[i];
            out.bits[i] = !self.bits[i];
        }
        out.normalize();
        out
    }
}
