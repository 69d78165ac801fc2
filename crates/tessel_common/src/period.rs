//! Time periods with femtosecond resolution, constructed from time or frequency units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::str::FromStr;

/// Femtoseconds per picosecond.
pub const FS_PER_PS: u64 = 1_000;
/// Femtoseconds per nanosecond.
pub const FS_PER_NS: u64 = 1_000_000;
/// Femtoseconds per microsecond.
pub const FS_PER_US: u64 = 1_000_000_000;
/// Femtoseconds per millisecond.
pub const FS_PER_MS: u64 = 1_000_000_000_000;
/// Femtoseconds per second.
pub const FS_PER_S: u64 = 1_000_000_000_000_000;

/// Time units accepted by [`Period::from_str`], largest first.
const TIME_UNITS: [(&str, u64); 6] = [
    ("s", FS_PER_S),
    ("ms", FS_PER_MS),
    ("us", FS_PER_US),
    ("ns", FS_PER_NS),
    ("ps", FS_PER_PS),
    ("fs", 1),
];

/// Frequency units accepted by [`Period::from_str`], as multiples of 1 Hz.
const FREQUENCY_UNITS: [(&str, f64); 4] = [
    ("ghz", 1e9),
    ("mhz", 1e6),
    ("khz", 1e3),
    ("hz", 1.0),
];

/// A non-negative span of simulated time stored in femtoseconds.
///
/// Periods can be built from a time (`Period::from_ns(10)`) or from a clock
/// frequency (`Period::from_mhz(100.0)` is 10 ns), and parsed from strings
/// such as `"10ns"`, `"1.5 us"` or `"100MHz"`. Frequencies are converted by
/// rounding to the nearest femtosecond.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    fs: u64,
}

impl Period {
    /// The empty period.
    pub const ZERO: Period = Period { fs: 0 };

    /// Creates a period from femtoseconds.
    pub const fn from_fs(fs: u64) -> Self {
        Self { fs }
    }

    /// Creates a period from picoseconds.
    pub const fn from_ps(ps: u64) -> Self {
        Self { fs: ps * FS_PER_PS }
    }

    /// Creates a period from nanoseconds.
    pub const fn from_ns(ns: u64) -> Self {
        Self { fs: ns * FS_PER_NS }
    }

    /// Creates a period from microseconds.
    pub const fn from_us(us: u64) -> Self {
        Self { fs: us * FS_PER_US }
    }

    /// Creates a period from milliseconds.
    pub const fn from_ms(ms: u64) -> Self {
        Self { fs: ms * FS_PER_MS }
    }

    /// Creates the period of a clock running at `hz` hertz.
    ///
    /// Returns `None` for zero, negative or non-finite frequencies.
    pub fn from_hz(hz: f64) -> Option<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return None;
        }
        Some(Self {
            fs: (FS_PER_S as f64 / hz).round() as u64,
        })
    }

    /// Creates the period of a clock running at `mhz` megahertz.
    pub fn from_mhz(mhz: f64) -> Option<Self> {
        Self::from_hz(mhz * 1e6)
    }

    /// Returns the period in femtoseconds.
    pub const fn as_fs(self) -> u64 {
        self.fs
    }

    /// Returns `true` for the empty period.
    pub const fn is_zero(self) -> bool {
        self.fs == 0
    }

    /// Returns the frequency of a clock with this period, or `None` if empty.
    pub fn hertz(self) -> Option<f64> {
        (self.fs != 0).then(|| FS_PER_S as f64 / self.fs as f64)
    }

    /// The longest representable period.
    pub const MAX: Period = Period { fs: u64::MAX };

    /// Addition, or `None` if the sum does not fit in `u64` femtoseconds.
    pub fn checked_add(self, rhs: Period) -> Option<Period> {
        self.fs.checked_add(rhs.fs).map(Period::from_fs)
    }

    /// Addition clamped at [`Period::MAX`].
    pub fn saturating_add(self, rhs: Period) -> Period {
        Period {
            fs: self.fs.saturating_add(rhs.fs),
        }
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, rhs: Period) -> Period {
        Period {
            fs: self.fs.saturating_sub(rhs.fs),
        }
    }
}

impl Add for Period {
    type Output = Period;

    fn add(self, rhs: Period) -> Period {
        Period {
            fs: self.fs + rhs.fs,
        }
    }
}

impl AddAssign for Period {
    fn add_assign(&mut self, rhs: Period) {
        self.fs += rhs.fs;
    }
}

impl Sub for Period {
    type Output = Period;

    fn sub(self, rhs: Period) -> Period {
        Period {
            fs: self.fs - rhs.fs,
        }
    }
}

impl Mul<u64> for Period {
    type Output = Period;

    fn mul(self, rhs: u64) -> Period {
        Period { fs: self.fs * rhs }
    }
}

impl Div<u64> for Period {
    type Output = Period;

    fn div(self, rhs: u64) -> Period {
        Period { fs: self.fs / rhs }
    }
}

impl fmt::Debug for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Period({self})")
    }
}

/// Displays using the largest unit not exceeding the value, with trailing
/// zeros of the fraction dropped: `10ns`, `1.5ps`, `0fs`.
impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, div) = TIME_UNITS
            .iter()
            .copied()
            .find(|(_, div)| self.fs >= *div)
            .unwrap_or(("fs", 1));
        let integer = self.fs / div;
        let fraction = self.fs % div;
        if fraction == 0 {
            return write!(f, "{integer}{unit}");
        }
        let digits = div.ilog10() as usize;
        let frac = format!("{fraction:0digits$}");
        write!(f, "{integer}.{}{unit}", frac.trim_end_matches('0'))
    }
}

/// Error type for parsing period strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePeriodError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParsePeriodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid period: '{}'", self.input)
    }
}

impl std::error::Error for ParsePeriodError {}

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParsePeriodError {
            input: s.to_string(),
        };

        let lower = s.to_ascii_lowercase();
        for (unit, hz) in FREQUENCY_UNITS {
            if let Some(num) = lower.strip_suffix(unit) {
                let val: f64 = num.trim().parse().map_err(|_| err())?;
                return Period::from_hz(val * hz).ok_or_else(err);
            }
        }

        for (unit, div) in TIME_UNITS.iter().rev() {
            if let Some(num) = s.strip_suffix(unit) {
                let val: f64 = num.trim().parse().map_err(|_| err())?;
                if !val.is_finite() || val < 0.0 {
                    return Err(err());
                }
                return Ok(Period {
                    fs: (val * *div as f64).round() as u64,
                });
            }
        }

        Err(err())
    }
}
