//! Shared foundational types for the Tessel hardware toolkit.
//!
//! This crate provides three-state logic bits, fixed-width bit-vectors with
//! an explicit unknown mask, femtosecond-resolution periods, and content
//! hashing used to fingerprint simulation traces.

#![warn(missing_docs)]

pub mod hash;
pub mod logic;
pub mod period;
pub mod value;

pub use hash::{ContentHash, ContentHasher};
pub use logic::Logic;
pub use period::{ParsePeriodError, Period};
pub use value::Value;
