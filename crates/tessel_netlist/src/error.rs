//! Elaboration errors reported by netlist validation.

/// A structural problem that makes a netlist impossible to simulate.
///
/// These are reported once, before any simulated time elapses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetlistError {
    /// An ID refers to a signal that was never declared.
    #[error("{context} refers to undeclared signal #{id}")]
    DanglingSignal {
        /// Raw index of the missing signal.
        id: u32,
        /// What held the reference.
        context: String,
    },

    /// An ID refers to a domain that was never declared.
    #[error("{context} refers to undeclared domain #{id}")]
    UnknownDomain {
        /// Raw index of the missing domain.
        id: u32,
        /// What held the reference.
        context: String,
    },

    /// A clock or reset signal is not one bit wide.
    #[error("signal `{signal}` must be {expected} bit(s) wide, found {found}")]
    WidthMismatch {
        /// Name of the offending signal.
        signal: String,
        /// The required width.
        expected: u32,
        /// The declared width.
        found: u32,
    },

    /// More than one binding drives the same signal.
    #[error("signal `{signal}` is driven by more than one binding")]
    MultipleDrivers {
        /// Name of the multiply driven signal.
        signal: String,
    },

    /// A binding drives a signal from a domain other than the one it was
    /// declared in.
    #[error("signal `{signal}` belongs to domain `{declared}` but is driven from `{driven}`")]
    DomainMismatch {
        /// Name of the signal.
        signal: String,
        /// The domain the signal was declared in (`comb` for none).
        declared: String,
        /// The domain of the binding driving it (`comb` for none).
        driven: String,
    },

    /// A slice range does not fit its operand.
    #[error("slice {start}..{stop} is out of range for a {width}-bit operand")]
    InvalidSlice {
        /// First bit of the slice.
        start: u32,
        /// One past the last bit of the slice.
        stop: u32,
        /// Width of the sliced operand.
        width: u32,
    },

    /// A left shift amount is so wide that the result width explodes.
    #[error("shift amount is {width} bits wide, at most {max} are supported")]
    ShiftTooWide {
        /// Width of the shift amount operand.
        width: u32,
        /// The supported maximum.
        max: u32,
    },

    /// An expression's result does not fit in a `u32` width.
    #[error("{context} result is wider than {} bits", u32::MAX)]
    WidthOverflow {
        /// The operation whose width overflowed.
        context: &'static str,
    },

    /// Two signals or two domains share a name.
    #[error("duplicate {kind} name `{name}`")]
    DuplicateName {
        /// `"signal"` or `"domain"`.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },

    /// A reset value does not have the width of its signal.
    #[error("reset value of `{signal}` is {found} bits wide, signal is {expected}")]
    ResetWidth {
        /// Name of the signal.
        signal: String,
        /// Width of the signal.
        expected: u32,
        /// Width of the reset value.
        found: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_signal_display() {
        let e = NetlistError::DanglingSignal {
            id: 7,
            context: "combinational binding comb#0".into(),
        };
        assert_eq!(
            e.to_string(),
            "combinational binding comb#0 refers to undeclared signal #7"
        );
    }

    #[test]
    fn domain_mismatch_display() {
        let e = NetlistError::DomainMismatch {
            signal: "count".into(),
            declared: "sync".into(),
            driven: "comb".into(),
        };
        assert_eq!(
            e.to_string(),
            "signal `count` belongs to domain `sync` but is driven from `comb`"
        );
    }

    #[test]
    fn shift_too_wide_display() {
        let e = NetlistError::ShiftTooWide { width: 20, max: 16 };
        assert_eq!(
            e.to_string(),
            "shift amount is 20 bits wide, at most 16 are supported"
        );
    }

    #[test]
    fn width_overflow_display() {
        let e = NetlistError::WidthOverflow { context: "replication" };
        assert_eq!(e.to_string(), "replication result is wider than 4294967295 bits");
    }

    #[test]
    fn duplicate_name_display() {
        let e = NetlistError::DuplicateName {
            kind: "signal",
            name: "top.a".into(),
        };
        assert_eq!(e.to_string(), "duplicate signal name `top.a`");
    }
}
