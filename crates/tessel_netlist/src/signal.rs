//! Signal declarations.

use crate::ids::DomainId;
use crate::shape::Shape;
use serde::{Deserialize, Serialize};
use tessel_common::Value;

/// A declared signal.
///
/// Names are dotted hierarchical paths (`top.uart.tx`); the last component is
/// the local name and the rest form the enclosing scopes in waveform output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecl {
    /// Hierarchical name.
    pub name: String,
    /// Width and signedness.
    pub shape: Shape,
    /// Value loaded at time zero and applied while the owning domain's reset
    /// is asserted. `None` starts the signal unknown and makes it ignore reset.
    pub reset: Option<Value>,
    /// The domain whose synchronous binding drives this signal, `None` for
    /// combinational or externally driven signals.
    pub domain: Option<DomainId>,
}

impl SignalDecl {
    /// Declares a combinational signal without a reset value.
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            reset: None,
            domain: None,
        }
    }

    /// Sets the reset value.
    pub fn with_reset(mut self, reset: Value) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Returns the value the signal holds before anything drives it.
    pub fn initial_value(&self) -> Value {
        match &self.reset {
            Some(reset) => reset.clone(),
            None => Value::unknown(self.shape.width),
        }
    }

    /// Returns the last component of the hierarchical name.
    pub fn local_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}
