//! Elaborated netlist model for the Tessel logic simulator.
//!
//! A [`Netlist`] is the flat, fully elaborated form of a design: declared
//! [`SignalDecl`]s with their [`Shape`]s and reset values, clock [`Domain`]s,
//! combinational bindings that continuously drive a signal from an [`Expr`],
//! and synchronous bindings that update a signal on a domain's clock edge.
//!
//! Netlists are assembled with [`NetlistBuilder`] and checked once with
//! [`Netlist::validate`]. All entities are stored in [`Arena`]s and referred
//! to by typed IDs, so a netlist is cheap to share and serializable with serde.

#![warn(missing_docs)]

pub mod arena;
pub mod binding;
pub mod builder;
pub mod domain;
pub mod error;
pub mod expr;
pub mod graph;
pub mod ids;
pub mod netlist;
pub mod shape;
pub mod signal;

pub use arena::{Arena, ArenaId};
pub use binding::{CombBinding, Driver, SyncBinding};
pub use builder::NetlistBuilder;
pub use domain::{Domain, Edge, Reset, ResetKind};
pub use error::NetlistError;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use graph::BindingGraph;
pub use ids::{BindingId, DomainId, SignalId};
pub use netlist::Netlist;
pub use shape::Shape;
pub use signal::SignalDecl;
