//! # Production
//!
//! Resource-limited assembly. Every (station, worker) pair runs its own task
//! that, per cycle, takes one part from the shared [`PartsPool`], two adjacent
//! tools from its station's [`ToolRing`], builds a [`Unit`](crate::model::Unit)
//! and places it on the [`ConveyorBelt`](crate::belt::ConveyorBelt).
//!
//! The only ways to touch the pool and the tools are their acquire methods,
//! which hand out guards; the guards put resources back when dropped.

mod error;
mod parts;
mod station;
mod tools;

pub use error::*;
pub use parts::*;
pub use station::*;
pub use tools::*;
