//! Startup, wiring and shutdown of the two halves of the simulation.
//!
//! - [`FactorySystem`] owns production and distribution: parts pool, stations,
//!   belt, TCP server and event recorder.
//! - [`RetailSystem`] owns the store agents and customers that buy from the
//!   factory over the network.
//! - [`setup_tracing`] initialises logging for the binary.

mod error;
mod factory_system;
mod retail_system;
pub mod tracing;

pub use error::*;
pub use factory_system::*;
pub use retail_system::*;
pub use self::tracing::setup_tracing;
