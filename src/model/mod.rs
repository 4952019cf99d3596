//! Pure data structures flowing from the assembly stations to the stores.

pub mod error;
pub mod unit;

pub use error::*;
pub use unit::*;
