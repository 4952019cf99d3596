mod agent;
mod client;
mod customer;
mod error;

pub use agent::*;
pub use client::*;
pub use customer::*;
pub use error::*;
