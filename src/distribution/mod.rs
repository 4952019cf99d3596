//! # Distribution
//!
//! Hands units from the belt to remote stores over TCP.
//!
//! - [`protocol`]: versioned, length-prefixed JSON messages.
//! - [`DistributionServer`]: accept loop with one task per connection.
//!
//! A request for a unit blocks on the belt until one is produced, so a store
//! asking an empty factory simply waits for its reply.

mod error;
pub mod protocol;
mod server;

pub use error::*;
pub use protocol::{ErrorCode, Request, Response, PROTOCOL_VERSION};
pub use server::*;
