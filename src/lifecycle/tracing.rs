//! # Logging
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter that
//! hides module paths. Log lines carry structured fields instead:
//! `station`, `worker`, `unit_id`, `store`, `peer`.
//!
//! The filter comes from `RUST_LOG` and falls back to `info`:
//!
//! ```bash
//! # Lifecycle, units produced and sold
//! cargo run
//!
//! # Tool and part hand-offs, connection details
//! RUST_LOG=debug cargo run
//!
//! # Only the network side
//! RUST_LOG=vehicle_factory::distribution=debug cargo run
//! ```
//!
//! With the default filter a healthy run looks like:
//!
//! ```text
//! INFO Factory started addr=127.0.0.1:5000 stations=4 workers=20
//! INFO Produced station=2 worker=3 unit=Unit #1 [Red SUV, station 2, worker 3, belt position 0]
//! INFO Vehicle requested peer=127.0.0.1:53312 store=Store A store_belt_position=0
//! INFO Vehicle sent peer=127.0.0.1:53312 store=Store A unit_id=1
//! INFO Bought customer=4 store=Store A unit=Unit #1 [...]
//! ```
//!
//! The event record (production, sales and purchase logs) is separate from
//! these operational logs; see [`crate::events`].

use tracing_subscriber::EnvFilter;

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
