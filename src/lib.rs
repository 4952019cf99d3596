#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Vehicle Factory
//!
//! > **A concurrent production line with a network sale counter.**
//!
//! Assembly stations build vehicles out of a bounded stock of parts, using
//! tools shared in a ring between neighbouring workers. Finished units go on a
//! bounded conveyor belt. Remote stores pull units off the belt over TCP and
//! sell them to customers.
//!
//! ## 🏗️ Concurrency Model
//!
//! Every worker, every accepted connection, every store and every customer is
//! its own Tokio task. All blocking is an `.await` on a Tokio primitive:
//!
//! - **Parts** are permits of one semaphore ([`PartsPool`](production::PartsPool)).
//! - **Tools** are one-permit semaphores in a ring ([`ToolRing`](production::ToolRing)).
//!   Workers take the lower-indexed tool first, which rules out the circular
//!   wait of the dining philosophers.
//! - **The belt** is a FIFO guarded by two counting semaphores, free slots
//!   and queued units ([`ConveyorBelt`](belt::ConveyorBelt)).
//!
//! Every wait also watches a
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Resources are
//! held through RAII guards, so a cancelled worker puts its tools and part
//! back on the way out.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Line ([`model`], [`production`], [`belt`])
//! - [`Unit`](model::Unit): the vehicle, with process-unique ids from
//!   [`UnitIdIssuer`](model::UnitIdIssuer).
//! - [`AssemblyStation`](production::AssemblyStation): the worker loop
//!   (part, tools, build, belt).
//!
//! ### 2. The Counter ([`distribution`])
//! - [`DistributionServer`](distribution::DistributionServer): one task per
//!   connection, one request and one reply per connection.
//! - [`protocol`](distribution::protocol): length-prefixed JSON frames.
//!
//! ### 3. The Buyers ([`store`])
//! - [`FactoryClient`](store::FactoryClient),
//!   [`StoreAgent`](store::StoreAgent), [`Customer`](store::Customer).
//!
//! ### 4. The Orchestrator ([`lifecycle`], [`config`], [`events`])
//! - [`FactorySystem`](lifecycle::FactorySystem) and
//!   [`RetailSystem`](lifecycle::RetailSystem) start and stop everything.
//! - [`EventRecorder`](events::EventRecorder) appends the production, sales
//!   and purchase logs.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Stock simulation on 127.0.0.1:5000
//! cargo run
//!
//! # Custom settings
//! cargo run -- factory.toml
//! FACTORY_CONFIG=factory.toml cargo run
//! ```

pub mod belt;
pub mod config;
pub mod distribution;
pub mod events;
pub mod lifecycle;
pub mod model;
pub mod production;
pub mod store;
