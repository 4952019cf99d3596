//! # Event Record
//!
//! The append-only record of what happened to every unit: produced, sold,
//! undeliverable, purchased.
//!
//! Producers hold a cheap [`EventLog`] handle and call [`EventLog::record`],
//! which never waits: if the recorder is behind or gone, the event is dropped
//! and counted. A single [`EventRecorder`] task drains the channel into an
//! [`EventSink`].
//!
//! ```text
//! station ─┐
//! server  ─┼─ EventLog::record ──mpsc──▶ EventRecorder ──▶ EventSink (files / memory)
//! store   ─┘
//! ```

mod recorder;
mod sink;

pub use recorder::*;
pub use sink::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::Unit;

/// Something worth recording about a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FactoryEvent {
    /// A station placed a unit on the belt.
    Produced { unit: Unit },
    /// The factory handed a unit to a store.
    Sold {
        unit: Unit,
        store_name: String,
        store_belt_position: u32,
    },
    /// A unit left the belt but never reached the store.
    Undeliverable {
        unit: Unit,
        store_name: String,
        reason: String,
    },
    /// A customer bought a unit from a store.
    Purchased {
        customer_id: u32,
        store_name: String,
        unit: Unit,
    },
}

/// Which log an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    Production,
    Sales,
    Purchases,
}

impl EventChannel {
    /// File name used by [`FileSink`].
    pub fn file_name(self) -> &'static str {
        match self {
            EventChannel::Production => "factory_production.log",
            EventChannel::Sales => "factory_sales.log",
            EventChannel::Purchases => "store_purchases.log",
        }
    }
}

impl FactoryEvent {
    pub fn channel(&self) -> EventChannel {
        match self {
            FactoryEvent::Produced { .. } => EventChannel::Production,
            FactoryEvent::Sold { .. } | FactoryEvent::Undeliverable { .. } => EventChannel::Sales,
            FactoryEvent::Purchased { .. } => EventChannel::Purchases,
        }
    }

    pub fn unit(&self) -> &Unit {
        match self {
            FactoryEvent::Produced { unit }
            | FactoryEvent::Sold { unit, .. }
            | FactoryEvent::Undeliverable { unit, .. }
            | FactoryEvent::Purchased { unit, .. } => unit,
        }
    }
}

impl fmt::Display for FactoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryEvent::Produced { unit } => write!(f, "Produced {}", unit),
            FactoryEvent::Sold {
                unit,
                store_name,
                store_belt_position,
            } => write!(
                f,
                "Sold {} to {} (store belt position {})",
                unit, store_name, store_belt_position
            ),
            FactoryEvent::Undeliverable {
                unit,
                store_name,
                reason,
            } => write!(f, "Undeliverable {} for {}: {}", unit, store_name, reason),
            FactoryEvent::Purchased {
                customer_id,
                store_name,
                unit,
            } => write!(f, "Customer {} bought {} from {}", customer_id, unit, store_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnitIdIssuer;

    #[test]
    fn events_route_to_their_log() {
        let ids = UnitIdIssuer::new();
        let unit = Unit::assemble(&ids, 0, 0, 0);

        let produced = FactoryEvent::Produced { unit: unit.clone() };
        let undeliverable = FactoryEvent::Undeliverable {
            unit: unit.clone(),
            store_name: "Store A".into(),
            reason: "connection reset".into(),
        };
        let purchased = FactoryEvent::Purchased {
            customer_id: 3,
            store_name: "Store A".into(),
            unit,
        };

        assert_eq!(produced.channel(), EventChannel::Production);
        assert_eq!(undeliverable.channel(), EventChannel::Sales);
        assert_eq!(purchased.channel(), EventChannel::Purchases);
    }

    #[test]
    fn serialized_events_are_tagged() {
        let ids = UnitIdIssuer::new();
        let event = FactoryEvent::Sold {
            unit: Unit::assemble(&ids, 1, 2, 3),
            store_name: "Store B".into(),
            store_belt_position: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sold");
        assert_eq!(json["store_belt_position"], 4);
        assert_eq!(json["unit"]["station_id"], 1);
    }
}
