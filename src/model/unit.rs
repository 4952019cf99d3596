//! The [`Unit`] entity: one manufactured vehicle.
//!
//! A `Unit` is created by an [`AssemblyStation`](crate::production::AssemblyStation),
//! queued on the [`ConveyorBelt`](crate::belt::ConveyorBelt), handed to a store by the
//! [`DistributionServer`](crate::distribution::DistributionServer) and finally
//! serialized across the wire to the requesting store.
//!
//! Every field is fixed at construction except `destination`, which is written
//! once when a store takes ownership (see [`Unit::assign_destination`]).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::UnitError;

/// Process-unique identifier of a unit.
pub type UnitId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    pub const ALL: [Color; 3] = [Color::Red, Color::Green, Color::Blue];

    /// Picks a color uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Blue => "Blue",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "SUV")]
    Suv,
    #[serde(rename = "SEDAN")]
    Sedan,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::Suv, Kind::Sedan];

    /// Picks a body kind uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Suv => f.write_str("SUV"),
            Kind::Sedan => f.write_str("SEDAN"),
        }
    }
}

/// Hands out unit ids from a shared atomic counter.
///
/// Clones share the same counter, so every station can hold its own handle
/// while ids stay unique across the process.
#[derive(Debug, Clone)]
pub struct UnitIdIssuer {
    next: Arc<AtomicU64>,
}

impl UnitIdIssuer {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: UnitId) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn next_id(&self) -> UnitId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for UnitIdIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    id: UnitId,
    color: Color,
    kind: Kind,
    station_id: usize,
    worker_id: usize,
    belt_position: usize,
    destination: Option<String>,
}

impl Unit {
    /// Assembles a new unit with a random color and kind.
    ///
    /// # Arguments
    /// * `ids` - Shared id issuer; the id is taken atomically
    /// * `station_id` / `worker_id` - The producing station and worker
    /// * `belt_position` - Belt occupancy observed just before insertion. This is
    ///   a snapshot for telemetry, not a slot index.
    pub fn assemble(
        ids: &UnitIdIssuer,
        station_id: usize,
        worker_id: usize,
        belt_position: usize,
    ) -> Self {
        let mut rng = rand::thread_rng();
        Self::assemble_with(&mut rng, ids, station_id, worker_id, belt_position)
    }

    /// Same as [`Unit::assemble`] with a caller-provided random source.
    pub fn assemble_with<R: Rng + ?Sized>(
        rng: &mut R,
        ids: &UnitIdIssuer,
        station_id: usize,
        worker_id: usize,
        belt_position: usize,
    ) -> Self {
        Self {
            id: ids.next_id(),
            color: Color::random(rng),
            kind: Kind::random(rng),
            station_id,
            worker_id,
            belt_position,
            destination: None,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn station_id(&self) -> usize {
        self.station_id
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn belt_position(&self) -> usize {
        self.belt_position
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Tags the unit with the store that took ownership of it.
    ///
    /// # Errors
    /// Fails if a destination was already assigned.
    pub fn assign_destination(&mut self, store: impl Into<String>) -> Result<(), UnitError> {
        if let Some(current) = &self.destination {
            return Err(UnitError::DestinationAlreadySet {
                id: self.id,
                current: current.clone(),
            });
        }
        self.destination = Some(store.into());
        Ok(())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unit #{} [{} {}, station {}, worker {}, belt position {}",
            self.id, self.color, self.kind, self.station_id, self.worker_id, self.belt_position
        )?;
        match &self.destination {
            Some(store) => write!(f, ", destination {}]", store),
            None => f.write_str("]"),
        }
    }
}
