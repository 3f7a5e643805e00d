//! Snapshot building for network transmission

use std::collections::HashMap;

use uuid::Uuid;

use crate::util::time::millis_to_secs;
use crate::ws::protocol::{PlayerWire, PositionWire};

use super::PlayerState;

impl From<&PlayerState> for PlayerWire {
    fn from(p: &PlayerState) -> Self {
        Self {
            id: p.id,
            x: p.x,
            y: p.y,
            z: p.z,
            rotation: p.rotation,
            health: p.health,
            connected_at: millis_to_secs(p.connected_at),
            last_update: millis_to_secs(p.last_update),
        }
    }
}

impl From<&PlayerState> for PositionWire {
    fn from(p: &PlayerState) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            rotation: p.rotation,
        }
    }
}

/// Convert a registry snapshot to its wire form
pub fn players_wire(players: &HashMap<Uuid, PlayerState>) -> HashMap<Uuid, PlayerWire> {
    players
        .iter()
        .map(|(id, player)| (*id, PlayerWire::from(player)))
        .collect()
}
