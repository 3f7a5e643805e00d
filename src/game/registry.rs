//! Authoritative player state shared by every connection

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::time::unix_millis;

use super::geometry::{Candidate, Vec3};

/// Full health, also the upper clamp
pub const MAX_HEALTH: i32 = 100;

/// Spawn height above the arena floor
pub const SPAWN_HEIGHT: f64 = 1.0;

/// Player state in the arena (authoritative)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: Uuid,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Rotation in radians
    pub rotation: f64,
    /// Health (0-100)
    pub health: i32,
    /// Unix millis
    pub connected_at: u64,
    /// Unix millis of the last accepted update
    pub last_update: u64,
}

impl PlayerState {
    pub fn spawn(id: Uuid, now: u64) -> Self {
        Self {
            id,
            x: 0.0,
            y: SPAWN_HEIGHT,
            z: 0.0,
            rotation: 0.0,
            health: MAX_HEALTH,
            connected_at: now,
            last_update: now,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Movement fields a client may change; `None` leaves the field as is
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerUpdate {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub rotation: Option<f64>,
}

impl PlayerUpdate {
    fn first_non_finite(&self) -> Option<&'static str> {
        [
            (self.x, "x"),
            (self.y, "y"),
            (self.z, "z"),
            (self.rotation, "rotation"),
        ]
        .into_iter()
        .find_map(|(value, field)| match value {
            Some(v) if !v.is_finite() => Some(field),
            _ => None,
        })
    }
}

/// Result of applying damage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    pub health: i32,
    /// Set only on the hit that takes health from above zero to zero
    pub eliminated: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown player: {0}")]
    UnknownPlayer(Uuid),

    #[error("Invalid update: {field} is not a finite number")]
    InvalidUpdate { field: &'static str },
}

/// Store of every player in the arena.
///
/// Writers take the lock exclusively, so two mutations never interleave on the
/// same record. Readers may overlap with each other.
#[derive(Debug, Default)]
pub struct StateRegistry {
    players: RwLock<HashMap<Uuid, PlayerState>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player at the spawn point, replacing any previous record for `id`
    pub fn register(&self, id: Uuid) -> PlayerState {
        let player = PlayerState::spawn(id, unix_millis());
        self.players.write().insert(id, player.clone());
        player
    }

    /// Merge the provided fields and refresh `last_update`
    pub fn update(&self, id: Uuid, update: PlayerUpdate) -> Result<PlayerState, RegistryError> {
        if let Some(field) = update.first_non_finite() {
            return Err(RegistryError::InvalidUpdate { field });
        }

        let mut players = self.players.write();
        let player = players
            .get_mut(&id)
            .ok_or(RegistryError::UnknownPlayer(id))?;

        if let Some(x) = update.x {
            player.x = x;
        }
        if let Some(y) = update.y {
            player.y = y;
        }
        if let Some(z) = update.z {
            player.z = z;
        }
        if let Some(rotation) = update.rotation {
            player.rotation = rotation;
        }
        player.last_update = unix_millis().max(player.last_update);

        Ok(player.clone())
    }

    /// Subtract `amount` from health, clamped to 0..=100
    pub fn apply_damage(&self, id: Uuid, amount: i32) -> Result<DamageOutcome, RegistryError> {
        let mut players = self.players.write();
        let player = players
            .get_mut(&id)
            .ok_or(RegistryError::UnknownPlayer(id))?;

        let prior = player.health;
        player.health = prior.saturating_sub(amount).clamp(0, MAX_HEALTH);

        Ok(DamageOutcome {
            health: player.health,
            eliminated: player.health == 0 && prior > 0,
        })
    }

    pub fn remove(&self, id: Uuid) -> Option<PlayerState> {
        self.players.write().remove(&id)
    }

    /// Remove every player whose last update is more than `max_age_ms` before `now`.
    ///
    /// Returned ids are sorted.
    pub fn remove_stale(&self, now: u64, max_age_ms: u64) -> Vec<Uuid> {
        let mut players = self.players.write();
        let mut stale: Vec<Uuid> = players
            .values()
            .filter(|p| now.saturating_sub(p.last_update) > max_age_ms)
            .map(|p| p.id)
            .collect();
        stale.sort();

        for id in &stale {
            players.remove(id);
        }
        stale
    }

    pub fn get(&self, id: Uuid) -> Option<PlayerState> {
        self.players.read().get(&id).cloned()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.players.read().contains_key(&id)
    }

    /// Point-in-time copy of every player
    pub fn snapshot(&self) -> HashMap<Uuid, PlayerState> {
        self.players.read().clone()
    }

    /// Visit every player except `id` under a single read lock
    pub fn for_each_except(&self, id: Uuid, mut f: impl FnMut(&PlayerState)) {
        let players = self.players.read();
        for player in players.values().filter(|p| p.id != id) {
            f(player);
        }
    }

    /// Hit-scan candidates for a shot fired by `shooter`
    pub fn candidates_except(&self, shooter: Uuid) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        self.for_each_except(shooter, |p| {
            candidates.push(Candidate {
                id: p.id,
                position: p.position(),
            })
        });
        candidates
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }
}
