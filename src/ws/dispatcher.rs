//! Per-connection command routing
//!
//! One [`EventDispatcher`] exists per connection. It applies that connection's
//! commands in arrival order and queues the resulting messages on the hub.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::combat::{CombatError, CombatResolver};
use crate::game::registry::{PlayerUpdate, RegistryError, StateRegistry};
use crate::game::snapshot::players_wire;
use crate::util::time::unix_secs_f64;
use crate::ws::hub::ConnectionHub;
use crate::ws::protocol::{
    Command, PlayerWire, PositionWire, ProtocolError, RayData, ServerMsg, ShotRequest,
};

const WELCOME: &str = "Welcome to the arena!";

/// Connection lifecycle; `Disconnected` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connected,
    Disconnected,
}

pub struct EventDispatcher {
    player_id: Uuid,
    phase: SessionPhase,
    registry: Arc<StateRegistry>,
    combat: CombatResolver,
    hub: Arc<ConnectionHub>,
}

impl EventDispatcher {
    /// Register the player, greet it and announce it to everyone else.
    ///
    /// The connection must already be attached to `hub`.
    pub fn connect(
        player_id: Uuid,
        registry: Arc<StateRegistry>,
        combat: CombatResolver,
        hub: Arc<ConnectionHub>,
    ) -> Self {
        let player = registry.register(player_id);
        let total_players = registry.len();
        info!(player_id = %player_id, total_players, "Player connected");

        hub.send_to(
            player_id,
            ServerMsg::GameState {
                players: players_wire(&registry.snapshot()),
                player_id,
                message: Some(WELCOME.to_string()),
                timestamp: None,
            },
        );
        hub.broadcast_except(
            player_id,
            &ServerMsg::PlayerJoined {
                player: PlayerWire::from(&player),
                total_players,
            },
        );

        Self {
            player_id,
            phase: SessionPhase::Connected,
            registry,
            combat,
            hub,
        }
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    #[cfg(test)]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Parse a text frame and handle it; parse errors go back to the sender
    pub fn handle_text(&mut self, text: &str) {
        if self.phase == SessionPhase::Disconnected {
            return;
        }
        match Command::parse(text) {
            Ok(command) => self.handle(command),
            Err(e) => self.reject(&e),
        }
    }

    pub fn handle(&mut self, command: Command) {
        if self.phase == SessionPhase::Disconnected {
            debug!(player_id = %self.player_id, "Command after disconnect ignored");
            return;
        }

        match command {
            Command::Move(update) => self.handle_move(update),
            Command::Action {
                action_type,
                action_data,
            } => {
                if !self.registry.contains(self.player_id) {
                    return;
                }
                debug!(player_id = %self.player_id, action = %action_type, "Player action");
                self.hub.broadcast_except(
                    self.player_id,
                    &ServerMsg::PlayerAction {
                        player_id: self.player_id,
                        action_type,
                        action_data,
                        timestamp: unix_secs_f64(),
                    },
                );
            }
            Command::Shoot(shot) => self.handle_shoot(shot),
            Command::RequestGameState => {
                self.hub.send_to(
                    self.player_id,
                    ServerMsg::GameState {
                        players: players_wire(&self.registry.snapshot()),
                        player_id: self.player_id,
                        message: None,
                        timestamp: Some(unix_secs_f64()),
                    },
                );
            }
            Command::Ping => {
                self.hub.send_to(
                    self.player_id,
                    ServerMsg::Pong {
                        timestamp: unix_secs_f64(),
                    },
                );
            }
        }
    }

    /// Remove the player and tell everyone still connected. Idempotent.
    pub fn disconnect(&mut self) {
        if self.phase == SessionPhase::Disconnected {
            return;
        }
        self.phase = SessionPhase::Disconnected;
        self.hub.detach(self.player_id);

        // Already gone if the sweeper evicted this player
        if self.registry.remove(self.player_id).is_some() {
            let total_players = self.registry.len();
            info!(player_id = %self.player_id, total_players, "Player disconnected");
            self.hub.broadcast(&ServerMsg::PlayerLeft {
                player_id: self.player_id,
                total_players,
            });
        }
    }

    fn handle_move(&mut self, update: PlayerUpdate) {
        match self.registry.update(self.player_id, update) {
            Ok(player) => {
                self.hub.broadcast_except(
                    self.player_id,
                    &ServerMsg::PlayerMoved {
                        player_id: self.player_id,
                        position: PositionWire::from(&player),
                    },
                );
            }
            Err(RegistryError::UnknownPlayer(_)) => {
                debug!(player_id = %self.player_id, "Move for player not in arena");
            }
            Err(e @ RegistryError::InvalidUpdate { .. }) => {
                warn!(player_id = %self.player_id, error = %e, "Rejected movement");
                self.reject(&ProtocolError::InvalidPayload("Invalid movement data"));
            }
        }
    }

    fn handle_shoot(&mut self, shot: ShotRequest) {
        let Some(shooter) = self.registry.get(self.player_id) else {
            return;
        };

        let outcome = match self
            .combat
            .resolve_shot(self.player_id, shot.origin, shot.direction)
        {
            Ok(outcome) => outcome,
            Err(CombatError::UnknownShooter(_)) => return,
        };

        debug!(
            player_id = %self.player_id,
            hit = outcome.hit.hit,
            target_id = ?outcome.hit.target_id,
            "Shot resolved"
        );

        self.hub.broadcast(&ServerMsg::PlayerShot {
            player_id: self.player_id,
            ray_data: RayData {
                origin: shot.origin,
                direction: shot.direction,
                player_position: shot.player_position.or(shooter.position()),
            },
            hit_data: outcome.hit.clone(),
            timestamp: unix_secs_f64(),
        });

        // A target that left before damage landed gets no follow-up messages
        let (Some(target_id), Some(damage), Some(hit_position)) =
            (outcome.hit.target_id, outcome.damage, outcome.hit.hit_position)
        else {
            return;
        };

        self.hub.send_to(
            self.player_id,
            ServerMsg::ShotHit {
                target_id,
                hit_position,
                damage: outcome.hit.damage,
            },
        );
        self.hub.broadcast(&ServerMsg::PlayerHealthUpdate {
            player_id: target_id,
            health: damage.health,
        });
        if let Some(eliminated) = outcome.eliminated() {
            self.hub.broadcast(&ServerMsg::PlayerEliminated {
                player_id: eliminated,
                eliminated_by: self.player_id,
            });
        }
    }

    fn reject(&self, error: &ProtocolError) {
        warn!(player_id = %self.player_id, error = %error, "Rejected client message");
        self.hub.send_to(
            self.player_id,
            ServerMsg::Error {
                message: error.client_message(),
            },
        );
    }
}
