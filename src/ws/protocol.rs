//! WebSocket protocol message definitions
//! These are the wire types for client-server communication
//!
//! Every frame is a JSON envelope `{"event": "<name>", "data": {...}}`.
//! Inbound payloads are validated into [`Command`] before anything touches
//! shared state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::game::geometry::{HitResult, Vec3};
use crate::game::registry::PlayerUpdate;

/// Raw inbound frame
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Validated message from a client
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Position/rotation update
    Move(PlayerUpdate),
    /// Opaque action relayed to the other players
    Action {
        action_type: Value,
        action_data: Value,
    },
    /// Hitscan shot
    Shoot(ShotRequest),
    /// Ask for the full arena state
    RequestGameState,
    /// Latency probe
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotRequest {
    pub origin: Vec3,
    /// As sent by the client, not normalized
    pub direction: Vec3,
    pub player_position: PartialPosition,
}

/// Position where each axis may be missing
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialPosition {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl PartialPosition {
    /// Fill missing axes from `fallback`
    pub fn or(self, fallback: Vec3) -> Vec3 {
        Vec3::new(
            self.x.unwrap_or(fallback.x),
            self.y.unwrap_or(fallback.y),
            self.z.unwrap_or(fallback.z),
        )
    }
}

/// Protocol errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("{0}")]
    InvalidPayload(&'static str),
}

impl ProtocolError {
    /// Text sent back to the client in an `error` message
    pub fn client_message(&self) -> String {
        match self {
            Self::Malformed(_) => "Malformed message".to_string(),
            Self::UnknownEvent(event) => format!("Unknown event: {event}"),
            Self::InvalidPayload(message) => (*message).to_string(),
        }
    }
}

const INVALID_MOVE: &str = "Invalid movement data";
const INVALID_ACTION: &str = "Invalid action data";
const INVALID_SHOOT: &str = "Invalid shoot data";

impl Command {
    /// Parse and validate a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        match envelope.event.as_str() {
            "player_move" => {
                let data = as_object(&envelope.data, INVALID_MOVE)?;
                Ok(Self::Move(PlayerUpdate {
                    x: optional_number(data, "x", INVALID_MOVE)?,
                    y: optional_number(data, "y", INVALID_MOVE)?,
                    z: optional_number(data, "z", INVALID_MOVE)?,
                    rotation: optional_number(data, "rotation", INVALID_MOVE)?,
                }))
            }
            "player_action" => {
                let data = as_object(&envelope.data, INVALID_ACTION)?;
                let action_type = match data.get("type") {
                    Some(Value::Null) | None => {
                        return Err(ProtocolError::InvalidPayload(INVALID_ACTION))
                    }
                    Some(value) => value.clone(),
                };
                let action_data = match data.get("data") {
                    Some(Value::Null) | None => Value::Object(Map::new()),
                    Some(value) => value.clone(),
                };
                Ok(Self::Action {
                    action_type,
                    action_data,
                })
            }
            "shoot" => {
                let data = as_object(&envelope.data, INVALID_SHOOT)?;
                let origin = required_vec3(data.get("origin"))?;
                let direction = required_vec3(data.get("direction"))?;
                let player_position = match data.get("player_position") {
                    Some(Value::Null) | None => PartialPosition::default(),
                    Some(value) => {
                        let position = as_object(value, INVALID_SHOOT)?;
                        PartialPosition {
                            x: optional_number(position, "x", INVALID_SHOOT)?,
                            y: optional_number(position, "y", INVALID_SHOOT)?,
                            z: optional_number(position, "z", INVALID_SHOOT)?,
                        }
                    }
                };
                Ok(Self::Shoot(ShotRequest {
                    origin,
                    direction,
                    player_position,
                }))
            }
            "request_game_state" => Ok(Self::RequestGameState),
            "ping" => Ok(Self::Ping),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn as_object<'a>(
    value: &'a Value,
    error: &'static str,
) -> Result<&'a Map<String, Value>, ProtocolError> {
    value.as_object().ok_or(ProtocolError::InvalidPayload(error))
}

/// Accept JSON numbers and numeric strings
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn optional_number(
    data: &Map<String, Value>,
    key: &str,
    error: &'static str,
) -> Result<Option<f64>, ProtocolError> {
    match data.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => coerce_number(value)
            .map(Some)
            .ok_or(ProtocolError::InvalidPayload(error)),
    }
}

fn required_vec3(value: Option<&Value>) -> Result<Vec3, ProtocolError> {
    let object = value
        .and_then(Value::as_object)
        .ok_or(ProtocolError::InvalidPayload(INVALID_SHOOT))?;
    let axis = |key: &str| {
        object
            .get(key)
            .and_then(coerce_number)
            .ok_or(ProtocolError::InvalidPayload(INVALID_SHOOT))
    };
    Ok(Vec3::new(axis("x")?, axis("y")?, axis("z")?))
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Full arena state, on connect and on request
    GameState {
        players: HashMap<Uuid, PlayerWire>,
        player_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    PlayerJoined {
        player: PlayerWire,
        total_players: usize,
    },

    PlayerLeft {
        player_id: Uuid,
        total_players: usize,
    },

    PlayerMoved {
        player_id: Uuid,
        position: PositionWire,
    },

    PlayerAction {
        player_id: Uuid,
        action_type: Value,
        action_data: Value,
        timestamp: f64,
    },

    /// A shot and its outcome, sent to everyone
    PlayerShot {
        player_id: Uuid,
        ray_data: RayData,
        hit_data: HitResult,
        timestamp: f64,
    },

    /// Hit confirmation, shooter only
    ShotHit {
        target_id: Uuid,
        hit_position: Vec3,
        damage: i32,
    },

    PlayerHealthUpdate {
        player_id: Uuid,
        health: i32,
    },

    PlayerEliminated {
        player_id: Uuid,
        eliminated_by: Uuid,
    },

    /// Stale players removed by the sweeper
    PlayersCleaned {
        disconnected_players: Vec<Uuid>,
        total_players: usize,
    },

    Pong {
        timestamp: f64,
    },

    Error {
        message: String,
    },
}

/// Player record on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerWire {
    pub id: Uuid,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotation: f64,
    pub health: i32,
    /// Unix seconds
    pub connected_at: f64,
    /// Unix seconds
    pub last_update: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionWire {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotation: f64,
}

/// Echo of a validated shot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayData {
    pub origin: Vec3,
    pub direction: Vec3,
    pub player_position: Vec3,
}
