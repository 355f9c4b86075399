use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Dog,
    Panda,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dog" => Some(Self::Dog),
            "panda" => Some(Self::Panda),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Dog => Self::Panda,
            Self::Panda => Self::Dog,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Facing {
    /// 8-way compass facing from a velocity vector; `None` when not moving.
    pub fn from_velocity(vx: f32, vy: f32) -> Option<Self> {
        if vx == 0.0 && vy == 0.0 {
            return None;
        }
        let east = vx > 0.0;
        let west = vx < 0.0;
        let south = vy > 0.0;
        let north = vy < 0.0;
        Some(match (north, south, east, west) {
            (true, _, false, false) => Self::North,
            (true, _, true, _) => Self::NorthEast,
            (true, _, _, true) => Self::NorthWest,
            (_, true, false, false) => Self::South,
            (_, true, true, _) => Self::SouthEast,
            (_, true, _, true) => Self::SouthWest,
            (_, _, true, _) => Self::East,
            _ => Self::West,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityBehavior {
    Idle,
    Walk,
    Run,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn planar(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Distance ignoring elevation.
    pub fn planar_distance_to(self, other: Vec3) -> f32 {
        self.planar().distance_to(other.planar())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EntityView {
    pub id: String,
    pub role: Role,
    pub position: Vec3,
    pub velocity: Vec3,
    pub facing: Facing,
    pub state: EntityBehavior,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Idle,
    Suspicious,
    Alert,
    Returning,
}

#[derive(Clone, Debug, Serialize)]
pub struct GuardView {
    pub id: String,
    pub position: Vec2,
    #[serde(rename = "facingDeg")]
    pub facing_deg: f32,
    #[serde(rename = "alertState")]
    pub alert_state: AlertState,
    #[serde(rename = "patrolIndex")]
    pub patrol_index: usize,
    #[serde(rename = "lastSeenPlayerPos")]
    pub last_seen_player_pos: Option<Vec2>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractableKind {
    Door,
    Lever,
    PressurePlate,
    Crate,
    Winch,
    CameraNode,
    Platform,
    Button,
    Hazard,
    Conveyor,
    Mirror,
    Teleporter,
    Checkpoint,
    SpikeTrap,
}

#[derive(Clone, Debug, Serialize)]
pub struct InteractableView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InteractableKind,
    pub position: Vec3,
    pub state: Value,
    #[serde(rename = "linkedIds")]
    pub linked_ids: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PingType {
    Look,
    Danger,
    Help,
    Wait,
}

impl PingType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "look" => Some(Self::Look),
            "danger" => Some(Self::Danger),
            "help" => Some(Self::Help),
            "wait" => Some(Self::Wait),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PingView {
    pub id: String,
    pub position: Vec3,
    pub kind: PingType,
    #[serde(rename = "createdBy")]
    pub created_by: Role,
    #[serde(rename = "createdAtMs")]
    pub created_at_ms: u64,
    #[serde(rename = "expiresAtMs")]
    pub expires_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistractionKind {
    Whistle,
    Rock,
}

impl DistractionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "whistle" => Some(Self::Whistle),
            "rock" => Some(Self::Rock),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RespawnReason {
    Hazard,
    GuardCatch,
}

#[derive(Clone, Debug, Serialize)]
pub struct RespawnEvent {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub role: Role,
    pub position: Vec3,
    pub reason: RespawnReason,
}

#[derive(Clone, Debug, Serialize)]
pub struct PuzzleStateView {
    pub id: String,
    pub completed: bool,
    pub objectives: BTreeMap<String, bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub run: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct InteractionResult {
    pub success: bool,
    #[serde(rename = "newState")]
    pub new_state: Option<Value>,
    pub reason: Option<String>,
}

impl InteractionResult {
    pub fn ok(new_state: Value) -> Self {
        Self {
            success: true,
            new_state: Some(new_state),
            reason: None,
        }
    }

    pub fn err(reason: &str) -> Self {
        Self {
            success: false,
            new_state: None,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Ready,
    Playing,
    Paused,
    Completed,
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    pub entities: Vec<EntityView>,
    pub interactables: Vec<InteractableView>,
    pub guards: Vec<GuardView>,
    pub pings: Vec<PingView>,
    pub puzzles: Vec<PuzzleStateView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomPlayerView {
    pub id: String,
    pub role: Role,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomStateView {
    #[serde(rename = "roomCode")]
    pub room_code: String,
    #[serde(rename = "levelId")]
    pub level_id: String,
    pub status: RoomStatus,
    pub players: Vec<RoomPlayerView>,
    pub tick: u64,
}
