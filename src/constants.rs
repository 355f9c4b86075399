use crate::types::{DistractionKind, Role};

pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const WALK_SPEED: f32 = 3.0;
pub const RUN_SPEED: f32 = 5.0;

pub const PLATE_RADIUS: f32 = 0.75;
pub const CRATE_WEIGHT: i32 = 2;
pub const CRATE_OVERLAP_DISTANCE: f32 = 0.9;
pub const CRATE_PUSH_TICKS: u32 = 6;

pub const WINCH_STEP: f32 = 0.02;
pub const MECHANISM_STEP_SEC: f32 = TICK_MS as f32 / 1000.0;

pub const GUARD_LOS_SAMPLES: u32 = 8;
pub const GUARD_ALERT_MS: u64 = 4_000;
pub const GUARD_SUSPICIOUS_MS: u64 = 3_000;
pub const GUARD_SUSPICIOUS_SPEED_MULTIPLIER: f32 = 0.6;
pub const GUARD_ALERT_SPEED_MULTIPLIER: f32 = 1.5;
pub const GUARD_CATCH_RADIUS: f32 = 0.6;
pub const GUARD_WAYPOINT_EPSILON: f32 = 0.15;

pub const HAZARD_CONTACT_RADIUS: f32 = 0.5;

pub const DISTRACTION_LIFETIME_MS: u64 = 4_000;

pub const PING_COOLDOWN_MS: u64 = 2_000;
pub const PING_TTL_MS: u64 = 10_000;
pub const MAX_PINGS_PER_PLAYER: usize = 3;

pub const ROOM_CAPACITY: usize = 2;
pub const ROOM_CODE_LEN: usize = 6;
pub const ROOM_IDLE_TIMEOUT_MS: i64 = 5 * 60 * 1000;

pub fn role_weight(role: Role) -> i32 {
    match role {
        Role::Dog => 1,
        Role::Panda => 2,
    }
}

pub fn role_collision_radius(role: Role) -> f32 {
    match role {
        Role::Dog => 0.3,
        Role::Panda => 0.35,
    }
}

pub fn distraction_hearing_radius(kind: DistractionKind) -> f32 {
    match kind {
        DistractionKind::Whistle => 8.0,
        DistractionKind::Rock => 5.0,
    }
}
