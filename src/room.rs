use std::collections::BTreeMap;

use log::{debug, info};
use serde_json::Value;

use crate::constants::{
    role_collision_radius, DISTRACTION_LIFETIME_MS, HAZARD_CONTACT_RADIUS, MECHANISM_STEP_SEC,
    ROOM_CAPACITY, RUN_SPEED, TICK_MS, WALK_SPEED,
};
use crate::guard::GuardSystem;
use crate::interactable::InteractableSystem;
use crate::level::{load_level, LevelData};
use crate::movement::validate_position;
use crate::ping_manager::PingManager;
use crate::puzzle::PuzzleSystem;
use crate::types::{
    DistractionKind, EntityBehavior, EntityView, Facing, GuardView, InputState, InteractableView,
    InteractionResult, PingType, PingView, RespawnEvent, RespawnReason, Role, RoomPlayerView,
    RoomStateView, RoomStatus, Snapshot, Vec2, Vec3,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomError {
    NotFound,
    Full,
    RoleTaken,
}

impl RoomError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::NotFound => "room_not_found",
            Self::Full => "room_full",
            Self::RoleTaken => "role_taken",
        }
    }
}

/// Authoritative simulation for one two-player session. All timing is
/// tick-counted; the same inputs at the same ticks replay identically.
pub struct Room {
    pub code: String,
    pub level_id: String,
    level: LevelData,
    status: RoomStatus,
    tick: u64,
    players: BTreeMap<Role, String>,
    entities: BTreeMap<Role, EntityView>,
    inputs: BTreeMap<Role, (InputState, Option<Vec3>)>,
    interactables: InteractableSystem,
    guards: GuardSystem,
    puzzles: PuzzleSystem,
    pings: PingManager,
    checkpoint: Option<(Vec3, Vec3)>,
    pending_respawns: Vec<RespawnEvent>,
}

impl Room {
    pub fn new(code: &str, level_id: &str) -> Self {
        let level = load_level(level_id);
        let interactables = InteractableSystem::from_configs(&level.interactables);
        let guards = GuardSystem::from_configs(&level.guards);
        let puzzles = PuzzleSystem::from_configs(&level.puzzles);
        Self {
            code: code.to_string(),
            level_id: level_id.to_string(),
            level,
            status: RoomStatus::Waiting,
            tick: 0,
            players: BTreeMap::new(),
            entities: BTreeMap::new(),
            inputs: BTreeMap::new(),
            interactables,
            guards,
            puzzles,
            pings: PingManager::new(),
            checkpoint: None,
            pending_respawns: Vec::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.tick * TICK_MS
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn role_of(&self, player_id: &str) -> Option<Role> {
        self.players
            .iter()
            .find(|(_, id)| id.as_str() == player_id)
            .map(|(role, _)| *role)
    }

    /// First joiner gets the dog unless they ask for the panda; the second
    /// joiner gets whatever is left.
    pub fn add_player(
        &mut self,
        player_id: &str,
        preferred: Option<Role>,
    ) -> Result<Role, RoomError> {
        if self.players.len() >= ROOM_CAPACITY {
            return Err(RoomError::Full);
        }
        let role = match preferred {
            Some(role) => {
                if self.players.contains_key(&role) {
                    return Err(RoomError::RoleTaken);
                }
                role
            }
            None => {
                if self.players.contains_key(&Role::Dog) {
                    Role::Panda
                } else {
                    Role::Dog
                }
            }
        };
        self.players.insert(role, player_id.to_string());
        let spawn = self.level.spawn_for(role);
        self.entities.insert(
            role,
            EntityView {
                id: format!("entity_{player_id}"),
                role,
                position: spawn,
                velocity: Vec3::zero(),
                facing: Facing::South,
                state: EntityBehavior::Idle,
            },
        );
        if self.players.len() == ROOM_CAPACITY && self.status == RoomStatus::Waiting {
            self.status = RoomStatus::Ready;
        }
        info!("room {}: player '{player_id}' joined as {role:?}", self.code);
        Ok(role)
    }

    pub fn remove_player(&mut self, player_id: &str) -> Option<Role> {
        let role = self.role_of(player_id)?;
        self.players.remove(&role);
        self.entities.remove(&role);
        self.inputs.remove(&role);
        match self.status {
            RoomStatus::Playing => self.status = RoomStatus::Paused,
            RoomStatus::Ready => self.status = RoomStatus::Waiting,
            _ => {}
        }
        info!("room {}: player '{player_id}' left", self.code);
        Some(role)
    }

    pub fn start_game(&mut self) -> bool {
        if self.status != RoomStatus::Ready {
            return false;
        }
        self.status = RoomStatus::Playing;
        info!("room {}: game started on '{}'", self.code, self.level_id);
        true
    }

    pub fn set_paused(&mut self, paused: bool) -> bool {
        match (self.status, paused) {
            (RoomStatus::Playing, true) => {
                self.status = RoomStatus::Paused;
                true
            }
            (RoomStatus::Paused, false) => {
                self.status = RoomStatus::Playing;
                true
            }
            _ => false,
        }
    }

    /// Stores the latest input for the player. A reported position is kept
    /// as a movement candidate and still passes tile validation on tick.
    pub fn handle_input(&mut self, player_id: &str, input: InputState, position: Option<Vec3>) {
        if let Some(role) = self.role_of(player_id) {
            self.inputs.insert(role, (input, position));
        }
    }

    pub fn handle_interaction(
        &mut self,
        player_id: &str,
        target_id: &str,
        action: &str,
        data: Option<&Value>,
    ) -> InteractionResult {
        let Some(role) = self.role_of(player_id) else {
            return InteractionResult::err("not_in_room");
        };
        if self.status != RoomStatus::Playing {
            return InteractionResult::err("not_playing");
        }
        let Some(actor_pos) = self.entities.get(&role).map(|entity| entity.position) else {
            return InteractionResult::err("not_in_room");
        };
        let effect = self.interactables.apply_interaction(
            role,
            actor_pos,
            target_id,
            action,
            &self.level,
            data,
        );
        if let Some(destination) = effect.teleport_to {
            if let Some(entity) = self.entities.get_mut(&role) {
                entity.position = destination;
                entity.velocity = Vec3::zero();
            }
        }
        if let Some(at) = effect.checkpoint_at {
            self.checkpoint = Some((at, at));
            debug!("room {}: checkpoint set at ({}, {})", self.code, at.x, at.y);
        }
        effect.result
    }

    pub fn add_ping(
        &mut self,
        player_id: &str,
        position: Vec3,
        kind: PingType,
    ) -> Option<PingView> {
        let role = self.role_of(player_id)?;
        let now = self.now_ms();
        self.pings.add(player_id, role, position, kind, now)
    }

    pub fn remove_ping(&mut self, player_id: &str, ping_id: &str) -> bool {
        match self.role_of(player_id) {
            Some(role) => self.pings.remove(ping_id, role),
            None => false,
        }
    }

    pub fn create_distraction(&mut self, position: Vec2, kind: DistractionKind) {
        self.guards
            .add_distraction(position, kind, DISTRACTION_LIFETIME_MS);
    }

    pub fn set_checkpoint(&mut self, dog: Vec3, panda: Vec3) {
        self.checkpoint = Some((dog, panda));
    }

    pub fn drain_pending_respawns(&mut self) -> Vec<RespawnEvent> {
        std::mem::take(&mut self.pending_respawns)
    }

    /// One simulation step. Order is significant: movement feeds plates,
    /// mechanisms move before guards look, hazards and catches resolve
    /// before puzzles are scored.
    pub fn tick(&mut self) {
        if self.status != RoomStatus::Playing {
            return;
        }
        self.tick += 1;
        let now = self.now_ms();

        self.apply_movement();

        let entity_list = self.entity_list();
        self.interactables.tick_pressure_plates(&entity_list);
        self.interactables.tick_winches();
        self.interactables.tick_platforms();
        self.interactables.tick_buttons();
        self.apply_conveyors();
        self.interactables.tick_crates();
        self.interactables.tick_spike_traps();

        let entity_list = self.entity_list();
        self.guards.tick_guards(&self.level, &entity_list);
        self.guards.tick_distractions();

        self.apply_hazard_contacts();

        let entity_list = self.entity_list();
        if self.guards.check_catches(&entity_list) {
            let roles: Vec<Role> = self.entities.keys().copied().collect();
            for role in roles {
                self.respawn(role, RespawnReason::GuardCatch);
            }
        }

        let entity_list = self.entity_list();
        for reward in self.puzzles.evaluate(&self.interactables, &entity_list) {
            self.interactables.unlock_reward(&reward);
        }
        if self.puzzles.all_completed() && self.status == RoomStatus::Playing {
            self.status = RoomStatus::Completed;
            info!("room {}: level '{}' completed", self.code, self.level_id);
        }

        self.pings.prune(now);
    }

    fn entity_list(&self) -> Vec<EntityView> {
        self.entities.values().cloned().collect()
    }

    fn apply_movement(&mut self) {
        let closed = self.interactables.closed_door_cells();
        let roles: Vec<Role> = self.entities.keys().copied().collect();
        for role in roles {
            let (input, reported) = match self.inputs.get_mut(&role) {
                Some(slot) => (slot.0, slot.1.take()),
                None => (InputState::default(), None),
            };
            let Some(entity) = self.entities.get_mut(&role) else {
                continue;
            };
            let dx = (input.right as i32 - input.left as i32) as f32;
            let dy = (input.down as i32 - input.up as i32) as f32;
            let speed = if input.run { RUN_SPEED } else { WALK_SPEED };
            let (vx, vy) = if dx != 0.0 || dy != 0.0 {
                let len = (dx * dx + dy * dy).sqrt();
                (dx / len * speed, dy / len * speed)
            } else {
                (0.0, 0.0)
            };
            let current = entity.position;
            let candidate = reported.unwrap_or(Vec3::new(
                current.x + vx * MECHANISM_STEP_SEC,
                current.y + vy * MECHANISM_STEP_SEC,
                current.z,
            ));
            let validated = validate_position(
                &self.level,
                &closed,
                current,
                candidate,
                role_collision_radius(role),
            );
            entity.velocity = Vec3::new(
                (validated.x - current.x) / MECHANISM_STEP_SEC,
                (validated.y - current.y) / MECHANISM_STEP_SEC,
                0.0,
            );
            entity.position = validated;
            if let Some(facing) = Facing::from_velocity(vx, vy) {
                entity.facing = facing;
            }
            entity.state = if vx == 0.0 && vy == 0.0 {
                EntityBehavior::Idle
            } else if input.run {
                EntityBehavior::Run
            } else {
                EntityBehavior::Walk
            };
        }
    }

    /// Belt displacement goes through the same tile validation as input
    /// movement so a conveyor cannot shove anyone into a wall.
    fn apply_conveyors(&mut self) {
        let mut moved = self.entity_list();
        self.interactables.tick_conveyors(&mut moved);
        let closed = self.interactables.closed_door_cells();
        for dragged in moved {
            if let Some(entity) = self.entities.get_mut(&dragged.role) {
                entity.position = validate_position(
                    &self.level,
                    &closed,
                    entity.position,
                    dragged.position,
                    role_collision_radius(dragged.role),
                );
            }
        }
    }

    fn apply_hazard_contacts(&mut self) {
        let harmful = self.interactables.harmful_positions();
        let hit: Vec<Role> = self
            .entities
            .values()
            .filter(|entity| {
                harmful
                    .iter()
                    .any(|pos| entity.position.planar_distance_to(*pos) < HAZARD_CONTACT_RADIUS)
            })
            .map(|entity| entity.role)
            .collect();
        for role in hit {
            self.respawn(role, RespawnReason::Hazard);
        }
    }

    fn respawn(&mut self, role: Role, reason: RespawnReason) {
        let target = match self.checkpoint {
            Some((dog, panda)) => match role {
                Role::Dog => dog,
                Role::Panda => panda,
            },
            None => self.level.spawn_for(role),
        };
        if let Some(entity) = self.entities.get_mut(&role) {
            entity.position = target;
            entity.velocity = Vec3::zero();
            entity.state = EntityBehavior::Idle;
            self.pending_respawns.push(RespawnEvent {
                entity_id: entity.id.clone(),
                role,
                position: target,
                reason,
            });
        }
    }

    pub fn get_game_state(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            now_ms: self.now_ms(),
            entities: self.entity_list(),
            interactables: self.interactables.views(),
            guards: self.guards.views(),
            pings: self.pings.views(),
            puzzles: self.puzzles.views(),
        }
    }

    pub fn get_room_state(&self) -> RoomStateView {
        RoomStateView {
            room_code: self.code.clone(),
            level_id: self.level_id.clone(),
            status: self.status,
            players: self
                .players
                .iter()
                .map(|(role, id)| RoomPlayerView {
                    id: id.clone(),
                    role: *role,
                })
                .collect(),
            tick: self.tick,
        }
    }

    pub fn get_interactable_states(&self) -> Vec<InteractableView> {
        self.interactables.views()
    }

    pub fn get_guard_states(&self) -> Vec<GuardView> {
        self.guards.views()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PING_TTL_MS;
    use crate::types::AlertState;
    use serde_json::Value;

    fn playing_room() -> Room {
        let mut room = Room::new("TEST01", "training_yard");
        room.add_player("player_dog", None).expect("dog joins");
        room.add_player("player_panda", None).expect("panda joins");
        assert!(room.start_game());
        room
    }

    fn place(room: &mut Room, player_id: &str, x: f32, y: f32) {
        room.handle_input(player_id, InputState::default(), Some(Vec3::new(x, y, 0.0)));
        room.tick();
    }

    fn door_state(room: &Room, id: &str) -> (bool, bool) {
        let view = room
            .get_interactable_states()
            .into_iter()
            .find(|item| item.id == id)
            .expect("door exists");
        let open = view.state.get("open") == Some(&Value::Bool(true));
        let locked = view.state.get("locked") == Some(&Value::Bool(true));
        (open, locked)
    }

    #[test]
    fn join_assigns_dog_then_panda() {
        let mut room = Room::new("TEST01", "training_yard");
        assert_eq!(room.add_player("a", None), Ok(Role::Dog));
        assert_eq!(room.add_player("b", None), Ok(Role::Panda));
        assert_eq!(room.status(), RoomStatus::Ready);
        assert_eq!(room.add_player("c", None), Err(RoomError::Full));
    }

    #[test]
    fn preferred_panda_is_honored_for_first_joiner() {
        let mut room = Room::new("TEST01", "training_yard");
        assert_eq!(room.add_player("a", Some(Role::Panda)), Ok(Role::Panda));
        assert_eq!(
            room.add_player("b", Some(Role::Panda)),
            Err(RoomError::RoleTaken)
        );
        assert_eq!(room.add_player("b", None), Ok(Role::Dog));
    }

    #[test]
    fn game_starts_only_with_two_players() {
        let mut room = Room::new("TEST01", "training_yard");
        room.add_player("a", None).expect("join");
        assert!(!room.start_game());
        room.add_player("b", None).expect("join");
        assert!(room.start_game());
        assert_eq!(room.status(), RoomStatus::Playing);
    }

    #[test]
    fn leaving_mid_game_pauses_the_room() {
        let mut room = playing_room();
        assert_eq!(room.remove_player("player_dog"), Some(Role::Dog));
        assert_eq!(room.status(), RoomStatus::Paused);
    }

    #[test]
    fn paused_room_does_not_advance() {
        let mut room = playing_room();
        room.tick();
        let tick = room.get_room_state().tick;
        assert!(room.set_paused(true));
        room.tick();
        assert_eq!(room.get_room_state().tick, tick);
        assert!(room.set_paused(false));
        room.tick();
        assert_eq!(room.get_room_state().tick, tick + 1);
    }

    #[test]
    fn input_moves_entity_with_wall_clamping() {
        let mut room = playing_room();
        let mut input = InputState::default();
        input.left = true;
        // Dog spawns at x=2.5; walking left hits the border wall and stops.
        for _ in 0..40 {
            room.handle_input("player_dog", input, None);
            room.tick();
        }
        let snapshot = room.get_game_state();
        let dog = snapshot
            .entities
            .iter()
            .find(|entity| entity.role == Role::Dog)
            .expect("dog entity");
        assert!(dog.position.x >= 1.0);
        assert!(dog.position.x < 2.5);
    }

    // Scenario: the light and heavy plates both weighted opens the gate;
    // stepping off closes and re-locks it.
    #[test]
    fn weighted_plates_open_the_gate_and_release_closes_it() {
        let mut room = playing_room();
        room.handle_input(
            "player_dog",
            InputState::default(),
            Some(Vec3::new(4.5, 6.5, 0.0)),
        );
        room.handle_input(
            "player_panda",
            InputState::default(),
            Some(Vec3::new(6.5, 6.5, 0.0)),
        );
        room.tick();
        assert_eq!(door_state(&room, "gate_1"), (true, false));

        place(&mut room, "player_dog", 2.5, 6.5);
        assert_eq!(door_state(&room, "gate_1"), (false, true));
    }

    // Scenario: a momentary button holds its door open for exactly its
    // timer, then the door closes on its own.
    #[test]
    fn timed_button_closes_door_after_expiry() {
        let mut room = playing_room();
        let result = room.handle_interaction("player_dog", "button_1", "press", None);
        assert!(result.success);
        assert_eq!(door_state(&room, "door_2").0, true);

        for _ in 0..99 {
            room.tick();
        }
        assert_eq!(door_state(&room, "door_2").0, true);
        room.tick();
        assert_eq!(door_state(&room, "door_2").0, false);
    }

    // Scenario: the panda shoves the crate one tile away from itself.
    #[test]
    fn panda_pushes_crate_one_tile() {
        let mut room = playing_room();
        place(&mut room, "player_panda", 8.5, 4.5);
        let result = room.handle_interaction("player_panda", "crate_1", "push", None);
        assert!(result.success);
        let crate_view = room
            .get_interactable_states()
            .into_iter()
            .find(|item| item.id == "crate_1")
            .expect("crate exists");
        assert!((crate_view.position.x - 10.5).abs() < 1e-6);

        let denied = room.handle_interaction("player_dog", "crate_1", "push", None);
        assert_eq!(denied.reason.as_deref(), Some("permission_denied"));
    }

    // Scenario: a guard spots the dog, runs it down, and both players are
    // sent back to their spawns.
    #[test]
    fn guard_catch_respawns_both_players() {
        let mut room = playing_room();
        place(&mut room, "player_dog", 9.5, 13.5);
        let mut events = room.drain_pending_respawns();
        for _ in 0..20 {
            room.tick();
            events = room.drain_pending_respawns();
            if !events.is_empty() {
                break;
            }
        }
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| event.reason == RespawnReason::GuardCatch));

        let snapshot = room.get_game_state();
        let dog = snapshot
            .entities
            .iter()
            .find(|entity| entity.role == Role::Dog)
            .expect("dog entity");
        assert!((dog.position.x - 2.5).abs() < 1e-6);
        assert_eq!(snapshot.guards[0].alert_state, AlertState::Returning);
    }

    #[test]
    fn hazard_contact_respawns_at_checkpoint_when_set() {
        let mut room = playing_room();
        let checkpoint = Vec3::new(12.5, 2.5, 0.0);
        room.set_checkpoint(checkpoint, checkpoint);
        place(&mut room, "player_dog", 13.5, 12.5);

        let events = room.drain_pending_respawns();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, RespawnReason::Hazard);
        assert!((events[0].position.x - checkpoint.x).abs() < 1e-6);
    }

    #[test]
    fn checkpoint_interactable_sets_respawn_point() {
        let mut room = playing_room();
        let result = room.handle_interaction("player_dog", "checkpoint_1", "activate", None);
        assert!(result.success);
        place(&mut room, "player_dog", 13.5, 12.5);
        let events = room.drain_pending_respawns();
        assert_eq!(events.len(), 1);
        assert!((events[0].position.x - 12.5).abs() < 1e-6);
    }

    #[test]
    fn teleporter_moves_the_user() {
        let mut room = playing_room();
        place(&mut room, "player_dog", 2.5, 8.5);
        let result = room.handle_interaction("player_dog", "tele_a", "use", None);
        assert!(result.success);
        let snapshot = room.get_game_state();
        let dog = snapshot
            .entities
            .iter()
            .find(|entity| entity.role == Role::Dog)
            .expect("dog entity");
        assert!((dog.position.x - 21.5).abs() < 1e-6);
    }

    // Scenario: pings obey cooldown and expire on schedule.
    #[test]
    fn ping_lifecycle_cooldown_and_expiry() {
        let mut room = playing_room();
        let ping = room
            .add_ping("player_dog", Vec3::new(5.0, 5.0, 0.0), PingType::Danger)
            .expect("first ping placed");
        assert!(room
            .add_ping("player_dog", Vec3::new(6.0, 5.0, 0.0), PingType::Look)
            .is_none());

        assert!(!room.remove_ping("player_panda", &ping.id));
        for _ in 0..(PING_TTL_MS / TICK_MS + 1) {
            room.tick();
        }
        assert!(room.get_game_state().pings.is_empty());
    }

    #[test]
    fn distraction_pulls_guard_to_suspicious() {
        let mut room = playing_room();
        room.create_distraction(Vec2::new(12.5, 13.5), DistractionKind::Whistle);
        room.tick();
        assert_eq!(
            room.get_guard_states()[0].alert_state,
            AlertState::Suspicious
        );
    }

    #[test]
    fn puzzle_completion_unlocks_reward_and_finishes_level() {
        let mut room = playing_room();
        let result = room.handle_interaction("player_dog", "lever_1", "toggle", None);
        assert!(result.success);
        room.handle_input(
            "player_dog",
            InputState::default(),
            Some(Vec3::new(2.5, 2.5, 0.0)),
        );
        room.handle_input(
            "player_panda",
            InputState::default(),
            Some(Vec3::new(3.5, 2.5, 0.0)),
        );
        room.tick();
        assert_eq!(door_state(&room, "door_2").0, true);
        assert_eq!(room.status(), RoomStatus::Completed);
        assert!(room.get_game_state().puzzles[0].completed);
    }

    #[test]
    fn interactions_are_rejected_while_not_playing() {
        let mut room = Room::new("TEST01", "training_yard");
        room.add_player("player_dog", None).expect("join");
        let result = room.handle_interaction("player_dog", "lever_1", "toggle", None);
        assert_eq!(result.reason.as_deref(), Some("not_playing"));
    }

    #[test]
    fn same_inputs_replay_identically() {
        let run = || {
            let mut room = playing_room();
            let mut input = InputState::default();
            input.right = true;
            input.down = true;
            for i in 0..60 {
                room.handle_input("player_dog", input, None);
                if i == 10 {
                    room.handle_interaction("player_dog", "lever_1", "toggle", None);
                }
                if i == 20 {
                    room.add_ping("player_panda", Vec3::new(6.5, 6.5, 0.0), PingType::Help)
                        .expect("ping placed");
                }
                room.tick();
            }
            serde_json::to_string(&room.get_game_state()).unwrap_or_default()
        };
        assert_eq!(run(), run());
    }
}
