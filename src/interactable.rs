use std::collections::HashMap;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{
    CRATE_OVERLAP_DISTANCE, CRATE_PUSH_TICKS, CRATE_WEIGHT, MECHANISM_STEP_SEC, PLATE_RADIUS,
    TICK_MS, WINCH_STEP,
};
use crate::level::{InteractableConfig, LevelData};
use crate::types::{
    EntityView, InteractableKind, InteractableView, InteractionResult, Role, Vec2, Vec3,
};

/// One variant per interactable type tag. The wire form is the flat
/// key/value record clients expect, so the enum serializes untagged.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum InteractableState {
    Door {
        open: bool,
        locked: bool,
    },
    Lever {
        on: bool,
    },
    Button {
        pressed: bool,
        momentary: bool,
        #[serde(rename = "timerDuration")]
        timer_duration_ms: u64,
        #[serde(rename = "timerRemaining")]
        timer_remaining_ms: u64,
    },
    PressurePlate {
        activated: bool,
        #[serde(rename = "requiredWeight")]
        required_weight: i32,
        #[serde(rename = "totalWeight")]
        total_weight: i32,
    },
    Crate {
        #[serde(rename = "beingPushed")]
        being_pushed: bool,
        #[serde(skip)]
        push_ticks_left: u32,
    },
    Winch {
        operating: bool,
        extended: f32,
    },
    Platform {
        moving: bool,
        #[serde(rename = "currentPosition")]
        current_position: f32,
        direction: f32,
        speed: f32,
        #[serde(rename = "waypointA")]
        waypoint_a: Vec2,
        #[serde(rename = "waypointB")]
        waypoint_b: Vec2,
    },
    Conveyor {
        active: bool,
        direction: Vec2,
        speed: f32,
        #[serde(rename = "halfWidth")]
        half_width: f32,
        #[serde(rename = "halfLength")]
        half_length: f32,
    },
    Hazard {
        active: bool,
    },
    SpikeTrap {
        extended: bool,
        #[serde(rename = "cycleMs")]
        cycle_ms: u64,
        #[serde(skip)]
        phase_ms: u64,
    },
    CameraNode {
        #[serde(rename = "inUse")]
        in_use: bool,
    },
    Mirror {
        orientation: u8,
    },
    Teleporter {
        enabled: bool,
    },
    Checkpoint {
        activated: bool,
    },
}

impl InteractableState {
    pub fn door(open: bool, locked: bool) -> Self {
        Self::Door { open, locked }
    }

    pub fn lever() -> Self {
        Self::Lever { on: false }
    }

    pub fn momentary_button(timer_duration_ms: u64) -> Self {
        Self::Button {
            pressed: false,
            momentary: true,
            timer_duration_ms,
            timer_remaining_ms: 0,
        }
    }

    pub fn latching_button() -> Self {
        Self::Button {
            pressed: false,
            momentary: false,
            timer_duration_ms: 0,
            timer_remaining_ms: 0,
        }
    }

    pub fn pressure_plate(required_weight: i32) -> Self {
        Self::PressurePlate {
            activated: false,
            required_weight,
            total_weight: 0,
        }
    }

    pub fn crate_box() -> Self {
        Self::Crate {
            being_pushed: false,
            push_ticks_left: 0,
        }
    }

    pub fn winch() -> Self {
        Self::Winch {
            operating: false,
            extended: 0.0,
        }
    }

    pub fn platform(waypoint_a: Vec2, waypoint_b: Vec2, speed: f32) -> Self {
        Self::Platform {
            moving: false,
            current_position: 0.0,
            direction: 1.0,
            speed,
            waypoint_a,
            waypoint_b,
        }
    }

    pub fn conveyor(direction: Vec2, speed: f32, half_width: f32, half_length: f32) -> Self {
        Self::Conveyor {
            active: true,
            direction,
            speed,
            half_width,
            half_length,
        }
    }

    pub fn hazard(active: bool) -> Self {
        Self::Hazard { active }
    }

    pub fn spike_trap(cycle_ms: u64) -> Self {
        Self::SpikeTrap {
            extended: false,
            cycle_ms,
            phase_ms: 0,
        }
    }

    pub fn camera_node() -> Self {
        Self::CameraNode { in_use: false }
    }

    pub fn mirror() -> Self {
        Self::Mirror { orientation: 0 }
    }

    pub fn teleporter() -> Self {
        Self::Teleporter { enabled: true }
    }

    pub fn checkpoint() -> Self {
        Self::Checkpoint { activated: false }
    }
}

#[derive(Clone, Debug)]
pub struct Interactable {
    pub id: String,
    pub kind: InteractableKind,
    pub position: Vec3,
    pub linked_ids: Vec<String>,
    pub state: InteractableState,
}

/// What an interaction did beyond flipping state. The room applies these to
/// the collections the interactable store cannot reach.
#[derive(Clone, Debug)]
pub struct InteractionEffect {
    pub result: InteractionResult,
    pub teleport_to: Option<Vec3>,
    pub checkpoint_at: Option<Vec3>,
}

impl InteractionEffect {
    fn plain(result: InteractionResult) -> Self {
        Self {
            result,
            teleport_to: None,
            checkpoint_at: None,
        }
    }
}

/// Arena of interactable instances. Links are id lists resolved through the
/// index map; no instance holds a reference to another.
pub struct InteractableSystem {
    items: Vec<Interactable>,
    index_by_id: HashMap<String, usize>,
}

impl InteractableSystem {
    pub fn from_configs(configs: &[InteractableConfig]) -> Self {
        let mut items = Vec::with_capacity(configs.len());
        let mut index_by_id = HashMap::new();
        for config in configs {
            index_by_id.insert(config.id.clone(), items.len());
            items.push(Interactable {
                id: config.id.clone(),
                kind: config.kind,
                position: config.position,
                linked_ids: config.linked_ids.clone(),
                state: config.state.clone(),
            });
        }
        Self { items, index_by_id }
    }

    pub fn state_of(&self, id: &str) -> Option<&InteractableState> {
        self.index_by_id.get(id).map(|idx| &self.items[*idx].state)
    }

    pub fn state_mut(&mut self, id: &str) -> Option<&mut InteractableState> {
        let idx = *self.index_by_id.get(id)?;
        Some(&mut self.items[idx].state)
    }

    pub fn position_of(&self, id: &str) -> Option<Vec3> {
        self.index_by_id.get(id).map(|idx| self.items[*idx].position)
    }

    pub fn state_value(&self, id: &str) -> Option<Value> {
        self.state_of(id)
            .map(|state| serde_json::to_value(state).unwrap_or(Value::Null))
    }

    pub fn views(&self) -> Vec<InteractableView> {
        self.items
            .iter()
            .map(|item| InteractableView {
                id: item.id.clone(),
                kind: item.kind,
                position: item.position,
                state: serde_json::to_value(&item.state).unwrap_or(Value::Null),
                linked_ids: item.linked_ids.clone(),
            })
            .collect()
    }

    /// Tile cells occupied by closed doors, for movement validation.
    pub fn closed_door_cells(&self) -> Vec<(i32, i32)> {
        self.items
            .iter()
            .filter_map(|item| match item.state {
                InteractableState::Door { open: false, .. } => Some((
                    item.position.x.floor() as i32,
                    item.position.y.floor() as i32,
                )),
                _ => None,
            })
            .collect()
    }

    /// Positions of everything that hurts on contact this tick.
    pub fn harmful_positions(&self) -> Vec<Vec3> {
        self.items
            .iter()
            .filter_map(|item| match item.state {
                InteractableState::Hazard { active: true } => Some(item.position),
                InteractableState::SpikeTrap { extended: true, .. } => Some(item.position),
                _ => None,
            })
            .collect()
    }

    fn crate_positions(&self) -> Vec<Vec3> {
        self.items
            .iter()
            .filter(|item| matches!(item.state, InteractableState::Crate { .. }))
            .map(|item| item.position)
            .collect()
    }

    /// Recomputes every plate's weight from scratch, then applies the
    /// multi-plate door rule and the plate→hazard inverse rule.
    pub fn tick_pressure_plates(&mut self, entities: &[EntityView]) {
        let crates = self.crate_positions();
        for item in &mut self.items {
            let InteractableState::PressurePlate {
                activated,
                required_weight,
                total_weight,
            } = &mut item.state
            else {
                continue;
            };
            let mut weight = 0;
            for entity in entities {
                if entity.position.planar_distance_to(item.position) < PLATE_RADIUS {
                    weight += crate::constants::role_weight(entity.role);
                }
            }
            for crate_pos in &crates {
                if crate_pos.planar_distance_to(item.position) < PLATE_RADIUS {
                    weight += CRATE_WEIGHT;
                }
            }
            *total_weight = weight;
            *activated = weight >= *required_weight;
        }
        self.apply_plate_links();
    }

    /// A door linked from plates opens iff every such plate is activated; a
    /// hazard linked from plates is disabled under the same condition.
    fn apply_plate_links(&mut self) {
        let mut gated: HashMap<String, (usize, bool)> = HashMap::new();
        for item in &self.items {
            let InteractableState::PressurePlate { activated, .. } = item.state else {
                continue;
            };
            for target in &item.linked_ids {
                let entry = gated.entry(target.clone()).or_insert((0, true));
                entry.0 += 1;
                entry.1 = entry.1 && activated;
            }
        }
        for (target, (count, all_active)) in gated {
            if count == 0 {
                continue;
            }
            let Some(idx) = self.index_by_id.get(&target).copied() else {
                continue;
            };
            match &mut self.items[idx].state {
                InteractableState::Door { open, locked } => {
                    if all_active {
                        *locked = false;
                        *open = true;
                    } else {
                        *locked = true;
                        *open = false;
                    }
                }
                InteractableState::Hazard { active } => {
                    *active = !all_active;
                }
                _ => {}
            }
        }
    }

    pub fn tick_winches(&mut self) {
        let mut completed: Vec<Vec<String>> = Vec::new();
        for item in &mut self.items {
            let InteractableState::Winch {
                operating,
                extended,
            } = &mut item.state
            else {
                continue;
            };
            if !*operating {
                continue;
            }
            *extended += WINCH_STEP;
            if *extended >= 1.0 {
                *extended = 1.0;
                *operating = false;
                completed.push(item.linked_ids.clone());
            }
        }
        for links in completed {
            for target in links {
                let Some(idx) = self.index_by_id.get(&target).copied() else {
                    continue;
                };
                if let InteractableState::Platform {
                    moving,
                    current_position,
                    ..
                } = &mut self.items[idx].state
                {
                    *moving = false;
                    *current_position = 1.0;
                }
            }
        }
        self.sync_platform_positions();
    }

    pub fn tick_platforms(&mut self) {
        for item in &mut self.items {
            let InteractableState::Platform {
                moving,
                current_position,
                direction,
                speed,
                ..
            } = &mut item.state
            else {
                continue;
            };
            if !*moving {
                continue;
            }
            *current_position += *direction * *speed * MECHANISM_STEP_SEC;
            if *current_position >= 1.0 {
                *current_position = 1.0;
                *direction = -1.0;
            } else if *current_position <= 0.0 {
                *current_position = 0.0;
                *direction = 1.0;
            }
        }
        self.sync_platform_positions();
    }

    fn sync_platform_positions(&mut self) {
        for item in &mut self.items {
            if let InteractableState::Platform {
                current_position,
                waypoint_a,
                waypoint_b,
                ..
            } = &item.state
            {
                let t = *current_position;
                item.position.x = waypoint_a.x + (waypoint_b.x - waypoint_a.x) * t;
                item.position.y = waypoint_a.y + (waypoint_b.y - waypoint_a.y) * t;
            }
        }
    }

    pub fn tick_buttons(&mut self) {
        let mut released: Vec<Vec<String>> = Vec::new();
        for item in &mut self.items {
            let InteractableState::Button {
                pressed,
                momentary,
                timer_duration_ms,
                timer_remaining_ms,
            } = &mut item.state
            else {
                continue;
            };
            if !*pressed || !*momentary || *timer_duration_ms == 0 {
                continue;
            }
            *timer_remaining_ms = timer_remaining_ms.saturating_sub(TICK_MS);
            if *timer_remaining_ms == 0 {
                *pressed = false;
                released.push(item.linked_ids.clone());
            }
        }
        for links in released {
            self.fire_links(&links);
        }
    }

    /// Drags entities and crates standing on an active belt.
    pub fn tick_conveyors(&mut self, entities: &mut [EntityView]) {
        struct Belt {
            position: Vec3,
            direction: Vec2,
            delta: Vec2,
            half_width: f32,
            half_length: f32,
        }
        let belts: Vec<Belt> = self
            .items
            .iter()
            .filter_map(|item| match &item.state {
                InteractableState::Conveyor {
                    active: true,
                    direction,
                    speed,
                    half_width,
                    half_length,
                } => Some(Belt {
                    position: item.position,
                    direction: *direction,
                    delta: Vec2::new(
                        direction.x * speed * MECHANISM_STEP_SEC,
                        direction.y * speed * MECHANISM_STEP_SEC,
                    ),
                    half_width: *half_width,
                    half_length: *half_length,
                }),
                _ => None,
            })
            .collect();

        let on_belt = |belt: &Belt, pos: Vec3| -> bool {
            let dx = pos.x - belt.position.x;
            let dy = pos.y - belt.position.y;
            let along = dx * belt.direction.x + dy * belt.direction.y;
            let across = dx * -belt.direction.y + dy * belt.direction.x;
            along.abs() <= belt.half_length && across.abs() <= belt.half_width
        };

        for belt in &belts {
            for entity in entities.iter_mut() {
                if on_belt(belt, entity.position) {
                    entity.position.x += belt.delta.x;
                    entity.position.y += belt.delta.y;
                }
            }
            for item in &mut self.items {
                if matches!(item.state, InteractableState::Crate { .. })
                    && on_belt(belt, item.position)
                {
                    item.position.x += belt.delta.x;
                    item.position.y += belt.delta.y;
                }
            }
        }
    }

    /// Tick-counted expiry of the transient push flag.
    pub fn tick_crates(&mut self) {
        for item in &mut self.items {
            if let InteractableState::Crate {
                being_pushed,
                push_ticks_left,
            } = &mut item.state
            {
                if *being_pushed {
                    *push_ticks_left = push_ticks_left.saturating_sub(1);
                    if *push_ticks_left == 0 {
                        *being_pushed = false;
                    }
                }
            }
        }
    }

    pub fn tick_spike_traps(&mut self) {
        for item in &mut self.items {
            if let InteractableState::SpikeTrap {
                extended,
                cycle_ms,
                phase_ms,
            } = &mut item.state
            {
                if *cycle_ms == 0 {
                    continue;
                }
                *phase_ms = (*phase_ms + TICK_MS) % (2 * *cycle_ms);
                *extended = *phase_ms >= *cycle_ms;
            }
        }
    }

    /// Puzzle completion reward: force the target open.
    pub fn unlock_reward(&mut self, id: &str) {
        if let Some(InteractableState::Door { open, locked }) = self.state_mut(id) {
            *locked = false;
            *open = true;
        }
    }

    pub fn apply_interaction(
        &mut self,
        role: Role,
        actor_pos: Vec3,
        target_id: &str,
        action: &str,
        level: &LevelData,
        data: Option<&Value>,
    ) -> InteractionEffect {
        let Some(idx) = self.index_by_id.get(target_id).copied() else {
            return InteractionEffect::plain(InteractionResult::err("target_not_found"));
        };
        let kind = self.items[idx].kind;

        let outcome = match (kind, action) {
            (InteractableKind::Door, "toggle") => self.toggle_door(idx),
            (InteractableKind::Lever, "toggle") => self.toggle_lever(idx),
            (InteractableKind::Button, "press") => self.press_button(idx),
            (InteractableKind::Crate, "push") => {
                if role != Role::Panda {
                    return InteractionEffect::plain(InteractionResult::err("permission_denied"));
                }
                self.push_crate(idx, actor_pos, level)
            }
            (InteractableKind::Winch, "operate_start") | (InteractableKind::Winch, "operate_stop") => {
                if role != Role::Panda {
                    return InteractionEffect::plain(InteractionResult::err("permission_denied"));
                }
                self.operate_winch(idx, action == "operate_start")
            }
            (InteractableKind::CameraNode, "view") | (InteractableKind::CameraNode, "stop_view") => {
                if role != Role::Dog {
                    return InteractionEffect::plain(InteractionResult::err("permission_denied"));
                }
                if let InteractableState::CameraNode { in_use } = &mut self.items[idx].state {
                    *in_use = action == "view";
                }
                Ok(())
            }
            (InteractableKind::Mirror, "rotate") => {
                let links = self.items[idx].linked_ids.clone();
                let requested = data
                    .and_then(|payload| payload.get("orientation"))
                    .and_then(Value::as_u64);
                if let InteractableState::Mirror { orientation } = &mut self.items[idx].state {
                    *orientation = match requested {
                        Some(quarter) => (quarter % 4) as u8,
                        None => (*orientation + 1) % 4,
                    };
                }
                self.fire_links(&links);
                Ok(())
            }
            (InteractableKind::Teleporter, "use") => {
                return self.use_teleporter(idx);
            }
            (InteractableKind::Checkpoint, "activate") => {
                if let InteractableState::Checkpoint { activated } = &mut self.items[idx].state {
                    *activated = true;
                }
                let position = self.items[idx].position;
                let result = self.ok_result(idx);
                return InteractionEffect {
                    result,
                    teleport_to: None,
                    checkpoint_at: Some(position),
                };
            }
            (InteractableKind::Platform, "toggle") => {
                if let InteractableState::Platform { moving, .. } = &mut self.items[idx].state {
                    *moving = !*moving;
                }
                Ok(())
            }
            _ => Err("invalid_action"),
        };

        match outcome {
            Ok(()) => InteractionEffect::plain(self.ok_result(idx)),
            Err(reason) => InteractionEffect::plain(InteractionResult::err(reason)),
        }
    }

    fn ok_result(&self, idx: usize) -> InteractionResult {
        let state = serde_json::to_value(&self.items[idx].state).unwrap_or(Value::Null);
        InteractionResult::ok(state)
    }

    fn toggle_door(&mut self, idx: usize) -> Result<(), &'static str> {
        let InteractableState::Door { open, locked } = &mut self.items[idx].state else {
            return Err("invalid_action");
        };
        if *locked {
            return Err("door_locked");
        }
        *open = !*open;
        let now_open = *open;
        debug!("door '{}' toggled to open={}", self.items[idx].id, now_open);
        Ok(())
    }

    fn toggle_lever(&mut self, idx: usize) -> Result<(), &'static str> {
        let InteractableState::Lever { on } = &mut self.items[idx].state else {
            return Err("invalid_action");
        };
        *on = !*on;
        let links = self.items[idx].linked_ids.clone();
        self.fire_links(&links);
        Ok(())
    }

    fn press_button(&mut self, idx: usize) -> Result<(), &'static str> {
        let InteractableState::Button {
            pressed,
            momentary,
            timer_duration_ms,
            timer_remaining_ms,
        } = &mut self.items[idx].state
        else {
            return Err("invalid_action");
        };
        if *pressed {
            return Ok(());
        }
        *pressed = true;
        if *momentary && *timer_duration_ms > 0 {
            *timer_remaining_ms = *timer_duration_ms;
        }
        let links = self.items[idx].linked_ids.clone();
        self.fire_links(&links);
        Ok(())
    }

    fn push_crate(
        &mut self,
        idx: usize,
        pusher: Vec3,
        level: &LevelData,
    ) -> Result<(), &'static str> {
        let crate_pos = self.items[idx].position;
        let dx = crate_pos.x - pusher.x;
        let dy = crate_pos.y - pusher.y;
        // Dominant axis wins; ties go to X.
        let (step_x, step_y) = if dx.abs() >= dy.abs() {
            (if dx >= 0.0 { 1.0 } else { -1.0 }, 0.0)
        } else {
            (0.0, if dy >= 0.0 { 1.0 } else { -1.0 })
        };
        let target = Vec3::new(crate_pos.x + step_x, crate_pos.y + step_y, crate_pos.z);
        let cell = (target.x.floor() as i32, target.y.floor() as i32);

        if !level.is_walkable(cell.0, cell.1) || level.is_water_or_void(cell.0, cell.1) {
            return Err("blocked");
        }
        let overlaps = self.items.iter().enumerate().any(|(other_idx, other)| {
            other_idx != idx
                && matches!(other.state, InteractableState::Crate { .. })
                && other.position.planar_distance_to(target) < CRATE_OVERLAP_DISTANCE
        });
        if overlaps {
            return Err("blocked");
        }

        self.items[idx].position = target;
        if let InteractableState::Crate {
            being_pushed,
            push_ticks_left,
        } = &mut self.items[idx].state
        {
            *being_pushed = true;
            *push_ticks_left = CRATE_PUSH_TICKS;
        }
        Ok(())
    }

    fn operate_winch(&mut self, idx: usize, start: bool) -> Result<(), &'static str> {
        let InteractableState::Winch {
            operating,
            extended,
        } = &mut self.items[idx].state
        else {
            return Err("invalid_action");
        };
        if start && *extended >= 1.0 {
            return Err("already_extended");
        }
        *operating = start;
        Ok(())
    }

    fn use_teleporter(&mut self, idx: usize) -> InteractionEffect {
        let enabled = matches!(
            self.items[idx].state,
            InteractableState::Teleporter { enabled: true }
        );
        if !enabled {
            return InteractionEffect::plain(InteractionResult::err("invalid_action"));
        }
        let destination = self.items[idx]
            .linked_ids
            .iter()
            .filter_map(|target| self.index_by_id.get(target).copied())
            .find(|other| {
                matches!(
                    self.items[*other].state,
                    InteractableState::Teleporter { .. }
                )
            })
            .map(|other| self.items[other].position);
        let Some(destination) = destination else {
            return InteractionEffect::plain(InteractionResult::err("no_destination"));
        };
        InteractionEffect {
            result: self.ok_result(idx),
            teleport_to: Some(destination),
            checkpoint_at: None,
        }
    }

    /// Single-hop link propagation: a firing interactable toggles its direct
    /// targets only, so cyclic author data cannot recurse.
    fn fire_links(&mut self, links: &[String]) {
        for target in links {
            let Some(idx) = self.index_by_id.get(target).copied() else {
                continue;
            };
            match &mut self.items[idx].state {
                InteractableState::Door { open, locked } => {
                    if !*locked {
                        *open = !*open;
                    }
                }
                InteractableState::Platform { moving, .. } => {
                    *moving = !*moving;
                }
                InteractableState::Hazard { active } => {
                    *active = !*active;
                }
                InteractableState::Conveyor { active, .. } => {
                    *active = !*active;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::load_level;
    use crate::types::{EntityBehavior, Facing};

    fn system() -> (InteractableSystem, LevelData) {
        let level = load_level("training_yard");
        (InteractableSystem::from_configs(&level.interactables), level)
    }

    fn entity(role: Role, x: f32, y: f32) -> EntityView {
        EntityView {
            id: format!("entity_{role:?}"),
            role,
            position: Vec3::new(x, y, 0.0),
            velocity: Vec3::zero(),
            facing: Facing::South,
            state: EntityBehavior::Idle,
        }
    }

    fn door_open(system: &InteractableSystem, id: &str) -> bool {
        matches!(
            system.state_of(id),
            Some(InteractableState::Door { open: true, .. })
        )
    }

    #[test]
    fn lever_toggle_opens_linked_door() {
        let (mut system, level) = system();
        assert!(!door_open(&system, "door_1"));
        let effect = system.apply_interaction(
            Role::Dog,
            Vec3::new(5.5, 2.5, 0.0),
            "lever_1",
            "toggle",
            &level,
            None,
        );
        assert!(effect.result.success);
        assert!(door_open(&system, "door_1"));

        system.apply_interaction(Role::Dog, Vec3::new(5.5, 2.5, 0.0), "lever_1", "toggle", &level, None);
        assert!(!door_open(&system, "door_1"));
    }

    #[test]
    fn locked_door_rejects_toggle() {
        let (mut system, level) = system();
        let effect =
            system.apply_interaction(Role::Dog, Vec3::zero(), "gate_1", "toggle", &level, None);
        assert!(!effect.result.success);
        assert_eq!(effect.result.reason.as_deref(), Some("door_locked"));
    }

    #[test]
    fn unknown_target_is_reported() {
        let (mut system, level) = system();
        let effect =
            system.apply_interaction(Role::Dog, Vec3::zero(), "nothing_here", "toggle", &level, None);
        assert_eq!(effect.result.reason.as_deref(), Some("target_not_found"));
    }

    #[test]
    fn plate_weight_is_recomputed_without_hysteresis() {
        let (mut system, _level) = system();
        let on_plate = [entity(Role::Panda, 6.5, 6.5)];
        system.tick_pressure_plates(&on_plate);
        assert!(matches!(
            system.state_of("plate_heavy"),
            Some(InteractableState::PressurePlate {
                activated: true,
                total_weight: 2,
                ..
            })
        ));

        let far_away = [entity(Role::Panda, 2.5, 2.5)];
        system.tick_pressure_plates(&far_away);
        assert!(matches!(
            system.state_of("plate_heavy"),
            Some(InteractableState::PressurePlate {
                activated: false,
                total_weight: 0,
                ..
            })
        ));
    }

    #[test]
    fn dog_alone_cannot_activate_heavy_plate() {
        let (mut system, _level) = system();
        system.tick_pressure_plates(&[entity(Role::Dog, 6.5, 6.5)]);
        assert!(matches!(
            system.state_of("plate_heavy"),
            Some(InteractableState::PressurePlate {
                activated: false,
                total_weight: 1,
                ..
            })
        ));
    }

    #[test]
    fn gate_opens_only_when_every_linked_plate_is_active() {
        let (mut system, _level) = system();
        // Only the heavy plate weighted: gate stays locked shut.
        system.tick_pressure_plates(&[entity(Role::Panda, 6.5, 6.5)]);
        assert!(matches!(
            system.state_of("gate_1"),
            Some(InteractableState::Door {
                open: false,
                locked: true
            })
        ));

        // Both plates weighted: gate unlocks and opens.
        let both = [entity(Role::Dog, 4.5, 6.5), entity(Role::Panda, 6.5, 6.5)];
        system.tick_pressure_plates(&both);
        assert!(matches!(
            system.state_of("gate_1"),
            Some(InteractableState::Door {
                open: true,
                locked: false
            })
        ));

        // Stepping off re-locks it.
        system.tick_pressure_plates(&[]);
        assert!(matches!(
            system.state_of("gate_1"),
            Some(InteractableState::Door {
                open: false,
                locked: true
            })
        ));
    }

    #[test]
    fn plate_activation_disables_linked_hazard() {
        let (mut system, _level) = system();
        system.tick_pressure_plates(&[entity(Role::Dog, 11.5, 12.5)]);
        assert!(matches!(
            system.state_of("hazard_1"),
            Some(InteractableState::Hazard { active: false })
        ));
        system.tick_pressure_plates(&[]);
        assert!(matches!(
            system.state_of("hazard_1"),
            Some(InteractableState::Hazard { active: true })
        ));
    }

    #[test]
    fn crate_weight_counts_toward_plates() {
        let (mut system, _level) = system();
        // Move the crate onto the heavy plate.
        let idx = system.index_by_id["crate_1"];
        system.items[idx].position = Vec3::new(6.5, 6.5, 0.0);
        system.tick_pressure_plates(&[]);
        assert!(matches!(
            system.state_of("plate_heavy"),
            Some(InteractableState::PressurePlate {
                activated: true,
                total_weight: 2,
                ..
            })
        ));
    }

    #[test]
    fn momentary_button_releases_after_its_timer() {
        let (mut system, level) = system();
        let effect =
            system.apply_interaction(Role::Dog, Vec3::zero(), "button_1", "press", &level, None);
        assert!(effect.result.success);
        assert!(door_open(&system, "door_2"));

        // 5000 ms at 50 ms per tick: still pressed through tick 99.
        for _ in 0..99 {
            system.tick_buttons();
            assert!(matches!(
                system.state_of("button_1"),
                Some(InteractableState::Button { pressed: true, .. })
            ));
        }
        system.tick_buttons();
        assert!(matches!(
            system.state_of("button_1"),
            Some(InteractableState::Button { pressed: false, .. })
        ));
        // Release re-fires the linked door as a toggle.
        assert!(!door_open(&system, "door_2"));
    }

    #[test]
    fn crate_push_requires_panda() {
        let (mut system, level) = system();
        let effect = system.apply_interaction(
            Role::Dog,
            Vec3::new(8.5, 4.5, 0.0),
            "crate_1",
            "push",
            &level,
            None,
        );
        assert!(!effect.result.success);
        assert_eq!(effect.result.reason.as_deref(), Some("permission_denied"));
    }

    #[test]
    fn crate_push_direction_is_dominant_axis_with_x_ties() {
        let (mut system, level) = system();
        // Pusher exactly diagonal: tie resolves to X.
        let effect = system.apply_interaction(
            Role::Panda,
            Vec3::new(8.5, 3.5, 0.0),
            "crate_1",
            "push",
            &level,
            None,
        );
        assert!(effect.result.success);
        let pos = system.position_of("crate_1").expect("crate exists");
        assert!((pos.x - 10.5).abs() < 1e-6);
        assert!((pos.y - 4.5).abs() < 1e-6);
        assert!(matches!(
            system.state_of("crate_1"),
            Some(InteractableState::Crate {
                being_pushed: true,
                ..
            })
        ));
    }

    #[test]
    fn crate_push_into_water_is_rejected() {
        let (mut system, level) = system();
        let idx = system.index_by_id["crate_1"];
        system.items[idx].position = Vec3::new(11.5, 4.5, 0.0);
        // Pushing right would land the crate in the water strip.
        let effect = system.apply_interaction(
            Role::Panda,
            Vec3::new(10.5, 4.5, 0.0),
            "crate_1",
            "push",
            &level,
            None,
        );
        assert!(!effect.result.success);
        assert_eq!(effect.result.reason.as_deref(), Some("blocked"));
    }

    #[test]
    fn crate_push_flag_expires_by_tick_count() {
        let (mut system, level) = system();
        system.apply_interaction(
            Role::Panda,
            Vec3::new(8.5, 4.5, 0.0),
            "crate_1",
            "push",
            &level,
            None,
        );
        for _ in 0..CRATE_PUSH_TICKS {
            system.tick_crates();
        }
        assert!(matches!(
            system.state_of("crate_1"),
            Some(InteractableState::Crate {
                being_pushed: false,
                ..
            })
        ));
    }

    #[test]
    fn winch_extends_then_snaps_linked_platform() {
        let (mut system, level) = system();
        let effect = system.apply_interaction(
            Role::Panda,
            Vec3::zero(),
            "winch_1",
            "operate_start",
            &level,
            None,
        );
        assert!(effect.result.success);

        // 0.02 per tick: fully extended after 50 ticks.
        for _ in 0..50 {
            system.tick_winches();
        }
        assert!(matches!(
            system.state_of("winch_1"),
            Some(InteractableState::Winch {
                operating: false,
                extended,
            }) if (*extended - 1.0).abs() < 1e-6
        ));
        assert!(matches!(
            system.state_of("platform_1"),
            Some(InteractableState::Platform {
                moving: false,
                current_position,
                ..
            }) if (*current_position - 1.0).abs() < 1e-6
        ));
        let pos = system.position_of("platform_1").expect("platform exists");
        assert!((pos.x - 20.5).abs() < 1e-4);
    }

    #[test]
    fn winch_operation_is_panda_only() {
        let (mut system, level) = system();
        let effect =
            system.apply_interaction(Role::Dog, Vec3::zero(), "winch_1", "operate_start", &level, None);
        assert_eq!(effect.result.reason.as_deref(), Some("permission_denied"));
    }

    #[test]
    fn platform_reverses_at_bounds() {
        let (mut system, level) = system();
        system.apply_interaction(Role::Dog, Vec3::zero(), "platform_1", "toggle", &level, None);
        // speed 0.4 → 0.02 per tick → 50 ticks to reach the far end.
        for _ in 0..50 {
            system.tick_platforms();
        }
        assert!(matches!(
            system.state_of("platform_1"),
            Some(InteractableState::Platform { direction, .. }) if *direction < 0.0
        ));
        for _ in 0..50 {
            system.tick_platforms();
        }
        let pos = system.position_of("platform_1").expect("platform exists");
        assert!((pos.x - 16.5).abs() < 1e-3);
    }

    #[test]
    fn conveyor_drags_entities_and_crates() {
        let (mut system, _level) = system();
        let mut entities = vec![entity(Role::Dog, 16.5, 8.5)];
        let idx = system.index_by_id["crate_1"];
        system.items[idx].position = Vec3::new(15.5, 8.5, 0.0);
        let before_entity = entities[0].position.x;
        let before_crate = system.items[idx].position.x;

        system.tick_conveyors(&mut entities);
        assert!(entities[0].position.x > before_entity);
        assert!(system.items[idx].position.x > before_crate);
    }

    #[test]
    fn inactive_conveyor_moves_nothing() {
        let (mut system, _level) = system();
        if let Some(InteractableState::Conveyor { active, .. }) = system.state_mut("conveyor_1") {
            *active = false;
        }
        let mut entities = vec![entity(Role::Dog, 16.5, 8.5)];
        system.tick_conveyors(&mut entities);
        assert!((entities[0].position.x - 16.5).abs() < 1e-6);
    }

    #[test]
    fn spike_trap_alternates_on_its_cycle() {
        let (mut system, _level) = system();
        // cycle 2000 ms = 40 ticks retracted, then 40 extended.
        for _ in 0..40 {
            system.tick_spike_traps();
        }
        assert!(matches!(
            system.state_of("spike_1"),
            Some(InteractableState::SpikeTrap { extended: true, .. })
        ));
        for _ in 0..40 {
            system.tick_spike_traps();
        }
        assert!(matches!(
            system.state_of("spike_1"),
            Some(InteractableState::SpikeTrap {
                extended: false,
                ..
            })
        ));
    }

    #[test]
    fn camera_node_is_dog_only() {
        let (mut system, level) = system();
        let denied =
            system.apply_interaction(Role::Panda, Vec3::zero(), "camera_1", "view", &level, None);
        assert_eq!(denied.result.reason.as_deref(), Some("permission_denied"));

        let allowed = system.apply_interaction(Role::Dog, Vec3::zero(), "camera_1", "view", &level, None);
        assert!(allowed.result.success);
        assert!(matches!(
            system.state_of("camera_1"),
            Some(InteractableState::CameraNode { in_use: true })
        ));
    }

    #[test]
    fn mirror_rotate_steps_or_takes_requested_orientation() {
        let (mut system, level) = system();
        system.apply_interaction(Role::Dog, Vec3::zero(), "mirror_1", "rotate", &level, None);
        assert!(matches!(
            system.state_of("mirror_1"),
            Some(InteractableState::Mirror { orientation: 1 })
        ));

        let payload = serde_json::json!({ "orientation": 3 });
        system.apply_interaction(
            Role::Dog,
            Vec3::zero(),
            "mirror_1",
            "rotate",
            &level,
            Some(&payload),
        );
        assert!(matches!(
            system.state_of("mirror_1"),
            Some(InteractableState::Mirror { orientation: 3 })
        ));
    }

    #[test]
    fn teleporter_reports_linked_destination() {
        let (mut system, level) = system();
        let effect = system.apply_interaction(Role::Dog, Vec3::zero(), "tele_a", "use", &level, None);
        assert!(effect.result.success);
        let destination = effect.teleport_to.expect("teleport destination");
        assert!((destination.x - 21.5).abs() < 1e-6);
    }

    #[test]
    fn checkpoint_interaction_reports_its_position() {
        let (mut system, level) = system();
        let effect =
            system.apply_interaction(Role::Dog, Vec3::zero(), "checkpoint_1", "activate", &level, None);
        assert!(effect.result.success);
        let at = effect.checkpoint_at.expect("checkpoint position");
        assert!((at.x - 12.5).abs() < 1e-6);
    }

    #[test]
    fn unsupported_action_is_invalid() {
        let (mut system, level) = system();
        let effect = system.apply_interaction(Role::Dog, Vec3::zero(), "door_1", "push", &level, None);
        assert_eq!(effect.result.reason.as_deref(), Some("invalid_action"));
    }

    #[test]
    fn closed_doors_occupy_their_cell() {
        let (system, _level) = system();
        let cells = system.closed_door_cells();
        assert!(cells.contains(&(8, 2)));
        assert!(cells.contains(&(10, 6)));
    }
}
