use log::debug;

use crate::constants::{
    distraction_hearing_radius, GUARD_ALERT_MS, GUARD_ALERT_SPEED_MULTIPLIER, GUARD_CATCH_RADIUS,
    GUARD_LOS_SAMPLES, GUARD_SUSPICIOUS_MS, GUARD_SUSPICIOUS_SPEED_MULTIPLIER,
    GUARD_WAYPOINT_EPSILON, MECHANISM_STEP_SEC, TICK_MS,
};
use crate::level::{GuardConfig, LevelData};
use crate::types::{AlertState, DistractionKind, EntityView, GuardView, Vec2};

pub struct Guard {
    pub id: String,
    pub position: Vec2,
    pub facing_deg: f32,
    patrol: Vec<Vec2>,
    patrol_index: usize,
    patrol_forward: bool,
    vision_angle_deg: f32,
    vision_range: f32,
    move_speed: f32,
    pub alert_state: AlertState,
    alert_timer_ms: u64,
    last_seen: Option<Vec2>,
    investigate_target: Option<Vec2>,
}

pub struct Distraction {
    pub position: Vec2,
    pub kind: DistractionKind,
    pub remaining_ms: u64,
}

pub struct GuardSystem {
    guards: Vec<Guard>,
    distractions: Vec<Distraction>,
}

fn normalize_deg(mut deg: f32) -> f32 {
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg < -180.0 {
        deg += 360.0;
    }
    deg
}

// Any non-walkable tile occludes: walls, water, and void all break the line.
fn blocks_sight(level: &LevelData, x: f32, y: f32) -> bool {
    !level.is_walkable(x.floor() as i32, y.floor() as i32)
}

impl Guard {
    fn from_config(config: &GuardConfig) -> Self {
        Self {
            id: config.id.clone(),
            position: config.position,
            facing_deg: config.facing_deg,
            patrol: config.patrol.clone(),
            patrol_index: 0,
            patrol_forward: true,
            vision_angle_deg: config.vision_angle_deg,
            vision_range: config.vision_range,
            move_speed: config.move_speed,
            alert_state: AlertState::Idle,
            alert_timer_ms: 0,
            last_seen: None,
            investigate_target: None,
        }
    }

    /// Range check, then cone check against the facing, then straight-line
    /// visibility sampled at fixed intervals against non-walkable tiles.
    pub fn can_see(&self, level: &LevelData, target: Vec2) -> bool {
        let distance = self.position.distance_to(target);
        if distance > self.vision_range {
            return false;
        }
        if distance > 1e-3 {
            let angle_to =
                (target.y - self.position.y).atan2(target.x - self.position.x).to_degrees();
            let off_axis = normalize_deg(angle_to - self.facing_deg);
            if off_axis.abs() > self.vision_angle_deg / 2.0 {
                return false;
            }
        }
        for i in 1..=GUARD_LOS_SAMPLES {
            let t = i as f32 / (GUARD_LOS_SAMPLES as f32 + 1.0);
            let sx = self.position.x + (target.x - self.position.x) * t;
            let sy = self.position.y + (target.y - self.position.y) * t;
            if blocks_sight(level, sx, sy) {
                return false;
            }
        }
        true
    }

    /// Steps toward `target`; returns true once within the waypoint epsilon.
    fn move_toward(&mut self, target: Vec2, speed: f32) -> bool {
        let dx = target.x - self.position.x;
        let dy = target.y - self.position.y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance <= GUARD_WAYPOINT_EPSILON {
            return true;
        }
        let step = (speed * MECHANISM_STEP_SEC).min(distance);
        self.position.x += dx / distance * step;
        self.position.y += dy / distance * step;
        self.facing_deg = dy.atan2(dx).to_degrees();
        distance - step <= GUARD_WAYPOINT_EPSILON
    }

    fn patrol_step(&mut self) {
        if self.patrol.len() < 2 {
            return;
        }
        let target = self.patrol[self.patrol_index];
        if self.move_toward(target, self.move_speed) {
            // Ping-pong over the waypoint list.
            if self.patrol_forward {
                if self.patrol_index + 1 >= self.patrol.len() {
                    self.patrol_forward = false;
                    self.patrol_index -= 1;
                } else {
                    self.patrol_index += 1;
                }
            } else if self.patrol_index == 0 {
                self.patrol_forward = true;
                self.patrol_index += 1;
            } else {
                self.patrol_index -= 1;
            }
        }
    }

    fn spot(&mut self, at: Vec2) {
        if self.alert_state != AlertState::Alert {
            debug!("guard '{}' spotted a player", self.id);
        }
        self.alert_state = AlertState::Alert;
        self.alert_timer_ms = GUARD_ALERT_MS;
        self.last_seen = Some(at);
    }

    fn hear(&mut self, at: Vec2) {
        if self.alert_state == AlertState::Alert {
            return;
        }
        self.alert_state = AlertState::Suspicious;
        self.alert_timer_ms = GUARD_SUSPICIOUS_MS;
        self.investigate_target = Some(at);
    }

    fn nearest_waypoint_index(&self) -> usize {
        let mut best = 0;
        let mut best_distance = f32::MAX;
        for (index, waypoint) in self.patrol.iter().enumerate() {
            let distance = self.position.distance_to(*waypoint);
            if distance < best_distance {
                best_distance = distance;
                best = index;
            }
        }
        best
    }

    fn behave(&mut self) {
        match self.alert_state {
            AlertState::Idle => self.patrol_step(),
            AlertState::Suspicious => {
                if let Some(target) = self.last_seen.or(self.investigate_target) {
                    self.move_toward(target, self.move_speed * GUARD_SUSPICIOUS_SPEED_MULTIPLIER);
                }
                self.alert_timer_ms = self.alert_timer_ms.saturating_sub(TICK_MS);
                if self.alert_timer_ms == 0 {
                    self.alert_state = AlertState::Returning;
                    self.last_seen = None;
                    self.investigate_target = None;
                }
            }
            AlertState::Alert => {
                let Some(target) = self.last_seen else {
                    self.alert_state = AlertState::Suspicious;
                    self.alert_timer_ms = GUARD_SUSPICIOUS_MS;
                    return;
                };
                self.move_toward(target, self.move_speed * GUARD_ALERT_SPEED_MULTIPLIER);
                self.alert_timer_ms = self.alert_timer_ms.saturating_sub(TICK_MS);
                if self.alert_timer_ms == 0 {
                    // Lost the trail: cool off through suspicious first.
                    self.alert_state = AlertState::Suspicious;
                    self.alert_timer_ms = GUARD_SUSPICIOUS_MS;
                }
            }
            AlertState::Returning => {
                if self.patrol.is_empty() {
                    self.alert_state = AlertState::Idle;
                    return;
                }
                let nearest = self.nearest_waypoint_index();
                if self.move_toward(self.patrol[nearest], self.move_speed) {
                    self.patrol_index = nearest;
                    self.alert_state = AlertState::Idle;
                }
            }
        }
    }

    fn view(&self) -> GuardView {
        GuardView {
            id: self.id.clone(),
            position: self.position,
            facing_deg: self.facing_deg,
            alert_state: self.alert_state,
            patrol_index: self.patrol_index,
            last_seen_player_pos: self.last_seen,
        }
    }
}

impl GuardSystem {
    pub fn from_configs(configs: &[GuardConfig]) -> Self {
        Self {
            guards: configs.iter().map(Guard::from_config).collect(),
            distractions: Vec::new(),
        }
    }

    pub fn add_distraction(&mut self, position: Vec2, kind: DistractionKind, lifetime_ms: u64) {
        self.distractions.push(Distraction {
            position,
            kind,
            remaining_ms: lifetime_ms,
        });
    }

    /// Detection, hearing, and per-state movement for every guard.
    pub fn tick_guards(&mut self, level: &LevelData, entities: &[EntityView]) {
        for guard in &mut self.guards {
            for entity in entities {
                let target = entity.position.planar();
                if guard.can_see(level, target) {
                    guard.spot(target);
                }
            }
            for distraction in &self.distractions {
                let radius = distraction_hearing_radius(distraction.kind);
                if guard.position.distance_to(distraction.position) <= radius {
                    guard.hear(distraction.position);
                }
            }
            guard.behave();
        }
    }

    /// Counts down distraction lifetimes and drops the expired ones.
    pub fn tick_distractions(&mut self) {
        for distraction in &mut self.distractions {
            distraction.remaining_ms = distraction.remaining_ms.saturating_sub(TICK_MS);
        }
        self.distractions.retain(|d| d.remaining_ms > 0);
    }

    /// True when an alert guard reaches an entity. The guard drops back to
    /// returning; the caller owns the respawn of both players.
    pub fn check_catches(&mut self, entities: &[EntityView]) -> bool {
        let mut caught = false;
        for guard in &mut self.guards {
            if guard.alert_state != AlertState::Alert {
                continue;
            }
            let contact = entities.iter().any(|entity| {
                guard.position.distance_to(entity.position.planar()) < GUARD_CATCH_RADIUS
            });
            if contact {
                debug!("guard '{}' caught a player", guard.id);
                caught = true;
                guard.alert_state = AlertState::Returning;
                guard.alert_timer_ms = 0;
                guard.last_seen = None;
                guard.investigate_target = None;
            }
        }
        caught
    }

    pub fn views(&self) -> Vec<GuardView> {
        self.guards.iter().map(Guard::view).collect()
    }

    pub fn distraction_count(&self) -> usize {
        self.distractions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DISTRACTION_LIFETIME_MS;
    use crate::level::load_level;
    use crate::types::{EntityBehavior, Facing, Role, Vec3};

    fn fixture() -> (GuardSystem, LevelData) {
        let level = load_level("training_yard");
        (GuardSystem::from_configs(&level.guards), level)
    }

    fn entity_at(x: f32, y: f32) -> EntityView {
        EntityView {
            id: "entity_dog".to_string(),
            role: Role::Dog,
            position: Vec3::new(x, y, 0.0),
            velocity: Vec3::zero(),
            facing: Facing::South,
            state: EntityBehavior::Idle,
        }
    }

    #[test]
    fn guard_sees_entity_in_cone() {
        let (system, level) = fixture();
        let guard = &system.guards[0];
        assert!(guard.can_see(&level, Vec2::new(11.5, 13.5)));
    }

    #[test]
    fn guard_does_not_see_behind_itself() {
        let (system, level) = fixture();
        let guard = &system.guards[0];
        assert!(!guard.can_see(&level, Vec2::new(5.5, 13.5)));
    }

    #[test]
    fn guard_does_not_see_beyond_range() {
        let (system, level) = fixture();
        let guard = &system.guards[0];
        assert!(!guard.can_see(&level, Vec2::new(15.5, 13.5)));
    }

    #[test]
    fn walls_block_line_of_sight() {
        let (mut system, level) = fixture();
        // Face the border wall and look at a point on its far side.
        system.guards[0].position = Vec2::new(2.5, 13.5);
        system.guards[0].facing_deg = 180.0;
        assert!(!system.guards[0].can_see(&level, Vec2::new(-1.5, 13.5)));
    }

    #[test]
    fn water_blocks_line_of_sight() {
        let (mut system, level) = fixture();
        // Look straight across the water strip at (12,4)-(13,4).
        system.guards[0].position = Vec2::new(11.5, 4.5);
        system.guards[0].facing_deg = 0.0;
        assert!(!system.guards[0].can_see(&level, Vec2::new(14.5, 4.5)));
        // The same ray one row down crosses only floor and stays visible.
        system.guards[0].position = Vec2::new(11.5, 5.5);
        assert!(system.guards[0].can_see(&level, Vec2::new(14.5, 5.5)));
    }

    #[test]
    fn sighting_raises_alert_and_records_position() {
        let (mut system, level) = fixture();
        system.tick_guards(&level, &[entity_at(11.5, 13.5)]);
        let view = &system.views()[0];
        assert_eq!(view.alert_state, AlertState::Alert);
        let seen = view.last_seen_player_pos.expect("position recorded");
        assert!((seen.x - 11.5).abs() < 1e-6);
        assert!((seen.y - 13.5).abs() < 1e-6);
    }

    #[test]
    fn alert_cools_off_through_suspicious_then_patrol_resumes() {
        let (mut system, level) = fixture();
        system.tick_guards(&level, &[entity_at(11.5, 13.5)]);
        assert_eq!(system.guards[0].alert_state, AlertState::Alert);

        // Entity gone: 4000 ms of alert at 50 ms per tick.
        for _ in 0..(GUARD_ALERT_MS / TICK_MS) {
            system.tick_guards(&level, &[]);
        }
        assert_eq!(system.guards[0].alert_state, AlertState::Suspicious);

        for _ in 0..(GUARD_SUSPICIOUS_MS / TICK_MS) {
            system.tick_guards(&level, &[]);
        }
        assert_eq!(system.guards[0].alert_state, AlertState::Returning);

        // The guard walks back to its nearest waypoint and settles in.
        for _ in 0..400 {
            system.tick_guards(&level, &[]);
            if system.guards[0].alert_state == AlertState::Idle {
                break;
            }
        }
        assert_eq!(system.guards[0].alert_state, AlertState::Idle);
    }

    #[test]
    fn distraction_turns_guard_suspicious() {
        let (mut system, level) = fixture();
        system.add_distraction(
            Vec2::new(12.5, 13.5),
            DistractionKind::Whistle,
            DISTRACTION_LIFETIME_MS,
        );
        system.tick_guards(&level, &[]);
        assert_eq!(system.guards[0].alert_state, AlertState::Suspicious);
    }

    #[test]
    fn distraction_out_of_earshot_is_ignored() {
        let (mut system, level) = fixture();
        // A rock carries 5 units; drop it well outside that.
        system.add_distraction(
            Vec2::new(2.5, 2.5),
            DistractionKind::Rock,
            DISTRACTION_LIFETIME_MS,
        );
        system.tick_guards(&level, &[]);
        assert_eq!(system.guards[0].alert_state, AlertState::Idle);
    }

    #[test]
    fn distraction_does_not_downgrade_alert() {
        let (mut system, level) = fixture();
        system.tick_guards(&level, &[entity_at(11.5, 13.5)]);
        system.add_distraction(
            Vec2::new(12.5, 13.5),
            DistractionKind::Whistle,
            DISTRACTION_LIFETIME_MS,
        );
        system.tick_guards(&level, &[entity_at(11.5, 13.5)]);
        assert_eq!(system.guards[0].alert_state, AlertState::Alert);
    }

    #[test]
    fn distractions_expire_after_their_lifetime() {
        let (mut system, _level) = fixture();
        system.add_distraction(
            Vec2::new(12.5, 13.5),
            DistractionKind::Rock,
            DISTRACTION_LIFETIME_MS,
        );
        for _ in 0..(DISTRACTION_LIFETIME_MS / TICK_MS) {
            system.tick_distractions();
        }
        assert_eq!(system.distraction_count(), 0);
    }

    #[test]
    fn only_alert_guards_catch() {
        let (mut system, _level) = fixture();
        let close = entity_at(8.6, 13.5);
        assert!(!system.check_catches(std::slice::from_ref(&close)));

        system.guards[0].alert_state = AlertState::Alert;
        assert!(system.check_catches(std::slice::from_ref(&close)));
        assert_eq!(system.guards[0].alert_state, AlertState::Returning);
    }

    #[test]
    fn guard_patrols_between_waypoints() {
        let (mut system, level) = fixture();
        let start_x = system.guards[0].position.x;
        for _ in 0..20 {
            system.tick_guards(&level, &[]);
        }
        assert!(system.guards[0].position.x > start_x);
    }
}
