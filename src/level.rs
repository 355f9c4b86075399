use log::warn;
use serde_json::Value;

use crate::interactable::InteractableState;
use crate::types::{InteractableKind, Vec2, Vec3};

pub const TILE_FLOOR: u8 = b'.';
pub const TILE_WALL: u8 = b'#';
pub const TILE_WATER: u8 = b'~';
pub const TILE_VOID: u8 = b' ';

#[derive(Clone, Debug)]
pub struct InteractableConfig {
    pub id: String,
    pub kind: InteractableKind,
    pub position: Vec3,
    pub linked_ids: Vec<String>,
    pub state: InteractableState,
}

#[derive(Clone, Debug)]
pub enum ObjectiveCondition {
    InteractableState {
        target_id: String,
        expected: Vec<(String, Value)>,
    },
    BothPlayersInZone {
        min: Vec2,
        max: Vec2,
    },
    AllObjectives,
}

#[derive(Clone, Debug)]
pub struct ObjectiveConfig {
    pub id: String,
    pub optional: bool,
    pub condition: ObjectiveCondition,
}

#[derive(Clone, Debug)]
pub struct PuzzleConfig {
    pub id: String,
    pub objectives: Vec<ObjectiveConfig>,
    pub reward_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GuardConfig {
    pub id: String,
    pub position: Vec2,
    pub facing_deg: f32,
    pub patrol: Vec<Vec2>,
    pub vision_angle_deg: f32,
    pub vision_range: f32,
    pub move_speed: f32,
}

#[derive(Clone, Debug)]
pub struct LevelData {
    pub id: String,
    pub width: i32,
    pub height: i32,
    pub tiles: Vec<String>,
    pub elevations: Vec<Vec<f32>>,
    pub dog_spawn: Vec3,
    pub panda_spawn: Vec3,
    pub interactables: Vec<InteractableConfig>,
    pub puzzles: Vec<PuzzleConfig>,
    pub guards: Vec<GuardConfig>,
    pub checkpoints: Vec<Vec3>,
}

impl LevelData {
    pub fn tile_at(&self, ix: i32, iy: i32) -> Option<u8> {
        if ix < 0 || iy < 0 || ix >= self.width || iy >= self.height {
            return None;
        }
        self.tiles
            .get(iy as usize)
            .and_then(|row| row.as_bytes().get(ix as usize))
            .copied()
    }

    pub fn is_walkable(&self, ix: i32, iy: i32) -> bool {
        self.tile_at(ix, iy) == Some(TILE_FLOOR)
    }

    pub fn is_water_or_void(&self, ix: i32, iy: i32) -> bool {
        matches!(self.tile_at(ix, iy), Some(TILE_WATER) | Some(TILE_VOID))
    }

    pub fn elevation_at(&self, x: f32, y: f32) -> f32 {
        let ix = x.floor() as i32;
        let iy = y.floor() as i32;
        if ix < 0 || iy < 0 || ix >= self.width || iy >= self.height {
            return 0.0;
        }
        self.elevations
            .get(iy as usize)
            .and_then(|row| row.get(ix as usize))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn spawn_for(&self, role: crate::types::Role) -> Vec3 {
        match role {
            crate::types::Role::Dog => self.dog_spawn,
            crate::types::Role::Panda => self.panda_spawn,
        }
    }
}

/// Loads a level by id. Unknown ids degrade to a minimal placeholder level so
/// a room can still run; the miss is logged, not surfaced as an error.
pub fn load_level(level_id: &str) -> LevelData {
    let mut level = match level_id {
        "training_yard" => training_yard(),
        _ => {
            warn!("unknown level id '{level_id}', falling back to placeholder");
            placeholder_level(level_id)
        }
    };
    validate_links(&mut level);
    level
}

/// Drops link targets that do not exist in the interactable list. The link
/// graph is static and single-hop, so this is the only load-time check needed.
fn validate_links(level: &mut LevelData) {
    let known: Vec<String> = level
        .interactables
        .iter()
        .map(|config| config.id.clone())
        .collect();
    for config in &mut level.interactables {
        let before = config.linked_ids.len();
        config
            .linked_ids
            .retain(|target| known.iter().any(|id| id == target));
        if config.linked_ids.len() != before {
            warn!(
                "interactable '{}' in level '{}' had unknown link targets; dropped",
                config.id, level.id
            );
        }
    }
}

fn flat_elevations(width: i32, height: i32) -> Vec<Vec<f32>> {
    vec![vec![0.0; width as usize]; height as usize]
}

fn placeholder_level(level_id: &str) -> LevelData {
    let tiles: Vec<String> = vec![
        "##########".to_string(),
        "#........#".to_string(),
        "#........#".to_string(),
        "#........#".to_string(),
        "#........#".to_string(),
        "##########".to_string(),
    ];
    LevelData {
        id: level_id.to_string(),
        width: 10,
        height: 6,
        tiles,
        elevations: flat_elevations(10, 6),
        dog_spawn: Vec3::new(2.5, 2.5, 0.0),
        panda_spawn: Vec3::new(3.5, 2.5, 0.0),
        interactables: Vec::new(),
        puzzles: Vec::new(),
        guards: Vec::new(),
        checkpoints: Vec::new(),
    }
}

fn training_yard() -> LevelData {
    let tiles: Vec<String> = vec![
        "########################".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#...........~~.........#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "#......................#".to_string(),
        "########################".to_string(),
    ];
    let width = 24;
    let height = 16;

    let interactables = vec![
        InteractableConfig {
            id: "lever_1".to_string(),
            kind: InteractableKind::Lever,
            position: Vec3::new(5.5, 2.5, 0.0),
            linked_ids: vec!["door_1".to_string()],
            state: InteractableState::lever(),
        },
        InteractableConfig {
            id: "door_1".to_string(),
            kind: InteractableKind::Door,
            position: Vec3::new(8.5, 2.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::door(false, false),
        },
        InteractableConfig {
            id: "plate_light".to_string(),
            kind: InteractableKind::PressurePlate,
            position: Vec3::new(4.5, 6.5, 0.0),
            linked_ids: vec!["gate_1".to_string()],
            state: InteractableState::pressure_plate(1),
        },
        InteractableConfig {
            id: "plate_heavy".to_string(),
            kind: InteractableKind::PressurePlate,
            position: Vec3::new(6.5, 6.5, 0.0),
            linked_ids: vec!["gate_1".to_string()],
            state: InteractableState::pressure_plate(2),
        },
        InteractableConfig {
            id: "gate_1".to_string(),
            kind: InteractableKind::Door,
            position: Vec3::new(10.5, 6.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::door(false, true),
        },
        InteractableConfig {
            id: "button_1".to_string(),
            kind: InteractableKind::Button,
            position: Vec3::new(5.5, 9.5, 0.0),
            linked_ids: vec!["door_2".to_string()],
            state: InteractableState::momentary_button(5_000),
        },
        InteractableConfig {
            id: "door_2".to_string(),
            kind: InteractableKind::Door,
            position: Vec3::new(12.5, 9.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::door(false, false),
        },
        InteractableConfig {
            id: "crate_1".to_string(),
            kind: InteractableKind::Crate,
            position: Vec3::new(9.5, 4.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::crate_box(),
        },
        InteractableConfig {
            id: "winch_1".to_string(),
            kind: InteractableKind::Winch,
            position: Vec3::new(14.5, 3.5, 0.0),
            linked_ids: vec!["platform_1".to_string()],
            state: InteractableState::winch(),
        },
        InteractableConfig {
            id: "platform_1".to_string(),
            kind: InteractableKind::Platform,
            position: Vec3::new(16.5, 3.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::platform(
                Vec2::new(16.5, 3.5),
                Vec2::new(20.5, 3.5),
                0.4,
            ),
        },
        InteractableConfig {
            id: "conveyor_1".to_string(),
            kind: InteractableKind::Conveyor,
            position: Vec3::new(16.5, 8.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::conveyor(Vec2::new(1.0, 0.0), 1.5, 0.5, 2.0),
        },
        InteractableConfig {
            id: "plate_hazard".to_string(),
            kind: InteractableKind::PressurePlate,
            position: Vec3::new(11.5, 12.5, 0.0),
            linked_ids: vec!["hazard_1".to_string()],
            state: InteractableState::pressure_plate(1),
        },
        InteractableConfig {
            id: "hazard_1".to_string(),
            kind: InteractableKind::Hazard,
            position: Vec3::new(13.5, 12.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::hazard(true),
        },
        InteractableConfig {
            id: "spike_1".to_string(),
            kind: InteractableKind::SpikeTrap,
            position: Vec3::new(18.5, 12.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::spike_trap(2_000),
        },
        InteractableConfig {
            id: "camera_1".to_string(),
            kind: InteractableKind::CameraNode,
            position: Vec3::new(2.5, 12.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::camera_node(),
        },
        InteractableConfig {
            id: "mirror_1".to_string(),
            kind: InteractableKind::Mirror,
            position: Vec3::new(20.5, 12.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::mirror(),
        },
        InteractableConfig {
            id: "tele_a".to_string(),
            kind: InteractableKind::Teleporter,
            position: Vec3::new(2.5, 8.5, 0.0),
            linked_ids: vec!["tele_b".to_string()],
            state: InteractableState::teleporter(),
        },
        InteractableConfig {
            id: "tele_b".to_string(),
            kind: InteractableKind::Teleporter,
            position: Vec3::new(21.5, 8.5, 0.0),
            linked_ids: vec!["tele_a".to_string()],
            state: InteractableState::teleporter(),
        },
        InteractableConfig {
            id: "checkpoint_1".to_string(),
            kind: InteractableKind::Checkpoint,
            position: Vec3::new(12.5, 2.5, 0.0),
            linked_ids: Vec::new(),
            state: InteractableState::checkpoint(),
        },
    ];

    let puzzles = vec![PuzzleConfig {
        id: "puzzle_entry".to_string(),
        objectives: vec![
            ObjectiveConfig {
                id: "obj_lever".to_string(),
                optional: false,
                condition: ObjectiveCondition::InteractableState {
                    target_id: "lever_1".to_string(),
                    expected: vec![("on".to_string(), Value::Bool(true))],
                },
            },
            ObjectiveConfig {
                id: "obj_regroup".to_string(),
                optional: false,
                condition: ObjectiveCondition::BothPlayersInZone {
                    min: Vec2::new(1.0, 1.0),
                    max: Vec2::new(7.0, 4.0),
                },
            },
            ObjectiveConfig {
                id: "obj_all".to_string(),
                optional: true,
                condition: ObjectiveCondition::AllObjectives,
            },
        ],
        reward_id: Some("door_2".to_string()),
    }];

    let guards = vec![GuardConfig {
        id: "guard_1".to_string(),
        position: Vec2::new(8.5, 13.5),
        facing_deg: 0.0,
        patrol: vec![Vec2::new(8.5, 13.5), Vec2::new(16.5, 13.5)],
        vision_angle_deg: 90.0,
        vision_range: 6.0,
        move_speed: 2.0,
    }];

    LevelData {
        id: "training_yard".to_string(),
        width,
        height,
        tiles,
        elevations: flat_elevations(width, height),
        dog_spawn: Vec3::new(2.5, 2.5, 0.0),
        panda_spawn: Vec3::new(3.5, 2.5, 0.0),
        interactables,
        puzzles,
        guards,
        checkpoints: vec![Vec3::new(12.5, 2.5, 0.0)],
    }
}
