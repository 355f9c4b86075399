use std::collections::BTreeMap;

use log::info;
use serde_json::Value;

use crate::interactable::InteractableSystem;
use crate::level::{ObjectiveCondition, ObjectiveConfig, PuzzleConfig};
use crate::types::{EntityView, PuzzleStateView, Role};

struct Puzzle {
    id: String,
    objectives: Vec<ObjectiveConfig>,
    reward_id: Option<String>,
    completed: bool,
    objective_done: BTreeMap<String, bool>,
}

pub struct PuzzleSystem {
    puzzles: Vec<Puzzle>,
}

fn state_matches(state: &Value, expected: &[(String, Value)]) -> bool {
    let Value::Object(map) = state else {
        return false;
    };
    expected
        .iter()
        .all(|(key, value)| map.get(key) == Some(value))
}

fn both_players_in_zone(
    entities: &[EntityView],
    min: crate::types::Vec2,
    max: crate::types::Vec2,
) -> bool {
    let in_zone = |role: Role| {
        entities.iter().any(|entity| {
            entity.role == role
                && entity.position.x >= min.x
                && entity.position.x <= max.x
                && entity.position.y >= min.y
                && entity.position.y <= max.y
        })
    };
    in_zone(Role::Dog) && in_zone(Role::Panda)
}

impl PuzzleSystem {
    pub fn from_configs(configs: &[PuzzleConfig]) -> Self {
        let puzzles = configs
            .iter()
            .map(|config| Puzzle {
                id: config.id.clone(),
                objectives: config.objectives.clone(),
                reward_id: config.reward_id.clone(),
                completed: false,
                objective_done: config
                    .objectives
                    .iter()
                    .map(|objective| (objective.id.clone(), false))
                    .collect(),
            })
            .collect();
        Self { puzzles }
    }

    /// Re-evaluates every open puzzle. Objectives track current conditions;
    /// completion latches and never reverts. Returns reward ids for puzzles
    /// that completed this tick.
    pub fn evaluate(
        &mut self,
        interactables: &InteractableSystem,
        entities: &[EntityView],
    ) -> Vec<String> {
        let mut rewards = Vec::new();
        for puzzle in &mut self.puzzles {
            if puzzle.completed {
                continue;
            }
            let mut done: BTreeMap<String, bool> = BTreeMap::new();
            for objective in &puzzle.objectives {
                let met = match &objective.condition {
                    ObjectiveCondition::InteractableState {
                        target_id,
                        expected,
                    } => interactables
                        .state_value(target_id)
                        .map(|state| state_matches(&state, expected))
                        .unwrap_or(false),
                    ObjectiveCondition::BothPlayersInZone { min, max } => {
                        both_players_in_zone(entities, *min, *max)
                    }
                    // Aggregation happens at the puzzle level; as an
                    // objective this is vacuously met.
                    ObjectiveCondition::AllObjectives => true,
                };
                done.insert(objective.id.clone(), met);
            }
            puzzle.objective_done = done;

            let required_met = puzzle.objectives.iter().all(|objective| {
                objective.optional
                    || puzzle
                        .objective_done
                        .get(&objective.id)
                        .copied()
                        .unwrap_or(false)
            });
            if required_met {
                puzzle.completed = true;
                info!("puzzle '{}' completed", puzzle.id);
                if let Some(reward) = &puzzle.reward_id {
                    rewards.push(reward.clone());
                }
            }
        }
        rewards
    }

    pub fn all_completed(&self) -> bool {
        !self.puzzles.is_empty() && self.puzzles.iter().all(|puzzle| puzzle.completed)
    }

    pub fn views(&self) -> Vec<PuzzleStateView> {
        self.puzzles
            .iter()
            .map(|puzzle| PuzzleStateView {
                id: puzzle.id.clone(),
                completed: puzzle.completed,
                objectives: puzzle.objective_done.clone(),
            })
            .collect()
    }
}
