use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use duo_stealth_server::constants::TICK_MS;
use duo_stealth_server::room::Room;
use duo_stealth_server::types::{
    DistractionKind, InputState, PingType, RoomStatus, Vec2, Vec3,
};
use serde::Serialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    level: Option<String>,
    #[arg(long)]
    ticks: Option<u64>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "levelId")]
    level_id: String,
    ticks: u64,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "finalStatus")]
    final_status: RoomStatus,
    #[serde(rename = "respawnCounts")]
    respawn_counts: BTreeMap<String, usize>,
    #[serde(rename = "puzzlesCompleted")]
    puzzles_completed: usize,
    #[serde(rename = "pingsAlive")]
    pings_alive: usize,
    anomalies: Vec<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let level_id = cli.level.unwrap_or_else(|| "training_yard".to_string());
    let max_ticks = cli.ticks.unwrap_or(600);

    let summary = run_scripted_session(&level_id, max_ticks);

    let payload = json!({ "summary": summary });
    println!("{payload}");

    if let Some(path) = cli.summary_out {
        let serialized = serde_json::to_string_pretty(&summary).unwrap_or_default();
        if let Err(error) = std::fs::write(&path, serialized) {
            eprintln!("failed to write summary to {}: {error}", path.display());
            std::process::exit(1);
        }
    }

    if !summary.anomalies.is_empty() {
        std::process::exit(2);
    }
}

/// Deterministic two-player session: exercise a lever, a ping, a
/// distraction, and a regroup, then idle out the clock. The same level and
/// tick count always produce the same summary.
fn run_scripted_session(level_id: &str, max_ticks: u64) -> RunSummary {
    let mut room = Room::new("SIMULA", level_id);
    let mut anomalies = Vec::new();

    if room.add_player("sim_dog", None).is_err() || room.add_player("sim_panda", None).is_err() {
        anomalies.push("players failed to join".to_string());
    }
    if !room.start_game() {
        anomalies.push("game failed to start".to_string());
    }

    let mut respawn_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut ticks_run = 0;

    for tick in 0..max_ticks {
        match tick {
            5 => {
                room.handle_input(
                    "sim_dog",
                    InputState::default(),
                    Some(Vec3::new(5.5, 2.5, 0.0)),
                );
            }
            8 => {
                if room
                    .add_ping("sim_panda", Vec3::new(6.5, 6.5, 0.0), PingType::Help)
                    .is_none()
                {
                    anomalies.push("ping placement failed".to_string());
                }
            }
            10 => {
                room.create_distraction(Vec2::new(12.5, 13.5), DistractionKind::Rock);
            }
            // Both players sit in the regroup zone, so pulling the lever is
            // the last objective of the entry puzzle.
            30 => {
                let result = room.handle_interaction("sim_dog", "lever_1", "toggle", None);
                if !result.success {
                    anomalies.push(format!(
                        "lever interaction failed: {}",
                        result.reason.unwrap_or_default()
                    ));
                }
            }
            _ => {}
        }

        room.tick();
        ticks_run += 1;

        for event in room.drain_pending_respawns() {
            let key = format!("{:?}", event.reason);
            *respawn_counts.entry(key).or_insert(0) += 1;
        }

        if room.status() == RoomStatus::Completed {
            break;
        }
    }

    let snapshot = room.get_game_state();
    for entity in &snapshot.entities {
        if !entity.position.x.is_finite() || !entity.position.y.is_finite() {
            anomalies.push(format!("entity '{}' position is not finite", entity.id));
        }
    }

    RunSummary {
        level_id: level_id.to_string(),
        ticks: ticks_run,
        duration_ms: ticks_run * TICK_MS,
        final_status: room.status(),
        respawn_counts,
        puzzles_completed: snapshot
            .puzzles
            .iter()
            .filter(|puzzle| puzzle.completed)
            .count(),
        pings_alive: snapshot.pings.len(),
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_session_completes_the_entry_puzzle() {
        let summary = run_scripted_session("training_yard", 600);
        assert!(summary.anomalies.is_empty(), "{:?}", summary.anomalies);
        assert_eq!(summary.final_status, RoomStatus::Completed);
        assert_eq!(summary.puzzles_completed, 1);
    }

    #[test]
    fn placeholder_level_runs_without_anomalies() {
        let summary = run_scripted_session("empty_level", 100);
        // No lever or puzzle exists, so the scripted interactions fail softly.
        assert_eq!(summary.ticks, 100);
        assert_eq!(summary.final_status, RoomStatus::Playing);
    }
}
