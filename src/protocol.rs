use serde_json::Value;

use crate::types::{DistractionKind, InputState, PingType, Role, Vec2, Vec3};

#[derive(Debug)]
pub enum ParsedClientMessage {
    CreateRoom {
        level_id: String,
    },
    JoinRoom {
        room_code: String,
        preferred_role: Option<Role>,
    },
    StartGame,
    Input {
        tick: Option<u64>,
        input: InputState,
        position: Option<Vec3>,
    },
    Interact {
        target_id: String,
        action: String,
        data: Option<Value>,
    },
    PlacePing {
        position: Vec3,
        kind: PingType,
    },
    RemovePing {
        ping_id: String,
    },
    Distract {
        position: Vec2,
        kind: DistractionKind,
    },
    SetCheckpoint {
        dog: Vec3,
        panda: Vec3,
    },
    Pause {
        paused: bool,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "create_room" => {
            let level_id = object.get("levelId")?.as_str()?.to_string();
            Some(ParsedClientMessage::CreateRoom { level_id })
        }
        "join_room" => {
            let room_code = object.get("roomCode")?.as_str()?.to_uppercase();
            let preferred_role = match object.get("preferredRole") {
                None => None,
                Some(value) => Role::parse(value.as_str()?),
            };
            if object.get("preferredRole").is_some() && preferred_role.is_none() {
                return None;
            }
            Some(ParsedClientMessage::JoinRoom {
                room_code,
                preferred_role,
            })
        }
        "start_game" => Some(ParsedClientMessage::StartGame),
        "input" => {
            let tick = match object.get("tick") {
                None => None,
                Some(value) => Some(value.as_u64()?),
            };
            let input = match object.get("input") {
                None => InputState::default(),
                Some(value) => parse_input_state(value)?,
            };
            let position = match object.get("position") {
                None => None,
                Some(value) => Some(parse_vec3(value)?),
            };
            Some(ParsedClientMessage::Input {
                tick,
                input,
                position,
            })
        }
        "interact" => {
            let target_id = object.get("targetId")?.as_str()?.to_string();
            let action = object.get("action")?.as_str()?.to_string();
            let data = object.get("data").cloned();
            Some(ParsedClientMessage::Interact {
                target_id,
                action,
                data,
            })
        }
        "place_ping" => {
            let position = parse_vec3(object.get("position")?)?;
            let kind = PingType::parse(object.get("kind")?.as_str()?)?;
            Some(ParsedClientMessage::PlacePing { position, kind })
        }
        "remove_ping" => {
            let ping_id = object.get("pingId")?.as_str()?.to_string();
            Some(ParsedClientMessage::RemovePing { ping_id })
        }
        "distract" => {
            let position = parse_vec2(object.get("position")?)?;
            let kind = DistractionKind::parse(object.get("kind")?.as_str()?)?;
            Some(ParsedClientMessage::Distract { position, kind })
        }
        "set_checkpoint" => {
            let dog = parse_vec3(object.get("dog")?)?;
            let panda = parse_vec3(object.get("panda")?)?;
            Some(ParsedClientMessage::SetCheckpoint { dog, panda })
        }
        "pause" => {
            let paused = object.get("paused")?.as_bool()?;
            Some(ParsedClientMessage::Pause { paused })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_finite_f32(value: &Value) -> Option<f32> {
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    Some(number as f32)
}

fn parse_vec3(value: &Value) -> Option<Vec3> {
    let object = value.as_object()?;
    let x = parse_finite_f32(object.get("x")?)?;
    let y = parse_finite_f32(object.get("y")?)?;
    let z = match object.get("z") {
        None => 0.0,
        Some(value) => parse_finite_f32(value)?,
    };
    Some(Vec3::new(x, y, z))
}

fn parse_vec2(value: &Value) -> Option<Vec2> {
    let object = value.as_object()?;
    let x = parse_finite_f32(object.get("x")?)?;
    let y = parse_finite_f32(object.get("y")?)?;
    Some(Vec2::new(x, y))
}

fn parse_input_state(value: &Value) -> Option<InputState> {
    let object = value.as_object()?;
    let flag = |key: &str| -> Option<bool> {
        match object.get(key) {
            None => Some(false),
            Some(value) => value.as_bool(),
        }
    };
    Some(InputState {
        up: flag("up")?,
        down: flag("down")?,
        left: flag("left")?,
        right: flag("right")?,
        run: flag("run")?,
    })
}
