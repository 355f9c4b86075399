use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use duo_stealth_server::constants::TICK_MS;
use duo_stealth_server::protocol::{parse_client_message, ParsedClientMessage};
use duo_stealth_server::room_manager::RoomManager;
use duo_stealth_server::types::Role;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// Stale-room sweep cadence, in ticks.
const CLEANUP_INTERVAL_TICKS: u64 = 1_200;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    player_id: String,
    room_code: Option<String>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    manager: RoomManager,
    tick_count: u64,
}

impl ServerState {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
            manager: RoomManager::new(),
            tick_count: 0,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let state = Arc::new(Mutex::new(ServerState::new()));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!("static file root: {}", static_dir.to_string_lossy());
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found; serving websocket endpoint only");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!("listening on :{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("../client/dist")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let player_id = make_id("player");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                player_id: player_id.clone(),
                room_code: None,
            },
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    match message {
        ParsedClientMessage::Ping { t } => {
            let mut guard = state.lock().await;
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::CreateRoom { level_id } => {
            let mut guard = state.lock().await;
            let Some(player_id) = guard
                .clients
                .get(client_id)
                .map(|ctx| ctx.player_id.clone())
            else {
                return;
            };
            let created = guard.manager.create_room(&player_id, &level_id);
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "room_created",
                    "roomCode": created.room_code,
                    "joinUrl": created.join_url,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::JoinRoom {
            room_code,
            preferred_role,
        } => {
            handle_join_room(state, client_id, &room_code, preferred_role).await;
        }
        ParsedClientMessage::StartGame => {
            let mut guard = state.lock().await;
            let Some(room_code) = client_room(&guard, client_id) else {
                send_to_client(
                    &mut guard,
                    client_id,
                    &json!({ "type": "error", "message": "join a room first" }),
                    QueuePolicy::DisconnectOnFull,
                );
                return;
            };
            let started = guard
                .manager
                .get_room_mut(&room_code)
                .map(|room| room.start_game())
                .unwrap_or(false);
            if started {
                broadcast_room_state(&mut guard, &room_code);
            } else {
                send_to_client(
                    &mut guard,
                    client_id,
                    &json!({ "type": "error", "message": "room is not ready" }),
                    QueuePolicy::DisconnectOnFull,
                );
            }
        }
        ParsedClientMessage::Input {
            tick: _,
            input,
            position,
        } => {
            with_player_room(&state, client_id, |room, player_id| {
                room.handle_input(player_id, input, position);
                None
            })
            .await;
        }
        ParsedClientMessage::Interact {
            target_id,
            action,
            data,
        } => {
            with_player_room(&state, client_id, |room, player_id| {
                let result = room.handle_interaction(player_id, &target_id, &action, data.as_ref());
                Some(json!({
                    "type": "interaction_result",
                    "targetId": target_id,
                    "result": result,
                }))
            })
            .await;
        }
        ParsedClientMessage::PlacePing { position, kind } => {
            with_player_room(&state, client_id, |room, player_id| {
                match room.add_ping(player_id, position, kind) {
                    Some(_) => None,
                    None => Some(json!({
                        "type": "error",
                        "message": "ping cooldown active",
                    })),
                }
            })
            .await;
        }
        ParsedClientMessage::RemovePing { ping_id } => {
            with_player_room(&state, client_id, |room, player_id| {
                if room.remove_ping(player_id, &ping_id) {
                    None
                } else {
                    Some(json!({
                        "type": "error",
                        "message": "ping not found or not yours",
                    }))
                }
            })
            .await;
        }
        ParsedClientMessage::Distract { position, kind } => {
            with_player_room(&state, client_id, |room, _player_id| {
                room.create_distraction(position, kind);
                None
            })
            .await;
        }
        ParsedClientMessage::SetCheckpoint { dog, panda } => {
            with_player_room(&state, client_id, |room, _player_id| {
                room.set_checkpoint(dog, panda);
                None
            })
            .await;
        }
        ParsedClientMessage::Pause { paused } => {
            let mut guard = state.lock().await;
            let Some(room_code) = client_room(&guard, client_id) else {
                return;
            };
            let changed = guard
                .manager
                .get_room_mut(&room_code)
                .map(|room| room.set_paused(paused))
                .unwrap_or(false);
            if changed {
                broadcast_room_state(&mut guard, &room_code);
            }
        }
    }
}

async fn handle_join_room(
    state: SharedState,
    client_id: &str,
    room_code: &str,
    preferred_role: Option<Role>,
) {
    let mut guard = state.lock().await;
    let Some(player_id) = guard
        .clients
        .get(client_id)
        .map(|ctx| ctx.player_id.clone())
    else {
        return;
    };

    match guard.manager.join_room(room_code, &player_id, preferred_role) {
        Ok(role) => {
            if let Some(ctx) = guard.clients.get_mut(client_id) {
                ctx.room_code = Some(room_code.to_string());
            }
            let room_state = guard
                .manager
                .get_room(room_code)
                .map(|room| serde_json::to_value(room.get_room_state()).unwrap_or(Value::Null));
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "joined",
                    "roomCode": room_code,
                    "role": role,
                    "roomState": room_state,
                }),
                QueuePolicy::DisconnectOnFull,
            );
            broadcast_room_state(&mut guard, room_code);
        }
        Err(error) => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "error",
                    "message": error.reason(),
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

/// Runs `action` against the caller's room and optionally sends a reply.
async fn with_player_room<F>(state: &SharedState, client_id: &str, action: F)
where
    F: FnOnce(&mut duo_stealth_server::room::Room, &str) -> Option<Value>,
{
    let mut guard = state.lock().await;
    let Some(ctx) = guard.clients.get(client_id) else {
        return;
    };
    let player_id = ctx.player_id.clone();
    let Some(room_code) = ctx.room_code.clone() else {
        send_to_client(
            &mut guard,
            client_id,
            &json!({ "type": "error", "message": "join a room first" }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    };
    let reply = guard
        .manager
        .get_room_mut(&room_code)
        .and_then(|room| action(room, &player_id));
    if let Some(reply) = reply {
        send_to_client(&mut guard, client_id, &reply, QueuePolicy::DisconnectOnFull);
    }
}

async fn handle_disconnect(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    let Some(ctx) = guard.clients.remove(client_id) else {
        return;
    };
    if let Some(room_code) = ctx.room_code {
        if let Some(room) = guard.manager.get_room_mut(&room_code) {
            room.remove_player(&ctx.player_id);
        }
        broadcast_room_state(&mut guard, &room_code);
    }
    info!("client '{client_id}' disconnected");
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_rooms(&mut guard);
        }
    });
}

fn tick_rooms(state: &mut ServerState) {
    state.tick_count += 1;
    state.manager.tick_all();

    for room_code in state.manager.room_codes() {
        let (snapshot, respawns) = {
            let Some(room) = state.manager.get_room_mut(&room_code) else {
                continue;
            };
            (room.get_game_state(), room.drain_pending_respawns())
        };
        broadcast_to_room(
            state,
            &room_code,
            &json!({
                "type": "state",
                "snapshot": snapshot,
            }),
            QueuePolicy::DropOnFull,
        );
        for event in respawns {
            broadcast_to_room(
                state,
                &room_code,
                &json!({
                    "type": "respawn",
                    "event": event,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }

    if state.tick_count % CLEANUP_INTERVAL_TICKS == 0 {
        state.manager.cleanup_stale_rooms(Utc::now());
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id);
    }
}

fn broadcast_to_room(state: &mut ServerState, room_code: &str, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let client_ids: Vec<String> = state
        .clients
        .iter()
        .filter(|(_, ctx)| ctx.room_code.as_deref() == Some(room_code))
        .map(|(id, _)| id.clone())
        .collect();

    let mut failed_clients = Vec::new();
    for client_id in client_ids {
        let send_failed = state
            .clients
            .get(&client_id)
            .map(|client| {
                client
                    .tx
                    .try_send(OutboundMessage::Text(payload.clone()))
                    .is_err()
            })
            .unwrap_or(false);
        if send_failed {
            failed_clients.push(client_id);
        }
    }
    if policy == QueuePolicy::DisconnectOnFull {
        for client_id in failed_clients {
            disconnect_client_internal(state, &client_id);
        }
    }
}

fn broadcast_room_state(state: &mut ServerState, room_code: &str) {
    let Some(room_state) = state
        .manager
        .get_room(room_code)
        .map(|room| room.get_room_state())
    else {
        return;
    };
    broadcast_to_room(
        state,
        room_code,
        &json!({
            "type": "room_state",
            "room": room_state,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn client_room(state: &ServerState, client_id: &str) -> Option<String> {
    state
        .clients
        .get(client_id)
        .and_then(|ctx| ctx.room_code.clone())
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(ctx) = state.clients.remove(client_id) else {
        return;
    };
    if let Some(room_code) = &ctx.room_code {
        if let Some(room) = state.manager.get_room_mut(room_code) {
            room.remove_player(&ctx.player_id);
        }
    }
    let _ = ctx.tx.try_send(OutboundMessage::Close {
        code: 1013,
        reason: "server queue overflow".to_string(),
    });
    warn!("client '{client_id}' dropped for backpressure");
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = make_id("client");
        let b = make_id("client");
        assert!(a.starts_with("client_"));
        assert_ne!(a, b);
    }

    #[test]
    fn tick_rooms_handles_empty_manager() {
        let mut state = ServerState::new();
        tick_rooms(&mut state);
        assert_eq!(state.tick_count, 1);
    }
}
