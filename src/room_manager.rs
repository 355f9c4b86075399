use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::info;
use rand::Rng;

use crate::constants::{ROOM_CODE_LEN, ROOM_IDLE_TIMEOUT_MS};
use crate::room::{Room, RoomError};
use crate::types::Role;

// 0/O and 1/I left out so codes survive being read aloud.
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Clone, Debug)]
pub struct CreatedRoom {
    pub room_code: String,
    pub join_url: String,
}

struct RoomEntry {
    room: Room,
    creator_id: String,
    last_active: DateTime<Utc>,
}

/// Registry of live rooms keyed by join code. The wall clock is used here
/// for idle cleanup only; everything inside a room runs on tick time.
pub struct RoomManager {
    rooms: HashMap<String, RoomEntry>,
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    /// Creates an empty room. The creator still joins through `join_room`
    /// like anyone else; they are only remembered as the host.
    pub fn create_room(&mut self, creator_id: &str, level_id: &str) -> CreatedRoom {
        let code = self.generate_code();
        let room = Room::new(&code, level_id);
        self.rooms.insert(
            code.clone(),
            RoomEntry {
                room,
                creator_id: creator_id.to_string(),
                last_active: Utc::now(),
            },
        );
        info!("created room {code} on level '{level_id}' for '{creator_id}'");
        CreatedRoom {
            join_url: format!("/?room={code}"),
            room_code: code,
        }
    }

    pub fn creator_of(&self, room_code: &str) -> Option<&str> {
        self.rooms
            .get(room_code)
            .map(|entry| entry.creator_id.as_str())
    }

    pub fn join_room(
        &mut self,
        room_code: &str,
        player_id: &str,
        preferred: Option<Role>,
    ) -> Result<Role, RoomError> {
        let entry = self.rooms.get_mut(room_code).ok_or(RoomError::NotFound)?;
        let role = entry.room.add_player(player_id, preferred)?;
        entry.last_active = Utc::now();
        Ok(role)
    }

    pub fn get_room(&self, room_code: &str) -> Option<&Room> {
        self.rooms.get(room_code).map(|entry| &entry.room)
    }

    pub fn get_room_mut(&mut self, room_code: &str) -> Option<&mut Room> {
        let entry = self.rooms.get_mut(room_code)?;
        entry.last_active = Utc::now();
        Some(&mut entry.room)
    }

    pub fn remove_room(&mut self, room_code: &str) -> bool {
        self.rooms.remove(room_code).is_some()
    }

    pub fn room_codes(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    pub fn tick_all(&mut self) {
        for entry in self.rooms.values_mut() {
            entry.room.tick();
        }
    }

    /// Drops rooms that are empty and have been idle past the timeout.
    pub fn cleanup_stale_rooms(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = Duration::milliseconds(ROOM_IDLE_TIMEOUT_MS);
        let before = self.rooms.len();
        self.rooms.retain(|code, entry| {
            let stale = entry.room.is_empty() && now - entry.last_active > timeout;
            if stale {
                info!("removing stale room {code}");
            }
            !stale
        });
        before - self.rooms.len()
    }
}
