use std::collections::HashMap;

use crate::constants::{MAX_PINGS_PER_PLAYER, PING_COOLDOWN_MS, PING_TTL_MS};
use crate::types::{PingType, PingView, Role, Vec3};

/// Co-op marker pings with per-player cooldown, cap, and expiry. All times
/// come from the room's tick clock, never the wall clock, and ids are
/// numbered per room so identical input sequences yield identical ids.
pub struct PingManager {
    pings: Vec<PingView>,
    last_ping_at: HashMap<String, u64>,
    next_id: u64,
}

impl Default for PingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PingManager {
    pub fn new() -> Self {
        Self {
            pings: Vec::new(),
            last_ping_at: HashMap::new(),
            next_id: 1,
        }
    }

    /// Places a ping, or returns `None` while the player's cooldown is live.
    /// Players at their cap lose their oldest ping to make room.
    pub fn add(
        &mut self,
        player_id: &str,
        role: Role,
        position: Vec3,
        kind: PingType,
        now_ms: u64,
    ) -> Option<PingView> {
        if let Some(last) = self.last_ping_at.get(player_id) {
            if now_ms.saturating_sub(*last) < PING_COOLDOWN_MS {
                return None;
            }
        }

        let owned: Vec<usize> = self
            .pings
            .iter()
            .enumerate()
            .filter(|(_, ping)| ping.created_by == role)
            .map(|(idx, _)| idx)
            .collect();
        if owned.len() >= MAX_PINGS_PER_PLAYER {
            let oldest = owned
                .into_iter()
                .min_by_key(|idx| self.pings[*idx].created_at_ms);
            if let Some(idx) = oldest {
                self.pings.remove(idx);
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let ping = PingView {
            id: format!("ping_{id}"),
            position,
            kind,
            created_by: role,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + PING_TTL_MS,
        };
        self.last_ping_at.insert(player_id.to_string(), now_ms);
        self.pings.push(ping.clone());
        Some(ping)
    }

    /// Removes a ping the requester owns; false for unknown ids and for
    /// pings placed by the other player.
    pub fn remove(&mut self, ping_id: &str, requester: Role) -> bool {
        let before = self.pings.len();
        self.pings
            .retain(|ping| !(ping.id == ping_id && ping.created_by == requester));
        self.pings.len() != before
    }

    pub fn prune(&mut self, now_ms: u64) {
        self.pings.retain(|ping| ping.expires_at_ms > now_ms);
    }

    pub fn views(&self) -> Vec<PingView> {
        self.pings.clone()
    }
}
