//! Authoritative in-memory set of connected players for the current process
//! lifetime. Rebuilt purely from observed console output; cleared wholesale
//! when the process exits (no partial leave inference on crash).

use std::collections::BTreeMap;

use bedrock_process::Player;

#[derive(Debug, Default)]
pub struct PlayerRoster {
    // Keyed by xuid; snapshot order follows the key order, which is stable
    // across mutations.
    players: BTreeMap<String, Player>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for the player's xuid.
    pub fn upsert(&mut self, player: Player) {
        self.players.insert(player.xuid.clone(), player);
    }

    /// Removes by xuid. Absent entries are a no-op, not an error.
    pub fn remove(&mut self, xuid: &str) {
        self.players.remove(xuid);
    }

    /// Updates the ping of the first player whose display name matches.
    ///
    /// Ping lines carry no xuid, so two players sharing a name are
    /// ambiguous; the first match wins. Returns whether a player was found.
    pub fn update_ping(&mut self, name: &str, ping: u32) -> bool {
        if let Some(p) = self.players.values_mut().find(|p| p.name == name) {
            p.ping = ping;
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}
