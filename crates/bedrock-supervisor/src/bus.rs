//! In-process publish/subscribe decoupling the supervisor from its
//! consumers (console relay, player-list relay, notification dispatcher).
//!
//! Three named channels over [`tokio::sync::broadcast`]:
//! - `output`: raw console lines, extraction included and non-matching lines
//!   alike (extraction is additive, not a filter).
//! - `status`: lifecycle transitions, emitted synchronously at each
//!   transition point and therefore observed in strict order.
//! - `players`: full roster snapshots after every roster mutation.
//!
//! Publishing never blocks. A send with no receivers drops the event; a slow
//! receiver observes `RecvError::Lagged` and skips, without stalling the
//! supervisor or other subscribers.

use bedrock_process::{Player, ProcessState};
use tokio::sync::broadcast;

use crate::support;

#[derive(Clone, Debug)]
pub struct EventBus {
    output: broadcast::Sender<String>,
    status: broadcast::Sender<ProcessState>,
    players: broadcast::Sender<Vec<Player>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (output, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        let (players, _) = broadcast::channel(capacity);
        Self {
            output,
            status,
            players,
        }
    }

    pub fn publish_output(&self, line: impl Into<String>) {
        let _ = self.output.send(line.into());
    }

    pub fn publish_status(&self, state: ProcessState) {
        let _ = self.status.send(state);
    }

    pub fn publish_players(&self, snapshot: Vec<Player>) {
        let _ = self.players.send(snapshot);
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<String> {
        self.output.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ProcessState> {
        self.status.subscribe()
    }

    pub fn subscribe_players(&self) -> broadcast::Receiver<Vec<Player>> {
        self.players.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(support::bus_capacity())
    }
}
