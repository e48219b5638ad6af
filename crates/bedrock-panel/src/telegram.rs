//! Telegram notification dispatcher.
//!
//! Subscribes to the supervisor's event bus and relays lifecycle changes and
//! player join/leave notices to a Telegram chat. Dispatch is strictly
//! fire-and-forget: a failed or slow send is logged and dropped, and can
//! never feed back into the supervisor's control flow.

use bedrock_process::{Player, ProcessState};
use bedrock_supervisor::EventBus;
use tokio::{sync::broadcast, task::JoinHandle};

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// Enabled only when explicitly switched on and both credentials are
    /// present.
    pub fn from_env() -> Self {
        let bot_token = std::env::var("BEDROCK_TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let chat_id = std::env::var("BEDROCK_TELEGRAM_CHAT_ID").unwrap_or_default();
        let switched_on = std::env::var("BEDROCK_TELEGRAM_ENABLED")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            enabled: switched_on && !bot_token.is_empty() && !chat_id.is_empty(),
            bot_token,
            chat_id,
        }
    }
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Spawns the relay task. Returns `None` when notifications are
    /// disabled.
    pub fn spawn(self, bus: &EventBus) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::debug!("telegram notifications disabled");
            return None;
        }

        let mut status_rx = bus.subscribe_status();
        let mut players_rx = bus.subscribe_players();

        Some(tokio::spawn(async move {
            let mut last_players: Vec<Player> = Vec::new();
            loop {
                tokio::select! {
                    status = status_rx.recv() => match status {
                        Ok(state) => {
                            if let Some(text) = format_status_message(state) {
                                self.send(&text).await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "telegram relay lagged on status events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    players = players_rx.recv() => match players {
                        Ok(snapshot) => {
                            let (joined, left) = diff_players(&last_players, &snapshot);
                            for p in joined {
                                self.send(&format_join_message(&p)).await;
                            }
                            for p in left {
                                self.send(&format_leave_message(&p)).await;
                            }
                            last_players = snapshot;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "telegram relay lagged on player events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }))
    }

    async fn send(&self, text: &str) {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );
        let body = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "telegram send rejected");
            }
            Err(err) => {
                tracing::warn!(error = %err, "telegram send failed");
            }
        }
    }
}

/// Players present in `current` but not `previous`, and vice versa, matched
/// by xuid.
fn diff_players(previous: &[Player], current: &[Player]) -> (Vec<Player>, Vec<Player>) {
    let joined = current
        .iter()
        .filter(|p| !previous.iter().any(|lp| lp.xuid == p.xuid))
        .cloned()
        .collect();
    let left = previous
        .iter()
        .filter(|lp| !current.iter().any(|p| p.xuid == lp.xuid))
        .cloned()
        .collect();
    (joined, left)
}

fn format_status_message(state: ProcessState) -> Option<String> {
    match state {
        ProcessState::Running => Some(
            "🟢 <b>Server Started</b>\nThe Minecraft server is now online.".to_string(),
        ),
        ProcessState::Stopped => Some(
            "🔴 <b>Server Stopped</b>\nThe Minecraft server has stopped.".to_string(),
        ),
        // Transitional/error states surface through the console stream.
        ProcessState::Stopping | ProcessState::Error => None,
    }
}

fn format_join_message(player: &Player) -> String {
    format!(
        "👤 <b>Player Joined</b>\n{} has joined the game.",
        escape_html(&player.name)
    )
}

fn format_leave_message(player: &Player) -> String {
    format!(
        "👋 <b>Player Left</b>\n{} has left the game.",
        escape_html(&player.name)
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
