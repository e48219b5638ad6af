/// Liveness of the supervised server process.
///
/// `Error` is reachable only from a failed spawn attempt; a process that
/// crashed after running lands back in `Stopped` (and may be auto-restarted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Running,
    Stopping,
    Error,
}

/// A connected player, derived purely from observed server output.
///
/// Keyed by `xuid` (the connection/account identifier), not by display name:
/// names are not unique and may carry formatting artifacts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Player {
    pub name: String,
    pub xuid: String,
    /// Best-effort metadata; the server log does not report it.
    pub gamemode: String,
    pub ping: u32,
}

impl Player {
    pub fn new(name: impl Into<String>, xuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            xuid: xuid.into(),
            gamemode: "survival".to_string(),
            ping: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StartOutcome {
    pub started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StartOutcome {
    pub fn ok() -> Self {
        Self {
            started: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            started: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StopOutcome {
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StopOutcome {
    pub fn ok() -> Self {
        Self {
            stopped: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            stopped: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RestartOutcome {
    pub restarted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RestartOutcome {
    pub fn ok() -> Self {
        Self {
            restarted: true,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            restarted: true,
            message: Some(message.into()),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            restarted: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommandOutcome {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandOutcome {
    pub fn ok() -> Self {
        Self {
            sent: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            sent: false,
            message: Some(message.into()),
        }
    }
}
