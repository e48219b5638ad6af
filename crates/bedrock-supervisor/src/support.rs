use std::time::Duration;

const DEFAULT_RESTART_DELAY_MS: u64 = 5000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;
const DEFAULT_STOP_WAIT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BUS_CAPACITY: usize = 256;

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
}

/// Delay before respawning after an unexpected exit.
pub(crate) fn restart_delay() -> Duration {
    Duration::from_millis(
        env_u64("BEDROCK_RESTART_DELAY_MS")
            .map(|v| v.clamp(100, 10 * 60 * 1000))
            .unwrap_or(DEFAULT_RESTART_DELAY_MS),
    )
}

/// Pause between the close of the outgoing process and the respawn in
/// `restart()`, giving the server time to release its port and lock files.
pub(crate) fn settle_delay() -> Duration {
    Duration::from_millis(
        env_u64("BEDROCK_SETTLE_DELAY_MS")
            .map(|v| v.clamp(0, 60_000))
            .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
    )
}

/// How long `restart()` waits for the outgoing process to exit after the
/// stop directive before escalating to a forced kill.
pub(crate) fn stop_wait_timeout() -> Duration {
    Duration::from_millis(
        env_u64("BEDROCK_STOP_WAIT_TIMEOUT_MS")
            .map(|v| v.clamp(1000, 10 * 60 * 1000))
            .unwrap_or(DEFAULT_STOP_WAIT_TIMEOUT_MS),
    )
}

pub(crate) fn bus_capacity() -> usize {
    env_usize("BEDROCK_BUS_CAPACITY")
        .map(|v| v.clamp(16, 65_536))
        .unwrap_or(DEFAULT_BUS_CAPACITY)
}
