//! Process supervision core for a single Bedrock dedicated server.
//!
//! Spawns the externally supplied `bedrock_server` binary, scrapes its
//! unstructured stdout into a live player roster, manages stop/restart and
//! crash recovery, and fans lifecycle events out over an in-process bus.

pub mod bus;
pub mod extract;
pub mod roster;
pub mod supervisor;
pub(crate) mod support;

pub use bus::EventBus;
pub use extract::{BedrockLineMatcher, ConsoleEvent, LineMatcher};
pub use roster::PlayerRoster;
pub use supervisor::{Supervisor, SupervisorConfig};
