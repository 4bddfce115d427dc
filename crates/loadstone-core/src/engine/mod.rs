pub mod scheduler;
pub mod virtual_user;

pub use scheduler::{run_test, EngineConfig, EngineHandle, Phase};

/// Lifecycle status of a run, surfaced to callers watching a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Running,
    Stopping,
    Completed,
    Error,
}

impl Default for EngineStatus {
    fn default() -> Self {
        EngineStatus::Idle
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Running => "running",
            EngineStatus::Stopping => "stopping",
            EngineStatus::Completed => "completed",
            EngineStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}
