use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Commands the admin surface sends to the capture loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ControlCommand {
    Run,
    Pause,
    Stop,
}

impl ControlCommand {
    pub fn target_mode(self) -> RunMode {
        match self {
            ControlCommand::Run => RunMode::Running,
            ControlCommand::Pause => RunMode::Paused,
            ControlCommand::Stop => RunMode::Stopped,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown control action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for ControlCommand {
    type Err = UnknownAction;

    /// Parses the action segment of `/control/{action}`.
    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "start" | "run" => Ok(ControlCommand::Run),
            "pause" => Ok(ControlCommand::Pause),
            "stop" => Ok(ControlCommand::Stop),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Wire keys follow the admin dashboard (`Status`, `SlidesCaptured`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RunState {
    #[serde(rename = "Status")]
    pub mode: RunMode,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "LastSlideAt")]
    pub last_capture_at: Option<DateTime<Utc>>,
    #[serde(rename = "SlidesCaptured")]
    pub capture_count: u64,
    pub last_error: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to `mode`. The first entry into `Running` stamps `started_at`;
    /// later entries leave it untouched.
    pub fn enter(&mut self, mode: RunMode, now: DateTime<Utc>) {
        self.mode = mode;
        if mode == RunMode::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn apply(&mut self, command: ControlCommand, now: DateTime<Utc>) -> RunMode {
        self.enter(command.target_mode(), now);
        self.mode
    }

    pub fn mark_capture(&mut self, now: DateTime<Utc>) {
        self.capture_count = self.capture_count.saturating_add(1);
        self.last_capture_at = Some(now);
    }
}

/// Cloneable handle to the shared run state. The capture loop writes through
/// it; the admin surface only takes snapshots.
#[derive(Debug, Clone, Default)]
pub struct RunStatus {
    inner: Arc<RwLock<RunState>>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RunState {
        self.read().clone()
    }

    pub fn mode(&self) -> RunMode {
        self.read().mode
    }

    pub fn set_mode(&self, mode: RunMode) {
        self.write().enter(mode, Utc::now());
    }

    pub fn apply(&self, command: ControlCommand) -> RunMode {
        self.write().apply(command, Utc::now())
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.write().last_error = Some(message.into());
    }

    pub fn mark_capture(&self) {
        self.write().mark_capture(Utc::now());
    }

    fn read(&self) -> RwLockReadGuard<'_, RunState> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunState> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
