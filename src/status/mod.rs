pub mod state;

pub use state::{ControlCommand, RunMode, RunState, RunStatus, UnknownAction};
