pub mod artifacts;
pub mod controller;
pub mod detector;
pub mod loop_worker;

pub use controller::SensingController;
pub use detector::{ChangeDetector, DetectionResult};
pub use loop_worker::{Bridges, Runner};
