//! Turns recognized slide text into a bounded, human-readable caption.

pub mod caption;
pub mod summarizer;

pub use caption::build_caption;
pub use summarizer::{summarize, Summary};
