use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One line of `metrics.jsonl`, written once per detected slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideRecord {
    #[serde(rename = "time_iso")]
    pub timestamp: DateTime<Utc>,
    pub slide_path: PathBuf,
    pub raw_path: PathBuf,
    pub change_score: f64,
    pub ocr_ms: u64,
    pub total_ms: u64,
    pub text_chars: usize,
    pub caption_chars: usize,
    pub send_ok: bool,
    pub ocr_ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

/// Served by `GET /metrics`. The last block of fields is what the admin
/// dashboard panel reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_slides: Vec<SlideRecord>,
    pub total_slides: u64,
    pub ocr_failures: u64,
    pub send_failures: u64,
    pub ocr_success_rate: f64,
    pub send_success_rate: f64,
    pub avg_total_ms: f64,
    pub avg_change_score: f64,

    /// OCR success rate, percent.
    pub ocr_accuracy: f64,
    /// Mean end-to-end time per slide, seconds.
    pub processing_time: f64,
    /// Delivery success rate, percent.
    pub telegram_success_rate: f64,
    pub last_hour_slides: u64,
}
