mod types;

pub use types::{MetricsSnapshot, SlideRecord, SystemMetrics};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const MAX_RECENT_SLIDES: usize = 20;
const RECENT_WINDOW: TimeDelta = TimeDelta::hours(1);

/// Appends slide records to a JSONL log and keeps running aggregates for the
/// admin surface.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
    path: Arc<PathBuf>,
}

struct MetricsState {
    sink: File,
    recent_slides: Vec<SlideRecord>,
    /// Timestamps of records inside `RECENT_WINDOW`.
    window: VecDeque<DateTime<Utc>>,
    total_slides: u64,
    ocr_failures: u64,
    send_failures: u64,
    total_ms_sum: u64,
    change_score_sum: f64,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    /// Opens (or creates) the log in append mode. Existing lines are never
    /// rewritten.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create metrics directory {}", parent.display())
                })?;
            }
        }
        let sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open metrics log {}", path.display()))?;
        let sink = File::from_std(sink);

        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());
        // Baseline refresh; CPU usage is a delta between refreshes.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Ok(Self {
            inner: Arc::new(Mutex::new(MetricsState {
                sink,
                recent_slides: Vec::with_capacity(MAX_RECENT_SLIDES),
                window: VecDeque::new(),
                total_slides: 0,
                ocr_failures: 0,
                send_failures: 0,
                total_ms_sum: 0,
                change_score_sum: 0.0,
                system,
                pid,
            })),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `record` as one line and folds it into the aggregates. The
    /// line is written with a single `write_all` under the lock, so concurrent
    /// writers never interleave.
    pub async fn record(&self, record: SlideRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record).context("Failed to encode slide record")?;
        line.push(b'\n');

        let mut state = self.inner.lock().await;
        state
            .sink
            .write_all(&line)
            .await
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        state
            .sink
            .flush()
            .await
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;

        state.total_slides += 1;
        if !record.ocr_ok {
            state.ocr_failures += 1;
        }
        if !record.send_ok {
            state.send_failures += 1;
        }
        state.total_ms_sum = state.total_ms_sum.saturating_add(record.total_ms);
        state.change_score_sum += record.change_score;
        state.window.push_back(record.timestamp);

        state.recent_slides.push(record);
        if state.recent_slides.len() > MAX_RECENT_SLIDES {
            state.recent_slides.remove(0);
        }

        Ok(())
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Utc::now()).await
    }

    async fn snapshot_at(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        state.window.retain(|at| now - *at < RECENT_WINDOW);
        let last_hour_slides = state.window.len() as u64;

        let pid = state.pid;
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system = state
            .system
            .process(pid)
            .map(|process| SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            })
            .unwrap_or_default();

        let total = state.total_slides;
        let rate = |failures: u64| {
            if total == 0 {
                1.0
            } else {
                (total - failures) as f64 / total as f64
            }
        };
        let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };

        let ocr_success_rate = rate(state.ocr_failures);
        let send_success_rate = rate(state.send_failures);
        let avg_total_ms = mean(state.total_ms_sum as f64);

        MetricsSnapshot {
            system,
            recent_slides: state.recent_slides.clone(),
            total_slides: total,
            ocr_failures: state.ocr_failures,
            send_failures: state.send_failures,
            ocr_success_rate,
            send_success_rate,
            avg_total_ms,
            avg_change_score: mean(state.change_score_sum),
            ocr_accuracy: round_to(ocr_success_rate * 100.0, 1),
            processing_time: round_to(avg_total_ms / 1000.0, 2),
            telegram_success_rate: round_to(send_success_rate * 100.0, 1),
            last_hour_slides,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            path: Arc::clone(&self.path),
        }
    }
}
