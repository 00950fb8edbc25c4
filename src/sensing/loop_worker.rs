use anyhow::{Context, Result};
use chrono::Utc;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bridge::{annotate, DeliveryChannel, FrameSource, TextRecognizer};
use crate::metrics::{MetricsCollector, SlideRecord};
use crate::settings::{Config, SettingsStore};
use crate::status::{ControlCommand, RunMode, RunStatus};
use crate::summary::{build_caption, summarize};

use super::artifacts::{save_frame, slide_path, ArtifactKind};
use super::detector::{is_empty_frame, ChangeDetector};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// The outside-world collaborators of one capture loop.
pub struct Bridges {
    pub source: Box<dyn FrameSource>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub delivery: Arc<dyn DeliveryChannel>,
}

/// Single-consumer capture loop. Owns the frame source for its lifetime.
pub struct Runner {
    settings: Arc<SettingsStore>,
    status: RunStatus,
    metrics: MetricsCollector,
    bridges: Bridges,
    commands: mpsc::Receiver<ControlCommand>,
}

struct LoopState {
    config: Config,
    detector: ChangeDetector,
    ticker: Interval,
    prev: Option<RgbImage>,
}

enum TickOutcome {
    Continue,
    Cancelled,
}

impl Runner {
    pub fn new(
        settings: Arc<SettingsStore>,
        status: RunStatus,
        metrics: MetricsCollector,
        bridges: Bridges,
        commands: mpsc::Receiver<ControlCommand>,
    ) -> Self {
        Self {
            settings,
            status,
            metrics,
            bridges,
            commands,
        }
    }

    /// Runs until cancelled or told to stop. Events are taken in priority
    /// order: cancellation, then control commands, then ticks.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let config = self.settings.current();
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .with_context(|| format!("failed to create {}", config.output_dir.display()))?;

        self.status.set_mode(RunMode::Running);
        log_info!(
            "capture loop started ({} fps, sensitivity {}, gap {}s)",
            config.capture_fps,
            config.sensitivity,
            config.min_seconds_between_slides
        );

        let mut state = LoopState {
            detector: ChangeDetector::new(config.sensitivity, config.min_gap()),
            ticker: new_ticker(&config),
            prev: None,
            config,
        };
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log_info!("capture loop cancelled");
                    break;
                }
                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(command) => {
                            let mode = self.status.apply(command);
                            log_info!("control command {:?} -> {:?}", command, mode);
                            if mode == RunMode::Stopped {
                                break;
                            }
                        }
                        None => {
                            log_debug!("control channel closed");
                            commands_open = false;
                        }
                    }
                }
                _ = state.ticker.tick() => {
                    self.refresh_config(&mut state).await;
                    if self.status.mode() != RunMode::Running {
                        continue;
                    }
                    if let TickOutcome::Cancelled = self.on_tick(&mut state, &cancel).await {
                        log_info!("capture loop cancelled mid-capture");
                        break;
                    }
                }
            }
        }

        self.status.set_mode(RunMode::Stopped);
        if let Err(err) = self.bridges.source.release().await {
            log_warn!("failed to release frame source: {err:#}");
        }
        Ok(())
    }

    /// Picks up runtime config edits. Fields read only at startup are left
    /// alone with a warning.
    async fn refresh_config(&self, state: &mut LoopState) {
        let latest = self.settings.current();
        if latest == state.config {
            return;
        }

        let restart_only = state.config.restart_required_changes(&latest);
        if !restart_only.is_empty() {
            log_warn!(
                "config change to {} takes effect after a restart",
                restart_only.join(", ")
            );
        }

        if latest.sensitivity != state.config.sensitivity
            || latest.min_seconds_between_slides != state.config.min_seconds_between_slides
        {
            state.detector = state
                .detector
                .retuned(latest.sensitivity, latest.min_gap());
            log_info!(
                "detector retuned: sensitivity {}, gap {}s",
                latest.sensitivity,
                latest.min_seconds_between_slides
            );
        }

        if latest.capture_fps != state.config.capture_fps {
            state.ticker = new_ticker(&latest);
            log_info!("capture rate changed to {} fps", latest.capture_fps);
        }

        if latest.output_dir != state.config.output_dir {
            if let Err(err) = tokio::fs::create_dir_all(&latest.output_dir).await {
                log_error!(
                    "failed to create output dir {}: {err}",
                    latest.output_dir.display()
                );
                self.status.record_error(format!(
                    "output dir {}: {err}",
                    latest.output_dir.display()
                ));
            }
        }

        state.config = latest;
    }

    async fn on_tick(&mut self, state: &mut LoopState, cancel: &CancellationToken) -> TickOutcome {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TickOutcome::Cancelled,
            read = self.bridges.source.read_frame() => read,
        };

        let frame = match read {
            Ok(Some(frame)) if !is_empty_frame(&frame) => frame,
            Ok(_) => return TickOutcome::Continue,
            Err(err) => {
                log_debug!("frame unavailable: {err:#}");
                return TickOutcome::Continue;
            }
        };

        let Some(prev) = state.prev.take() else {
            state.prev = Some(frame);
            return TickOutcome::Continue;
        };

        let detection = state.detector.evaluate(&prev, &frame);
        if !detection.changed {
            state.prev = Some(frame);
            return TickOutcome::Continue;
        }
        log_info!("slide change detected (score {:.3})", detection.score);

        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TickOutcome::Cancelled,
            record = self.process_slide(&frame, detection.score, &state.config) => record,
        };

        let send_ok = record.send_ok;
        let total_ms = record.total_ms;
        if let Err(err) = self.metrics.record(record).await {
            log_error!("failed to append metrics record: {err:#}");
            self.status.record_error(format!("{err:#}"));
        }
        self.status.mark_capture();
        log_info!(
            "slide processed in {}ms ({})",
            total_ms,
            if send_ok { "delivered" } else { "not delivered" }
        );

        state.prev = Some(frame);
        TickOutcome::Continue
    }

    /// Everything a detected slide goes through before its metrics record.
    /// Failures are folded into the record; nothing here aborts the loop.
    async fn process_slide(&self, frame: &RgbImage, score: f64, config: &Config) -> SlideRecord {
        let started = Instant::now();
        let captured_at = Utc::now();

        let raw_path = slide_path(&config.output_dir, captured_at, ArtifactKind::Raw);
        if let Err(err) = save_frame(frame.clone(), raw_path.clone()).await {
            log_warn!("{err:#}");
        }

        let ocr_started = Instant::now();
        let ocr = self.bridges.recognizer.recognize(frame).await;
        let ocr_ms = ocr_started.elapsed().as_millis() as u64;
        let (text, ocr_err) = match ocr {
            Ok(text) => (text, None),
            Err(err) => {
                let message = format!("{err:#}");
                log_warn!("ocr failed after {ocr_ms}ms: {message}");
                self.status.record_error(message.clone());
                (String::new(), Some(message))
            }
        };

        let summary = summarize(&text);

        let slide_path = if config.enable_annotation {
            self.save_annotated(frame, &summary.keywords, captured_at, config)
                .await
                .unwrap_or_else(|| raw_path.clone())
        } else {
            raw_path.clone()
        };

        let caption = build_caption(&summary, config.max_caption_chars, score);

        let send_err = match self.bridges.delivery.deliver(&slide_path, &caption).await {
            Ok(()) => None,
            Err(err) => {
                let message = format!("{err:#}");
                log_warn!("delivery failed: {message}");
                self.status.record_error(message.clone());
                Some(message)
            }
        };

        SlideRecord {
            timestamp: Utc::now(),
            slide_path,
            raw_path,
            change_score: score,
            ocr_ms,
            total_ms: started.elapsed().as_millis() as u64,
            text_chars: text.chars().count(),
            caption_chars: caption.chars().count(),
            send_ok: send_err.is_none(),
            ocr_ok: ocr_err.is_none(),
            error: ocr_err.or(send_err),
        }
    }

    async fn save_annotated(
        &self,
        frame: &RgbImage,
        keywords: &[String],
        captured_at: chrono::DateTime<Utc>,
        config: &Config,
    ) -> Option<PathBuf> {
        let frame = frame.clone();
        let keywords = keywords.to_vec();
        let annotated = tokio::task::spawn_blocking(move || annotate::annotate(&frame, &keywords));
        let annotated = match annotated.await {
            Ok(annotated) => annotated,
            Err(err) => {
                log_warn!("annotation worker join failed: {err}");
                return None;
            }
        };
        let path = slide_path(&config.output_dir, captured_at, ArtifactKind::Annotated);
        match save_frame(annotated, path).await {
            Ok(path) => Some(path),
            Err(err) => {
                log_warn!("{err:#}");
                None
            }
        }
    }
}

fn new_ticker(config: &Config) -> Interval {
    let period = config.tick_period();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
