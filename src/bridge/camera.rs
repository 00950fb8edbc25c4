use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::FrameSource;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const FFMPEG: &str = "ffmpeg";

/// V4L2 camera read one still at a time through `ffmpeg`.
pub struct FfmpegCamera {
    binary: String,
    device: PathBuf,
    failed_grabs: u32,
}

impl FfmpegCamera {
    /// Fails unless ffmpeg runs, the device node exists and one frame can be
    /// grabbed, so a broken camera stops startup instead of producing an
    /// endless run of empty ticks.
    pub async fn open(index: i32) -> Result<Self> {
        Self::open_with(FFMPEG, index).await
    }

    pub async fn open_with(binary: &str, index: i32) -> Result<Self> {
        if index < 0 {
            bail!("camera_index must not be negative, got {index}");
        }

        let status = Command::new(binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("{binary} is not installed or not on PATH"))?;
        if !status.success() {
            bail!("{binary} -version exited with {status}");
        }

        let device = PathBuf::from(format!("/dev/video{index}"));
        if !device.exists() {
            bail!("could not open camera {}", device.display());
        }

        let mut camera = Self {
            binary: binary.to_string(),
            device,
            failed_grabs: 0,
        };
        if camera.read_frame().await?.is_none() {
            bail!("could not read a frame from {}", camera.device.display());
        }
        log_info!("camera opened at {}", camera.device.display());
        Ok(camera)
    }
}

#[async_trait]
impl FrameSource for FfmpegCamera {
    async fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-f", "v4l2", "-i"])
            .arg(&self.device)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))?;

        if !output.status.success() || output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Only the first failure of a streak is worth a warning.
            if self.failed_grabs == 0 {
                log_warn!(
                    "frame grab from {} failed ({}): {}",
                    self.device.display(),
                    output.status,
                    stderr.trim()
                );
            } else {
                log_debug!("frame grab failed again ({} in a row)", self.failed_grabs + 1);
            }
            self.failed_grabs = self.failed_grabs.saturating_add(1);
            return Ok(None);
        }

        if self.failed_grabs > 0 {
            log_info!(
                "camera {} recovered after {} failed grabs",
                self.device.display(),
                self.failed_grabs
            );
            self.failed_grabs = 0;
        }

        let bytes = output.stdout;
        let frame = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .context("frame decode worker join failed")?
            .context("failed to decode frame")?;
        Ok(Some(frame.to_rgb8()))
    }

    async fn release(&mut self) -> Result<()> {
        log_info!("camera {} released", self.device.display());
        Ok(())
    }
}
