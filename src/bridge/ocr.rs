use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::TextRecognizer;

const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// OCR through the `tesseract` CLI, fed a PNG on stdin.
pub struct TesseractOcr {
    lang: String,
}

impl TesseractOcr {
    /// Probes `tesseract --version` so a missing install fails at startup.
    pub async fn new(lang: impl Into<String>) -> Result<Self> {
        let status = Command::new("tesseract")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("tesseract is not installed or not on PATH")?;
        if !status.success() {
            bail!("tesseract --version exited with {status}");
        }
        Ok(Self { lang: lang.into() })
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }
}

#[async_trait]
impl TextRecognizer for TesseractOcr {
    async fn recognize(&self, frame: &RgbImage) -> Result<String> {
        let frame = frame.clone();
        let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut buf = Cursor::new(Vec::new());
            frame
                .write_to(&mut buf, ImageFormat::Png)
                .context("failed to encode frame for OCR")?;
            Ok(buf.into_inner())
        })
        .await
        .context("ocr encode worker join failed")??;

        let mut child = Command::new("tesseract")
            .args(["stdin", "stdout", "-l", &self.lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn tesseract")?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("tesseract stdin unavailable"))?;
        stdin
            .write_all(&png)
            .await
            .context("failed to pipe frame to tesseract")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("tesseract did not finish")?;
        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        log_debug!("tesseract returned {} chars", text.chars().count());
        Ok(text)
    }
}
