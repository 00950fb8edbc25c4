//! Seams between the capture loop and the outside world: the camera, the OCR
//! engine and the chat channel. The loop only talks to these traits; the
//! concrete adapters shell out to ffmpeg and tesseract or call Telegram.

pub mod annotate;
pub mod camera;
pub mod ocr;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;

pub use camera::FfmpegCamera;
pub use ocr::TesseractOcr;
pub use telegram::TelegramChannel;

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grabs the next frame. `Ok(None)` means no frame was available this
    /// time, which is not an error.
    async fn read_frame(&mut self) -> Result<Option<RgbImage>>;

    async fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, frame: &RgbImage) -> Result<String>;
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver(&self, artifact: &Path, caption: &str) -> Result<()>;
}
