use image::{imageops, GrayImage, RgbImage};
use tokio::time::{Duration, Instant};

/// Gaussian sigma matching a 5x5 smoothing kernel.
const BLUR_SIGMA: f32 = 1.1;
/// Luminance difference (8-bit) above which a pixel counts as changed.
const DIFF_THRESHOLD: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    pub changed: bool,
    pub score: f64,
}

impl DetectionResult {
    const NONE: DetectionResult = DetectionResult {
        changed: false,
        score: 0.0,
    };
}

/// Decides whether two consecutive frames show different slides.
///
/// `score` is the fraction of pixels whose smoothed luminance moved by more
/// than [`DIFF_THRESHOLD`]. A change is reported when the score reaches
/// `sensitivity` and at least `min_gap` has passed since the last reported
/// change, which debounces the frames captured mid-transition.
#[derive(Debug)]
pub struct ChangeDetector {
    sensitivity: f64,
    min_gap: Duration,
    last_trigger: Option<Instant>,
}

impl ChangeDetector {
    pub fn new(sensitivity: f64, min_gap: Duration) -> Self {
        Self {
            sensitivity,
            min_gap,
            last_trigger: None,
        }
    }

    /// Builds a detector with new thresholds that keeps this one's cooldown.
    pub fn retuned(&self, sensitivity: f64, min_gap: Duration) -> Self {
        Self {
            sensitivity,
            min_gap,
            last_trigger: self.last_trigger,
        }
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    pub fn evaluate(&mut self, prev: &RgbImage, cur: &RgbImage) -> DetectionResult {
        self.evaluate_at(prev, cur, Instant::now())
    }

    pub fn evaluate_at(
        &mut self,
        prev: &RgbImage,
        cur: &RgbImage,
        now: Instant,
    ) -> DetectionResult {
        let Some(score) = change_score(prev, cur) else {
            return DetectionResult::NONE;
        };

        let changed = score >= self.sensitivity && self.cooldown_elapsed(now);
        if changed {
            self.last_trigger = Some(now);
        }
        DetectionResult { changed, score }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_trigger
            .map(|last| now.saturating_duration_since(last) >= self.min_gap)
            .unwrap_or(true)
    }
}

pub fn is_empty_frame(frame: &RgbImage) -> bool {
    frame.width() == 0 || frame.height() == 0
}

/// Fraction of changed pixels, or `None` when the frames cannot be compared.
pub fn change_score(prev: &RgbImage, cur: &RgbImage) -> Option<f64> {
    if is_empty_frame(prev) || is_empty_frame(cur) {
        return None;
    }
    if prev.dimensions() != cur.dimensions() {
        return None;
    }

    let total = u64::from(prev.width()) * u64::from(prev.height());
    if total == 0 {
        return None;
    }

    let prev = smoothed_luma(prev);
    let cur = smoothed_luma(cur);

    let changed = prev
        .as_raw()
        .iter()
        .zip(cur.as_raw())
        .filter(|(a, b)| a.abs_diff(**b) > DIFF_THRESHOLD)
        .count() as u64;

    Some(changed as f64 / total as f64)
}

fn smoothed_luma(frame: &RgbImage) -> GrayImage {
    let gray = imageops::grayscale(frame);
    imageops::blur(&gray, BLUR_SIGMA)
}
