use ab_glyph::{FontRef, PxScale};
use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

static LABEL_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
const LABEL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_SCALE: f32 = 24.0;
const LABEL_ORIGIN: (i32, i32) = (15, 10);

/// 8-neighbour Laplacian. Negative responses clamp to zero, which keeps the
/// bright side of every edge.
const LAPLACIAN: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];
const EDGE_THRESHOLD: u8 = 60;
const MIN_ROW_EDGES: u32 = 8;
/// Text rows separated by at most this many quiet rows belong to one block.
const MAX_ROW_GAP: u32 = 8;
const MIN_BOX_WIDTH: u32 = 120;
const MIN_BOX_HEIGHT: u32 = 40;
/// Boxes covering this much of both dimensions are the whole frame, not a
/// text block.
const FULL_FRAME_RATIO: f64 = 0.95;
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Returns a copy of `frame` with a `KW: ...` label in the top-left corner
/// and red boxes around text-like regions. Regions are found on the
/// unlabelled frame.
pub fn annotate(frame: &RgbImage, keywords: &[String]) -> RgbImage {
    let regions = text_regions(frame);
    let mut out = frame.clone();
    draw_label(&mut out, &format!("KW: {}", keywords.join(", ")));
    for region in regions {
        draw_outline(&mut out, region);
    }
    out
}

fn draw_label(img: &mut RgbImage, text: &str) {
    match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => {
            let (x, y) = LABEL_ORIGIN;
            draw_text_mut(img, LABEL_COLOR, x, y, PxScale::from(LABEL_SCALE), &font, text);
        }
        Err(err) => log_warn!("keyword label skipped, bundled font is unreadable: {err}"),
    }
}

/// Finds blocks of dense edges, which on a slide are almost always text.
pub fn text_regions(frame: &RgbImage) -> Vec<Region> {
    let (width, height) = frame.dimensions();
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let gray = imageops::grayscale(frame);
    let edges: GrayImage = imageops::filter3x3(&gray, &LAPLACIAN);

    let mut regions = Vec::new();
    let mut band: Option<Band> = None;
    let mut quiet_rows = 0u32;

    for y in 0..height {
        let row = row_profile(&edges, y);
        match (row, band.as_mut()) {
            (Some((min_x, max_x)), Some(open)) => {
                open.extend(y, min_x, max_x);
                quiet_rows = 0;
            }
            (Some((min_x, max_x)), None) => {
                band = Some(Band::new(y, min_x, max_x));
                quiet_rows = 0;
            }
            (None, Some(_)) => {
                quiet_rows += 1;
                if quiet_rows > MAX_ROW_GAP {
                    if let Some(closed) = band.take() {
                        regions.extend(closed.into_region(width, height));
                    }
                }
            }
            (None, None) => {}
        }
    }
    if let Some(closed) = band {
        regions.extend(closed.into_region(width, height));
    }
    regions
}

/// Horizontal extent of the edge pixels in row `y`, if the row has enough of
/// them to look like text.
fn row_profile(edges: &GrayImage, y: u32) -> Option<(u32, u32)> {
    let mut count = 0;
    let mut min_x = u32::MAX;
    let mut max_x = 0;
    for x in 0..edges.width() {
        if edges.get_pixel(x, y)[0] > EDGE_THRESHOLD {
            count += 1;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
        }
    }
    (count >= MIN_ROW_EDGES).then_some((min_x, max_x))
}

struct Band {
    top: u32,
    bottom: u32,
    left: u32,
    right: u32,
}

impl Band {
    fn new(y: u32, min_x: u32, max_x: u32) -> Self {
        Self {
            top: y,
            bottom: y,
            left: min_x,
            right: max_x,
        }
    }

    fn extend(&mut self, y: u32, min_x: u32, max_x: u32) {
        self.bottom = y;
        self.left = self.left.min(min_x);
        self.right = self.right.max(max_x);
    }

    fn into_region(self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let region = Region {
            x: self.left,
            y: self.top,
            width: self.right - self.left + 1,
            height: self.bottom - self.top + 1,
        };
        let full_frame = region.width as f64 >= frame_width as f64 * FULL_FRAME_RATIO
            && region.height as f64 >= frame_height as f64 * FULL_FRAME_RATIO;
        (region.width >= MIN_BOX_WIDTH && region.height >= MIN_BOX_HEIGHT && !full_frame)
            .then_some(region)
    }
}

fn draw_outline(img: &mut RgbImage, region: Region) {
    let (width, height) = img.dimensions();
    let right = (region.x + region.width).min(width);
    let bottom = (region.y + region.height).min(height);

    for y in region.y..bottom {
        for x in region.x..right {
            let on_border = x < region.x + BOX_THICKNESS
                || x + BOX_THICKNESS >= right
                || y < region.y + BOX_THICKNESS
                || y + BOX_THICKNESS >= bottom;
            if on_border {
                img.put_pixel(x, y, BOX_COLOR);
            }
        }
    }
}
