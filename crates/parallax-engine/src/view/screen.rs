use glam::{DMat4, DVec2};

/// Default calibration: 90 dots per inch.
const DEFAULT_METERS_PER_PIXEL: f64 = 0.0254 / 90.0;

/// Physical calibration of the screen a surface lives on.
#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    /// Screen size in device pixels.
    pub width_px: u32,
    pub height_px: u32,

    /// Physical size of one pixel in metres (x, y).
    pub meters_per_pixel: DVec2,

    /// Calibration from tracker base to image plate.
    pub tracker_base_to_image_plate: DMat4,
}

impl Screen {
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
            meters_per_pixel: DVec2::splat(DEFAULT_METERS_PER_PIXEL),
            tracker_base_to_image_plate: DMat4::IDENTITY,
        }
    }

    /// Physical screen width in metres.
    #[inline]
    pub fn physical_width(&self) -> f64 {
        self.width_px as f64 * self.meters_per_pixel.x
    }

    #[inline]
    pub fn physical_height(&self) -> f64 {
        self.height_px as f64 * self.meters_per_pixel.y
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}
