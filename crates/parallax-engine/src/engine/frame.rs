use crate::config::MAX_ACCUMULATION_SAMPLES;
use crate::view::Eye;

/// Sub-pixel offsets for accumulation antialiasing, in pixels.
///
/// Eight-sample pattern; fewer samples use a prefix.
pub const JITTER_PATTERN: [[f64; 2]; MAX_ACCUMULATION_SAMPLES as usize] = [
    [-0.334818, 0.435331],
    [0.286438, -0.393495],
    [0.459462, 0.141540],
    [-0.414498, -0.192829],
    [-0.183790, 0.082102],
    [-0.079263, -0.317383],
    [0.102254, 0.299133],
    [0.164216, -0.054399],
];

/// Pass layout of one frame: eyes × accumulation samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    stereo: bool,
    samples: u32,
}

impl FramePlan {
    /// `samples` is only honoured when antialiasing is requested and the backend
    /// cannot multisample.
    pub fn new(stereo: bool, antialias: bool, multisample: bool, samples: u32) -> Self {
        let samples = if antialias && !multisample {
            samples.clamp(1, MAX_ACCUMULATION_SAMPLES)
        } else {
            1
        };
        Self { stereo, samples }
    }

    pub fn eyes(&self) -> &'static [Eye] {
        const STEREO: &[Eye] = &Eye::BOTH;
        const MONO: &[Eye] = &[Eye::Left];
        if self.stereo { STEREO } else { MONO }
    }

    #[inline]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    #[inline]
    pub fn accumulating(&self) -> bool {
        self.samples > 1
    }

    /// Per-sample accumulation weight; the weights of a frame sum to one.
    #[inline]
    pub fn weight(&self) -> f32 {
        1.0 / self.samples as f32
    }

    /// Projection offset in pixels for `sample`; zero without accumulation.
    pub fn jitter(&self, sample: u32) -> (f64, f64) {
        if !self.accumulating() {
            return (0.0, 0.0);
        }
        let [dx, dy] = JITTER_PATTERN[sample as usize % JITTER_PATTERN.len()];
        (dx, dy)
    }

    pub fn pass_count(&self) -> usize {
        self.eyes().len() * self.samples as usize
    }
}
