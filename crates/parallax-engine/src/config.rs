use std::time::Duration;

/// Upper bound on accumulation samples; matches the length of the jitter table.
pub const MAX_ACCUMULATION_SAMPLES: u32 = 8;

/// Engine construction parameters.
///
/// Keep this structure small. Per-surface behavior (stereo, antialiasing request)
/// belongs to the surface's view policy, not here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name given to the engine's OS thread; also prefixes its log records.
    pub thread_name: String,

    /// Surfaces attached to this engine join one shared context instead of
    /// creating one context each.
    pub prefer_shared_context: bool,

    /// Sub-pass count for accumulation antialiasing.
    ///
    /// Clamped to `1..=MAX_ACCUMULATION_SAMPLES`. Only used when a surface requests
    /// scene antialiasing and the backend has no hardware multisample path.
    pub accumulation_samples: u32,

    /// When set, `Render` requests leave frames in the back buffer and a later
    /// `Swap` request presents a batch of surfaces together.
    pub synchronized_swap: bool,

    /// How long the engine waits for a surface's drawing lock before skipping
    /// that surface for the current frame.
    pub drawing_lock_timeout: Duration,

    /// Color used for the per-pass clear (linear RGBA).
    pub clear_color: [f32; 4],
}

impl EngineConfig {
    /// Effective accumulation sample count after clamping.
    pub fn effective_accumulation_samples(&self) -> u32 {
        self.accumulation_samples.clamp(1, MAX_ACCUMULATION_SAMPLES)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name: "parallax-render".to_string(),
            prefer_shared_context: false,
            accumulation_samples: MAX_ACCUMULATION_SAMPLES,
            synchronized_swap: false,
            drawing_lock_timeout: Duration::from_millis(50),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
