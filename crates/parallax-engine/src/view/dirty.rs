bitflags::bitflags! {
    /// Change bits published by external threads and consumed by the frame pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u32 {
        /// Window moved or resized.
        const CANVAS        = 1 << 0;
        /// Screen calibration (metres per pixel, tracker base).
        const SCREEN        = 1 << 1;
        /// Any view policy field.
        const VIEW_POLICY   = 1 << 2;
        /// Manual or tracked eye positions.
        const EYE           = 1 << 3;
        /// Clip-volume override.
        const CLIP          = 1 << 4;
        /// View platform transform.
        const VIEW_PLATFORM = 1 << 5;
        /// Stereo enable toggled.
        const STEREO        = 1 << 6;
        /// Background geometry set changed.
        const BACKGROUND    = 1 << 7;
        /// Light set changed; consumed only when lights were bound.
        const LIGHTS        = 1 << 8;
        /// Fog/environment set changed; consumed only when bound.
        const ENVIRONMENT   = 1 << 9;

        /// Bits that invalidate the view derivation cache.
        const VIEW_CACHE = Self::CANVAS.bits()
            | Self::SCREEN.bits()
            | Self::VIEW_POLICY.bits()
            | Self::EYE.bits()
            | Self::CLIP.bits()
            | Self::VIEW_PLATFORM.bits()
            | Self::STEREO.bits();
    }
}

/// Pipeline phase owning an independent dirty mask.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Consumer {
    /// Structural update ("bin") phase, external to the engine.
    Bin,
    /// Frame execution phase.
    Renderer,
}

impl Consumer {
    const ALL: [Consumer; 2] = [Consumer::Bin, Consumer::Renderer];

    #[inline]
    fn index(self) -> usize {
        match self {
            Consumer::Bin => 0,
            Consumer::Renderer => 1,
        }
    }
}

/// One dirty mask per consumer role.
///
/// Publishing marks every role; each role clears only what it consumed, so a bit
/// consumed by the renderer stays set for the bin phase and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyMasks {
    masks: [DirtyFlags; 2],
}

impl DirtyMasks {
    /// All roles start fully dirty so the first frame derives everything.
    pub fn all_dirty() -> Self {
        Self {
            masks: [DirtyFlags::all(); 2],
        }
    }

    pub fn clean() -> Self {
        Self {
            masks: [DirtyFlags::empty(); 2],
        }
    }

    /// Marks `flags` for every consumer.
    pub fn mark(&mut self, flags: DirtyFlags) {
        for consumer in Consumer::ALL {
            self.masks[consumer.index()] |= flags;
        }
    }

    pub fn mark_for(&mut self, consumer: Consumer, flags: DirtyFlags) {
        self.masks[consumer.index()] |= flags;
    }

    #[inline]
    pub fn get(&self, consumer: Consumer) -> DirtyFlags {
        self.masks[consumer.index()]
    }

    #[inline]
    pub fn is_dirty(&self, consumer: Consumer, flags: DirtyFlags) -> bool {
        self.get(consumer).intersects(flags)
    }

    /// Returns the bits of `mask` set for `consumer` and clears them.
    pub fn take(&mut self, consumer: Consumer, mask: DirtyFlags) -> DirtyFlags {
        let slot = &mut self.masks[consumer.index()];
        let taken = *slot & mask;
        slot.remove(taken);
        taken
    }

    pub fn clear(&mut self, consumer: Consumer, mask: DirtyFlags) {
        self.masks[consumer.index()].remove(mask);
    }
}

impl Default for DirtyMasks {
    fn default() -> Self {
        Self::all_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_sets_every_consumer() {
        let mut masks = DirtyMasks::clean();
        masks.mark(DirtyFlags::CANVAS);
        assert!(masks.is_dirty(Consumer::Bin, DirtyFlags::CANVAS));
        assert!(masks.is_dirty(Consumer::Renderer, DirtyFlags::CANVAS));
    }

    #[test]
    fn take_clears_only_the_requesting_consumer() {
        let mut masks = DirtyMasks::clean();
        masks.mark(DirtyFlags::CANVAS | DirtyFlags::LIGHTS);

        let taken = masks.take(Consumer::Renderer, DirtyFlags::VIEW_CACHE);
        assert_eq!(taken, DirtyFlags::CANVAS);
        assert_eq!(masks.get(Consumer::Renderer), DirtyFlags::LIGHTS);
        assert_eq!(masks.get(Consumer::Bin), DirtyFlags::CANVAS | DirtyFlags::LIGHTS);
    }

    #[test]
    fn view_cache_group_excludes_bound_resources() {
        assert!(!DirtyFlags::VIEW_CACHE.contains(DirtyFlags::LIGHTS));
        assert!(!DirtyFlags::VIEW_CACHE.contains(DirtyFlags::ENVIRONMENT));
        assert!(DirtyFlags::VIEW_CACHE.contains(DirtyFlags::VIEW_PLATFORM));
    }

    #[test]
    fn new_masks_are_fully_dirty() {
        let masks = DirtyMasks::default();
        assert_eq!(masks.get(Consumer::Renderer), DirtyFlags::all());
    }
}
