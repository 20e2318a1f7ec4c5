use glam::DMat4;

use crate::device::{
    BackendResult, ContextId, CurrentContext, GraphicsBackend, ResourceDesc, ResourceId,
};
use crate::surface::SurfaceId;
use crate::view::{DirtyFlags, Eye, Frustum};

/// Which slot of the fixed draw order a call belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
    Background,
    Opaque,
    Ordered,
    Transparent,
    Immediate,
}

/// Matrices for one pass. For the background layer these are the infinite
/// variants (no translation, far plane at infinity).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PassMatrices {
    /// Eye → clip, jittered for the current sample.
    pub projection: DMat4,
    /// View platform → eye.
    pub view: DMat4,
    pub world_to_vpc: DMat4,
}

impl PassMatrices {
    #[inline]
    pub fn clip_from_world(&self) -> DMat4 {
        self.projection * self.view * self.world_to_vpc
    }
}

/// Everything a geometry source may touch while drawing one layer of one pass.
pub struct DrawPass<'a, 'c, B: GraphicsBackend> {
    pub(crate) surface: SurfaceId,
    pub(crate) layer: Layer,
    pub(crate) eye: Eye,
    pub(crate) sample: u32,
    pub(crate) samples: u32,
    pub(crate) matrices: PassMatrices,
    pub(crate) frustum: Option<&'a Frustum>,
    pub(crate) rebuild: bool,
    pub(crate) context: &'a mut CurrentContext<'c, B>,
    pub(crate) consumed: &'a mut DirtyFlags,
}

impl<B: GraphicsBackend> DrawPass<'_, '_, B> {
    #[inline]
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    #[inline]
    pub fn layer(&self) -> Layer {
        self.layer
    }

    #[inline]
    pub fn eye(&self) -> Eye {
        self.eye
    }

    /// Accumulation sample index, `0..sample_count()`.
    #[inline]
    pub fn sample(&self) -> u32 {
        self.sample
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    #[inline]
    pub fn matrices(&self) -> &PassMatrices {
        &self.matrices
    }

    /// World-space frustum of the finite pass, for culling. `None` for
    /// immediate draws and the background layer.
    #[inline]
    pub fn frustum(&self) -> Option<&Frustum> {
        self.frustum
    }

    /// Set on the first frame a surface draws with a new context: every cached
    /// GPU object from a previous context is gone and must be recreated.
    #[inline]
    pub fn rebuild_requested(&self) -> bool {
        self.rebuild
    }

    /// Backend and native context, for issuing draw calls.
    #[inline]
    pub fn parts(&mut self) -> (&mut B, &mut B::Context) {
        self.context.parts()
    }

    /// Allocates a context-owned object. Free it later through the engine's
    /// [`ResourceFreeList`](crate::device::ResourceFreeList).
    pub fn create_resource(&mut self, desc: &ResourceDesc) -> BackendResult<ResourceId> {
        self.context.create_resource(desc)
    }

    /// Context the pass runs under; needed to enqueue frees.
    #[inline]
    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// Records that scene state behind `flags` was bound this pass. Only
    /// lights and environment are tracked here; view bits are consumed by
    /// the view refresh.
    pub fn mark_consumed(&mut self, flags: DirtyFlags) {
        *self.consumed |= flags & (DirtyFlags::LIGHTS | DirtyFlags::ENVIRONMENT);
    }
}
