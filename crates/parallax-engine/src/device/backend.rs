use std::fmt;

use crate::coords::PixelRect;
use crate::error::BackendError;
use crate::surface::SurfaceId;
use crate::view::Eye;

pub type BackendResult<T> = Result<T, BackendError>;

/// Backend-allocated GPU object id. Unique within its owning context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    DisplayList,
}

/// Request for a context-owned GPU object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDesc {
    Texture { width: u32, height: u32 },
    /// Recorded draw commands; backends without retained command lists may
    /// back this with a buffer.
    DisplayList { size_bytes: u64 },
}

impl ResourceDesc {
    #[inline]
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDesc::Texture { .. } => ResourceKind::Texture,
            ResourceDesc::DisplayList { .. } => ResourceKind::DisplayList,
        }
    }
}

/// What a backend needs to know to give a surface its render targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub id: SurfaceId,
    pub rect: PixelRect,
    /// Allocate separate left/right back buffers.
    pub stereo: bool,
    pub offscreen: bool,
}

/// Native graphics capability driven by the engine thread.
///
/// Every call except `create_context`/`destroy_context` is issued while the
/// context passed in is current. Frame calls name the surface they target
/// because one shared context may serve several surfaces.
pub trait GraphicsBackend: Send + 'static {
    type Context: Send;

    /// Creates a context and the first surface's targets.
    fn create_context(&mut self, surface: &SurfaceDesc) -> BackendResult<Self::Context>;

    fn destroy_context(&mut self, context: Self::Context) -> BackendResult<()>;

    /// Adds another surface's targets to an existing shared context.
    fn attach_surface(
        &mut self,
        context: &mut Self::Context,
        surface: &SurfaceDesc,
    ) -> BackendResult<()>;

    fn detach_surface(&mut self, context: &mut Self::Context, surface: SurfaceId);

    /// Binds `context` to the calling thread, or unbinds when `None`.
    fn make_current(&mut self, context: Option<&mut Self::Context>) -> BackendResult<()>;

    /// True when scene antialiasing can be satisfied by hardware multisampling,
    /// making the accumulation loop unnecessary.
    fn supports_multisample(&self, context: &Self::Context) -> bool;

    fn create_resource(
        &mut self,
        context: &mut Self::Context,
        desc: &ResourceDesc,
    ) -> BackendResult<ResourceId>;

    fn delete_resource(
        &mut self,
        context: &mut Self::Context,
        kind: ResourceKind,
        id: ResourceId,
    ) -> BackendResult<()>;

    fn resize_target(
        &mut self,
        context: &mut Self::Context,
        surface: SurfaceId,
        rect: PixelRect,
    ) -> BackendResult<()>;

    fn begin_frame(&mut self, context: &mut Self::Context, surface: SurfaceId) -> BackendResult<()>;

    /// Directs subsequent clears and draws at one eye's back buffer.
    fn select_eye(
        &mut self,
        context: &mut Self::Context,
        surface: SurfaceId,
        eye: Eye,
    ) -> BackendResult<()>;

    fn clear(
        &mut self,
        context: &mut Self::Context,
        surface: SurfaceId,
        color: [f32; 4],
    ) -> BackendResult<()>;

    /// Zeroes the accumulation buffer and routes draws to the scratch target.
    fn accum_clear(&mut self, context: &mut Self::Context, surface: SurfaceId)
    -> BackendResult<()>;

    /// Adds the scratch target into the accumulation buffer scaled by `weight`.
    fn accumulate(
        &mut self,
        context: &mut Self::Context,
        surface: SurfaceId,
        weight: f32,
    ) -> BackendResult<()>;

    /// Writes the accumulation buffer into the selected eye's back buffer.
    fn accum_return(
        &mut self,
        context: &mut Self::Context,
        surface: SurfaceId,
    ) -> BackendResult<()>;

    fn end_frame(&mut self, context: &mut Self::Context, surface: SurfaceId) -> BackendResult<()>;

    /// Drops whatever was recorded since `begin_frame` without submitting it.
    /// Called after a failed frame so a shared context does not carry the
    /// partial work into a sibling's frame.
    fn abort_frame(&mut self, context: &mut Self::Context, surface: SurfaceId);

    fn swap(&mut self, context: &mut Self::Context, surface: SurfaceId) -> BackendResult<()>;
}
