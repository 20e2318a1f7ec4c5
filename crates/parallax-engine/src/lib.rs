//! Parallax engine crate.
//!
//! Renders one or more drawing surfaces from a shared scene description:
//! per-surface view derivation (stereo, head tracking, clip policy), a
//! dedicated engine thread that owns the graphics contexts, and a multi-pass
//! frame loop (eyes × accumulation samples × draw layers) driven through the
//! [`device::GraphicsBackend`] seam.

pub mod config;
pub mod coords;
pub mod device;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod surface;
pub mod view;

pub use config::EngineConfig;
pub use coords::PixelRect;
pub use engine::{
    CleanupTarget, Completion, ErrorEvent, ErrorListener, FrameExecutionEngine, ImmediateCommand,
    RenderHooks, RenderRequest, RequestOutcome, ViewId,
};
pub use error::{BackendError, EngineError, ErrorKind, RenderError};
pub use geometry::{DrawPass, GeometrySource, ImmediatePayload, Layer, PassMatrices};
pub use surface::{Surface, SurfaceConfig, SurfaceId, SurfaceState};
