//! View derivation.
//!
//! Turns window geometry, screen calibration and view policy into per-eye projection
//! and view matrices plus world-space frustum planes. Everything here is pure math over
//! snapshotted inputs; the engine decides when to refresh.
//!
//! Coordinate frames, innermost first:
//! - image plate: physical screen, metres, origin lower-left, +Z toward the viewer
//! - eye: image plate translated so the eye sits at the origin, looking down -Z
//! - coexistence: aligns physical and virtual space
//! - view platform (VPC): the moving platform inside the virtual world
//! - world
//!
//! Clip space follows the GL convention (all axes in [-1, 1]).

mod cache;
mod dirty;
mod frustum;
mod policy;
pub mod projection;
mod screen;

pub use cache::{DerivedView, Eye, EyeView, RefreshResult, ViewDerivationCache, ViewInputs, WindowExtent};
pub use dirty::{Consumer, DirtyFlags, DirtyMasks};
pub use frustum::{Frustum, Plane};
pub use policy::{
    ClipPolicy, EyepointPolicy, MonoscopicPolicy, ProjectionPolicy, ScreenScalePolicy, ViewPolicy,
    WindowResizePolicy,
};
pub use screen::Screen;
