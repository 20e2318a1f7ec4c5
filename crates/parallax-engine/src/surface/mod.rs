//! Drawing surfaces.
//!
//! A [`Surface`] is created by the windowing layer and shared with the engine
//! through an `Arc`. External threads publish view inputs into it; the engine
//! thread owns its lifecycle state.

mod canvas;
mod id;
mod state;

pub use canvas::{Surface, SurfaceConfig};
pub use id::SurfaceId;
pub use state::SurfaceState;
