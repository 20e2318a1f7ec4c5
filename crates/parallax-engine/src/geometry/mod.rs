//! Geometry supplied to the engine by the scene side.

mod pass;
mod source;

pub use pass::{DrawPass, Layer, PassMatrices};
pub use source::{GeometrySource, ImmediatePayload};
