//! Frame execution.
//!
//! A single engine thread owns every graphics context and executes queued
//! [`RenderRequest`]s in order. Surfaces are shared with the application through
//! `Arc<Surface>`; the engine only ever reads their published state through a
//! snapshot at the start of each frame.

mod frame;
mod hooks;
mod listener;
mod request;
mod thread;

pub use frame::{FramePlan, JITTER_PATTERN};
pub use hooks::RenderHooks;
pub use listener::{ErrorEvent, ErrorListener};
pub use request::{
    CleanupTarget, Completion, ImmediateCommand, RenderRequest, RequestOutcome, ViewId,
};
pub use thread::FrameExecutionEngine;
