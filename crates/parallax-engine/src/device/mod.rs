//! Native graphics contexts and the objects they own.
//!
//! This module is responsible for:
//! - the [`GraphicsBackend`] capability the engine drives
//! - the context registry (creation, sharing, teardown, current-context scoping)
//! - deferred deletion of context-owned resources
//! - an offscreen wgpu backend

mod backend;
mod context;
mod free_list;
mod gpu;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    BackendResult, GraphicsBackend, ResourceDesc, ResourceId, ResourceKind, SurfaceDesc,
};
pub use context::{ContextHandle, ContextId, ContextRegistry, CurrentContext, DeleteOutcome};
pub use free_list::{DrainReport, ResourceFreeList};
pub use gpu::{GpuInit, WgpuBackend, WgpuContext};
