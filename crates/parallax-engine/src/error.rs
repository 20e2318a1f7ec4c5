//! Error taxonomy.
//!
//! Only [`ErrorKind::ContextCreation`] and [`ErrorKind::NativeDraw`] are terminal for a
//! surface and reach the error listener; callback and resource-free failures are absorbed
//! where they happen and only logged.

use crate::device::{ContextId, ResourceId, ResourceKind};
use crate::surface::SurfaceId;

/// Failure reported by a native graphics call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation}: {message}")]
pub struct BackendError {
    /// Backend operation that failed (e.g. "create_context").
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }

    /// Flattens an `anyhow` chain into a backend error, keeping every context layer.
    pub fn from_anyhow(operation: &'static str, err: anyhow::Error) -> Self {
        Self::new(operation, format!("{err:#}"))
    }
}

/// Classification used by listeners and logs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ContextCreation,
    NativeDraw,
    Callback,
    ResourceFree,
}

impl ErrorKind {
    /// Terminal kinds move the surface to `Fatal` and are reported to listeners.
    pub fn is_terminal(self) -> bool {
        matches!(self, ErrorKind::ContextCreation | ErrorKind::NativeDraw)
    }
}

/// Errors produced while executing render requests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("surface {surface}: context creation failed: {source}")]
    ContextCreation {
        surface: SurfaceId,
        #[source]
        source: BackendError,
    },

    #[error("surface {surface}: native draw failed: {source}")]
    NativeDraw {
        surface: SurfaceId,
        #[source]
        source: BackendError,
    },

    #[error("surface {surface}: {hook} hook failed: {message}")]
    Callback {
        surface: SurfaceId,
        hook: &'static str,
        message: String,
    },

    #[error("context {context}: freeing {kind:?} {id} failed: {source}")]
    ResourceFree {
        context: ContextId,
        kind: ResourceKind,
        id: ResourceId,
        #[source]
        source: BackendError,
    },
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::ContextCreation { .. } => ErrorKind::ContextCreation,
            RenderError::NativeDraw { .. } => ErrorKind::NativeDraw,
            RenderError::Callback { .. } => ErrorKind::Callback,
            RenderError::ResourceFree { .. } => ErrorKind::ResourceFree,
        }
    }

    /// Surface the error is attributed to, if any.
    pub fn surface(&self) -> Option<SurfaceId> {
        match self {
            RenderError::ContextCreation { surface, .. }
            | RenderError::NativeDraw { surface, .. }
            | RenderError::Callback { surface, .. } => Some(*surface),
            RenderError::ResourceFree { .. } => None,
        }
    }
}

/// Failures of the engine itself (thread lifecycle, queue).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn engine thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine thread is no longer accepting requests")]
    Disconnected,

    #[error("engine thread panicked")]
    ThreadPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_context_and_draw_failures_are_terminal() {
        assert!(ErrorKind::ContextCreation.is_terminal());
        assert!(ErrorKind::NativeDraw.is_terminal());
        assert!(!ErrorKind::Callback.is_terminal());
        assert!(!ErrorKind::ResourceFree.is_terminal());
    }

    #[test]
    fn from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("adapter lost").context("failed to create device");
        let be = BackendError::from_anyhow("create_context", err);
        assert_eq!(be.message, "failed to create device: adapter lost");
        assert_eq!(be.to_string(), "create_context: failed to create device: adapter lost");
    }

    #[test]
    fn render_error_reports_kind_and_surface() {
        let err = RenderError::NativeDraw {
            surface: SurfaceId::from_raw(7),
            source: BackendError::new("swap", "device lost"),
        };
        assert_eq!(err.kind(), ErrorKind::NativeDraw);
        assert_eq!(err.surface(), Some(SurfaceId::from_raw(7)));
    }
}
