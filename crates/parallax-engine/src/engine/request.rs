use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::coords::PixelRect;
use crate::error::EngineError;
use crate::geometry::ImmediatePayload;
use crate::surface::{Surface, SurfaceId};

/// Identifies the view a `Swap` batch belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ViewId(pub u32);

pub enum ImmediateCommand {
    Clear { color: [f32; 4] },
    Draw(ImmediatePayload),
    Swap,
}

impl fmt::Debug for ImmediateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImmediateCommand::Clear { color } => f.debug_struct("Clear").field("color", color).finish(),
            ImmediateCommand::Draw(_) => f.write_str("Draw(..)"),
            ImmediateCommand::Swap => f.write_str("Swap"),
        }
    }
}

#[derive(Debug)]
pub enum CleanupTarget {
    Surface(Arc<Surface>),
    All,
}

/// Work item for the engine thread. Consumed strictly in posting order.
#[derive(Debug)]
pub enum RenderRequest {
    /// Draw one frame on each listed surface.
    Render { surfaces: Vec<Arc<Surface>> },
    /// Present frames left in the back buffers by synchronized rendering.
    Swap { surfaces: Vec<Arc<Surface>>, view: ViewId },
    /// One command bracketed by its own begin/end frame.
    Immediate {
        surface: Arc<Surface>,
        command: ImmediateCommand,
    },
    /// Release one surface's context, or every context.
    Cleanup(CleanupTarget),
    Resize { surface: Arc<Surface>, rect: PixelRect },
    /// Drop the surface's context so the next frame rebuilds it (e.g. after a
    /// stereo or pixel-format change).
    Toggle { surface: Arc<Surface> },
}

impl RenderRequest {
    pub fn render(surfaces: impl IntoIterator<Item = Arc<Surface>>) -> Self {
        RenderRequest::Render {
            surfaces: surfaces.into_iter().collect(),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            RenderRequest::Render { .. } => "render",
            RenderRequest::Swap { .. } => "swap",
            RenderRequest::Immediate { .. } => "immediate",
            RenderRequest::Cleanup(_) => "cleanup",
            RenderRequest::Resize { .. } => "resize",
            RenderRequest::Toggle { .. } => "toggle",
        }
    }
}

/// What happened to each surface a request named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Work completed.
    pub completed: Vec<SurfaceId>,
    /// Not attempted: fatal surface, drawing lock timeout, or wrong state.
    pub skipped: Vec<SurfaceId>,
    /// Terminal failure during this request.
    pub failed: Vec<SurfaceId>,
}

impl RequestOutcome {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// One-shot completion handle returned by `post`.
#[derive(Debug)]
pub struct Completion {
    rx: mpsc::Receiver<RequestOutcome>,
}

impl Completion {
    pub(crate) fn channel() -> (mpsc::SyncSender<RequestOutcome>, Self) {
        let (tx, rx) = mpsc::sync_channel(1);
        (tx, Self { rx })
    }

    /// Blocks until the engine has processed the request.
    pub fn wait(self) -> Result<RequestOutcome, EngineError> {
        self.rx.recv().map_err(|_| EngineError::Disconnected)
    }

    /// `Ok(None)` on timeout; the handle stays usable.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<RequestOutcome>, EngineError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineError::Disconnected),
        }
    }
}
