use std::sync::mpsc;

use crate::error::{ErrorKind, RenderError};
use crate::surface::SurfaceId;

/// Terminal failure delivered to an [`ErrorListener`].
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub surface: Option<SurfaceId>,
    pub error: RenderError,
}

/// Sending half of the error channel.
///
/// Unbounded, so notifying never blocks the engine thread. A dropped receiver
/// is not an error; events are discarded.
#[derive(Debug, Clone)]
pub struct ErrorListener {
    tx: mpsc::Sender<ErrorEvent>,
}

impl ErrorListener {
    pub fn channel() -> (Self, mpsc::Receiver<ErrorEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, error: RenderError) {
        let event = ErrorEvent {
            kind: error.kind(),
            surface: error.surface(),
            error,
        };
        if self.tx.send(event).is_err() {
            log::debug!("error listener dropped; discarding event");
        }
    }
}
