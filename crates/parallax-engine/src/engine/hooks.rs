use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::RenderError;
use crate::surface::SurfaceId;
use crate::view::Eye;

/// Per-surface user callbacks around a frame.
///
/// Every method defaults to a no-op. Errors and panics are caught by the engine,
/// logged as callback failures, and never abort the frame.
pub trait RenderHooks: Send {
    /// Before the first pass of a frame.
    fn pre_render(&mut self, _surface: SurfaceId) -> anyhow::Result<()> {
        Ok(())
    }

    /// After all samples of one eye have been drawn.
    fn render_field(&mut self, _surface: SurfaceId, _eye: Eye) -> anyhow::Result<()> {
        Ok(())
    }

    /// After the last pass, before the swap.
    fn post_render(&mut self, _surface: SurfaceId) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_swap(&mut self, _surface: SurfaceId) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs one hook, turning an error or a panic into [`RenderError::Callback`].
pub(crate) fn invoke(
    surface: SurfaceId,
    hook: &'static str,
    f: impl FnOnce() -> anyhow::Result<()>,
) -> Result<(), RenderError> {
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    Err(RenderError::Callback {
        surface,
        hook,
        message,
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_hook_passes_through() {
        assert!(invoke(SurfaceId::from_raw(1), "pre_render", || Ok(())).is_ok());
    }

    #[test]
    fn hook_error_becomes_callback_error() {
        let err = invoke(SurfaceId::from_raw(1), "post_swap", || anyhow::bail!("disk full"))
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::Callback {
                surface: SurfaceId::from_raw(1),
                hook: "post_swap",
                message: "disk full".to_string(),
            }
        );
    }

    #[test]
    fn hook_panic_is_contained() {
        let err = invoke(SurfaceId::from_raw(2), "render_field", || panic!("boom {}", 3))
            .unwrap_err();
        match err {
            RenderError::Callback { message, .. } => assert_eq!(message, "panicked: boom 3"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
