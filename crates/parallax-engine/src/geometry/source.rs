use std::any::Any;
use std::sync::Arc;

use crate::device::{BackendResult, GraphicsBackend};
use crate::surface::SurfaceId;

use super::DrawPass;

/// Opaque payload of an immediate-mode draw.
pub type ImmediatePayload = Arc<dyn Any + Send + Sync>;

/// Supplies draw commands per layer.
///
/// The engine calls the layers of one pass in a fixed order: background,
/// opaque, ordered, transparent. An error is a native failure and makes the
/// surface fatal; so does a panic.
pub trait GeometrySource<B: GraphicsBackend>: Send + 'static {
    /// Whether `surface` has background geometry this frame. Decides whether the
    /// infinite matrices are derived and the background layer is drawn.
    fn has_background(&self, _surface: SurfaceId) -> bool {
        false
    }

    fn draw_background(&mut self, _pass: &mut DrawPass<'_, '_, B>) -> BackendResult<()> {
        Ok(())
    }

    fn draw_opaque(&mut self, pass: &mut DrawPass<'_, '_, B>) -> BackendResult<()>;

    fn draw_ordered(&mut self, _pass: &mut DrawPass<'_, '_, B>) -> BackendResult<()> {
        Ok(())
    }

    fn draw_transparent(&mut self, _pass: &mut DrawPass<'_, '_, B>) -> BackendResult<()> {
        Ok(())
    }

    fn draw_immediate(
        &mut self,
        _pass: &mut DrawPass<'_, '_, B>,
        _payload: &ImmediatePayload,
    ) -> BackendResult<()> {
        Ok(())
    }
}
