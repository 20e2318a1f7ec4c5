//! Recording backend and geometry shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use parallax_engine::device::{
    BackendResult, GraphicsBackend, ResourceDesc, ResourceId, ResourceKind, SurfaceDesc,
};
use parallax_engine::view::Eye;
use parallax_engine::{BackendError, DrawPass, GeometrySource, Layer, PixelRect, SurfaceId};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CreateContext(SurfaceId),
    DestroyContext,
    CreateResource(ResourceId),
    DeleteResource(ResourceId),
    BeginFrame(SurfaceId),
    SelectEye(SurfaceId, Eye),
    Accumulate(SurfaceId, f32),
    AbortFrame(SurfaceId),
    Swap(SurfaceId),
    Draw { surface: SurfaceId, layer: Layer, eye: Eye, sample: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

/// Backend whose contexts are plain counters. Context creation can be made
/// to fail once.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    pub log: EventLog,
    pub fail_next_create: Arc<AtomicBool>,
    next: u64,
}

impl ScriptedBackend {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }
}

impl GraphicsBackend for ScriptedBackend {
    type Context = ();

    fn create_context(&mut self, surface: &SurfaceDesc) -> BackendResult<()> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(BackendError::new("create_context", "no matching pixel format"));
        }
        self.log.push(Event::CreateContext(surface.id));
        Ok(())
    }

    fn destroy_context(&mut self, _: ()) -> BackendResult<()> {
        self.log.push(Event::DestroyContext);
        Ok(())
    }

    fn attach_surface(&mut self, _: &mut (), _: &SurfaceDesc) -> BackendResult<()> {
        Ok(())
    }

    fn detach_surface(&mut self, _: &mut (), _: SurfaceId) {}

    fn make_current(&mut self, _: Option<&mut ()>) -> BackendResult<()> {
        Ok(())
    }

    fn supports_multisample(&self, _: &()) -> bool {
        false
    }

    fn create_resource(&mut self, _: &mut (), _: &ResourceDesc) -> BackendResult<ResourceId> {
        self.next += 1;
        let id = ResourceId::from_raw(self.next);
        self.log.push(Event::CreateResource(id));
        Ok(id)
    }

    fn delete_resource(&mut self, _: &mut (), _: ResourceKind, id: ResourceId) -> BackendResult<()> {
        self.log.push(Event::DeleteResource(id));
        Ok(())
    }

    fn resize_target(&mut self, _: &mut (), _: SurfaceId, _: PixelRect) -> BackendResult<()> {
        Ok(())
    }

    fn begin_frame(&mut self, _: &mut (), surface: SurfaceId) -> BackendResult<()> {
        self.log.push(Event::BeginFrame(surface));
        Ok(())
    }

    fn select_eye(&mut self, _: &mut (), surface: SurfaceId, eye: Eye) -> BackendResult<()> {
        self.log.push(Event::SelectEye(surface, eye));
        Ok(())
    }

    fn clear(&mut self, _: &mut (), _: SurfaceId, _: [f32; 4]) -> BackendResult<()> {
        Ok(())
    }

    fn accum_clear(&mut self, _: &mut (), _: SurfaceId) -> BackendResult<()> {
        Ok(())
    }

    fn accumulate(&mut self, _: &mut (), surface: SurfaceId, weight: f32) -> BackendResult<()> {
        self.log.push(Event::Accumulate(surface, weight));
        Ok(())
    }

    fn accum_return(&mut self, _: &mut (), _: SurfaceId) -> BackendResult<()> {
        Ok(())
    }

    fn end_frame(&mut self, _: &mut (), _: SurfaceId) -> BackendResult<()> {
        Ok(())
    }

    fn abort_frame(&mut self, _: &mut (), surface: SurfaceId) {
        self.log.push(Event::AbortFrame(surface));
    }

    fn swap(&mut self, _: &mut (), surface: SurfaceId) -> BackendResult<()> {
        self.log.push(Event::Swap(surface));
        Ok(())
    }
}

/// Logs every layer call; allocates one display list per context rebuild and
/// hands it back through `allocated`.
#[derive(Debug, Default)]
pub struct LayerRecorder {
    pub log: EventLog,
    pub background: bool,
    pub allocated: Arc<Mutex<Vec<(parallax_engine::device::ContextId, ResourceId)>>>,
}

impl LayerRecorder {
    fn record(&self, pass: &mut DrawPass<'_, '_, ScriptedBackend>) -> BackendResult<()> {
        self.log.push(Event::Draw {
            surface: pass.surface(),
            layer: pass.layer(),
            eye: pass.eye(),
            sample: pass.sample(),
        });
        if pass.rebuild_requested() && pass.layer() == Layer::Opaque && pass.sample() == 0 {
            let id = pass.create_resource(&ResourceDesc::DisplayList { size_bytes: 256 })?;
            self.allocated.lock().unwrap().push((pass.context_id(), id));
        }
        Ok(())
    }
}

impl GeometrySource<ScriptedBackend> for LayerRecorder {
    fn has_background(&self, _surface: SurfaceId) -> bool {
        self.background
    }

    fn draw_background(&mut self, pass: &mut DrawPass<'_, '_, ScriptedBackend>) -> BackendResult<()> {
        self.record(pass)
    }

    fn draw_opaque(&mut self, pass: &mut DrawPass<'_, '_, ScriptedBackend>) -> BackendResult<()> {
        self.record(pass)
    }

    fn draw_ordered(&mut self, pass: &mut DrawPass<'_, '_, ScriptedBackend>) -> BackendResult<()> {
        self.record(pass)
    }

    fn draw_transparent(&mut self, pass: &mut DrawPass<'_, '_, ScriptedBackend>) -> BackendResult<()> {
        self.record(pass)
    }
}
