//! Recording backend for registry, free-list and engine unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::coords::PixelRect;
use crate::error::BackendError;
use crate::surface::SurfaceId;
use crate::view::Eye;

use super::backend::{BackendResult, GraphicsBackend, ResourceDesc, ResourceId, ResourceKind, SurfaceDesc};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(SurfaceId),
    Attach(SurfaceId),
    Detach(SurfaceId),
    Destroy(u64),
    MakeCurrent(Option<u64>),
    CreateResource(ResourceId),
    Delete(ResourceId),
    Resize(SurfaceId, PixelRect),
    BeginFrame(SurfaceId),
    SelectEye(SurfaceId, Eye),
    Clear(SurfaceId, [f32; 4]),
    AccumClear(SurfaceId),
    Accumulate(SurfaceId, f32),
    AccumReturn(SurfaceId),
    EndFrame(SurfaceId),
    AbortFrame(SurfaceId),
    Swap(SurfaceId),
}

impl Call {
    /// Surface a frame-level call targets.
    pub fn surface(&self) -> Option<SurfaceId> {
        match *self {
            Call::Resize(s, _)
            | Call::BeginFrame(s)
            | Call::SelectEye(s, _)
            | Call::Clear(s, _)
            | Call::AccumClear(s)
            | Call::Accumulate(s, _)
            | Call::AccumReturn(s)
            | Call::EndFrame(s)
            | Call::AbortFrame(s)
            | Call::Swap(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    next: u64,
    fail_next_create: bool,
    failing_deletes: HashSet<ResourceId>,
    failing_frames: HashSet<SurfaceId>,
    failing_binds: bool,
    multisample: bool,
}

/// Records every call; failures are injected per call site.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<State>>,
}

impl RecordingBackend {
    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn frame_call(&self, call: Call) -> BackendResult<()> {
        self.with(|s| {
            let surface = call.surface();
            s.calls.push(call);
            match surface {
                Some(id) if s.failing_frames.contains(&id) => {
                    Err(BackendError::new("begin_frame", "device lost"))
                }
                _ => Ok(()),
            }
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn calls_for(&self, surface: SurfaceId) -> Vec<Call> {
        self.with(|s| {
            s.calls
                .iter()
                .filter(|c| c.surface() == Some(surface))
                .cloned()
                .collect()
        })
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.with(|s| s.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn fail_next_create(&self) {
        self.with(|s| s.fail_next_create = true);
    }

    pub fn fail_delete(&self, id: ResourceId) {
        self.with(|s| s.failing_deletes.insert(id));
    }

    pub fn heal_delete(&self, id: ResourceId) {
        self.with(|s| s.failing_deletes.remove(&id));
    }

    /// Every frame call for `surface` fails from now on.
    pub fn fail_frames(&self, surface: SurfaceId) {
        self.with(|s| s.failing_frames.insert(surface));
    }

    /// Binding any context fails from now on; unbinding still succeeds.
    pub fn fail_binds(&self) {
        self.with(|s| s.failing_binds = true);
    }

    pub fn set_multisample(&self, multisample: bool) {
        self.with(|s| s.multisample = multisample);
    }
}

impl GraphicsBackend for RecordingBackend {
    type Context = u64;

    fn create_context(&mut self, surface: &SurfaceDesc) -> BackendResult<u64> {
        self.with(|s| {
            if std::mem::take(&mut s.fail_next_create) {
                return Err(BackendError::new("create_context", "no pixel format"));
            }
            s.next += 1;
            s.calls.push(Call::Create(surface.id));
            Ok(s.next)
        })
    }

    fn destroy_context(&mut self, context: u64) -> BackendResult<()> {
        self.with(|s| s.calls.push(Call::Destroy(context)));
        Ok(())
    }

    fn attach_surface(&mut self, _: &mut u64, surface: &SurfaceDesc) -> BackendResult<()> {
        self.with(|s| s.calls.push(Call::Attach(surface.id)));
        Ok(())
    }

    fn detach_surface(&mut self, _: &mut u64, surface: SurfaceId) {
        self.with(|s| s.calls.push(Call::Detach(surface)));
    }

    fn make_current(&mut self, context: Option<&mut u64>) -> BackendResult<()> {
        let raw = context.map(|c| *c);
        self.with(|s| {
            s.calls.push(Call::MakeCurrent(raw));
            if s.failing_binds && raw.is_some() {
                return Err(BackendError::new("make_current", "context lost"));
            }
            Ok(())
        })
    }

    fn supports_multisample(&self, _: &u64) -> bool {
        self.with(|s| s.multisample)
    }

    fn create_resource(&mut self, _: &mut u64, _: &ResourceDesc) -> BackendResult<ResourceId> {
        self.with(|s| {
            s.next += 1;
            let id = ResourceId::from_raw(s.next);
            s.calls.push(Call::CreateResource(id));
            Ok(id)
        })
    }

    fn delete_resource(&mut self, _: &mut u64, _: ResourceKind, id: ResourceId) -> BackendResult<()> {
        self.with(|s| {
            if s.failing_deletes.contains(&id) {
                return Err(BackendError::new("delete_resource", "object busy"));
            }
            s.calls.push(Call::Delete(id));
            Ok(())
        })
    }

    fn resize_target(&mut self, _: &mut u64, surface: SurfaceId, rect: PixelRect) -> BackendResult<()> {
        self.frame_call(Call::Resize(surface, rect))
    }

    fn begin_frame(&mut self, _: &mut u64, surface: SurfaceId) -> BackendResult<()> {
        self.frame_call(Call::BeginFrame(surface))
    }

    fn select_eye(&mut self, _: &mut u64, surface: SurfaceId, eye: Eye) -> BackendResult<()> {
        self.frame_call(Call::SelectEye(surface, eye))
    }

    fn clear(&mut self, _: &mut u64, surface: SurfaceId, color: [f32; 4]) -> BackendResult<()> {
        self.frame_call(Call::Clear(surface, color))
    }

    fn accum_clear(&mut self, _: &mut u64, surface: SurfaceId) -> BackendResult<()> {
        self.frame_call(Call::AccumClear(surface))
    }

    fn accumulate(&mut self, _: &mut u64, surface: SurfaceId, weight: f32) -> BackendResult<()> {
        self.frame_call(Call::Accumulate(surface, weight))
    }

    fn accum_return(&mut self, _: &mut u64, surface: SurfaceId) -> BackendResult<()> {
        self.frame_call(Call::AccumReturn(surface))
    }

    fn end_frame(&mut self, _: &mut u64, surface: SurfaceId) -> BackendResult<()> {
        self.frame_call(Call::EndFrame(surface))
    }

    fn abort_frame(&mut self, _: &mut u64, surface: SurfaceId) {
        self.with(|s| s.calls.push(Call::AbortFrame(surface)));
    }

    fn swap(&mut self, _: &mut u64, surface: SurfaceId) -> BackendResult<()> {
        self.frame_call(Call::Swap(surface))
    }
}
