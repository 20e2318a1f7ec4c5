use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use crate::config::EngineConfig;
use crate::device::{
    BackendResult, ContextHandle, ContextRegistry, CurrentContext, GraphicsBackend,
    ResourceFreeList,
};
use crate::error::{BackendError, EngineError, RenderError};
use crate::geometry::{DrawPass, GeometrySource, Layer, PassMatrices};
use crate::surface::{Surface, SurfaceId, SurfaceState};
use crate::view::projection::jittered;
use crate::view::{Consumer, DerivedView, DirtyFlags, Eye, Frustum, ViewDerivationCache, ViewInputs};

use super::frame::FramePlan;
use super::hooks::{self, panic_message, RenderHooks};
use super::listener::ErrorListener;
use super::request::{
    CleanupTarget, Completion, ImmediateCommand, RenderRequest, RequestOutcome,
};

struct Envelope {
    request: RenderRequest,
    done: mpsc::SyncSender<RequestOutcome>,
}

/// Handle to the engine thread.
///
/// Returned from [`FrameExecutionEngine::spawn`]. Requests are posted from any
/// thread and executed in order on the engine's own thread. Dropping the handle
/// stops the thread after the queued requests have run.
pub struct FrameExecutionEngine {
    /// Option so it can be dropped before joining.
    tx: Option<mpsc::Sender<Envelope>>,
    handle: Option<JoinHandle<()>>,
    free_list: Arc<ResourceFreeList>,
}

impl FrameExecutionEngine {
    pub fn spawn<B, G>(
        config: EngineConfig,
        backend: B,
        geometry: G,
        listener: Option<ErrorListener>,
    ) -> Result<Self, EngineError>
    where
        B: GraphicsBackend,
        G: GeometrySource<B>,
    {
        let (tx, rx) = mpsc::channel();
        let free_list = Arc::new(ResourceFreeList::new());
        let name = config.thread_name.clone();

        let worker = Worker {
            registry: ContextRegistry::new(backend, Arc::clone(&free_list)),
            geometry,
            listener,
            slots: HashMap::new(),
            config,
        };

        log::debug!("spawning engine thread `{name}`");
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run(rx))
            .map_err(|source| EngineError::Spawn { name, source })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            free_list,
        })
    }

    /// Queues a request. Never blocks.
    pub fn post(&self, request: RenderRequest) -> Result<Completion, EngineError> {
        let tx = self.tx.as_ref().ok_or(EngineError::Disconnected)?;
        let (done, completion) = Completion::channel();
        tx.send(Envelope { request, done })
            .map_err(|_| EngineError::Disconnected)?;
        Ok(completion)
    }

    /// Deferred-deletion queue shared with the engine thread.
    pub fn free_list(&self) -> &Arc<ResourceFreeList> {
        &self.free_list
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Runs the remaining queue, tears down every context and joins the thread.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        // Dropping the sender ends the thread's receive loop; join after.
        drop(self.tx.take());
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| EngineError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for FrameExecutionEngine {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("{err}");
        }
    }
}

// ── engine thread ─────────────────────────────────────────────────────────

/// Engine-thread bookkeeping for one attached surface.
struct SurfaceSlot {
    surface: Arc<Surface>,
    cache: ViewDerivationCache,
    /// Geometry must recreate its GPU objects on the next draw.
    rebuild: bool,
    /// A synchronized frame waits in the back buffer.
    pending_swap: bool,
}

impl SurfaceSlot {
    fn new(surface: Arc<Surface>) -> Self {
        Self {
            surface,
            cache: ViewDerivationCache::new(),
            rebuild: true,
            pending_swap: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Status {
    Completed,
    Skipped,
    Failed,
}

fn record(outcome: &mut RequestOutcome, id: SurfaceId, status: Status) {
    match status {
        Status::Completed => outcome.completed.push(id),
        Status::Skipped => outcome.skipped.push(id),
        Status::Failed => outcome.failed.push(id),
    }
}

struct Worker<B: GraphicsBackend, G> {
    config: EngineConfig,
    registry: ContextRegistry<B>,
    geometry: G,
    listener: Option<ErrorListener>,
    slots: HashMap<SurfaceId, SurfaceSlot>,
}

impl<B: GraphicsBackend, G: GeometrySource<B>> Worker<B, G> {
    fn run(mut self, rx: mpsc::Receiver<Envelope>) {
        log::debug!("engine thread started");

        while let Ok(Envelope { request, done }) = rx.recv() {
            log::trace!("dequeued {} request", request.name());
            let outcome = self.dispatch(request);
            // The poster may have dropped its completion handle.
            let _ = done.send(outcome);
        }

        self.slots.clear();
        let destroyed = self.registry.destroy_all();
        log::debug!("engine thread stopping; destroyed {destroyed} contexts");
    }

    fn dispatch(&mut self, request: RenderRequest) -> RequestOutcome {
        let mut outcome = RequestOutcome::default();
        match request {
            RenderRequest::Render { surfaces } => {
                for surface in &surfaces {
                    let status = self.render(surface);
                    record(&mut outcome, surface.id(), status);
                }
            }
            RenderRequest::Swap { surfaces, view } => {
                for surface in &surfaces {
                    let status = self.swap(surface);
                    record(&mut outcome, surface.id(), status);
                }
                log::trace!("swap batch for {view:?}: {} surfaces", surfaces.len());
            }
            RenderRequest::Immediate { surface, command } => {
                let status = self.immediate(&surface, command);
                record(&mut outcome, surface.id(), status);
            }
            RenderRequest::Cleanup(CleanupTarget::Surface(surface)) => {
                let status = self.cleanup(&surface);
                record(&mut outcome, surface.id(), status);
            }
            RenderRequest::Cleanup(CleanupTarget::All) => {
                outcome.completed = self.cleanup_all();
            }
            RenderRequest::Resize { surface, rect } => {
                surface.set_window_rect(rect);
                let status = self.resize(&surface);
                record(&mut outcome, surface.id(), status);
            }
            RenderRequest::Toggle { surface } => {
                let status = self.toggle(&surface);
                record(&mut outcome, surface.id(), status);
            }
        }
        outcome
    }

    /// Marks `surface` fatal and reports `err`, once.
    fn fail(&mut self, surface: &Surface, err: RenderError) {
        let id = surface.id();
        if !surface.mark_fatal() {
            return;
        }
        log::error!("{err}; surface is now fatal");
        if let Some(listener) = &self.listener {
            listener.notify(err);
        }
        self.slots.remove(&id);
        if let Err(e) = self.registry.release_context(id) {
            log::warn!("{id}: releasing context after failure: {e}");
        }
    }

    fn ensure_context(&mut self, surface: &Arc<Surface>) -> Option<ContextHandle> {
        let id = surface.id();
        if let Some(handle) = self.registry.handle_of(id) {
            return Some(handle);
        }

        if surface.state() != SurfaceState::ContextPending {
            surface.transition(SurfaceState::ContextPending);
        }
        match self
            .registry
            .acquire_context(&surface.desc(), self.config.prefer_shared_context)
        {
            Ok(handle) => {
                let slot = self
                    .slots
                    .entry(id)
                    .or_insert_with(|| SurfaceSlot::new(Arc::clone(surface)));
                slot.rebuild = true;
                slot.cache.invalidate();
                surface.transition(SurfaceState::Active);
                Some(handle)
            }
            Err(source) => {
                self.fail(surface, RenderError::ContextCreation { surface: id, source });
                None
            }
        }
    }

    // ── render ────────────────────────────────────────────────────────────

    fn render(&mut self, surface: &Arc<Surface>) -> Status {
        let id = surface.id();
        if surface.is_fatal() {
            log::trace!("{id}: fatal; dropping frame");
            return Status::Skipped;
        }
        if !surface.state().accepts_frames() {
            log::debug!("{id}: not drawable in state {:?}", surface.state());
            return Status::Skipped;
        }
        if surface.window_rect().is_empty() {
            log::debug!("{id}: zero-sized window; skipping frame");
            return Status::Skipped;
        }
        let Some(_drawing) = surface.lock_drawing(self.config.drawing_lock_timeout) else {
            log::warn!("{id}: drawing lock busy; skipping frame");
            return Status::Skipped;
        };
        let Some(handle) = self.ensure_context(surface) else {
            return Status::Failed;
        };

        match self.draw_frame(surface, handle) {
            Ok(()) => Status::Completed,
            Err(source) => {
                self.fail(surface, RenderError::NativeDraw { surface: id, source });
                Status::Failed
            }
        }
    }

    fn draw_frame(&mut self, surface: &Arc<Surface>, handle: ContextHandle) -> BackendResult<()> {
        let id = surface.id();
        let Self {
            config,
            registry,
            geometry,
            slots,
            ..
        } = self;
        let slot = slots
            .entry(id)
            .or_insert_with(|| SurfaceSlot::new(Arc::clone(surface)));

        let (inputs, taken) = surface.snapshot();
        let has_background = guarded(|| Ok(geometry.has_background(id)))?;
        slot.cache.refresh(&inputs, taken, has_background);
        let Some(derived) = slot.cache.derived() else {
            return Ok(());
        };

        let free_list = Arc::clone(registry.free_list());
        let mut consumed = DirtyFlags::empty();
        let job = FrameJob {
            surface,
            inputs: &inputs,
            derived,
            has_background,
            rebuild: slot.rebuild,
            config,
        };

        registry.with_context_current(handle.id, |cur| {
            free_list.drain(cur);

            if taken.contains(DirtyFlags::CANVAS) {
                let (backend, native) = cur.parts();
                backend.resize_target(native, id, inputs.window)?;
            }

            let multisample = cur.backend().supports_multisample(cur.native());
            let plan = FramePlan::new(
                inputs.stereo_in_use(),
                inputs.policy.scene_antialiasing,
                multisample,
                config.effective_accumulation_samples(),
            );
            discard_on_error(cur, id, |cur| guarded(|| job.draw(cur, geometry, plan, &mut consumed)))
        })??;

        slot.rebuild = false;
        slot.pending_swap = config.synchronized_swap;
        if !consumed.is_empty() {
            surface.take_dirty(Consumer::Renderer, consumed);
        }
        Ok(())
    }

    // ── swap / immediate ──────────────────────────────────────────────────

    fn swap(&mut self, surface: &Surface) -> Status {
        let id = surface.id();
        if surface.is_fatal() {
            return Status::Skipped;
        }
        let Some(handle) = self.registry.handle_of(id) else {
            log::debug!("{id}: nothing to swap without a context");
            return Status::Skipped;
        };
        let Some(_drawing) = surface.lock_drawing(self.config.drawing_lock_timeout) else {
            log::warn!("{id}: drawing lock busy; skipping swap");
            return Status::Skipped;
        };
        if self.slots.get(&id).is_some_and(|slot| !slot.pending_swap) {
            log::trace!("{id}: no new frame since the last swap");
        }

        let result = self
            .registry
            .with_context_current(handle.id, |cur| {
                let (backend, native) = cur.parts();
                backend.swap(native, id)
            })
            .and_then(|r| r);

        match result {
            Ok(()) => {
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.pending_swap = false;
                }
                run_hook(surface, "post_swap", |h| h.post_swap(id));
                Status::Completed
            }
            Err(source) => {
                self.fail(surface, RenderError::NativeDraw { surface: id, source });
                Status::Failed
            }
        }
    }

    fn immediate(&mut self, surface: &Arc<Surface>, command: ImmediateCommand) -> Status {
        let id = surface.id();
        if surface.is_fatal() || !surface.state().accepts_frames() {
            return Status::Skipped;
        }
        let Some(_drawing) = surface.lock_drawing(self.config.drawing_lock_timeout) else {
            log::warn!("{id}: drawing lock busy; skipping immediate command");
            return Status::Skipped;
        };
        let Some(handle) = self.ensure_context(surface) else {
            return Status::Failed;
        };

        match self.run_immediate(surface, handle, command) {
            Ok(()) => Status::Completed,
            Err(source) => {
                self.fail(surface, RenderError::NativeDraw { surface: id, source });
                Status::Failed
            }
        }
    }

    fn run_immediate(
        &mut self,
        surface: &Arc<Surface>,
        handle: ContextHandle,
        command: ImmediateCommand,
    ) -> BackendResult<()> {
        let id = surface.id();
        let Self {
            registry,
            geometry,
            slots,
            ..
        } = self;
        let slot = slots
            .entry(id)
            .or_insert_with(|| SurfaceSlot::new(Arc::clone(surface)));

        match command {
            ImmediateCommand::Clear { color } => registry.with_context_current(handle.id, |cur| {
                discard_on_error(cur, id, |cur| {
                    let (backend, native) = cur.parts();
                    backend.begin_frame(native, id)?;
                    backend.select_eye(native, id, Eye::Left)?;
                    backend.clear(native, id, color)?;
                    backend.end_frame(native, id)
                })
            })?,

            ImmediateCommand::Swap => {
                registry.with_context_current(handle.id, |cur| {
                    let (backend, native) = cur.parts();
                    backend.swap(native, id)
                })??;
                slot.pending_swap = false;
                run_hook(surface, "post_swap", |h| h.post_swap(id));
                Ok(())
            }

            ImmediateCommand::Draw(payload) => {
                let (inputs, taken) = surface.snapshot();
                let has_background = guarded(|| Ok(geometry.has_background(id)))?;
                slot.cache.refresh(&inputs, taken, has_background);
                let Some(derived) = slot.cache.derived() else {
                    return Ok(());
                };
                let view = derived.eye(Eye::Left);
                let matrices = PassMatrices {
                    projection: view.projection,
                    view: view.view,
                    world_to_vpc: derived.world_to_vpc,
                };
                let rebuild = slot.rebuild;
                let mut consumed = DirtyFlags::empty();

                registry.with_context_current(handle.id, |cur| {
                    if taken.contains(DirtyFlags::CANVAS) {
                        let (backend, native) = cur.parts();
                        backend.resize_target(native, id, inputs.window)?;
                    }
                    discard_on_error(cur, id, |cur| {
                        {
                            let (backend, native) = cur.parts();
                            backend.begin_frame(native, id)?;
                            backend.select_eye(native, id, Eye::Left)?;
                        }
                        guarded(|| {
                            let mut pass = DrawPass {
                                surface: id,
                                layer: Layer::Immediate,
                                eye: Eye::Left,
                                sample: 0,
                                samples: 1,
                                matrices,
                                frustum: Some(&view.frustum),
                                rebuild,
                                context: &mut *cur,
                                consumed: &mut consumed,
                            };
                            geometry.draw_immediate(&mut pass, &payload)
                        })?;
                        let (backend, native) = cur.parts();
                        backend.end_frame(native, id)
                    })
                })??;

                slot.rebuild = false;
                if !consumed.is_empty() {
                    surface.take_dirty(Consumer::Renderer, consumed);
                }
                Ok(())
            }
        }
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    fn cleanup(&mut self, surface: &Surface) -> Status {
        let id = surface.id();
        let fatal = surface.is_fatal();
        if !fatal {
            surface.transition(SurfaceState::CleanupPending);
        }

        let status = match self.registry.release_context(id) {
            Ok(destroyed) => {
                log::debug!("{id}: released context (destroyed: {destroyed})");
                Status::Completed
            }
            Err(err) => {
                log::error!("{id}: context teardown failed: {err}");
                Status::Failed
            }
        };

        if !fatal {
            surface.transition(SurfaceState::Destroyed);
        }
        self.slots.remove(&id);
        status
    }

    fn cleanup_all(&mut self) -> Vec<SurfaceId> {
        let surfaces: Vec<Arc<Surface>> = self.slots.drain().map(|(_, slot)| slot.surface).collect();
        for surface in surfaces.iter().filter(|s| !s.is_fatal()) {
            surface.transition(SurfaceState::CleanupPending);
        }

        let destroyed = self.registry.destroy_all();
        log::debug!("destroyed all {destroyed} contexts");

        let mut ids = Vec::with_capacity(surfaces.len());
        for surface in &surfaces {
            if !surface.is_fatal() {
                surface.transition(SurfaceState::Destroyed);
            }
            ids.push(surface.id());
        }
        ids.sort();
        ids
    }

    fn resize(&mut self, surface: &Surface) -> Status {
        let id = surface.id();
        if surface.is_fatal() {
            return Status::Skipped;
        }
        let Some(handle) = self.registry.handle_of(id) else {
            // Targets are created at the new size with the context.
            return Status::Completed;
        };
        if !surface.transition(SurfaceState::Resizing) {
            return Status::Skipped;
        }

        let rect = surface.window_rect();
        let result = self
            .registry
            .with_context_current(handle.id, |cur| {
                let (backend, native) = cur.parts();
                backend.resize_target(native, id, rect)
            })
            .and_then(|r| r);
        surface.transition(SurfaceState::Active);

        match result {
            Ok(()) => Status::Completed,
            Err(source) => {
                self.fail(surface, RenderError::NativeDraw { surface: id, source });
                Status::Failed
            }
        }
    }

    fn toggle(&mut self, surface: &Surface) -> Status {
        let id = surface.id();
        if surface.is_fatal() {
            return Status::Skipped;
        }
        if self.registry.handle_of(id).is_none() {
            return Status::Completed;
        }
        if !surface.transition(SurfaceState::Toggling) {
            return Status::Skipped;
        }

        if let Err(err) = self.registry.release_context(id) {
            log::warn!("{id}: releasing context for toggle: {err}");
        }
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.cache.invalidate();
            slot.pending_swap = false;
        }
        surface.mark_dirty(DirtyFlags::STEREO);
        surface.transition(SurfaceState::ContextPending);
        Status::Completed
    }
}

// ── frame body ────────────────────────────────────────────────────────────

/// Position of a pass within the frame.
#[derive(Debug, Copy, Clone)]
struct PassIndex {
    eye: Eye,
    sample: u32,
    samples: u32,
}

/// Per-frame inputs to the multi-pass loop.
struct FrameJob<'a> {
    surface: &'a Surface,
    inputs: &'a ViewInputs,
    derived: &'a DerivedView,
    has_background: bool,
    rebuild: bool,
    config: &'a EngineConfig,
}

impl FrameJob<'_> {
    fn draw<B: GraphicsBackend, G: GeometrySource<B>>(
        &self,
        cur: &mut CurrentContext<'_, B>,
        geometry: &mut G,
        plan: FramePlan,
        consumed: &mut DirtyFlags,
    ) -> BackendResult<()> {
        let id = self.surface.id();
        let (width, height) = self.inputs.window.target_size();
        let derived = self.derived;

        {
            let (backend, native) = cur.parts();
            backend.begin_frame(native, id)?;
        }
        run_hook(self.surface, "pre_render", |h| h.pre_render(id));

        for &eye in plan.eyes() {
            let view = derived.eye(eye);
            {
                let (backend, native) = cur.parts();
                backend.select_eye(native, id, eye)?;
                if plan.accumulating() {
                    backend.accum_clear(native, id)?;
                }
            }

            for sample in 0..plan.samples() {
                let at = PassIndex {
                    eye,
                    sample,
                    samples: plan.samples(),
                };
                log::trace!("{id}: {eye:?} sample {}/{}", sample + 1, at.samples);
                {
                    let (backend, native) = cur.parts();
                    backend.clear(native, id, self.config.clear_color)?;
                }

                let (dx, dy) = plan.jitter(sample);
                if self.has_background && derived.has_infinite {
                    let matrices = PassMatrices {
                        projection: jittered(view.infinite_projection, dx, dy, width, height),
                        view: view.infinite_view,
                        world_to_vpc: derived.infinite_world_to_vpc,
                    };
                    self.draw_layer(cur, geometry, consumed, Layer::Background, at, matrices, None)?;
                }

                let matrices = PassMatrices {
                    projection: jittered(view.projection, dx, dy, width, height),
                    view: view.view,
                    world_to_vpc: derived.world_to_vpc,
                };
                for layer in [Layer::Opaque, Layer::Ordered, Layer::Transparent] {
                    self.draw_layer(cur, geometry, consumed, layer, at, matrices, Some(&view.frustum))?;
                }

                if plan.accumulating() {
                    let (backend, native) = cur.parts();
                    backend.accumulate(native, id, plan.weight())?;
                }
            }

            if plan.accumulating() {
                let (backend, native) = cur.parts();
                backend.accum_return(native, id)?;
            }
            run_hook(self.surface, "render_field", |h| h.render_field(id, eye));
        }

        run_hook(self.surface, "post_render", |h| h.post_render(id));
        {
            let (backend, native) = cur.parts();
            backend.end_frame(native, id)?;
            if !self.config.synchronized_swap {
                backend.swap(native, id)?;
            }
        }
        if !self.config.synchronized_swap {
            run_hook(self.surface, "post_swap", |h| h.post_swap(id));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_layer<B: GraphicsBackend, G: GeometrySource<B>>(
        &self,
        cur: &mut CurrentContext<'_, B>,
        geometry: &mut G,
        consumed: &mut DirtyFlags,
        layer: Layer,
        at: PassIndex,
        matrices: PassMatrices,
        frustum: Option<&Frustum>,
    ) -> BackendResult<()> {
        let mut pass = DrawPass {
            surface: self.surface.id(),
            layer,
            eye: at.eye,
            sample: at.sample,
            samples: at.samples,
            matrices,
            frustum,
            rebuild: self.rebuild,
            context: cur,
            consumed,
        };
        match layer {
            Layer::Background => geometry.draw_background(&mut pass),
            Layer::Opaque => geometry.draw_opaque(&mut pass),
            Layer::Ordered => geometry.draw_ordered(&mut pass),
            Layer::Transparent => geometry.draw_transparent(&mut pass),
            Layer::Immediate => Ok(()),
        }
    }
}

/// Runs one frame body, discarding what it recorded if it fails.
fn discard_on_error<'a, B: GraphicsBackend>(
    cur: &mut CurrentContext<'a, B>,
    surface: SurfaceId,
    body: impl FnOnce(&mut CurrentContext<'a, B>) -> BackendResult<()>,
) -> BackendResult<()> {
    let result = body(cur);
    if let Err(err) = &result {
        log::debug!("{surface}: discarding partial frame: {err}");
        let (backend, native) = cur.parts();
        backend.abort_frame(native, surface);
    }
    result
}

/// Runs geometry code, turning a panic into a native failure.
fn guarded<T>(f: impl FnOnce() -> BackendResult<T>) -> BackendResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(BackendError::new(
            "draw",
            format!("geometry source panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn run_hook(
    surface: &Surface,
    hook: &'static str,
    f: impl FnOnce(&mut Box<dyn RenderHooks>) -> anyhow::Result<()>,
) {
    let id = surface.id();
    if let Some(Err(err)) = surface.with_hooks(|h| hooks::invoke(id, hook, || f(h))) {
        log::warn!("{err}");
    }
}
