use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use glam::{DMat4, DVec3};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::coords::PixelRect;
use crate::device::SurfaceDesc;
use crate::engine::RenderHooks;
use crate::view::{Consumer, DirtyFlags, DirtyMasks, Screen, ViewInputs, ViewPolicy};

use super::{SurfaceId, SurfaceState};

/// Creation parameters for a [`Surface`].
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub rect: PixelRect,
    pub screen: Screen,
    pub policy: ViewPolicy,
    /// The target has separate left/right back buffers.
    pub stereo_capable: bool,
    pub offscreen: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            rect: PixelRect::from_size(640, 480),
            screen: Screen::default(),
            policy: ViewPolicy::default(),
            stereo_capable: false,
            offscreen: true,
        }
    }
}

/// Inputs published by external threads, guarded together with their dirty bits.
struct Published {
    inputs: ViewInputs,
    dirty: DirtyMasks,
}

/// One drawing target, shared between the thread that owns the window and the
/// engine thread.
///
/// Setters publish under the surface's own lock and mark the matching dirty bits;
/// the engine snapshots under the same lock, so a refresh never sees half an
/// update and never blocks other surfaces.
pub struct Surface {
    id: SurfaceId,
    stereo_capable: bool,
    offscreen: bool,

    published: Mutex<Published>,

    /// Held across the first bind and the swap. Reentrant so hooks running on
    /// the engine thread can take it mid-frame.
    drawing: ReentrantMutex<()>,

    state: Mutex<SurfaceState>,
    fatal: AtomicBool,

    hooks: Mutex<HookSlot>,
}

/// Installed hooks plus a generation bumped on every install or clear.
///
/// The engine takes the box out while a hook runs, so a hook may replace or
/// clear its own surface's hooks.
#[derive(Default)]
struct HookSlot {
    hooks: Option<Box<dyn RenderHooks>>,
    generation: u64,
}

impl HookSlot {
    fn replace(&mut self, hooks: Option<Box<dyn RenderHooks>>) {
        self.hooks = hooks;
        self.generation = self.generation.wrapping_add(1);
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("fatal", &self.is_fatal())
            .finish_non_exhaustive()
    }
}

impl Surface {
    pub fn new(config: SurfaceConfig) -> Arc<Self> {
        let SurfaceConfig {
            rect,
            screen,
            policy,
            stereo_capable,
            offscreen,
        } = config;

        let mut inputs = ViewInputs::new(rect, screen);
        inputs.policy = policy;
        inputs.stereo_capable = stereo_capable;

        Arc::new(Self {
            id: SurfaceId::next(),
            stereo_capable,
            offscreen,
            published: Mutex::new(Published {
                inputs,
                dirty: DirtyMasks::all_dirty(),
            }),
            drawing: ReentrantMutex::new(()),
            state: Mutex::new(SurfaceState::Uninitialized),
            fatal: AtomicBool::new(false),
            hooks: Mutex::new(HookSlot::default()),
        })
    }

    #[inline]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    #[inline]
    pub fn is_stereo_capable(&self) -> bool {
        self.stereo_capable
    }

    #[inline]
    pub fn is_offscreen(&self) -> bool {
        self.offscreen
    }

    /// Sticky; set once a terminal failure hit this surface.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SurfaceState {
        *self.state.lock()
    }

    pub fn window_rect(&self) -> PixelRect {
        self.published.lock().inputs.window
    }

    pub fn view_policy(&self) -> ViewPolicy {
        self.published.lock().inputs.policy.clone()
    }

    // ── publishing ────────────────────────────────────────────────────────

    fn publish(&self, flags: DirtyFlags, f: impl FnOnce(&mut ViewInputs)) {
        let mut p = self.published.lock();
        f(&mut p.inputs);
        p.dirty.mark(flags);
    }

    pub fn set_window_rect(&self, rect: PixelRect) {
        self.publish(DirtyFlags::CANVAS, |i| i.window = rect);
    }

    pub fn set_screen(&self, screen: Screen) {
        self.publish(DirtyFlags::SCREEN, |i| i.screen = screen);
    }

    pub fn set_view_policy(&self, policy: ViewPolicy) {
        let mut p = self.published.lock();
        let mut flags = DirtyFlags::VIEW_POLICY;
        if p.inputs.policy.stereo_enable != policy.stereo_enable {
            flags |= DirtyFlags::STEREO;
        }
        p.inputs.policy = policy;
        p.dirty.mark(flags);
    }

    /// Publishes the view platform → world transform.
    pub fn set_view_platform_transform(&self, vpc_to_world: DMat4) {
        self.publish(DirtyFlags::VIEW_PLATFORM, |i| i.vpc_to_world = vpc_to_world);
    }

    pub fn set_coexistence_to_tracker_base(&self, m: DMat4) {
        self.publish(DirtyFlags::SCREEN, |i| i.coexistence_to_tracker_base = m);
    }

    pub fn set_tracked_eyes(&self, eyes: Option<[DVec3; 2]>) {
        self.publish(DirtyFlags::EYE, |i| i.tracked_eyes = eyes);
    }

    pub fn set_clip_override(&self, back_distance: Option<f64>) {
        self.publish(DirtyFlags::CLIP, |i| i.clip_override = back_distance);
    }

    /// Marks scene-side changes (lights, environment, background) for every consumer.
    pub fn mark_dirty(&self, flags: DirtyFlags) {
        self.published.lock().dirty.mark(flags);
    }

    pub fn dirty(&self, consumer: Consumer) -> DirtyFlags {
        self.published.lock().dirty.get(consumer)
    }

    /// Clears and returns the bits of `mask` set for `consumer`.
    pub fn take_dirty(&self, consumer: Consumer, mask: DirtyFlags) -> DirtyFlags {
        self.published.lock().dirty.take(consumer, mask)
    }

    pub fn set_hooks(&self, hooks: impl RenderHooks + 'static) {
        self.hooks.lock().replace(Some(Box::new(hooks)));
    }

    pub fn clear_hooks(&self) {
        self.hooks.lock().replace(None);
    }

    pub fn has_hooks(&self) -> bool {
        self.hooks.lock().hooks.is_some()
    }

    // ── engine side ───────────────────────────────────────────────────────

    /// Copies the published inputs and takes the renderer's view bits.
    pub(crate) fn snapshot(&self) -> (ViewInputs, DirtyFlags) {
        let mut p = self.published.lock();
        let taken = p
            .dirty
            .take(Consumer::Renderer, DirtyFlags::VIEW_CACHE | DirtyFlags::BACKGROUND);
        (p.inputs.clone(), taken)
    }

    pub(crate) fn desc(&self) -> SurfaceDesc {
        SurfaceDesc {
            id: self.id,
            rect: self.window_rect(),
            stereo: self.stereo_capable,
            offscreen: self.offscreen,
        }
    }

    /// Runs `f` against the installed hooks, if any.
    ///
    /// The hooks lock is not held during `f`. The box goes back afterwards
    /// unless `f` (or another thread) installed or cleared hooks meanwhile.
    pub(crate) fn with_hooks<R>(&self, f: impl FnOnce(&mut Box<dyn RenderHooks>) -> R) -> Option<R> {
        let (mut hooks, generation) = {
            let mut slot = self.hooks.lock();
            (slot.hooks.take()?, slot.generation)
        };
        let result = f(&mut hooks);
        let mut slot = self.hooks.lock();
        if slot.generation == generation {
            slot.hooks = Some(hooks);
        }
        Some(result)
    }

    /// Waits up to `timeout` for the drawing lock.
    pub(crate) fn lock_drawing(&self, timeout: Duration) -> Option<ReentrantMutexGuard<'_, ()>> {
        self.drawing.try_lock_for(timeout)
    }

    /// Drawing lock for code outside the engine that must not race a swap,
    /// such as reading back an offscreen front buffer.
    pub fn drawing_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.drawing.lock()
    }

    /// Moves to `next` if the lifecycle allows it.
    pub(crate) fn transition(&self, next: SurfaceState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            log::debug!("{}: ignoring transition {:?} -> {next:?}", self.id, *state);
            return false;
        }
        log::debug!("{}: {:?} -> {next:?}", self.id, *state);
        *state = next;
        if next == SurfaceState::Fatal {
            self.fatal.store(true, Ordering::Release);
        }
        true
    }

    /// Marks the surface fatal. Returns `false` if it already was.
    pub(crate) fn mark_fatal(&self) -> bool {
        if self.fatal.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.state.lock() = SurfaceState::Fatal;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_mark_both_consumers() {
        let s = Surface::new(SurfaceConfig::default());
        s.take_dirty(Consumer::Bin, DirtyFlags::all());
        s.take_dirty(Consumer::Renderer, DirtyFlags::all());

        s.set_window_rect(PixelRect::new(10, 10, 100, 100));
        assert_eq!(s.dirty(Consumer::Bin), DirtyFlags::CANVAS);
        assert_eq!(s.dirty(Consumer::Renderer), DirtyFlags::CANVAS);
        assert_eq!(s.window_rect(), PixelRect::new(10, 10, 100, 100));
    }

    #[test]
    fn snapshot_takes_only_renderer_view_bits() {
        let s = Surface::new(SurfaceConfig::default());
        let (_, taken) = s.snapshot();
        assert!(taken.contains(DirtyFlags::VIEW_CACHE));
        assert!(!s.dirty(Consumer::Renderer).intersects(DirtyFlags::VIEW_CACHE));
        assert!(s.dirty(Consumer::Renderer).contains(DirtyFlags::LIGHTS));
        assert!(s.dirty(Consumer::Bin).contains(DirtyFlags::VIEW_CACHE));
    }

    #[test]
    fn toggling_stereo_marks_stereo_bit() {
        let s = Surface::new(SurfaceConfig::default());
        s.take_dirty(Consumer::Renderer, DirtyFlags::all());
        let mut policy = s.view_policy();
        policy.stereo_enable = !policy.stereo_enable;
        s.set_view_policy(policy);
        assert!(s.dirty(Consumer::Renderer).contains(DirtyFlags::STEREO | DirtyFlags::VIEW_POLICY));
    }

    #[test]
    fn drawing_lock_times_out_when_held_elsewhere() {
        let s = Surface::new(SurfaceConfig::default());
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let s = Arc::clone(&s);
            std::thread::spawn(move || {
                let _held = s.drawing_lock();
                held_tx.send(()).unwrap();
                let _ = release_rx.recv();
            })
        };
        held_rx.recv().unwrap();
        assert!(s.lock_drawing(Duration::from_millis(5)).is_none());
        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(s.lock_drawing(Duration::from_millis(5)).is_some());
    }

    #[test]
    fn drawing_lock_reenters_on_the_holding_thread() {
        let s = Surface::new(SurfaceConfig::default());
        let _outer = s.lock_drawing(Duration::from_millis(5)).unwrap();
        let _inner = s.drawing_lock();
    }

    struct Noop;
    impl RenderHooks for Noop {}

    #[test]
    fn hooks_can_clear_themselves() {
        let s = Surface::new(SurfaceConfig::default());
        s.set_hooks(Noop);
        assert_eq!(s.with_hooks(|_| s.clear_hooks()), Some(()));
        assert!(!s.has_hooks());
        assert!(s.with_hooks(|_| ()).is_none());
    }

    #[test]
    fn hooks_are_restored_after_running() {
        let s = Surface::new(SurfaceConfig::default());
        s.set_hooks(Noop);
        s.with_hooks(|_| assert!(!s.has_hooks()));
        assert!(s.has_hooks());
    }

    #[test]
    fn hooks_replaced_mid_call_are_kept() {
        let s = Surface::new(SurfaceConfig::default());
        s.set_hooks(Noop);
        s.with_hooks(|_| s.set_hooks(Noop));
        assert!(s.has_hooks());
        s.with_hooks(|_| s.clear_hooks());
        assert!(!s.has_hooks());
    }

    #[test]
    fn fatal_is_reported_once() {
        let s = Surface::new(SurfaceConfig::default());
        assert!(s.mark_fatal());
        assert!(!s.mark_fatal());
        assert_eq!(s.state(), SurfaceState::Fatal);
        assert!(s.is_fatal());
    }

    #[test]
    fn surface_ids_are_unique() {
        let a = Surface::new(SurfaceConfig::default());
        let b = Surface::new(SurfaceConfig::default());
        assert_ne!(a.id(), b.id());
    }
}
