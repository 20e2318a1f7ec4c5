use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::BackendError;
use crate::surface::SurfaceId;

use super::backend::{BackendResult, GraphicsBackend, ResourceDesc, ResourceId, ResourceKind, SurfaceDesc};
use super::free_list::ResourceFreeList;

/// One native context create or destroy at a time, process-wide.
///
/// Not reentrant: never call back into the registry while holding it.
static CONTEXT_CREATION_LOCK: Mutex<()> = Mutex::new(());

fn creation_guard() -> MutexGuard<'static, ()> {
    CONTEXT_CREATION_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    #[inline]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// Opaque reference to a registered context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextHandle {
    pub id: ContextId,
    /// Other surfaces may join this context.
    pub shared: bool,
}

struct ContextEntry<C> {
    native: C,
    shared: bool,
    users: HashSet<SurfaceId>,
    live: HashSet<(ResourceKind, ResourceId)>,
}

/// Live native contexts and the surfaces using them.
///
/// Owned by the engine thread. All GPU work goes through
/// [`ContextRegistry::with_context_current`].
pub struct ContextRegistry<B: GraphicsBackend> {
    backend: B,
    contexts: HashMap<ContextId, ContextEntry<B::Context>>,
    free_list: Arc<ResourceFreeList>,
    current: Option<ContextId>,
    next_id: u64,
}

/// Proof that a context is current on this thread.
///
/// Only [`ContextRegistry::with_context_current`] hands these out.
pub struct CurrentContext<'a, B: GraphicsBackend> {
    id: ContextId,
    backend: &'a mut B,
    entry: &'a mut ContextEntry<B::Context>,
}

/// Result of deleting one id through [`CurrentContext::delete_resource`].
#[derive(Debug)]
pub enum DeleteOutcome {
    Freed,
    /// The id is not in the live table; nothing was called.
    NotLive,
    Failed(BackendError),
}

impl<B: GraphicsBackend> CurrentContext<'_, B> {
    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.entry.shared
    }

    /// Backend and native context, borrowed together for frame calls.
    #[inline]
    pub fn parts(&mut self) -> (&mut B, &mut B::Context) {
        (&mut *self.backend, &mut self.entry.native)
    }

    #[inline]
    pub fn backend(&self) -> &B {
        self.backend
    }

    #[inline]
    pub fn native(&self) -> &B::Context {
        &self.entry.native
    }

    /// Allocates a GPU object and records it as live.
    pub fn create_resource(&mut self, desc: &ResourceDesc) -> BackendResult<ResourceId> {
        let id = self.backend.create_resource(&mut self.entry.native, desc)?;
        self.entry.live.insert((desc.kind(), id));
        Ok(id)
    }

    #[inline]
    pub fn is_live(&self, kind: ResourceKind, id: ResourceId) -> bool {
        self.entry.live.contains(&(kind, id))
    }

    #[inline]
    pub fn live_resource_count(&self) -> usize {
        self.entry.live.len()
    }

    /// Deletes a live id. Ids that are not live are never passed to the backend.
    pub fn delete_resource(&mut self, kind: ResourceKind, id: ResourceId) -> DeleteOutcome {
        if !self.entry.live.contains(&(kind, id)) {
            return DeleteOutcome::NotLive;
        }
        match self.backend.delete_resource(&mut self.entry.native, kind, id) {
            Ok(()) => {
                self.entry.live.remove(&(kind, id));
                DeleteOutcome::Freed
            }
            Err(err) => DeleteOutcome::Failed(err),
        }
    }
}

impl<B: GraphicsBackend> ContextRegistry<B> {
    pub fn new(backend: B, free_list: Arc<ResourceFreeList>) -> Self {
        Self {
            backend,
            contexts: HashMap::new(),
            free_list,
            current: None,
            next_id: 1,
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn free_list(&self) -> &Arc<ResourceFreeList> {
        &self.free_list
    }

    #[inline]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    #[inline]
    pub fn current(&self) -> Option<ContextId> {
        self.current
    }

    /// Context currently serving `surface`, if any.
    pub fn handle_of(&self, surface: SurfaceId) -> Option<ContextHandle> {
        self.contexts
            .iter()
            .find(|(_, e)| e.users.contains(&surface))
            .map(|(&id, e)| ContextHandle { id, shared: e.shared })
    }

    pub fn user_count(&self, id: ContextId) -> usize {
        self.contexts.get(&id).map_or(0, |e| e.users.len())
    }

    pub fn live_resource_count(&self, id: ContextId) -> usize {
        self.contexts.get(&id).map_or(0, |e| e.live.len())
    }

    /// Gives `surface` a context.
    ///
    /// With `prefer_shared`, joins the first existing shared context; otherwise, or
    /// when none exists, creates a new one under the process-wide creation lock.
    /// A surface that already holds a context gets the same handle back.
    pub fn acquire_context(
        &mut self,
        surface: &SurfaceDesc,
        prefer_shared: bool,
    ) -> BackendResult<ContextHandle> {
        if let Some(handle) = self.handle_of(surface.id) {
            return Ok(handle);
        }

        if prefer_shared {
            let shared = self
                .contexts
                .iter_mut()
                .filter(|(_, e)| e.shared)
                .min_by_key(|(id, _)| **id);
            if let Some((&id, entry)) = shared {
                self.backend.attach_surface(&mut entry.native, surface)?;
                entry.users.insert(surface.id);
                log::debug!("{} joined shared context {id}", surface.id);
                return Ok(ContextHandle { id, shared: true });
            }
        }

        let native = {
            let _guard = creation_guard();
            self.backend.create_context(surface)?
        };

        let id = ContextId::from_raw(self.next_id);
        self.next_id += 1;
        self.contexts.insert(
            id,
            ContextEntry {
                native,
                shared: prefer_shared,
                users: HashSet::from([surface.id]),
                live: HashSet::new(),
            },
        );
        log::debug!(
            "created {} context {id} for {}",
            if prefer_shared { "shared" } else { "exclusive" },
            surface.id
        );
        Ok(ContextHandle { id, shared: prefer_shared })
    }

    /// Detaches `surface` from its context. The last user's release tears the
    /// context down before returning; `Ok(true)` reports that teardown.
    pub fn release_context(&mut self, surface: SurfaceId) -> BackendResult<bool> {
        let Some(handle) = self.handle_of(surface) else {
            return Ok(false);
        };

        let last_user = match self.contexts.get_mut(&handle.id) {
            Some(entry) => {
                entry.users.remove(&surface);
                self.backend.detach_surface(&mut entry.native, surface);
                entry.users.is_empty()
            }
            None => return Ok(false),
        };

        if last_user {
            self.teardown(handle.id)?;
        }
        Ok(last_user)
    }

    /// Tears down every context regardless of users.
    ///
    /// Returns the number destroyed; failures are logged and the remaining
    /// contexts are still torn down.
    pub fn destroy_all(&mut self) -> usize {
        let mut ids: Vec<ContextId> = self.contexts.keys().copied().collect();
        ids.sort();

        let mut destroyed = 0;
        for id in ids {
            match self.teardown(id) {
                Ok(()) => destroyed += 1,
                Err(err) => log::error!("failed to destroy context {id}: {err}"),
            }
        }
        destroyed
    }

    /// Runs `body` with context `id` current, then restores whatever was current
    /// before, including when `body` panics.
    pub fn with_context_current<R>(
        &mut self,
        id: ContextId,
        body: impl FnOnce(&mut CurrentContext<'_, B>) -> R,
    ) -> BackendResult<R> {
        if !self.contexts.contains_key(&id) {
            return Err(BackendError::new("make_current", format!("unknown context {id}")));
        }

        let previous = self.current;
        let switch = previous != Some(id);

        if switch {
            self.bind(Some(id))?;
        }

        let result = {
            let entry = self
                .contexts
                .get_mut(&id)
                .ok_or_else(|| BackendError::new("make_current", format!("unknown context {id}")))?;
            let mut current = CurrentContext {
                id,
                backend: &mut self.backend,
                entry,
            };
            panic::catch_unwind(AssertUnwindSafe(|| body(&mut current)))
        };

        if switch {
            let restore = previous.filter(|p| self.contexts.contains_key(p));
            if let Err(err) = self.bind(restore) {
                log::warn!("failed to restore previous context {previous:?}: {err}");
            }
        }

        match result {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn bind(&mut self, id: Option<ContextId>) -> BackendResult<()> {
        let native = match id {
            Some(id) => Some(
                &mut self
                    .contexts
                    .get_mut(&id)
                    .ok_or_else(|| {
                        BackendError::new("make_current", format!("unknown context {id}"))
                    })?
                    .native,
            ),
            None => None,
        };
        self.backend.make_current(native)?;
        self.current = id;
        Ok(())
    }

    /// Context current → drain pending frees → native destroy.
    ///
    /// The entry is removed even when a step fails, so a context whose last
    /// user has gone never lingers in the table; the first error is returned.
    fn teardown(&mut self, id: ContextId) -> BackendResult<()> {
        let free_list = Arc::clone(&self.free_list);
        let drained = match self.with_context_current(id, |cur| free_list.drain(cur)) {
            Ok(report) => {
                if report.requeued > 0 {
                    log::warn!(
                        "context {id}: {} frees still failing at teardown; released with the context",
                        report.requeued
                    );
                }
                Ok(())
            }
            Err(err) => {
                log::warn!("context {id}: could not drain pending frees at teardown: {err}");
                Err(err)
            }
        };
        free_list.discard(id);

        let unbound = if self.current == Some(id) {
            let result = self.bind(None);
            // Never leave a removed context recorded as current.
            self.current = None;
            result
        } else {
            Ok(())
        };

        let Some(entry) = self.contexts.remove(&id) else {
            return drained.and(unbound);
        };
        let destroyed = {
            let _guard = creation_guard();
            self.backend.destroy_context(entry.native)
        };
        match &destroyed {
            Ok(()) => log::debug!("destroyed context {id}"),
            Err(err) => log::error!("context {id}: native destroy failed; dropping it anyway: {err}"),
        }
        drained.and(unbound).and(destroyed)
    }
}

impl<B: GraphicsBackend> Drop for ContextRegistry<B> {
    fn drop(&mut self) {
        if !self.contexts.is_empty() {
            self.destroy_all();
        }
    }
}
