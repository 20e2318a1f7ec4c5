use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::RenderError;

use super::backend::{GraphicsBackend, ResourceId, ResourceKind};
use super::context::{ContextId, CurrentContext, DeleteOutcome};

/// Deferred GPU-object deletion, partitioned by owning context.
///
/// Any thread may enqueue. Entries leave the list only through [`drain`], which
/// needs the owning context current.
///
/// [`drain`]: ResourceFreeList::drain
#[derive(Debug, Default)]
pub struct ResourceFreeList {
    pending: Mutex<HashMap<ContextId, VecDeque<(ResourceKind, ResourceId)>>>,
}

/// Outcome of one [`ResourceFreeList::drain`].
#[derive(Debug, Default)]
pub struct DrainReport {
    pub freed: usize,
    /// Ids that were no longer live and were dropped without a backend call.
    pub skipped: usize,
    /// Ids whose deletion failed and went back on the list.
    pub requeued: usize,
    pub errors: Vec<RenderError>,
}

impl ResourceFreeList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContextId, VecDeque<(ResourceKind, ResourceId)>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, context: ContextId, kind: ResourceKind, id: ResourceId) {
        self.lock().entry(context).or_default().push_back((kind, id));
    }

    pub fn pending(&self, context: ContextId) -> usize {
        self.lock().get(&context).map_or(0, VecDeque::len)
    }

    pub fn total_pending(&self) -> usize {
        self.lock().values().map(VecDeque::len).sum()
    }

    /// Deletes every pending id of the current context.
    ///
    /// Failed deletions are re-queued ahead of anything enqueued meanwhile, so
    /// order is preserved across retries.
    pub fn drain<B: GraphicsBackend>(&self, current: &mut CurrentContext<'_, B>) -> DrainReport {
        let context = current.id();
        let batch = match self.lock().get_mut(&context) {
            Some(queue) => std::mem::take(queue),
            None => return DrainReport::default(),
        };

        let mut report = DrainReport::default();
        let mut retry = VecDeque::new();

        for (kind, id) in batch {
            match current.delete_resource(kind, id) {
                DeleteOutcome::Freed => report.freed += 1,
                DeleteOutcome::NotLive => {
                    log::warn!("context {context}: {kind:?} {id} is not live; dropping free request");
                    report.skipped += 1;
                }
                DeleteOutcome::Failed(source) => {
                    let err = RenderError::ResourceFree { context, kind, id, source };
                    log::warn!("{err}; re-queued");
                    report.errors.push(err);
                    retry.push_back((kind, id));
                }
            }
        }

        report.requeued = retry.len();
        if !retry.is_empty() {
            let mut pending = self.lock();
            let queue = pending.entry(context).or_default();
            retry.append(queue);
            *queue = retry;
        }

        if report.freed > 0 {
            log::trace!("context {context}: freed {} resources", report.freed);
        }
        report
    }

    /// Forgets everything pending for a destroyed context.
    pub(crate) fn discard(&self, context: ContextId) -> usize {
        self.lock().remove(&context).map_or(0, |q| q.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::coords::PixelRect;
    use crate::device::testing::{Call, RecordingBackend};
    use crate::device::{ContextRegistry, ResourceDesc, SurfaceDesc};
    use crate::surface::SurfaceId;

    fn setup() -> (ContextRegistry<RecordingBackend>, RecordingBackend, ContextId) {
        let backend = RecordingBackend::default();
        let recorder = backend.clone();
        let mut reg = ContextRegistry::new(backend, Arc::new(ResourceFreeList::new()));
        let desc = SurfaceDesc {
            id: SurfaceId::from_raw(1),
            rect: PixelRect::from_size(8, 8),
            stereo: false,
            offscreen: true,
        };
        let id = reg.acquire_context(&desc, false).unwrap().id;
        (reg, recorder, id)
    }

    fn texture(reg: &mut ContextRegistry<RecordingBackend>, ctx: ContextId) -> ResourceId {
        reg.with_context_current(ctx, |cur| {
            cur.create_resource(&ResourceDesc::Texture { width: 2, height: 2 })
        })
        .unwrap()
        .unwrap()
    }

    fn drain(reg: &mut ContextRegistry<RecordingBackend>, ctx: ContextId) -> DrainReport {
        let list = Arc::clone(reg.free_list());
        reg.with_context_current(ctx, |cur| list.drain(cur)).unwrap()
    }

    #[test]
    fn drain_frees_in_enqueue_order() {
        let (mut reg, recorder, ctx) = setup();
        let a = texture(&mut reg, ctx);
        let b = texture(&mut reg, ctx);
        reg.free_list().enqueue(ctx, ResourceKind::Texture, b);
        reg.free_list().enqueue(ctx, ResourceKind::Texture, a);

        let report = drain(&mut reg, ctx);
        assert_eq!(report.freed, 2);
        let deletes: Vec<_> = recorder
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(deletes, vec![b, a]);
        assert_eq!(reg.live_resource_count(ctx), 0);
    }

    #[test]
    fn failed_free_is_requeued_then_retried() {
        let (mut reg, recorder, ctx) = setup();
        let a = texture(&mut reg, ctx);
        let b = texture(&mut reg, ctx);
        reg.free_list().enqueue(ctx, ResourceKind::Texture, a);
        reg.free_list().enqueue(ctx, ResourceKind::Texture, b);

        recorder.fail_delete(a);
        let first = drain(&mut reg, ctx);
        assert_eq!((first.freed, first.requeued), (1, 1));
        assert_eq!(first.errors.len(), 1);
        assert_eq!(reg.free_list().pending(ctx), 1);
        assert_eq!(reg.live_resource_count(ctx), 1);

        recorder.heal_delete(a);
        let second = drain(&mut reg, ctx);
        assert_eq!(second.freed, 1);
        assert_eq!(reg.free_list().pending(ctx), 0);
        assert_eq!(reg.live_resource_count(ctx), 0);
    }

    #[test]
    fn duplicate_free_is_never_passed_to_backend() {
        let (mut reg, recorder, ctx) = setup();
        let a = texture(&mut reg, ctx);
        reg.free_list().enqueue(ctx, ResourceKind::Texture, a);
        reg.free_list().enqueue(ctx, ResourceKind::Texture, a);

        let report = drain(&mut reg, ctx);
        assert_eq!((report.freed, report.skipped), (1, 1));
        assert_eq!(recorder.count(|c| matches!(c, Call::Delete(_))), 1);
    }

    #[test]
    fn other_contexts_are_left_alone() {
        let (mut reg, _, ctx) = setup();
        let other = ContextId::from_raw(999);
        reg.free_list().enqueue(other, ResourceKind::DisplayList, ResourceId::from_raw(5));
        drain(&mut reg, ctx);
        assert_eq!(reg.free_list().pending(other), 1);
        assert_eq!(reg.free_list().total_pending(), 1);
    }
}
