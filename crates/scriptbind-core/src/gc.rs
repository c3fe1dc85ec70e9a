//! Tracing garbage collector for the host heap.
//!
//! ## Algorithm
//!
//! A stop-the-world mark and sweep, run only when asked
//! (`Isolate::collect_garbage`):
//!
//! 1. Mark everything reachable from the global object and from persistent
//!    roots (`Global` handles).
//! 2. Sweep every unmarked object out of the heap.
//! 3. For each dead object that had a weak callback, hand the callback the
//!    object's internal field.
//!
//! Step 3 and dropping the dead objects happen after the isolate state is
//! released, so callbacks and native destructors may call back into the
//! isolate.

use rustc_hash::FxHashMap;

use crate::heap::{ObjectHandle, ObjectHeap};
use crate::isolate::Isolate;
use crate::object::{HostObject, InternalField};

/// One-shot finalizer attached to an object.
///
/// Receives the dead object's internal field, if it had one.
pub type WeakCallback = Box<dyn FnOnce(&Isolate, Option<InternalField>) + Send>;

/// Statistics from the garbage collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStatistics {
    /// Number of completed collections
    pub collections: u64,
    /// Objects alive after the last collection
    pub live_objects: usize,
    /// Objects freed by the last collection
    pub last_collected: usize,
    /// Objects freed over the isolate's lifetime
    pub total_collected: u64,
    /// Weak callbacks run over the isolate's lifetime
    pub weak_callbacks_run: u64,
}

/// Output of a collection, consumed outside the state borrow.
pub(crate) struct Sweep {
    pub(crate) dead: Vec<HostObject>,
    pub(crate) finalizers: Vec<(WeakCallback, Option<InternalField>)>,
}

/// Collector bookkeeping stored in the isolate.
pub(crate) struct GcState {
    /// Persistent roots with their handle counts.
    roots: FxHashMap<ObjectHandle, u32>,
    weak: FxHashMap<ObjectHandle, WeakCallback>,
    external_memory: i64,
    stats: GcStatistics,
}

impl GcState {
    pub(crate) fn new() -> Self {
        Self {
            roots: FxHashMap::default(),
            weak: FxHashMap::default(),
            external_memory: 0,
            stats: GcStatistics::default(),
        }
    }

    pub(crate) fn root(&mut self, handle: ObjectHandle) {
        *self.roots.entry(handle).or_insert(0) += 1;
    }

    pub(crate) fn unroot(&mut self, handle: ObjectHandle) {
        if let Some(count) = self.roots.get_mut(&handle) {
            *count -= 1;
            if *count == 0 {
                self.roots.remove(&handle);
            }
        }
    }

    pub(crate) fn is_rooted(&self, handle: ObjectHandle) -> bool {
        self.roots.contains_key(&handle)
    }

    /// Replaces any callback already registered for `handle`.
    pub(crate) fn set_weak(&mut self, handle: ObjectHandle, callback: WeakCallback) {
        self.weak.insert(handle, callback);
    }

    pub(crate) fn clear_weak(&mut self, handle: ObjectHandle) -> bool {
        self.weak.remove(&handle).is_some()
    }

    pub(crate) fn has_weak(&self, handle: ObjectHandle) -> bool {
        self.weak.contains_key(&handle)
    }

    /// Adjust the external-memory counter, clamping at zero.
    pub(crate) fn adjust_external_memory(&mut self, delta: i64) -> i64 {
        let next = self.external_memory.saturating_add(delta);
        if next < 0 {
            log::warn!(
                target: "scriptbind::gc",
                "external memory would go negative ({next}), clamping to 0"
            );
        }
        self.external_memory = next.max(0);
        self.external_memory
    }

    pub(crate) fn external_memory(&self) -> i64 {
        self.external_memory
    }

    pub(crate) fn statistics(&self) -> GcStatistics {
        self.stats
    }

    /// Mark from the roots and sweep the heap.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn collect(&mut self, heap: &mut ObjectHeap, global: ObjectHandle) -> Sweep {
        let mut worklist: Vec<ObjectHandle> = Vec::with_capacity(self.roots.len() + 1);
        worklist.push(global);
        worklist.extend(self.roots.keys().copied());

        let mut children = Vec::new();
        while let Some(handle) = worklist.pop() {
            if !heap.mark(handle) {
                continue;
            }
            if let Some(object) = heap.get(handle) {
                children.clear();
                object.trace(&mut children);
                worklist.extend(children.iter().copied());
            }
        }

        let mut dead = Vec::new();
        let mut finalizers = Vec::new();
        for (handle, mut object) in heap.sweep() {
            if let Some(callback) = self.weak.remove(&handle) {
                finalizers.push((callback, object.internal.take()));
            }
            dead.push(object);
        }

        self.stats.collections += 1;
        self.stats.last_collected = dead.len();
        self.stats.total_collected += dead.len() as u64;
        self.stats.weak_callbacks_run += finalizers.len() as u64;
        self.stats.live_objects = heap.len();

        Sweep { dead, finalizers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Property, PropertyFlags};
    use crate::value::Value;

    fn link(heap: &mut ObjectHeap, from: ObjectHandle, key: &str, to: ObjectHandle) {
        heap.get_mut(from).unwrap().define(
            key,
            Property::Data {
                value: Value::Object(to),
                flags: PropertyFlags::assigned(),
            },
        );
    }

    #[test]
    fn reachable_objects_survive() {
        let mut heap = ObjectHeap::new();
        let mut gc = GcState::new();
        let global = heap.allocate(HostObject::plain(None));
        let child = heap.allocate(HostObject::plain(None));
        let grandchild = heap.allocate(HostObject::plain(None));
        let orphan = heap.allocate(HostObject::plain(None));
        link(&mut heap, global, "child", child);
        link(&mut heap, child, "next", grandchild);

        let sweep = gc.collect(&mut heap, global);
        assert_eq!(sweep.dead.len(), 1);
        assert!(heap.contains(child));
        assert!(heap.contains(grandchild));
        assert!(!heap.contains(orphan));
        assert_eq!(gc.statistics().live_objects, 3);
    }

    #[test]
    fn cycles_are_collected() {
        let mut heap = ObjectHeap::new();
        let mut gc = GcState::new();
        let global = heap.allocate(HostObject::plain(None));
        let a = heap.allocate(HostObject::plain(None));
        let b = heap.allocate(HostObject::plain(None));
        link(&mut heap, a, "b", b);
        link(&mut heap, b, "a", a);

        let sweep = gc.collect(&mut heap, global);
        assert_eq!(sweep.dead.len(), 2);
    }

    #[test]
    fn roots_are_counted() {
        let mut heap = ObjectHeap::new();
        let mut gc = GcState::new();
        let global = heap.allocate(HostObject::plain(None));
        let rooted = heap.allocate(HostObject::plain(None));
        gc.root(rooted);
        gc.root(rooted);
        gc.unroot(rooted);

        gc.collect(&mut heap, global);
        assert!(heap.contains(rooted));

        gc.unroot(rooted);
        assert!(!gc.is_rooted(rooted));
        gc.collect(&mut heap, global);
        assert!(!heap.contains(rooted));
    }

    #[test]
    fn weak_callbacks_are_handed_out_once() {
        let mut heap = ObjectHeap::new();
        let mut gc = GcState::new();
        let global = heap.allocate(HostObject::plain(None));
        let doomed = heap.allocate(HostObject::plain(None));
        gc.set_weak(doomed, Box::new(|_, _| {}));

        let sweep = gc.collect(&mut heap, global);
        assert_eq!(sweep.finalizers.len(), 1);
        assert!(!gc.has_weak(doomed));

        let sweep = gc.collect(&mut heap, global);
        assert!(sweep.finalizers.is_empty());
        assert_eq!(gc.statistics().weak_callbacks_run, 1);
        assert_eq!(gc.statistics().collections, 2);
    }

    #[test]
    fn external_memory_never_goes_negative() {
        let mut gc = GcState::new();
        assert_eq!(gc.adjust_external_memory(100), 100);
        assert_eq!(gc.adjust_external_memory(-40), 60);
        assert_eq!(gc.adjust_external_memory(-100), 0);
        assert_eq!(gc.external_memory(), 0);
    }
}
