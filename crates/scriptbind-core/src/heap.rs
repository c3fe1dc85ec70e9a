//! Generational arena for host objects.

use crate::object::HostObject;

/// Handle to a heap-allocated host object.
///
/// Copyable and cheap. The generation detects handles that outlived their
/// object: once a slot is freed and reused, old handles stop resolving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    /// Index into `ObjectHeap.slots`
    pub index: u32,
    /// Generation for use-after-free detection
    pub generation: u32,
}

impl ObjectHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Heap storage for host objects with generational indices.
///
/// Objects are not reference counted. They stay alive until the collector
/// finds them unreachable, at which point the slot is freed and its
/// generation bumped.
pub struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

struct HeapSlot {
    generation: u32,
    object: Option<HostObject>,
    marked: bool,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a new object on the heap.
    pub fn allocate(&mut self, object: HostObject) -> ObjectHandle {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            ObjectHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                object: Some(object),
                marked: false,
            });
            ObjectHandle::new(index, 0)
        }
    }

    /// Returns None if the handle is stale.
    pub fn get(&self, handle: ObjectHandle) -> Option<&HostObject> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_ref()
    }

    /// Returns None if the handle is stale.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut HostObject> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_mut()
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Free an object immediately, returning it so the caller controls when
    /// it is dropped.
    pub fn free(&mut self, handle: ObjectHandle) -> Option<HostObject> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.marked = false;
        self.free_list.push(handle.index);
        self.live -= 1;
        Some(object)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    // ========================================================================
    // Collector support
    // ========================================================================

    /// Mark a live object. Returns true if it was not marked before.
    pub(crate) fn mark(&mut self, handle: ObjectHandle) -> bool {
        if let Some(slot) = self.slots.get_mut(handle.index as usize)
            && slot.generation == handle.generation
            && slot.object.is_some()
            && !slot.marked
        {
            slot.marked = true;
            return true;
        }
        false
    }

    /// Free every unmarked object and clear the marks on the survivors.
    pub(crate) fn sweep(&mut self) -> Vec<(ObjectHandle, HostObject)> {
        let mut dead = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
                continue;
            }
            let handle = ObjectHandle::new(index as u32, slot.generation);
            if let Some(object) = slot.object.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
                dead.push((handle, object));
            }
        }
        self.live -= dead.len();
        dead
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}
