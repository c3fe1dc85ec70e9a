//! Coordination between native ownership and host garbage collection.
//!
//! Every host object created for a native object gets a one-shot weak
//! callback. When the collector finds the object unreachable, the callback
//! applies the object's [`DisposalPolicy`], removes the object from its
//! descriptor's existing-object map and gives back the external memory
//! charged for it.
//!
//! A borrowed binding can later be promoted to an owning one when native
//! code hands the same object over with [`DisposalPolicy::Delete`]. The
//! charge follows the promotion.

use std::sync::Arc;

use scriptbind_core::{InternalField, Isolate, ObjectHandle};

use crate::error::BindError;
use crate::native::WrappedNative;
use crate::registry::WeakRegistry;

/// What happens to the native object when its host object is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisposalPolicy {
    /// The host object shares ownership; collection releases that share,
    /// destroying the native object if it was the last one.
    Delete,
    /// Native code owns the object; collection only detaches the handle.
    LeaveAlone,
}

impl DisposalPolicy {
    /// Apply the policy to a dead object's payload.
    pub(crate) fn dispose(self, wrapped: &WrappedNative) {
        let released = wrapped.detach();
        match self {
            DisposalPolicy::Delete => drop(released),
            DisposalPolicy::LeaveAlone => debug_assert!(released.is_none()),
        }
    }

    /// External memory charged for a native object of `size` bytes.
    pub(crate) fn charged_size(self, size: usize) -> usize {
        match self {
            DisposalPolicy::Delete => size,
            DisposalPolicy::LeaveAlone => 0,
        }
    }
}

/// Install `wrapped` as the payload of `handle` and register its finalizer.
pub(crate) fn attach(
    isolate: &Isolate,
    registry: WeakRegistry,
    handle: ObjectHandle,
    wrapped: Arc<WrappedNative>,
) -> Result<(), BindError> {
    let size = wrapped.policy().charged_size(wrapped.size());
    let field: InternalField = wrapped.clone();
    isolate.set_internal(handle, field)?;
    if size > 0 {
        isolate.adjust_external_memory(size as i64);
    }
    log::debug!(
        target: "scriptbind::wrap",
        "attached {} at {:#x} to {}:{} ({:?}, {size} bytes)",
        wrapped.type_name(),
        wrapped.address(),
        handle.index,
        handle.generation,
        wrapped.policy()
    );
    isolate.make_weak(handle, move |iso, internal| finalize(iso, &registry, handle, internal));
    Ok(())
}

/// Let a borrowed host object share ownership of its native object.
///
/// Returns false when the binding cannot be promoted.
pub(crate) fn promote(isolate: &Isolate, handle: ObjectHandle, wrapped: &WrappedNative) -> bool {
    if !wrapped.promote() {
        return false;
    }
    let size = DisposalPolicy::Delete.charged_size(wrapped.size());
    if size > 0 {
        isolate.adjust_external_memory(size as i64);
    }
    log::debug!(
        target: "scriptbind::wrap",
        "{} at {:#x} now owned by {}:{} ({size} bytes)",
        wrapped.type_name(),
        wrapped.address(),
        handle.index,
        handle.generation
    );
    true
}

fn finalize(
    isolate: &Isolate,
    registry: &WeakRegistry,
    handle: ObjectHandle,
    internal: Option<InternalField>,
) {
    let Some(wrapped) = internal.and_then(|field| field.downcast::<WrappedNative>().ok()) else {
        log::warn!(
            target: "scriptbind::gc",
            "finalizer for {}:{} found no native payload",
            handle.index,
            handle.generation
        );
        return;
    };
    if let Some(registry) = registry.upgrade() {
        registry.forget(wrapped.descriptor(), wrapped.address(), handle);
    }
    // a promoted binding was charged when it was promoted
    let policy = wrapped.policy();
    let size = policy.charged_size(wrapped.size());
    policy.dispose(&wrapped);
    if size > 0 {
        isolate.adjust_external_memory(-(size as i64));
    }
    log::debug!(
        target: "scriptbind::gc",
        "finalized {} at {:#x} ({:?})",
        wrapped.type_name(),
        wrapped.address(),
        policy
    );
}

#[cfg(test)]
mod tests {
    use std::any::TypeId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::native::Native;
    use crate::registry::TypeRegistry;

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked([u8; 24]);

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn delete_policy_releases_and_refunds_memory() {
        let isolate = Isolate::new();
        let registry = TypeRegistry::new(&isolate);
        let handle = isolate.new_object();
        let native = Native::new(Tracked([0; 24]));
        let wrapped = Arc::new(WrappedNative::new(
            &native.erase(),
            TypeId::of::<Tracked>(),
            DisposalPolicy::Delete,
        ));
        drop(native);

        attach(&isolate, registry.downgrade(), handle, wrapped).unwrap();
        assert_eq!(isolate.external_memory(), 24);

        let before = DROPS.load(Ordering::SeqCst);
        isolate.collect_garbage();
        assert_eq!(DROPS.load(Ordering::SeqCst), before + 1);
        assert_eq!(isolate.external_memory(), 0);
    }

    #[test]
    fn leave_alone_policy_never_destroys() {
        let isolate = Isolate::new();
        let registry = TypeRegistry::new(&isolate);
        let handle = isolate.new_object();
        let native = Native::new(7_u64);
        let wrapped = Arc::new(WrappedNative::new(
            &native.erase(),
            TypeId::of::<u64>(),
            DisposalPolicy::LeaveAlone,
        ));

        attach(&isolate, registry.downgrade(), handle, wrapped).unwrap();
        assert_eq!(isolate.external_memory(), 0);
        isolate.collect_garbage();
        assert_eq!(native.strong_count(), 1);
        assert_eq!(*native.read(), 7);
    }

    struct Noted(Arc<AtomicUsize>, [u8; 16]);

    impl Drop for Noted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn promoted_bindings_own_and_refund() {
        let isolate = Isolate::new();
        let registry = TypeRegistry::new(&isolate);
        let drops = Arc::new(AtomicUsize::new(0));
        let handle = isolate.new_object();
        let native = Native::new(Noted(drops.clone(), [0; 16]));
        let wrapped = Arc::new(WrappedNative::new(
            &native.erase(),
            TypeId::of::<Noted>(),
            DisposalPolicy::LeaveAlone,
        ));
        attach(&isolate, registry.downgrade(), handle, wrapped.clone()).unwrap();
        assert_eq!(isolate.external_memory(), 0);

        assert!(promote(&isolate, handle, &wrapped));
        assert!(!promote(&isolate, handle, &wrapped));
        assert_eq!(isolate.external_memory(), size_of::<Noted>() as i64);
        drop(native);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(wrapped);
        isolate.collect_garbage();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(isolate.external_memory(), 0);
    }
}
