//! Native object handles and the type-erased holder.
//!
//! Native objects live in an `Arc<RwLock<T>>`. [`Native<T>`] is the typed
//! handle native code works with; [`AnyNative`] is the same allocation with
//! the type erased, which is what a wrapped host object stores. The
//! allocation address is the object's identity across both views.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::lifetime::DisposalPolicy;

/// Type-erased native allocation. The concrete type is always `RwLock<D>`.
pub type ErasedNative = Arc<dyn Any + Send + Sync>;

/// Shared handle to a native object.
pub struct Native<T> {
    cell: Arc<RwLock<T>>,
}

impl<T: Send + Sync + 'static> Native<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(RwLock::new(value)),
        }
    }

    /// Blocking shared borrow.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.cell.read()
    }

    /// Blocking exclusive borrow.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.cell.write()
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.cell.try_read()
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.cell.try_write()
    }

    /// Identity of the native object.
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.cell) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Native<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Number of strong handles, including the ones held by host objects.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    /// Type-erased view of the same allocation.
    pub fn erase(&self) -> AnyNative {
        let erased: ErasedNative = self.cell.clone();
        AnyNative {
            erased,
            type_name: type_name::<T>(),
            size: size_of::<T>(),
        }
    }

    /// Take the value back if this is the last strong handle.
    pub fn into_inner(self) -> Result<T, Self> {
        Arc::try_unwrap(self.cell)
            .map(RwLock::into_inner)
            .map_err(|cell| Self { cell })
    }
}

impl<T> Clone for Native<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Default + Send + Sync + 'static> Default for Native<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Native<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("type", &type_name::<T>())
            .field("address", &(Arc::as_ptr(&self.cell) as *const ()))
            .finish()
    }
}

/// A native object with its type erased.
#[derive(Clone)]
pub struct AnyNative {
    erased: ErasedNative,
    type_name: &'static str,
    size: usize,
}

impl AnyNative {
    pub(crate) fn from_parts(erased: ErasedNative, type_name: &'static str, size: usize) -> Self {
        Self {
            erased,
            type_name,
            size,
        }
    }

    /// Name of the concrete type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `TypeId` of the concrete holder, `RwLock<D>`.
    pub fn holder_type_id(&self) -> TypeId {
        Any::type_id(&*self.erased)
    }

    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.erased) as *const () as usize
    }

    /// Size of the concrete type in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is<D: Send + Sync + 'static>(&self) -> bool {
        self.erased.is::<RwLock<D>>()
    }

    /// Recover the typed handle if the concrete type is exactly `D`.
    pub fn downcast<D: Send + Sync + 'static>(&self) -> Option<Native<D>> {
        self.erased
            .clone()
            .downcast::<RwLock<D>>()
            .ok()
            .map(|cell| Native { cell })
    }

    pub(crate) fn erased(&self) -> &ErasedNative {
        &self.erased
    }
}

impl fmt::Debug for AnyNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyNative")
            .field("type", &self.type_name)
            .field("address", &(self.address() as *const ()))
            .finish()
    }
}

// ============================================================================
// Wrapped object payload
// ============================================================================

enum Holder {
    /// The host object shares ownership.
    Owned(ErasedNative),
    /// The host object only observes.
    Borrowed(Weak<dyn Any + Send + Sync>),
    Detached,
}

/// Payload stored in the internal field of every host object the engine
/// creates for a native object.
pub struct WrappedNative {
    descriptor: TypeId,
    type_name: &'static str,
    size: usize,
    address: usize,
    /// Native side owns the object for good. Never promoted.
    pinned: bool,
    binding: Mutex<Binding>,
}

struct Binding {
    policy: DisposalPolicy,
    holder: Holder,
}

impl WrappedNative {
    pub(crate) fn new(native: &AnyNative, descriptor: TypeId, policy: DisposalPolicy) -> Self {
        let holder = match policy {
            DisposalPolicy::Delete => Holder::Owned(native.erased.clone()),
            DisposalPolicy::LeaveAlone => Holder::Borrowed(Arc::downgrade(&native.erased)),
        };
        Self {
            descriptor,
            type_name: native.type_name,
            size: native.size,
            address: native.address(),
            pinned: false,
            binding: Mutex::new(Binding { policy, holder }),
        }
    }

    /// Refuse later promotion. Override objects use this: their host object
    /// is rooted by the native side, so owning it back would form a cycle.
    pub(crate) fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// Switch a borrowed binding to [`DisposalPolicy::Delete`].
    ///
    /// Returns true if the host object now shares ownership. Pinned,
    /// owned and detached bindings are left alone, as are bindings whose
    /// object is already gone.
    pub(crate) fn promote(&self) -> bool {
        if self.pinned {
            return false;
        }
        let mut binding = self.binding.lock();
        let Holder::Borrowed(weak) = &binding.holder else {
            return false;
        };
        let Some(erased) = weak.upgrade() else {
            return false;
        };
        binding.holder = Holder::Owned(erased);
        binding.policy = DisposalPolicy::Delete;
        true
    }

    /// The native object, if it still exists.
    pub fn get(&self) -> Option<AnyNative> {
        let erased = match &self.binding.lock().holder {
            Holder::Owned(erased) => erased.clone(),
            Holder::Borrowed(weak) => weak.upgrade()?,
            Holder::Detached => return None,
        };
        Some(AnyNative::from_parts(erased, self.type_name, self.size))
    }

    pub fn is_detached(&self) -> bool {
        match &self.binding.lock().holder {
            Holder::Owned(_) => false,
            Holder::Borrowed(weak) => weak.strong_count() == 0,
            Holder::Detached => true,
        }
    }

    /// Drop the host object's claim on the native object. Returns the owning
    /// reference, if there was one, so the caller decides where it drops.
    pub(crate) fn detach(&self) -> Option<ErasedNative> {
        match std::mem::replace(&mut self.binding.lock().holder, Holder::Detached) {
            Holder::Owned(erased) => Some(erased),
            Holder::Borrowed(_) | Holder::Detached => None,
        }
    }

    /// `TypeId` of the descriptor this object was wrapped with.
    pub fn descriptor(&self) -> TypeId {
        self.descriptor
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn address(&self) -> usize {
        self.address
    }

    /// Size of the concrete native type in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current policy. A promoted binding reports `Delete`.
    pub fn policy(&self) -> DisposalPolicy {
        self.binding.lock().policy
    }
}

impl fmt::Debug for WrappedNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedNative")
            .field("type", &self.type_name)
            .field("address", &(self.address as *const ()))
            .field("policy", &self.policy())
            .field("detached", &self.is_detached())
            .finish()
    }
}
