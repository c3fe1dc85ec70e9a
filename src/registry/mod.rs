//! The type registry: one binding configuration per isolate.
//!
//! A [`TypeRegistry`] owns one [`TypeDescriptor`] per registered native
//! type. It creates host objects for native objects, recovers native
//! objects from host values and drives the lifetime layer.
//!
//! # Example
//!
//! ```ignore
//! let isolate = Isolate::new();
//! let registry = TypeRegistry::new(&isolate);
//!
//! registry
//!     .class::<Point>("Point")
//!     .constructor("Point", |x: f64, y: f64| Point { x, y })?
//!     .member("x", |p: &Point| p.x, |p: &mut Point, x: f64| p.x = x)?
//!     .method("length", |p: &Point| p.x.hypot(p.y))?
//!     .finalize(false)?;
//! ```

mod class_builder;
mod descriptor;
mod interface;

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use scriptbind_core::{Isolate, ObjectHandle, PropertyFlags, Value};

pub use class_builder::ClassBuilder;
pub use descriptor::{DescriptorCore, Phase, PropertyChanged, TypeDescriptor};
pub use interface::InterfaceBuilder;

use crate::compat::{CompatibilityChain, Obj};
use crate::convert::{FromScript, ToScript};
use crate::error::{BindError, CastError};
use crate::lifetime::{self, DisposalPolicy};
use crate::native::{AnyNative, Native, WrappedNative};

#[derive(Clone)]
struct Entry {
    core: Arc<DescriptorCore>,
    /// `Arc<TypeDescriptor<T>>`
    typed: Arc<dyn Any + Send + Sync>,
}

/// Compatibility chain shared between a descriptor or interface and the
/// registry's chain map.
pub(crate) type SharedChain<T> = Arc<RwLock<CompatibilityChain<T>>>;

struct RegistryInner {
    isolate: Isolate,
    descriptors: RwLock<FxHashMap<TypeId, Entry>>,
    /// Holder type (`RwLock<T>`) to registered type.
    by_holder: RwLock<FxHashMap<TypeId, TypeId>>,
    /// View type to its `SharedChain`. Classes and interfaces both land here.
    chains: RwLock<FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

/// Binding configuration of one isolate.
///
/// Cheap to clone; clones share descriptors. Call thunks and finalizers
/// only hold a [`WeakRegistry`], so dropping every `TypeRegistry` makes
/// later calls into bound functions fail with
/// [`BindError::RegistryDropped`].
#[derive(Clone)]
pub struct TypeRegistry {
    inner: Arc<RegistryInner>,
}

/// Non-owning reference to a [`TypeRegistry`].
#[derive(Clone)]
pub struct WeakRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<TypeRegistry> {
        self.inner.upgrade().map(|inner| TypeRegistry { inner })
    }

    pub(crate) fn registry(&self) -> Result<TypeRegistry, BindError> {
        self.upgrade().ok_or(BindError::RegistryDropped)
    }
}

impl fmt::Debug for WeakRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl TypeRegistry {
    pub fn new(isolate: &Isolate) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                isolate: isolate.clone(),
                descriptors: RwLock::new(FxHashMap::default()),
                by_holder: RwLock::new(FxHashMap::default()),
                chains: RwLock::new(FxHashMap::default()),
            }),
        }
    }

    pub fn isolate(&self) -> &Isolate {
        &self.inner.isolate
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Start or continue describing `T`, published as `name`.
    ///
    /// The descriptor is created on first use and lives as long as the
    /// registry. Asking again for a registered type under another name
    /// keeps the first name.
    pub fn class<T: Send + Sync + 'static>(&self, name: &str) -> ClassBuilder<T> {
        if let Some(existing) = self.descriptor::<T>() {
            if existing.core().name() != name {
                log::warn!(
                    target: "scriptbind::registration",
                    "{} is already registered as {}, ignoring new name {name}",
                    type_name::<T>(),
                    existing.core().name()
                );
            }
            return ClassBuilder::new(self.clone(), existing);
        }

        let core = Arc::new(DescriptorCore::new(
            self.isolate(),
            name,
            TypeId::of::<T>(),
            type_name::<T>(),
        ));
        let fresh = Arc::new(TypeDescriptor::<T>::new(core.clone()));
        let descriptor = {
            let mut descriptors = self.inner.descriptors.write();
            let entry = descriptors
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Entry {
                    core,
                    typed: fresh.clone(),
                });
            entry
                .typed
                .clone()
                .downcast::<TypeDescriptor<T>>()
                .unwrap_or(fresh)
        };
        self.inner
            .by_holder
            .write()
            .insert(TypeId::of::<RwLock<T>>(), TypeId::of::<T>());
        self.publish_chain(descriptor.chain());
        log::debug!(target: "scriptbind::registration", "registered {name} ({})", type_name::<T>());

        ClassBuilder::new(self.clone(), descriptor)
    }

    /// Start or continue describing the view `I`, typically a trait object.
    ///
    /// See [`InterfaceBuilder`]. Calling this for a registered class adds
    /// to that class's chain.
    pub fn interface<I: ?Sized + 'static>(&self) -> InterfaceBuilder<I> {
        let chain = self.chain::<I>().unwrap_or_else(|| {
            let fresh: SharedChain<I> = Arc::new(RwLock::new(CompatibilityChain::empty()));
            let mut chains = self.inner.chains.write();
            let entry = chains
                .entry(TypeId::of::<I>())
                .or_insert_with(|| fresh.clone());
            entry.clone().downcast::<RwLock<CompatibilityChain<I>>>().unwrap_or(fresh)
        });
        InterfaceBuilder::new(self.clone(), chain)
    }

    /// Make `chain` the one recovery uses for `T`. Links already added
    /// through [`interface`](Self::interface) carry over.
    fn publish_chain<T: Send + Sync + 'static>(&self, chain: &SharedChain<T>) {
        let previous = self
            .inner
            .chains
            .write()
            .insert(TypeId::of::<T>(), chain.clone());
        let previous = previous.and_then(|p| p.downcast::<RwLock<CompatibilityChain<T>>>().ok());
        if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(p, chain)) {
            chain.write().absorb(&previous.read());
        }
    }

    fn chain<T: ?Sized + 'static>(&self) -> Option<SharedChain<T>> {
        let erased = self.inner.chains.read().get(&TypeId::of::<T>())?.clone();
        erased.downcast::<RwLock<CompatibilityChain<T>>>().ok()
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.inner
            .descriptors
            .read()
            .contains_key(&TypeId::of::<T>())
    }

    pub fn descriptor<T: Send + Sync + 'static>(&self) -> Option<Arc<TypeDescriptor<T>>> {
        let typed = self
            .inner
            .descriptors
            .read()
            .get(&TypeId::of::<T>())?
            .typed
            .clone();
        typed.downcast::<TypeDescriptor<T>>().ok()
    }

    /// Published name of `T`.
    pub fn name_of<T: 'static>(&self) -> Option<String> {
        self.core(TypeId::of::<T>())
            .map(|core| core.name().to_string())
    }

    /// Prototype shared by every instance of `T`.
    pub fn prototype_of<T: 'static>(&self) -> Option<ObjectHandle> {
        self.core(TypeId::of::<T>()).map(|core| core.prototype())
    }

    pub(crate) fn core(&self, type_id: TypeId) -> Option<Arc<DescriptorCore>> {
        self.inner
            .descriptors
            .read()
            .get(&type_id)
            .map(|entry| entry.core.clone())
    }

    /// Descriptor of the concrete type behind a holder.
    fn core_for_holder(&self, holder_type: TypeId) -> Option<Arc<DescriptorCore>> {
        let type_id = *self.inner.by_holder.read().get(&holder_type)?;
        self.core(type_id)
    }

    // ========================================================================
    // Wrapping
    // ========================================================================

    /// Host object for a native object of a registered type.
    ///
    /// While a previously created host object for the same native object
    /// is alive it is returned again. If that object only borrows the native
    /// object, a [`DisposalPolicy::Delete`] request makes it an owner.
    pub fn wrap_existing<T: Send + Sync + 'static>(
        &self,
        native: &Native<T>,
        policy: DisposalPolicy,
    ) -> Result<ObjectHandle, BindError> {
        let core = self.core_of::<T>()?;
        self.wrap_with(&core, &native.erase(), policy)
    }

    /// Host object for a type-erased native object, wrapped as `T`.
    ///
    /// The object must be compatible with `T`. If `T` was finalized with
    /// most-derived materialization and the concrete type is registered,
    /// the concrete type's descriptor is used instead.
    pub fn wrap_any<T: Send + Sync + 'static>(
        &self,
        native: &AnyNative,
        policy: DisposalPolicy,
    ) -> Result<ObjectHandle, BindError> {
        let descriptor = self.descriptor::<T>().ok_or(CastError::Unregistered {
            type_name: type_name::<T>(),
        })?;
        if !descriptor.accepts(native) {
            return Err(CastError::Incompatible {
                expected: type_name::<T>(),
                actual: native.type_name(),
            }
            .into());
        }
        let core = if descriptor.core().most_derived() {
            self.core_for_holder(native.holder_type_id())
                .unwrap_or_else(|| descriptor.core().clone())
        } else {
            descriptor.core().clone()
        };
        self.wrap_with(&core, native, policy)
    }

    /// Host object for an object already recovered as the view `T`.
    ///
    /// A class view wraps like [`wrap_any`](Self::wrap_any). Interfaces have
    /// no prototype of their own, so the concrete type's descriptor is used.
    pub(crate) fn wrap_view<T: ?Sized + 'static>(
        &self,
        native: &AnyNative,
        policy: DisposalPolicy,
    ) -> Result<ObjectHandle, BindError> {
        let view = self.core(TypeId::of::<T>());
        let concrete = match &view {
            Some(core) if !core.most_derived() => None,
            _ => self.core_for_holder(native.holder_type_id()),
        };
        let core = concrete.or(view).ok_or(CastError::Unregistered {
            type_name: native.type_name(),
        })?;
        self.wrap_with(&core, native, policy)
    }

    /// Host object shaped by the concrete type of `native`.
    pub fn wrap_dynamic(
        &self,
        native: &AnyNative,
        policy: DisposalPolicy,
    ) -> Result<ObjectHandle, BindError> {
        let core = self
            .core_for_holder(native.holder_type_id())
            .ok_or(CastError::Unregistered {
                type_name: native.type_name(),
            })?;
        self.wrap_with(&core, native, policy)
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn wrap_with(
        &self,
        core: &DescriptorCore,
        native: &AnyNative,
        policy: DisposalPolicy,
    ) -> Result<ObjectHandle, BindError> {
        if let Some((handle, wrapped)) = self.live_wrapper(core, native.address()) {
            log::trace!(
                target: "scriptbind::wrap",
                "reusing {}:{} for {} at {:#x}",
                handle.index,
                handle.generation,
                core.name(),
                native.address()
            );
            // a Delete request must not leave the object to a weak holder
            if policy == DisposalPolicy::Delete && wrapped.policy() == DisposalPolicy::LeaveAlone {
                lifetime::promote(self.isolate(), handle, &wrapped);
            }
            return Ok(handle);
        }
        let handle = self
            .isolate()
            .new_object_with_prototype(Some(core.prototype()));
        self.bind(core, handle, WrappedNative::new(native, core.type_id(), policy))?;
        Ok(handle)
    }

    /// The mapped host object, if it is alive and still holds the object.
    fn live_wrapper(
        &self,
        core: &DescriptorCore,
        address: usize,
    ) -> Option<(ObjectHandle, Arc<WrappedNative>)> {
        let handle = core.existing(address)?;
        let wrapped = self
            .isolate()
            .internal(handle)?
            .downcast::<WrappedNative>()
            .ok()?;
        (wrapped.address() == address && wrapped.get().is_some()).then_some((handle, wrapped))
    }

    /// Turn `handle` into the host side of a wrapped object pair.
    fn bind(
        &self,
        core: &DescriptorCore,
        handle: ObjectHandle,
        wrapped: WrappedNative,
    ) -> Result<(), BindError> {
        if let Some(interceptors) = core.interceptors() {
            self.isolate().set_interceptors(handle, interceptors)?;
        }
        let address = wrapped.address();
        lifetime::attach(self.isolate(), self.downgrade(), handle, Arc::new(wrapped))?;
        core.remember(address, handle);
        Ok(())
    }

    fn core_of<T: 'static>(&self) -> Result<Arc<DescriptorCore>, CastError> {
        self.core(TypeId::of::<T>()).ok_or(CastError::Unregistered {
            type_name: type_name::<T>(),
        })
    }

    /// Bind a native object of registered type `T` to an existing host object.
    pub(crate) fn bind_object<T: Send + Sync + 'static>(
        &self,
        handle: ObjectHandle,
        native: &Native<T>,
        policy: DisposalPolicy,
    ) -> Result<(), BindError> {
        let core = self.core_of::<T>()?;
        let wrapped = WrappedNative::new(&native.erase(), core.type_id(), policy);
        self.bind(&core, handle, wrapped)
    }

    /// Bind an override object to the host object it dispatches to.
    ///
    /// The native side keeps ownership even if the object is later handed
    /// to scripting code with [`DisposalPolicy::Delete`].
    pub(crate) fn bind_override<T: Send + Sync + 'static>(
        &self,
        handle: ObjectHandle,
        native: &Native<T>,
    ) -> Result<(), BindError> {
        let core = self.core_of::<T>()?;
        let policy = DisposalPolicy::LeaveAlone;
        let wrapped = WrappedNative::new(&native.erase(), core.type_id(), policy).pinned();
        self.bind(&core, handle, wrapped)
    }

    /// Sever a host object from its native object.
    ///
    /// Later host access fails with [`CastError::Detached`]. An owning
    /// reference is released now. Returns false if the object was already
    /// detached.
    pub fn detach(&self, value: &Value) -> Result<bool, BindError> {
        let (wrapped, handle) = self.wrapped(value, "native object")?;
        let was_attached = !wrapped.is_detached();
        let released = wrapped.detach();
        if let Some(core) = self.core(wrapped.descriptor()) {
            core.forget(wrapped.address(), handle);
        }
        drop(released);
        log::debug!(
            target: "scriptbind::wrap",
            "detached {} at {:#x}",
            wrapped.type_name(),
            wrapped.address()
        );
        Ok(was_attached)
    }

    /// Called by finalizers.
    pub(crate) fn forget(&self, descriptor: TypeId, address: usize, handle: ObjectHandle) {
        if let Some(core) = self.core(descriptor) {
            core.forget(address, handle);
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    pub(crate) fn wrapped(
        &self,
        value: &Value,
        expected: &'static str,
    ) -> Result<(Arc<WrappedNative>, ObjectHandle), CastError> {
        let handle = value.as_object().ok_or(CastError::NotAnObject {
            expected,
            actual: value.type_name(),
        })?;
        let wrapped = self
            .isolate()
            .internal(handle)
            .and_then(|field| field.downcast::<WrappedNative>().ok())
            .ok_or(CastError::NotWrapped { expected })?;
        Ok((wrapped, handle))
    }

    /// The native object behind a host value, whatever its type.
    pub fn unwrap_any(
        &self,
        value: &Value,
        expected: &'static str,
    ) -> Result<(AnyNative, ObjectHandle), BindError> {
        let (wrapped, handle) = self.wrapped(value, expected)?;
        let native = wrapped.get().ok_or(CastError::Detached { expected })?;
        Ok((native, handle))
    }

    /// Recover a host value as `T` through `T`'s compatibility chain.
    ///
    /// `T` is a registered class or an interface view. Anything else fails
    /// with [`CastError::Unregistered`].
    pub fn recover<T: ?Sized + 'static>(&self, value: &Value) -> Result<Obj<T>, BindError> {
        let (native, handle) = self.unwrap_any(value, type_name::<T>())?;
        self.resolve_with::<T>(&native, Some(handle))
    }

    /// Recover a native object as `T` without a host object.
    pub fn resolve<T: ?Sized + 'static>(&self, native: &AnyNative) -> Result<Obj<T>, BindError> {
        self.resolve_with::<T>(native, None)
    }

    fn resolve_with<T: ?Sized + 'static>(
        &self,
        native: &AnyNative,
        handle: Option<ObjectHandle>,
    ) -> Result<Obj<T>, BindError> {
        let chain = self.chain::<T>().ok_or(CastError::Unregistered {
            type_name: type_name::<T>(),
        })?;
        let recovered = chain.read().recover(native, handle);
        recovered.ok_or_else(|| {
            CastError::Incompatible {
                expected: type_name::<T>(),
                actual: native.type_name(),
            }
            .into()
        })
    }

    // ========================================================================
    // Conversion helpers
    // ========================================================================

    pub fn to_script<V: ToScript>(&self, value: V) -> Result<Value, BindError> {
        value.to_script(self)
    }

    pub fn from_script<V: FromScript>(&self, value: &Value) -> Result<V, BindError> {
        V::from_script(value, self)
    }

    /// Publish a value on the global object.
    pub fn set_global<V: ToScript>(&self, name: &str, value: V) -> Result<(), BindError> {
        let value = value.to_script(self)?;
        let isolate = self.isolate();
        isolate.define_property(isolate.global(), name, value, PropertyFlags::assigned())?;
        Ok(())
    }

    /// Read a value from the global object.
    pub fn global<V: FromScript>(&self, name: &str) -> Result<V, BindError> {
        let isolate = self.isolate();
        let value = isolate.get(isolate.global(), name)?;
        V::from_script(&value, self)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .inner
            .descriptors
            .read()
            .values()
            .map(|entry| entry.core.name().to_string())
            .collect();
        f.debug_struct("TypeRegistry")
            .field("isolate", &self.inner.isolate.id())
            .field("types", &names)
            .finish()
    }
}
