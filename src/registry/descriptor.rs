//! Per-type binding state.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use scriptbind_core::{Getter, Global, Interceptors, Isolate, ObjectHandle, Value};

use crate::compat::{CompatibilityChain, Obj, Upcast};
use crate::native::AnyNative;

use super::SharedChain;

/// Callback run after a member write succeeds.
pub type PropertyChanged = Arc<dyn Fn(&Isolate, ObjectHandle, &str, &Value) + Send + Sync>;

/// Registration phase of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructors, methods and members may still be added.
    Open,
    /// The member set is locked.
    Finalized,
}

pub(crate) struct ConstructorTemplate {
    pub(crate) name: String,
    pub(crate) arity: usize,
    pub(crate) function: Global,
}

#[derive(Clone)]
pub(crate) enum StaticMember {
    Method(Global),
    Property(Getter),
}

pub(crate) struct DescriptorState {
    pub(crate) phase: Phase,
    pub(crate) instance_names: FxHashSet<String>,
    pub(crate) static_names: FxHashSet<String>,
    pub(crate) constructor_names: FxHashSet<String>,
    pub(crate) constructors: Vec<ConstructorTemplate>,
    pub(crate) statics: Vec<(String, StaticMember)>,
    pub(crate) namespace: Option<Global>,
    pub(crate) has_members: bool,
    pub(crate) most_derived: bool,
    pub(crate) parent: Option<&'static str>,
    pub(crate) interceptors: Interceptors,
    pub(crate) property_changed: Vec<PropertyChanged>,
}

impl DescriptorState {
    fn new() -> Self {
        Self {
            phase: Phase::Open,
            instance_names: FxHashSet::default(),
            static_names: FxHashSet::default(),
            constructor_names: FxHashSet::default(),
            constructors: Vec::new(),
            statics: Vec::new(),
            namespace: None,
            has_members: false,
            most_derived: false,
            parent: None,
            interceptors: Interceptors::default(),
            property_changed: Vec::new(),
        }
    }

    /// Objects that carry the static members.
    pub(crate) fn static_targets(&self) -> Vec<ObjectHandle> {
        self.constructors
            .iter()
            .map(|ctor| ctor.function.handle())
            .chain(self.namespace.as_ref().map(Global::handle))
            .collect()
    }
}

/// The type-independent part of a descriptor.
pub struct DescriptorCore {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    prototype: Global,
    state: Mutex<DescriptorState>,
    /// Native address to the host object currently wrapping it.
    existing: Mutex<FxHashMap<usize, ObjectHandle>>,
}

impl DescriptorCore {
    pub(crate) fn new(
        isolate: &Isolate,
        name: &str,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Self {
        let prototype = Global::new(isolate, isolate.new_object());
        Self {
            name: name.to_string(),
            type_id,
            type_name,
            prototype,
            state: Mutex::new(DescriptorState::new()),
            existing: Mutex::new(FxHashMap::default()),
        }
    }

    /// Name the type is published under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust name of the native type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Prototype shared by every instance.
    pub fn prototype(&self) -> ObjectHandle {
        self.prototype.handle()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn is_finalized(&self) -> bool {
        self.phase() == Phase::Finalized
    }

    pub fn most_derived(&self) -> bool {
        self.state.lock().most_derived
    }

    /// Name of the parent type, if one was declared.
    pub fn parent(&self) -> Option<&'static str> {
        self.state.lock().parent
    }

    /// Published constructor names with their arity, in declaration order.
    pub fn constructors(&self) -> Vec<(String, usize)> {
        self.state
            .lock()
            .constructors
            .iter()
            .map(|ctor| (ctor.name.clone(), ctor.arity))
            .collect()
    }

    /// Number of native objects currently mapped to a host object.
    pub fn live_wrappers(&self) -> usize {
        self.existing.lock().len()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, DescriptorState> {
        self.state.lock()
    }

    /// Interceptors to install on a new instance.
    pub(crate) fn interceptors(&self) -> Option<Arc<Interceptors>> {
        let state = self.state.lock();
        (!state.interceptors.is_empty()).then(|| Arc::new(state.interceptors.clone()))
    }

    pub(crate) fn property_changed(&self) -> Vec<PropertyChanged> {
        self.state.lock().property_changed.clone()
    }

    pub(crate) fn existing(&self, address: usize) -> Option<ObjectHandle> {
        self.existing.lock().get(&address).copied()
    }

    pub(crate) fn remember(&self, address: usize, handle: ObjectHandle) {
        self.existing.lock().insert(address, handle);
    }

    /// Drop the mapping if it still points at `handle`.
    pub(crate) fn forget(&self, address: usize, handle: ObjectHandle) -> bool {
        let mut existing = self.existing.lock();
        if existing.get(&address) == Some(&handle) {
            existing.remove(&address);
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for DescriptorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCore")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Binding state for native type `T` in one registry.
pub struct TypeDescriptor<T: 'static> {
    core: Arc<DescriptorCore>,
    /// Also published in the registry's chain map.
    chain: SharedChain<T>,
}

impl<T: Send + Sync + 'static> TypeDescriptor<T> {
    pub(crate) fn new(core: Arc<DescriptorCore>) -> Self {
        Self {
            core,
            chain: Arc::new(RwLock::new(CompatibilityChain::new())),
        }
    }

    pub fn core(&self) -> &Arc<DescriptorCore> {
        &self.core
    }

    pub(crate) fn chain(&self) -> &SharedChain<T> {
        &self.chain
    }

    /// Concrete types accepted where a `T` is expected, in lookup order.
    pub fn compatible_types(&self) -> Vec<&'static str> {
        self.chain.read().type_names()
    }

    pub(crate) fn push<D: Upcast<T> + Send + Sync + 'static>(&self) {
        self.chain.write().push::<D>();
    }

    pub fn accepts(&self, native: &AnyNative) -> bool {
        self.chain.read().accepts(native.holder_type_id())
    }

    pub fn recover(&self, native: &AnyNative, handle: Option<ObjectHandle>) -> Option<Obj<T>> {
        self.chain.read().recover(native, handle)
    }
}

impl<T: 'static> fmt::Debug for TypeDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("core", &self.core)
            .field("chain", &*self.chain.read())
            .finish()
    }
}
