//! The isolate: one independent runtime instance.
//!
//! An [`Isolate`] owns a heap, a global object, the collector state and the
//! external-memory counter. It is a cheap clonable handle; all clones refer
//! to the same instance.
//!
//! ## Locking
//!
//! Every operation takes the isolate's reentrant lock, so a thread that is
//! already inside the isolate (for example a native callback invoked from a
//! host call) can call back in, while other threads wait. [`Isolate::scope`]
//! holds the lock across a whole closure.
//!
//! The mutable state sits in a `RefCell` behind the lock. It is only ever
//! borrowed for short internal steps and never while a callback runs.
//!
//! # Example
//!
//! ```ignore
//! let isolate = Isolate::new();
//! isolate.scope(|iso| {
//!     let point = iso.new_object();
//!     iso.set(point, "x", Value::Int(3))?;
//!     assert_eq!(iso.get(point, "x")?, Value::Int(3));
//!     Ok::<_, Exception>(())
//! })?;
//! ```

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use crate::config::IsolateConfig;
use crate::error::Exception;
use crate::function::{CallContext, FunctionData, FunctionOrigin, HostFn};
use crate::gc::{GcState, GcStatistics};
use crate::heap::{ObjectHandle, ObjectHeap};
use crate::object::{
    Getter, HostObject, InternalField, Interceptors, ObjectKind, Property, PropertyFlags, Setter,
};
use crate::value::{Value, array_index};

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsolateId(u64);

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate#{}", self.0)
    }
}

/// Handle to a runtime instance.
#[derive(Clone)]
pub struct Isolate {
    inner: Arc<IsolateInner>,
}

/// Non-owning isolate handle.
///
/// Anything stored inside the isolate's own heap must use this instead of
/// [`Isolate`], otherwise the instance keeps itself alive.
#[derive(Clone)]
pub struct WeakIsolate {
    inner: Weak<IsolateInner>,
}

impl WeakIsolate {
    pub fn upgrade(&self) -> Option<Isolate> {
        self.inner.upgrade().map(|inner| Isolate { inner })
    }
}

struct IsolateInner {
    id: IsolateId,
    config: IsolateConfig,
    state: ReentrantMutex<RefCell<IsolateState>>,
}

struct IsolateState {
    heap: ObjectHeap,
    gc: GcState,
    global: ObjectHandle,
    max_array_length: usize,
}

/// Result of a read lookup along the prototype chain.
enum Lookup {
    Data(Value),
    Accessor(Option<Getter>),
    Missing,
}

/// Where a write along the prototype chain lands.
enum WriteTarget {
    Accessor(Option<Setter>),
    ReadOnly,
    Own,
}

fn collected(handle: ObjectHandle) -> Exception {
    Exception::reference_error(format!(
        "object {}:{} has been collected",
        handle.index, handle.generation
    ))
}

impl IsolateState {
    fn object(&self, handle: ObjectHandle) -> Result<&HostObject, Exception> {
        self.heap.get(handle).ok_or_else(|| collected(handle))
    }

    fn object_mut(&mut self, handle: ObjectHandle) -> Result<&mut HostObject, Exception> {
        self.heap.get_mut(handle).ok_or_else(|| collected(handle))
    }

    fn callback(&self, handle: ObjectHandle) -> Result<HostFn, Exception> {
        self.object(handle)?
            .function()
            .map(|data| data.callback.clone())
            .ok_or_else(|| Exception::type_error("object is not a function"))
    }

    fn lookup(&self, handle: ObjectHandle, key: &str) -> Result<Lookup, Exception> {
        self.object(handle)?;
        let mut current = Some(handle);
        while let Some(h) = current {
            let Some(object) = self.heap.get(h) else {
                break;
            };
            if let ObjectKind::Array(elements) = &object.kind {
                if key == "length" {
                    return Ok(Lookup::Data(Value::Int(elements.len() as i64)));
                }
                if let Some(index) = array_index(key)
                    && let Some(element) = elements.get(index as usize)
                {
                    return Ok(Lookup::Data(element.clone()));
                }
            }
            match object.property(key) {
                Some(Property::Data { value, .. }) => return Ok(Lookup::Data(value.clone())),
                Some(Property::Accessor { getter, .. }) => {
                    return Ok(Lookup::Accessor(getter.clone()));
                }
                None => current = object.prototype,
            }
        }
        Ok(Lookup::Missing)
    }

    fn resolve_write(&self, handle: ObjectHandle, key: &str) -> Result<WriteTarget, Exception> {
        let receiver = self.object(handle)?;
        if receiver.is_array() && (key == "length" || array_index(key).is_some()) {
            return Ok(WriteTarget::Own);
        }
        let mut current = Some(handle);
        while let Some(h) = current {
            let Some(object) = self.heap.get(h) else {
                break;
            };
            match object.property(key) {
                Some(Property::Accessor { setter, .. }) => {
                    return Ok(WriteTarget::Accessor(setter.clone()));
                }
                Some(Property::Data { flags, .. }) => {
                    return Ok(if flags.contains(PropertyFlags::WRITABLE) {
                        WriteTarget::Own
                    } else {
                        WriteTarget::ReadOnly
                    });
                }
                None => current = object.prototype,
            }
        }
        Ok(WriteTarget::Own)
    }

    fn write_own(&mut self, handle: ObjectHandle, key: &str, value: Value) -> Result<(), Exception> {
        let max_length = self.max_array_length;
        let object = self.object_mut(handle)?;
        if let ObjectKind::Array(elements) = &mut object.kind {
            if let Some(index) = array_index(key) {
                let index = index as usize;
                if index >= elements.len() {
                    if index >= max_length {
                        return Err(Exception::range_error(format!(
                            "array index {index} exceeds the limit of {max_length} elements"
                        )));
                    }
                    elements.resize(index + 1, Value::Undefined);
                }
                elements[index] = value;
                return Ok(());
            }
            if key == "length" {
                let length = value.to_integer();
                if length < 0 || length as u64 > max_length as u64 {
                    return Err(Exception::range_error("invalid array length"));
                }
                elements.resize(length as usize, Value::Undefined);
                return Ok(());
            }
        }
        let flags = match object.property(key) {
            Some(Property::Data { flags, .. }) => *flags,
            _ => PropertyFlags::assigned(),
        };
        object.define(key, Property::Data { value, flags });
        Ok(())
    }
}

impl Isolate {
    pub fn new() -> Self {
        Self::with_config(IsolateConfig::default())
    }

    pub fn with_config(config: IsolateConfig) -> Self {
        let mut heap = ObjectHeap::new();
        let global = heap.allocate(HostObject::plain(None));
        let id = IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!(target: "scriptbind::isolate", "created {id} ({})", config.name);
        let max_array_length = config.max_array_length;
        Self {
            inner: Arc::new(IsolateInner {
                id,
                config,
                state: ReentrantMutex::new(RefCell::new(IsolateState {
                    heap,
                    gc: GcState::new(),
                    global,
                    max_array_length,
                })),
            }),
        }
    }

    pub fn id(&self) -> IsolateId {
        self.inner.id
    }

    pub fn config(&self) -> &IsolateConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakIsolate {
        WeakIsolate {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Run `f` while holding the isolate lock.
    pub fn scope<R>(&self, f: impl FnOnce(&Isolate) -> R) -> R {
        let _guard = self.inner.state.lock();
        f(self)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut IsolateState) -> R) -> R {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    pub fn global(&self) -> ObjectHandle {
        self.with_state(|s| s.global)
    }

    pub fn new_object(&self) -> ObjectHandle {
        self.new_object_with_prototype(None)
    }

    pub fn new_object_with_prototype(&self, prototype: Option<ObjectHandle>) -> ObjectHandle {
        self.with_state(|s| s.heap.allocate(HostObject::plain(prototype)))
    }

    pub fn new_array(&self, elements: Vec<Value>) -> ObjectHandle {
        self.with_state(|s| {
            s.heap
                .allocate(HostObject::new(ObjectKind::Array(elements), None))
        })
    }

    /// Create a function object standing in for scripted code.
    pub fn new_function<F>(&self, name: &str, f: F) -> ObjectHandle
    where
        F: Fn(&Isolate, &mut CallContext) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        self.create_function(name, FunctionOrigin::Script, Arc::new(f))
    }

    /// Create a function object backed by native code.
    pub fn new_native_function<F>(&self, name: &str, f: F) -> ObjectHandle
    where
        F: Fn(&Isolate, &mut CallContext) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        self.create_function(name, FunctionOrigin::Native, Arc::new(f))
    }

    /// Every function gets a fresh `prototype` object whose `constructor`
    /// points back at it.
    fn create_function(&self, name: &str, origin: FunctionOrigin, callback: HostFn) -> ObjectHandle {
        self.with_state(|s| {
            let prototype = s.heap.allocate(HostObject::plain(None));
            let function = s.heap.allocate(HostObject::new(
                ObjectKind::Function(FunctionData::new(name, origin, callback)),
                None,
            ));
            if let Some(object) = s.heap.get_mut(prototype) {
                object.define(
                    "constructor",
                    Property::Data {
                        value: Value::Object(function),
                        flags: PropertyFlags::WRITABLE,
                    },
                );
            }
            if let Some(object) = s.heap.get_mut(function) {
                object.define(
                    "prototype",
                    Property::Data {
                        value: Value::Object(prototype),
                        flags: PropertyFlags::WRITABLE,
                    },
                );
                object.define(
                    "name",
                    Property::Data {
                        value: Value::String(name.to_string()),
                        flags: PropertyFlags::empty(),
                    },
                );
            }
            function
        })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.with_state(|s| s.heap.contains(handle))
    }

    pub fn is_array(&self, handle: ObjectHandle) -> bool {
        self.with_state(|s| s.heap.get(handle).is_some_and(HostObject::is_array))
    }

    pub fn is_callable(&self, value: &Value) -> bool {
        self.function_origin(value).is_some()
    }

    /// Origin of a function value, `None` if it is not a live function.
    pub fn function_origin(&self, value: &Value) -> Option<FunctionOrigin> {
        let handle = value.as_object()?;
        self.with_state(|s| s.heap.get(handle)?.function().map(FunctionData::origin))
    }

    pub fn array_elements(&self, handle: ObjectHandle) -> Option<Vec<Value>> {
        self.with_state(|s| match &s.heap.get(handle)?.kind {
            ObjectKind::Array(elements) => Some(elements.clone()),
            _ => None,
        })
    }

    pub fn prototype_of(&self, handle: ObjectHandle) -> Option<ObjectHandle> {
        self.with_state(|s| s.heap.get(handle)?.prototype)
    }

    /// Set the prototype link. Rejects links that would form a cycle.
    pub fn set_prototype(
        &self,
        handle: ObjectHandle,
        prototype: Option<ObjectHandle>,
    ) -> Result<(), Exception> {
        self.with_state(|s| {
            let mut current = prototype;
            while let Some(h) = current {
                if h == handle {
                    return Err(Exception::type_error("cyclic prototype chain"));
                }
                current = s.object(h)?.prototype;
            }
            s.object_mut(handle)?.prototype = prototype;
            Ok(())
        })
    }

    /// Enumerable own keys in insertion order. Array indices come first.
    pub fn own_keys(&self, handle: ObjectHandle) -> Result<Vec<String>, Exception> {
        self.with_state(|s| {
            let object = s.object(handle)?;
            let mut keys = Vec::new();
            if let ObjectKind::Array(elements) = &object.kind {
                keys.extend((0..elements.len()).map(|i| i.to_string()));
            }
            keys.extend(
                object
                    .keys
                    .iter()
                    .filter(|k| {
                        object
                            .property(k)
                            .is_some_and(|p| p.flags().contains(PropertyFlags::ENUMERABLE))
                    })
                    .cloned(),
            );
            Ok(keys)
        })
    }

    pub fn has_own_property(&self, handle: ObjectHandle, key: &str) -> bool {
        self.with_state(|s| s.heap.get(handle).is_some_and(|o| o.property(key).is_some()))
    }

    /// True if `key` resolves on the object or its prototype chain.
    /// Interceptors are not consulted.
    pub fn has_property(&self, handle: ObjectHandle, key: &str) -> bool {
        self.with_state(|s| !matches!(s.lookup(handle, key), Ok(Lookup::Missing) | Err(_)))
    }

    /// Raw lookup of a data property along the chain. Never runs accessors
    /// or interceptors.
    pub fn lookup_data(&self, handle: ObjectHandle, key: &str) -> Option<Value> {
        self.with_state(|s| match s.lookup(handle, key) {
            Ok(Lookup::Data(value)) => Some(value),
            _ => None,
        })
    }

    // ========================================================================
    // Property access
    // ========================================================================

    /// Read a property.
    ///
    /// Interceptors first, then own properties and the prototype chain.
    /// Accessors run with `object` as receiver.
    pub fn get(&self, object: ObjectHandle, key: &str) -> Result<Value, Exception> {
        let _guard = self.inner.state.lock();
        let interceptors = self.with_state(|s| s.object(object).map(|o| o.interceptors.clone()))?;
        if let Some(interceptors) = interceptors {
            match array_index(key) {
                Some(index) => {
                    if let Some(indexed) = &interceptors.indexed
                        && let Some(value) = (indexed.getter)(self, object, index)?
                    {
                        return Ok(value);
                    }
                }
                None => {
                    if let Some(named) = &interceptors.named
                        && let Some(value) = (named.getter)(self, object, key)?
                    {
                        return Ok(value);
                    }
                }
            }
        }
        match self.with_state(|s| s.lookup(object, key))? {
            Lookup::Data(value) => Ok(value),
            Lookup::Accessor(Some(getter)) => getter(self, object),
            Lookup::Accessor(None) | Lookup::Missing => Ok(Value::Undefined),
        }
    }

    /// Write a property.
    ///
    /// Interceptors first. Accessors found on the chain take the write, a
    /// read-only accessor or non-writable data property ignores it, anything
    /// else lands as an own data property.
    pub fn set(&self, object: ObjectHandle, key: &str, value: Value) -> Result<(), Exception> {
        let _guard = self.inner.state.lock();
        let interceptors = self.with_state(|s| s.object(object).map(|o| o.interceptors.clone()))?;
        if let Some(interceptors) = interceptors {
            let handled = match array_index(key) {
                Some(index) => match interceptors.indexed.as_ref().and_then(|i| i.setter.as_ref()) {
                    Some(setter) => setter(self, object, index, value.clone())?,
                    None => false,
                },
                None => match interceptors.named.as_ref().and_then(|i| i.setter.as_ref()) {
                    Some(setter) => setter(self, object, key, value.clone())?,
                    None => false,
                },
            };
            if handled {
                return Ok(());
            }
        }
        match self.with_state(|s| s.resolve_write(object, key))? {
            WriteTarget::Accessor(Some(setter)) => setter(self, object, value),
            WriteTarget::Accessor(None) | WriteTarget::ReadOnly => Ok(()),
            WriteTarget::Own => self.with_state(|s| s.write_own(object, key, value)),
        }
    }

    pub fn get_index(&self, object: ObjectHandle, index: u32) -> Result<Value, Exception> {
        self.get(object, &index.to_string())
    }

    pub fn set_index(&self, object: ObjectHandle, index: u32, value: Value) -> Result<(), Exception> {
        self.set(object, &index.to_string(), value)
    }

    /// Define (or redefine) an own data property with explicit flags.
    pub fn define_property(
        &self,
        object: ObjectHandle,
        key: &str,
        value: Value,
        flags: PropertyFlags,
    ) -> Result<(), Exception> {
        self.with_state(|s| {
            s.object_mut(object)?
                .define(key, Property::Data { value, flags });
            Ok(())
        })
    }

    /// Define (or redefine) an own accessor property.
    pub fn define_accessor(
        &self,
        object: ObjectHandle,
        key: &str,
        getter: Option<Getter>,
        setter: Option<Setter>,
        flags: PropertyFlags,
    ) -> Result<(), Exception> {
        self.with_state(|s| {
            s.object_mut(object)?.define(
                key,
                Property::Accessor {
                    getter,
                    setter,
                    flags,
                },
            );
            Ok(())
        })
    }

    pub fn delete_property(&self, object: ObjectHandle, key: &str) -> bool {
        let removed = self.with_state(|s| s.heap.get_mut(object)?.remove(key));
        removed.is_some()
    }

    // ========================================================================
    // Embedder slots
    // ========================================================================

    /// Store the embedder payload of an object.
    pub fn set_internal(&self, object: ObjectHandle, field: InternalField) -> Result<(), Exception> {
        let previous = self.with_state(|s| {
            s.object_mut(object)
                .map(|o| o.internal.replace(field))
        })?;
        // dropped outside the state borrow: it may own native objects
        drop(previous);
        Ok(())
    }

    pub fn internal(&self, object: ObjectHandle) -> Option<InternalField> {
        self.with_state(|s| s.heap.get(object)?.internal.clone())
    }

    pub fn set_interceptors(
        &self,
        object: ObjectHandle,
        interceptors: Arc<Interceptors>,
    ) -> Result<(), Exception> {
        self.with_state(|s| {
            s.object_mut(object)?.interceptors = Some(interceptors);
            Ok(())
        })
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call a function value with an explicit receiver.
    pub fn call(&self, function: &Value, this: Value, args: Vec<Value>) -> Result<Value, Exception> {
        let _guard = self.inner.state.lock();
        let handle = callable(function)?;
        let callback = self.with_state(|s| s.callback(handle))?;
        let mut cx = CallContext::new(this, args, handle, false);
        callback(self, &mut cx)
    }

    /// Invoke a function as a constructor.
    ///
    /// A fresh receiver is created whose prototype is the function's
    /// `prototype` property. If the callback returns an object that object
    /// is the result, otherwise the receiver is.
    pub fn construct(&self, function: &Value, args: Vec<Value>) -> Result<Value, Exception> {
        let _guard = self.inner.state.lock();
        let handle = callable(function)?;
        let callback = self.with_state(|s| s.callback(handle))?;
        let prototype = self.get(handle, "prototype")?.as_object();
        let receiver = self.new_object_with_prototype(prototype);
        let mut cx = CallContext::new(Value::Object(receiver), args, handle, true);
        match callback(self, &mut cx)? {
            Value::Object(result) => Ok(Value::Object(result)),
            _ => Ok(Value::Object(receiver)),
        }
    }

    // ========================================================================
    // Memory management
    // ========================================================================

    pub(crate) fn root(&self, handle: ObjectHandle) {
        self.with_state(|s| s.gc.root(handle));
    }

    pub(crate) fn unroot(&self, handle: ObjectHandle) {
        self.with_state(|s| s.gc.unroot(handle));
    }

    /// Register a one-shot callback that runs when `object` is collected.
    ///
    /// The object itself does not become a root. Returns false if the
    /// object is already dead.
    pub fn make_weak<F>(&self, object: ObjectHandle, callback: F) -> bool
    where
        F: FnOnce(&Isolate, Option<InternalField>) + Send + 'static,
    {
        self.with_state(|s| {
            if !s.heap.contains(object) {
                return false;
            }
            s.gc.set_weak(object, Box::new(callback));
            true
        })
    }

    pub fn clear_weak(&self, object: ObjectHandle) -> bool {
        self.with_state(|s| s.gc.clear_weak(object))
    }

    /// Run a full collection. Returns the number of objects freed.
    pub fn collect_garbage(&self) -> usize {
        let _guard = self.inner.state.lock();
        let sweep = self.with_state(|s| {
            let global = s.global;
            s.gc.collect(&mut s.heap, global)
        });
        let freed = sweep.dead.len();
        let finalized = sweep.finalizers.len();
        for (callback, internal) in sweep.finalizers {
            callback(self, internal);
        }
        drop(sweep.dead);
        log::debug!(
            target: "scriptbind::gc",
            "{}: collected {freed} objects, {finalized} finalizers run",
            self.inner.id
        );
        freed
    }

    /// Adjust the external-memory counter. Returns the new value.
    pub fn adjust_external_memory(&self, delta: i64) -> i64 {
        self.with_state(|s| s.gc.adjust_external_memory(delta))
    }

    pub fn external_memory(&self) -> i64 {
        self.with_state(|s| s.gc.external_memory())
    }

    /// True once external memory exceeds the configured threshold.
    pub fn memory_pressure(&self) -> bool {
        self.external_memory() > self.inner.config.external_memory_threshold
    }

    pub fn gc_statistics(&self) -> GcStatistics {
        self.with_state(|s| s.gc.statistics())
    }

    pub fn live_objects(&self) -> usize {
        self.with_state(|s| s.heap.len())
    }
}

fn callable(function: &Value) -> Result<ObjectHandle, Exception> {
    function
        .as_object()
        .ok_or_else(|| Exception::type_error(format!("{} is not a function", function.type_name())))
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Isolate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Isolate {}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Persistent handles
// ============================================================================

/// A strong, rooting reference to a host object.
///
/// The object survives collection for as long as any `Global` for it
/// exists. A `Global` keeps its isolate alive, so never store one inside
/// that isolate's heap.
pub struct Global {
    isolate: Isolate,
    handle: ObjectHandle,
}

impl Global {
    pub fn new(isolate: &Isolate, handle: ObjectHandle) -> Self {
        isolate.root(handle);
        Self {
            isolate: isolate.clone(),
            handle,
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn value(&self) -> Value {
        Value::Object(self.handle)
    }

    pub fn isolate(&self) -> &Isolate {
        &self.isolate
    }
}

impl Clone for Global {
    fn clone(&self) -> Self {
        Global::new(&self.isolate, self.handle)
    }
}

impl Drop for Global {
    fn drop(&mut self) {
        self.isolate.unroot(self.handle);
    }
}

impl fmt::Debug for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Global")
            .field("isolate", &self.isolate.id())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::ExceptionKind;
    use crate::object::{IndexedInterceptor, NamedInterceptor};

    #[test]
    fn properties_round_trip() {
        let iso = Isolate::new();
        let obj = iso.new_object();
        iso.set(obj, "x", Value::Int(3)).unwrap();
        assert_eq!(iso.get(obj, "x").unwrap(), Value::Int(3));
        assert_eq!(iso.get(obj, "missing").unwrap(), Value::Undefined);
        assert_eq!(iso.own_keys(obj).unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn prototype_chain_lookup_and_shadowing() {
        let iso = Isolate::new();
        let proto = iso.new_object();
        iso.set(proto, "greeting", "hi".into()).unwrap();
        let obj = iso.new_object_with_prototype(Some(proto));
        assert_eq!(iso.get(obj, "greeting").unwrap(), Value::from("hi"));

        iso.set(obj, "greeting", "hello".into()).unwrap();
        assert_eq!(iso.get(obj, "greeting").unwrap(), Value::from("hello"));
        assert_eq!(iso.get(proto, "greeting").unwrap(), Value::from("hi"));
    }

    #[test]
    fn cyclic_prototypes_are_rejected() {
        let iso = Isolate::new();
        let a = iso.new_object();
        let b = iso.new_object_with_prototype(Some(a));
        assert!(iso.set_prototype(a, Some(b)).is_err());
    }

    #[test]
    fn accessors_run_with_receiver() {
        let iso = Isolate::new();
        let proto = iso.new_object();
        let getter: Getter = Arc::new(|iso: &Isolate, this: ObjectHandle| iso.get(this, "_secret"));
        iso.define_accessor(proto, "secret", Some(getter), None, PropertyFlags::empty())
            .unwrap();
        let obj = iso.new_object_with_prototype(Some(proto));
        iso.set(obj, "_secret", Value::Int(9)).unwrap();
        assert_eq!(iso.get(obj, "secret").unwrap(), Value::Int(9));

        // read-only accessor swallows writes
        iso.set(obj, "secret", Value::Int(1)).unwrap();
        assert_eq!(iso.get(obj, "secret").unwrap(), Value::Int(9));
        assert!(!iso.has_own_property(obj, "secret"));
    }

    #[test]
    fn non_writable_data_ignores_writes() {
        let iso = Isolate::new();
        let obj = iso.new_object();
        iso.define_property(obj, "k", Value::Int(1), PropertyFlags::ENUMERABLE)
            .unwrap();
        iso.set(obj, "k", Value::Int(2)).unwrap();
        assert_eq!(iso.get(obj, "k").unwrap(), Value::Int(1));
    }

    #[test]
    fn arrays_expose_length_and_grow() {
        let iso = Isolate::new();
        let arr = iso.new_array(vec![Value::Int(1)]);
        assert_eq!(iso.get(arr, "length").unwrap(), Value::Int(1));
        iso.set_index(arr, 2, Value::Int(3)).unwrap();
        assert_eq!(
            iso.array_elements(arr).unwrap(),
            vec![Value::Int(1), Value::Undefined, Value::Int(3)]
        );
        iso.set(arr, "length", Value::Int(1)).unwrap();
        assert_eq!(iso.array_elements(arr).unwrap().len(), 1);
    }

    #[test]
    fn array_growth_is_capped() {
        let iso = Isolate::with_config(IsolateConfig::default().with_max_array_length(8));
        let arr = iso.new_array(Vec::new());

        iso.set_index(arr, 7, Value::Int(1)).unwrap();
        let err = iso.set_index(arr, 4_294_967_294, Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::RangeError);
        let err = iso.set(arr, "length", Value::Number(1e9)).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::RangeError);
        assert!(iso.set(arr, "length", Value::Int(-1)).is_err());
        assert_eq!(iso.array_elements(arr).unwrap().len(), 8);

        iso.set(arr, "length", Value::Int(2)).unwrap();
        assert_eq!(iso.get(arr, "length").unwrap(), Value::Int(2));
    }

    #[test]
    fn call_and_construct() {
        let iso = Isolate::new();
        let add = iso.new_function("add", |_, cx| {
            Ok(Value::Int(cx.arg(0).to_integer() + cx.arg(1).to_integer()))
        });
        let result = iso
            .call(&Value::Object(add), Value::Undefined, vec![2.into(), 3.into()])
            .unwrap();
        assert_eq!(result, Value::Int(5));

        let ctor = iso.new_function("Point", |iso, cx| {
            let this = cx.this_object().ok_or_else(|| Exception::type_error("no receiver"))?;
            iso.set(this, "x", cx.arg(0).clone())?;
            assert!(cx.is_construct_call());
            Ok(Value::Undefined)
        });
        let proto = iso.get(ctor, "prototype").unwrap().as_object().unwrap();
        let point = iso
            .construct(&Value::Object(ctor), vec![Value::Int(4)])
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(iso.prototype_of(point), Some(proto));
        assert_eq!(iso.get(point, "x").unwrap(), Value::Int(4));
        assert_eq!(iso.get(point, "constructor").unwrap(), Value::Object(ctor));
    }

    #[test]
    fn calling_a_non_function_is_a_type_error() {
        let iso = Isolate::new();
        let err = iso
            .call(&Value::Int(1), Value::Undefined, vec![])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ExceptionKind::TypeError);
        let obj = iso.new_object();
        assert!(iso.call(&Value::Object(obj), Value::Undefined, vec![]).is_err());
    }

    #[test]
    fn function_origin_is_recorded() {
        let iso = Isolate::new();
        let script = iso.new_function("s", |_, _| Ok(Value::Undefined));
        let native = iso.new_native_function("n", |_, _| Ok(Value::Undefined));
        assert_eq!(iso.function_origin(&script.into()), Some(FunctionOrigin::Script));
        assert_eq!(iso.function_origin(&native.into()), Some(FunctionOrigin::Native));
        assert_eq!(iso.function_origin(&Value::Null), None);
    }

    #[test]
    fn interceptors_take_precedence_and_fall_through() {
        let iso = Isolate::new();
        let obj = iso.new_object();
        iso.set(obj, "name", "own".into()).unwrap();
        iso.set(obj, "other", "own".into()).unwrap();
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = written.clone();
        iso.set_interceptors(
            obj,
            Arc::new(Interceptors {
                indexed: Some(IndexedInterceptor {
                    getter: Arc::new(|_: &Isolate, _: ObjectHandle, i: u32| {
                        Ok(Some(Value::Int(i as i64 * 10)))
                    }),
                    setter: Some(Arc::new(move |_: &Isolate, _: ObjectHandle, i: u32, v: Value| {
                        sink.lock().unwrap().push((i, v));
                        Ok(true)
                    })),
                }),
                named: Some(NamedInterceptor {
                    getter: Arc::new(|_: &Isolate, _: ObjectHandle, key: &str| {
                        Ok((key == "name").then(|| Value::from("intercepted")))
                    }),
                    setter: None,
                }),
            }),
        )
        .unwrap();

        assert_eq!(iso.get_index(obj, 4).unwrap(), Value::Int(40));
        assert_eq!(iso.get(obj, "name").unwrap(), Value::from("intercepted"));
        assert_eq!(iso.get(obj, "other").unwrap(), Value::from("own"));
        iso.set_index(obj, 1, Value::Bool(true)).unwrap();
        assert_eq!(*written.lock().unwrap(), vec![(1, Value::Bool(true))]);
    }

    #[test]
    fn unreachable_objects_are_collected_with_weak_callbacks() {
        let iso = Isolate::new();
        let kept = iso.new_object();
        iso.set(iso.global(), "kept", kept.into()).unwrap();
        let doomed = iso.new_object();
        iso.set_internal(doomed, Arc::new(5_u32)).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        assert!(iso.make_weak(doomed, move |_, internal| {
            let value = internal.and_then(|f| f.downcast_ref::<u32>().copied());
            counter.store(value.unwrap_or(0) as usize, Ordering::SeqCst);
        }));

        iso.collect_garbage();
        assert!(iso.is_alive(kept));
        assert!(!iso.is_alive(doomed));
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert!(!iso.make_weak(doomed, |_, _| {}));
    }

    #[test]
    fn globals_root_objects_until_dropped() {
        let iso = Isolate::new();
        let obj = iso.new_object();
        let global = Global::new(&iso, obj);
        let copy = global.clone();
        drop(global);
        iso.collect_garbage();
        assert!(iso.is_alive(obj));
        drop(copy);
        iso.collect_garbage();
        assert!(!iso.is_alive(obj));
    }

    #[test]
    fn weak_callbacks_can_reenter_the_isolate() {
        let iso = Isolate::new();
        let obj = iso.new_object();
        iso.adjust_external_memory(64);
        iso.make_weak(obj, |iso, _| {
            iso.adjust_external_memory(-64);
            let _ = iso.new_object();
        });
        iso.collect_garbage();
        assert_eq!(iso.external_memory(), 0);
    }

    #[test]
    fn memory_pressure_follows_threshold() {
        let iso = Isolate::with_config(IsolateConfig::default().with_external_memory_threshold(10));
        assert!(!iso.memory_pressure());
        iso.adjust_external_memory(11);
        assert!(iso.memory_pressure());
    }

    #[test]
    fn scope_is_reentrant_and_cross_thread_serialised() {
        let iso = Isolate::new();
        let counter = iso.new_object();
        iso.set(counter, "n", Value::Int(0)).unwrap();
        let g = Global::new(&iso, counter);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let iso = iso.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        iso.scope(|iso| {
                            let n = iso.get(counter, "n").unwrap().to_integer();
                            iso.scope(|inner| inner.set(counter, "n", Value::Int(n + 1)).unwrap());
                        });
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(iso.get(g.handle(), "n").unwrap(), Value::Int(400));
    }
}
