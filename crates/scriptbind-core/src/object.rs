//! Host objects, their properties and interceptors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::Exception;
use crate::function::FunctionData;
use crate::heap::ObjectHandle;
use crate::isolate::Isolate;
use crate::value::Value;

bitflags! {
    /// Attributes of an own property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        /// Data property can be overwritten.
        const WRITABLE = 1 << 0;
        /// Property shows up in `own_keys`.
        const ENUMERABLE = 1 << 1;
    }
}

impl PropertyFlags {
    /// Flags of a property created by a plain assignment.
    pub fn assigned() -> Self {
        PropertyFlags::WRITABLE | PropertyFlags::ENUMERABLE
    }
}

/// Accessor getter, invoked with the receiver the lookup started from.
pub type Getter = Arc<dyn Fn(&Isolate, ObjectHandle) -> Result<Value, Exception> + Send + Sync>;

/// Accessor setter.
pub type Setter =
    Arc<dyn Fn(&Isolate, ObjectHandle, Value) -> Result<(), Exception> + Send + Sync>;

/// Opaque per-object slot for embedder data.
pub type InternalField = Arc<dyn Any + Send + Sync>;

/// An own property.
#[derive(Clone)]
pub enum Property {
    Data {
        value: Value,
        flags: PropertyFlags,
    },
    /// A getter/setter pair. A missing setter makes the property read-only.
    Accessor {
        getter: Option<Getter>,
        setter: Option<Setter>,
        flags: PropertyFlags,
    },
}

impl Property {
    pub fn flags(&self) -> PropertyFlags {
        match self {
            Property::Data { flags, .. } | Property::Accessor { flags, .. } => *flags,
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Data { value, flags } => f
                .debug_struct("Data")
                .field("value", value)
                .field("flags", flags)
                .finish(),
            Property::Accessor { setter, flags, .. } => f
                .debug_struct("Accessor")
                .field("read_only", &setter.is_none())
                .field("flags", flags)
                .finish(),
        }
    }
}

// ============================================================================
// Interceptors
// ============================================================================

/// Indexed getter. `Ok(None)` means "not intercepted", lookup falls through.
pub type IndexedGetter =
    Arc<dyn Fn(&Isolate, ObjectHandle, u32) -> Result<Option<Value>, Exception> + Send + Sync>;

/// Indexed setter. `Ok(false)` means "not intercepted", the write falls through.
pub type IndexedSetter =
    Arc<dyn Fn(&Isolate, ObjectHandle, u32, Value) -> Result<bool, Exception> + Send + Sync>;

/// Named getter. `Ok(None)` means "not intercepted".
pub type NamedGetter =
    Arc<dyn Fn(&Isolate, ObjectHandle, &str) -> Result<Option<Value>, Exception> + Send + Sync>;

/// Named setter. `Ok(false)` means "not intercepted".
pub type NamedSetter =
    Arc<dyn Fn(&Isolate, ObjectHandle, &str, Value) -> Result<bool, Exception> + Send + Sync>;

#[derive(Clone)]
pub struct IndexedInterceptor {
    pub getter: IndexedGetter,
    pub setter: Option<IndexedSetter>,
}

#[derive(Clone)]
pub struct NamedInterceptor {
    pub getter: NamedGetter,
    pub setter: Option<NamedSetter>,
}

/// Property interceptors of an object.
///
/// Array-index keys go to the indexed interceptor, every other key to the
/// named one. Interceptors are consulted before own properties and the
/// prototype chain.
#[derive(Clone, Default)]
pub struct Interceptors {
    pub indexed: Option<IndexedInterceptor>,
    pub named: Option<NamedInterceptor>,
}

impl Interceptors {
    pub fn is_empty(&self) -> bool {
        self.indexed.is_none() && self.named.is_none()
    }
}

// ============================================================================
// Objects
// ============================================================================

/// What kind of object this is.
pub enum ObjectKind {
    Plain,
    Array(Vec<Value>),
    Function(FunctionData),
}

/// A heap object.
pub struct HostObject {
    pub(crate) kind: ObjectKind,
    pub(crate) properties: FxHashMap<String, Property>,
    /// Own keys in insertion order.
    pub(crate) keys: Vec<String>,
    pub(crate) prototype: Option<ObjectHandle>,
    pub(crate) internal: Option<InternalField>,
    pub(crate) interceptors: Option<Arc<Interceptors>>,
}

impl HostObject {
    pub fn new(kind: ObjectKind, prototype: Option<ObjectHandle>) -> Self {
        Self {
            kind,
            properties: FxHashMap::default(),
            keys: Vec::new(),
            prototype,
            internal: None,
            interceptors: None,
        }
    }

    pub fn plain(prototype: Option<ObjectHandle>) -> Self {
        Self::new(ObjectKind::Plain, prototype)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array(_))
    }

    pub fn function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Insert or replace an own property, keeping the original key order.
    pub(crate) fn define(&mut self, key: &str, property: Property) {
        if self.properties.insert(key.to_string(), property).is_none() {
            self.keys.push(key.to_string());
        }
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Property> {
        let removed = self.properties.remove(key)?;
        self.keys.retain(|k| k != key);
        Some(removed)
    }

    /// Push every object directly referenced by this one.
    pub(crate) fn trace(&self, out: &mut Vec<ObjectHandle>) {
        if let Some(prototype) = self.prototype {
            out.push(prototype);
        }
        for property in self.properties.values() {
            if let Property::Data {
                value: Value::Object(handle),
                ..
            } = property
            {
                out.push(*handle);
            }
        }
        if let ObjectKind::Array(elements) = &self.kind {
            out.extend(elements.iter().filter_map(Value::as_object));
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            ObjectKind::Plain => "plain",
            ObjectKind::Array(_) => "array",
            ObjectKind::Function(_) => "function",
        };
        f.debug_struct("HostObject")
            .field("kind", &kind)
            .field("keys", &self.keys)
            .field("prototype", &self.prototype)
            .field("has_internal", &self.internal.is_some())
            .finish_non_exhaustive()
    }
}
