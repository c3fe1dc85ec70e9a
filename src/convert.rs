//! Conversion between native values and host values.
//!
//! This module provides the two marshalling traits:
//! - [`FromScript`]: extract a native value from a host [`Value`]
//! - [`ToScript`]: turn a native value into a host [`Value`]
//!
//! Both take the [`TypeRegistry`] as conversion environment, since
//! containers need the isolate and registered native types need their
//! descriptors.
//!
//! ## Supported Types
//!
//! - Integers, floats, `bool`, `char`, `String`, `()` and [`Value`] itself
//! - `Option<T>` (`undefined`/`null` is `None`)
//! - `Vec`, `VecDeque`, `HashSet`, `BTreeSet` as host arrays
//! - `HashMap`, `BTreeMap` as plain host objects
//! - Tuples up to six elements as fixed-length host arrays
//! - Registered native types through [`Native`], [`Obj`], [`AnyNative`],
//!   [`Exposed`] and [`ByValue`]
//! - [`ScriptFunction`] for callable host values
//!
//! Primitive conversion never fails; it follows the host coercion rules.
//!
//! ## Example
//!
//! ```ignore
//! let value = vec![1, 2, 3].to_script(&registry)?;
//! let back: Vec<i32> = FromScript::from_script(&value, &registry)?;
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{BuildHasher, Hash};

use scriptbind_core::{Global, ObjectHandle, PropertyFlags, Value};

use crate::compat::Obj;
use crate::error::{BindError, CastError};
use crate::lifetime::DisposalPolicy;
use crate::native::{AnyNative, Native};
use crate::registry::TypeRegistry;

/// Extract a native value from a host value.
pub trait FromScript: Sized {
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError>;
}

/// Convert a native value into a host value.
pub trait ToScript {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError>;
}

// ============================================================================
// Primitive implementations
// ============================================================================

// Integers wrap to the target width; non-integers truncate and saturate.
macro_rules! impl_script_int {
    ($($ty:ty),*) => {
        $(
            impl FromScript for $ty {
                fn from_script(value: &Value, _: &TypeRegistry) -> Result<Self, BindError> {
                    Ok(match value {
                        Value::Int(i) => *i as $ty,
                        other => other.to_number() as $ty,
                    })
                }
            }

            impl ToScript for $ty {
                fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
                    Ok(Value::Int(self as i64))
                }
            }
        )*
    };
}

impl_script_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_script_float {
    ($($ty:ty),*) => {
        $(
            impl FromScript for $ty {
                fn from_script(value: &Value, _: &TypeRegistry) -> Result<Self, BindError> {
                    Ok(value.to_number() as $ty)
                }
            }

            impl ToScript for $ty {
                fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
                    Ok(Value::Number(self as f64))
                }
            }
        )*
    };
}

impl_script_float!(f32, f64);

impl FromScript for bool {
    fn from_script(value: &Value, _: &TypeRegistry) -> Result<Self, BindError> {
        Ok(value.to_boolean())
    }
}

impl ToScript for bool {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(Value::Bool(self))
    }
}

impl FromScript for String {
    fn from_script(value: &Value, _: &TypeRegistry) -> Result<Self, BindError> {
        Ok(value.to_display_string())
    }
}

impl ToScript for String {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(Value::String(self))
    }
}

impl ToScript for &str {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(Value::String(self.to_string()))
    }
}

/// First character of the string form, `'\0'` for the empty string.
impl FromScript for char {
    fn from_script(value: &Value, _: &TypeRegistry) -> Result<Self, BindError> {
        Ok(value.to_display_string().chars().next().unwrap_or('\0'))
    }
}

impl ToScript for char {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(Value::String(self.to_string()))
    }
}

impl FromScript for () {
    fn from_script(_: &Value, _: &TypeRegistry) -> Result<Self, BindError> {
        Ok(())
    }
}

impl ToScript for () {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(Value::Undefined)
    }
}

impl FromScript for Value {
    fn from_script(value: &Value, _: &TypeRegistry) -> Result<Self, BindError> {
        Ok(value.clone())
    }
}

impl ToScript for Value {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(self)
    }
}

impl<T: FromScript> FromScript for Option<T> {
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_script(value, registry).map(Some)
        }
    }
}

impl<T: ToScript> ToScript for Option<T> {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        match self {
            Some(inner) => inner.to_script(registry),
            None => Ok(Value::Undefined),
        }
    }
}

/// A native `Err` becomes a native exception carrying its message.
impl<T: ToScript, E: fmt::Display> ToScript for Result<T, E> {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        match self {
            Ok(inner) => inner.to_script(registry),
            Err(err) => Err(BindError::native(err.to_string())),
        }
    }
}

// ============================================================================
// Containers
// ============================================================================

fn array_elements(value: &Value, registry: &TypeRegistry) -> Result<Vec<Value>, BindError> {
    value
        .as_object()
        .and_then(|handle| registry.isolate().array_elements(handle))
        .ok_or_else(|| {
            CastError::TypeMismatch {
                expected: "array",
                actual: value.type_name(),
            }
            .into()
        })
}

fn object_entries(
    value: &Value,
    registry: &TypeRegistry,
) -> Result<Vec<(String, Value)>, BindError> {
    let handle = value.as_object().ok_or(CastError::TypeMismatch {
        expected: "object",
        actual: value.type_name(),
    })?;
    let isolate = registry.isolate();
    isolate
        .own_keys(handle)?
        .into_iter()
        .map(|key| -> Result<(String, Value), BindError> {
            let entry = isolate.get(handle, &key)?;
            Ok((key, entry))
        })
        .collect()
}

fn collect_array<I, T>(items: I, registry: &TypeRegistry) -> Result<Value, BindError>
where
    I: IntoIterator<Item = T>,
    T: ToScript,
{
    let elements = items
        .into_iter()
        .map(|item| item.to_script(registry))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Object(registry.isolate().new_array(elements)))
}

fn collect_object<I, K, V>(entries: I, registry: &TypeRegistry) -> Result<Value, BindError>
where
    I: IntoIterator<Item = (K, V)>,
    K: ToScript,
    V: ToScript,
{
    let isolate = registry.isolate();
    let object = isolate.new_object();
    for (key, value) in entries {
        let key = key.to_script(registry)?.to_display_string();
        let value = value.to_script(registry)?;
        isolate.define_property(object, &key, value, PropertyFlags::assigned())?;
    }
    Ok(Value::Object(object))
}

macro_rules! impl_script_sequence {
    ($($container:ident<T $(, $state:ident)?> where [$($bound:tt)*]),* $(,)?) => {
        $(
            impl<T $(, $state)?> FromScript for $container<T $(, $state)?>
            where
                T: FromScript $($bound)*,
            {
                fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
                    array_elements(value, registry)?
                        .iter()
                        .map(|element| T::from_script(element, registry))
                        .collect()
                }
            }

            impl<T $(, $state)?> ToScript for $container<T $(, $state)?>
            where
                T: ToScript,
            {
                fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
                    collect_array(self, registry)
                }
            }
        )*
    };
}

impl_script_sequence!(
    Vec<T> where [],
    VecDeque<T> where [],
    BTreeSet<T> where [+ Ord],
    HashSet<T, S> where [+ Eq + Hash, S: BuildHasher + Default],
);

impl<K, V, S> FromScript for HashMap<K, V, S>
where
    K: FromScript + Eq + Hash,
    V: FromScript,
    S: BuildHasher + Default,
{
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
        object_entries(value, registry)?
            .into_iter()
            .map(|(key, entry)| -> Result<(K, V), BindError> {
                Ok((
                    K::from_script(&Value::String(key), registry)?,
                    V::from_script(&entry, registry)?,
                ))
            })
            .collect()
    }
}

impl<K: ToScript, V: ToScript, S> ToScript for HashMap<K, V, S> {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        collect_object(self, registry)
    }
}

impl<K, V> FromScript for BTreeMap<K, V>
where
    K: FromScript + Ord,
    V: FromScript,
{
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
        object_entries(value, registry)?
            .into_iter()
            .map(|(key, entry)| -> Result<(K, V), BindError> {
                Ok((
                    K::from_script(&Value::String(key), registry)?,
                    V::from_script(&entry, registry)?,
                ))
            })
            .collect()
    }
}

impl<K: ToScript, V: ToScript> ToScript for BTreeMap<K, V> {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        collect_object(self, registry)
    }
}

macro_rules! impl_script_tuple {
    ($len:expr => $($name:ident : $idx:tt),+) => {
        impl<$($name: FromScript),+> FromScript for ($($name,)+) {
            fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
                let elements = array_elements(value, registry)?;
                if elements.len() != $len {
                    return Err(CastError::Length {
                        expected: $len,
                        actual: elements.len(),
                    }
                    .into());
                }
                Ok(($($name::from_script(&elements[$idx], registry)?,)+))
            }
        }

        impl<$($name: ToScript),+> ToScript for ($($name,)+) {
            fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
                let elements = vec![$(self.$idx.to_script(registry)?),+];
                Ok(Value::Object(registry.isolate().new_array(elements)))
            }
        }
    };
}

impl_script_tuple!(1 => A: 0);
impl_script_tuple!(2 => A: 0, B: 1);
impl_script_tuple!(3 => A: 0, B: 1, C: 2);
impl_script_tuple!(4 => A: 0, B: 1, C: 2, D: 3);
impl_script_tuple!(5 => A: 0, B: 1, C: 2, D: 3, E: 4);
impl_script_tuple!(6 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

// ============================================================================
// Argument lists
// ============================================================================

/// A positional argument list for calls into the host.
pub trait ToScriptArgs {
    fn to_script_args(self, registry: &TypeRegistry) -> Result<Vec<Value>, BindError>;
}

/// A positional argument list received from the host. Missing trailing
/// arguments read as `undefined`.
pub trait FromScriptArgs: Sized {
    const ARITY: usize;

    fn from_script_args(args: &[Value], registry: &TypeRegistry) -> Result<Self, BindError>;
}

impl ToScriptArgs for Vec<Value> {
    fn to_script_args(self, _: &TypeRegistry) -> Result<Vec<Value>, BindError> {
        Ok(self)
    }
}

macro_rules! impl_script_args {
    ($count:expr $(, $name:ident : $idx:tt)*) => {
        impl<$($name: ToScript),*> ToScriptArgs for ($($name,)*) {
            #[allow(unused_variables)]
            fn to_script_args(self, registry: &TypeRegistry) -> Result<Vec<Value>, BindError> {
                Ok(vec![$(self.$idx.to_script(registry)?),*])
            }
        }

        impl<$($name: FromScript),*> FromScriptArgs for ($($name,)*) {
            const ARITY: usize = $count;

            #[allow(unused_variables)]
            fn from_script_args(args: &[Value], registry: &TypeRegistry) -> Result<Self, BindError> {
                Ok(($($name::from_script(args.get($idx).unwrap_or(&Value::Undefined), registry)?,)*))
            }
        }
    };
}

impl_script_args!(0);
impl_script_args!(1, A: 0);
impl_script_args!(2, A: 0, B: 1);
impl_script_args!(3, A: 0, B: 1, C: 2);
impl_script_args!(4, A: 0, B: 1, C: 2, D: 3);
impl_script_args!(5, A: 0, B: 1, C: 2, D: 3, E: 4);
impl_script_args!(6, A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_script_args!(7, A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_script_args!(8, A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

// ============================================================================
// Registered native types
// ============================================================================

/// Shared ownership: the host object holds a share of the native object
/// until it is collected.
impl<T: Send + Sync + 'static> ToScript for Native<T> {
    #[cfg_attr(feature = "profiling", profiling::function)]
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        registry
            .wrap_existing(&self, DisposalPolicy::Delete)
            .map(Value::Object)
    }
}

/// Exact-type recovery only.
impl<T: Send + Sync + 'static> FromScript for Native<T> {
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
        let (native, _) = registry.unwrap_any(value, std::any::type_name::<T>())?;
        native.downcast::<T>().ok_or_else(|| {
            CastError::Incompatible {
                expected: std::any::type_name::<T>(),
                actual: native.type_name(),
            }
            .into()
        })
    }
}

/// Expose a native object the caller keeps owning.
///
/// The host object only observes it; if native code drops the last
/// handle, later host access fails with [`CastError::Detached`].
#[derive(Debug, Clone)]
pub struct Exposed<T>(pub Native<T>);

impl<T: Send + Sync + 'static> ToScript for Exposed<T> {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        registry
            .wrap_existing(&self.0, DisposalPolicy::LeaveAlone)
            .map(Value::Object)
    }
}

/// Move a native value into a new allocation owned solely by its host object.
#[derive(Debug, Clone, Default)]
pub struct ByValue<T>(pub T);

impl<T: Send + Sync + 'static> ToScript for ByValue<T> {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        registry
            .wrap_existing(&Native::new(self.0), DisposalPolicy::Delete)
            .map(Value::Object)
    }
}

/// Wrapped with the descriptor of the concrete type.
impl ToScript for AnyNative {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        registry
            .wrap_dynamic(&self, DisposalPolicy::Delete)
            .map(Value::Object)
    }
}

impl FromScript for AnyNative {
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
        registry
            .unwrap_any(value, "native object")
            .map(|(native, _)| native)
    }
}

impl<T: ?Sized + 'static> FromScript for Obj<T> {
    #[cfg_attr(feature = "profiling", profiling::function)]
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
        registry.recover::<T>(value)
    }
}

/// Returns the object it was recovered from while that is alive.
impl<T: ?Sized + 'static> ToScript for Obj<T> {
    fn to_script(self, registry: &TypeRegistry) -> Result<Value, BindError> {
        match self.handle() {
            Some(handle) if registry.isolate().is_alive(handle) => Ok(Value::Object(handle)),
            _ => registry
                .wrap_view::<T>(self.native(), DisposalPolicy::Delete)
                .map(Value::Object),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A rooted, callable host value.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    function: Global,
}

impl ScriptFunction {
    pub fn handle(&self) -> ObjectHandle {
        self.function.handle()
    }

    pub fn value(&self) -> Value {
        self.function.value()
    }

    /// Call with an `undefined` receiver.
    pub fn call<A, R>(&self, registry: &TypeRegistry, args: A) -> Result<R, BindError>
    where
        A: ToScriptArgs,
        R: FromScript,
    {
        self.call_with_this(registry, Value::Undefined, args)
    }

    pub fn call_with_this<A, R>(
        &self,
        registry: &TypeRegistry,
        this: Value,
        args: A,
    ) -> Result<R, BindError>
    where
        A: ToScriptArgs,
        R: FromScript,
    {
        let args = args.to_script_args(registry)?;
        let result = registry.isolate().call(&self.value(), this, args)?;
        R::from_script(&result, registry)
    }

    /// Invoke as a constructor.
    pub fn construct<A: ToScriptArgs>(
        &self,
        registry: &TypeRegistry,
        args: A,
    ) -> Result<Value, BindError> {
        let args = args.to_script_args(registry)?;
        Ok(registry.isolate().construct(&self.value(), args)?)
    }
}

impl FromScript for ScriptFunction {
    fn from_script(value: &Value, registry: &TypeRegistry) -> Result<Self, BindError> {
        let isolate = registry.isolate();
        match value.as_object() {
            Some(handle) if isolate.is_callable(value) => Ok(ScriptFunction {
                function: Global::new(isolate, handle),
            }),
            _ => Err(CastError::TypeMismatch {
                expected: "function",
                actual: value.type_name(),
            }
            .into()),
        }
    }
}

impl ToScript for ScriptFunction {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(self.value())
    }
}
