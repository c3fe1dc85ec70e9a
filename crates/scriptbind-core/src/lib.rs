//! Host runtime model for scriptbind.
//!
//! This crate provides the scripting-runtime side that the binding engine
//! talks to: isolates, boxed values, a collected object heap with
//! prototypes, accessors and interceptors, host function objects, weak
//! callbacks and external-memory accounting.
//!
//! It contains no language. Functions are Rust closures; a
//! function created with [`Isolate::new_function`] plays the role of
//! scripted code, one created with [`Isolate::new_native_function`] the role
//! of an engine-generated native thunk.

pub mod config;
pub mod error;
pub mod function;
pub mod gc;
pub mod heap;
pub mod isolate;
pub mod object;
pub mod value;

pub use config::IsolateConfig;
pub use error::{Exception, ExceptionKind};
pub use function::{CallContext, FunctionOrigin, HostFn};
pub use gc::{GcStatistics, WeakCallback};
pub use heap::ObjectHandle;
pub use isolate::{Global, Isolate, IsolateId, WeakIsolate};
pub use object::{
    Getter, IndexedGetter, IndexedInterceptor, IndexedSetter, InternalField, Interceptors,
    NamedGetter, NamedInterceptor, NamedSetter, PropertyFlags, Setter,
};
pub use value::{Value, array_index};
