//! Bind native Rust types into a garbage-collected scripting runtime.
//!
//! - [`convert`]: value conversion between native and host values
//! - [`registry`]: per-isolate type registration and wrapping
//! - [`lifetime`]: who frees the native object when its host object dies
//! - [`compat`]: recovering a base type from a wrapped derived object
//! - [`bidirectional`]: script-overridable native types and factories

pub mod bidirectional;
pub mod callable;
pub mod compat;
pub mod convert;
pub mod error;
pub mod lifetime;
pub mod native;
pub mod registry;

pub use scriptbind_core as core;

pub use bidirectional::{Factory, NativeFactory, ScriptFactory, ScriptObject, ScriptOverride};
pub use callable::{IntoFunction, IntoMethod, IntoMethodMut};
pub use compat::{CompatibilityChain, Obj, Upcast};
pub use convert::{
    ByValue, Exposed, FromScript, FromScriptArgs, ScriptFunction, ToScript, ToScriptArgs,
};
pub use error::{BindError, CastError, RegistrationError};
pub use lifetime::DisposalPolicy;
pub use native::{AnyNative, Native, WrappedNative};
pub use registry::{
    ClassBuilder, DescriptorCore, InterfaceBuilder, Phase, PropertyChanged, TypeDescriptor,
    TypeRegistry, WeakRegistry,
};

pub mod prelude {
    pub use crate::bidirectional::*;
    pub use crate::compat::{Obj, Upcast};
    pub use crate::convert::*;
    pub use crate::error::*;
    pub use crate::lifetime::DisposalPolicy;
    pub use crate::native::{AnyNative, Native};
    pub use crate::registry::{ClassBuilder, InterfaceBuilder, TypeRegistry};
    pub use crate::script_overrides;
    pub use scriptbind_core::{
        CallContext, Exception, ExceptionKind, Global, Isolate, IsolateConfig, ObjectHandle,
        PropertyFlags, Value,
    };
}
