//! Native types whose virtual methods scripting code can override.
//!
//! An override type embeds the native base it extends and a
//! [`ScriptObject`] for its host counterpart. Methods routed through
//! [`ScriptObject::dispatch`] (usually via [`script_overrides!`]) first look
//! for a scripted function of the same name on that object. Methods that
//! are not routed always run natively.
//!
//! ```ignore
//! trait Shape {
//!     fn area(&self) -> f64;
//!     fn label(&self, prefix: String) -> String;
//! }
//!
//! struct ScriptShape {
//!     base: Square,
//!     script: ScriptObject,
//! }
//!
//! impl ScriptOverride for ScriptShape {
//!     fn script_object(&self) -> &ScriptObject {
//!         &self.script
//!     }
//! }
//!
//! impl Shape for ScriptShape {
//!     script_overrides! { base =>
//!         fn area(&self) -> f64;
//!     }
//!
//!     fn label(&self, prefix: String) -> String {
//!         self.base.label(prefix)
//!     }
//! }
//! ```
//!
//! Factories produce either plain native objects ([`NativeFactory`]) or
//! override objects driven by a scripted constructor ([`ScriptFactory`]).
//!
//! Overrides only exist behind dynamic dispatch. Code that must see them
//! holds the object as a trait object: a factory typed on `dyn Shape`, or an
//! `Obj<dyn Shape>` recovered through
//! [`TypeRegistry::interface`](crate::TypeRegistry::interface). Viewing
//! `ScriptShape` as its embedded `Square` reaches the native code only.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use scriptbind_core::{Exception, FunctionOrigin, Global, ObjectHandle, PropertyFlags, Value};

use crate::callable::{check_arity, guard_native};
use crate::compat::{Obj, Upcast};
use crate::convert::{FromScript, FromScriptArgs, ScriptFunction, ToScript, ToScriptArgs};
use crate::error::{BindError, RegistrationError};
use crate::lifetime::DisposalPolicy;
use crate::native::{AnyNative, Native};
use crate::registry::{TypeRegistry, WeakRegistry};

const LOG_TARGET: &str = "scriptbind::override";

// ============================================================================
// Override binding
// ============================================================================

/// The host object an override type dispatches to.
///
/// Roots the object for as long as the binding lives.
#[derive(Clone)]
pub struct ScriptObject {
    registry: WeakRegistry,
    object: Global,
}

impl ScriptObject {
    pub fn new(registry: &TypeRegistry, object: ObjectHandle) -> Self {
        Self {
            registry: registry.downgrade(),
            object: Global::new(registry.isolate(), object),
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.object.handle()
    }

    pub fn value(&self) -> Value {
        self.object.value()
    }

    /// The scripted function overriding `name`, if any.
    ///
    /// Only data properties holding script functions count. Native thunks
    /// (such as the registered base methods on the prototype) never do.
    fn override_of(&self, name: &str) -> Option<Value> {
        let isolate = self.object.isolate();
        let function = isolate.lookup_data(self.object.handle(), name)?;
        (isolate.function_origin(&function) == Some(FunctionOrigin::Script)).then_some(function)
    }

    pub fn has_override(&self, name: &str) -> bool {
        self.override_of(name).is_some()
    }

    /// Call the scripted override of `name`, or `fallback` if there is none.
    ///
    /// When an override exists its result is final; `fallback` does not run.
    pub fn dispatch<A, R, E>(
        &self,
        name: &str,
        args: A,
        fallback: impl FnOnce() -> Result<R, E>,
    ) -> Result<R, E>
    where
        A: ToScriptArgs,
        R: FromScript,
        E: From<BindError>,
    {
        match self.override_of(name) {
            Some(function) => self.invoke(name, &function, args).map_err(E::from),
            None => fallback(),
        }
    }

    /// Like [`dispatch`](Self::dispatch) for methods with no error channel.
    ///
    /// # Panics
    ///
    /// A failing override unwinds with its [`BindError`] as payload. The
    /// call thunk that entered native code catches it and raises the error
    /// in the calling script, so a throwing override reaches its caller.
    pub fn dispatch_or_base<A, R>(&self, name: &str, args: A, base: impl FnOnce() -> R) -> R
    where
        A: ToScriptArgs,
        R: FromScript,
    {
        let Some(function) = self.override_of(name) else {
            return base();
        };
        match self.invoke(name, &function, args) {
            Ok(result) => result,
            Err(err) => {
                log::error!(target: LOG_TARGET, "override {name} failed: {err}");
                std::panic::panic_any(err)
            }
        }
    }

    fn invoke<A, R>(&self, name: &str, function: &Value, args: A) -> Result<R, BindError>
    where
        A: ToScriptArgs,
        R: FromScript,
    {
        let registry = self.registry.registry()?;
        let args = args.to_script_args(&registry)?;
        log::trace!(
            target: LOG_TARGET,
            "{name} overridden on {}:{}",
            self.handle().index,
            self.handle().generation
        );
        let result = registry.isolate().call(function, self.value(), args)?;
        R::from_script(&result, &registry)
    }
}

impl ToScript for ScriptObject {
    fn to_script(self, _: &TypeRegistry) -> Result<Value, BindError> {
        Ok(self.value())
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

/// A native type bound to a host object that may override its methods.
pub trait ScriptOverride {
    fn script_object(&self) -> &ScriptObject;
}

/// Generate trait method bodies that try a scripted override first.
///
/// Invoke inside a trait `impl` block. `base` names the field holding the
/// native implementation, which must implement the same trait. Arguments
/// must be `Clone + ToScript` and results `FromScript`.
///
/// Methods returning `Result<T, E>` require `E: From<BindError>` and report
/// override failures through it. Other methods unwind with the error, see
/// [`ScriptObject::dispatch_or_base`].
#[macro_export]
macro_rules! script_overrides {
    ($base:ident =>) => {};

    ($base:ident =>
        fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> Result<$ok:ty, $err:ty>;
        $($rest:tt)*
    ) => {
        fn $name(&self $(, $arg: $ty)*) -> ::std::result::Result<$ok, $err> {
            $crate::ScriptOverride::script_object(self).dispatch(
                ::std::stringify!($name),
                ($(::std::clone::Clone::clone(&$arg),)*),
                || self.$base.$name($($arg),*),
            )
        }
        $crate::script_overrides!($base => $($rest)*);
    };

    ($base:ident =>
        fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
        $($rest:tt)*
    ) => {
        fn $name(&self $(, $arg: $ty)*) -> $ret {
            $crate::ScriptOverride::script_object(self).dispatch_or_base(
                ::std::stringify!($name),
                ($(::std::clone::Clone::clone(&$arg),)*),
                || self.$base.$name($($arg),*),
            )
        }
        $crate::script_overrides!($base => $($rest)*);
    };

    ($base:ident =>
        fn $name:ident(&self $(, $arg:ident : $ty:ty)* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::script_overrides!($base => fn $name(&self $(, $arg: $ty)*) -> (); $($rest)*);
    };
}

// ============================================================================
// Factories
// ============================================================================

/// Produces native objects usable as `B`.
///
/// `B` may be a trait object, in which case it must be registered with
/// [`TypeRegistry::interface`].
pub trait Factory<B: ?Sized + 'static, Args>: Send + Sync {
    /// Build a new object. The caller receives a share of it.
    fn create(&self, registry: &TypeRegistry, args: Args) -> Result<AnyNative, BindError>;

    /// Build a new object and view it as `D`.
    ///
    /// Fails with [`BindError::Bidirectional`] if the product is not
    /// compatible with `D`.
    fn create_as<D: ?Sized + 'static>(
        &self,
        registry: &TypeRegistry,
        args: Args,
    ) -> Result<Obj<D>, BindError>
    where
        Self: Sized,
    {
        let product = self.create(registry, args)?;
        registry.resolve::<D>(&product).map_err(|_| {
            BindError::bidirectional(format!(
                "factory product {} is not a {}",
                product.type_name(),
                type_name::<D>()
            ))
        })
    }

    /// Build a new object and run `f` on it as `B`.
    fn with_base<R>(
        &self,
        registry: &TypeRegistry,
        args: Args,
        f: impl FnOnce(&B) -> R,
    ) -> Result<R, BindError>
    where
        Self: Sized,
    {
        let product = self.create(registry, args)?;
        let base = registry.resolve::<B>(&product)?;
        let guard = base.read()?;
        Ok(f(&*guard))
    }
}

/// Builds a plain native `D` for each request.
pub struct NativeFactory<B: ?Sized, D, Args, F> {
    build: F,
    _marker: PhantomData<(fn(Args) -> D, fn(&B))>,
}

impl<B: ?Sized, D, Args, F> NativeFactory<B, D, Args, F>
where
    F: Fn(Args) -> D,
{
    pub fn new(build: F) -> Self {
        Self {
            build,
            _marker: PhantomData,
        }
    }
}

impl<B, D, Args, F> Factory<B, Args> for NativeFactory<B, D, Args, F>
where
    B: ?Sized + 'static,
    D: Upcast<B> + Send + Sync + 'static,
    F: Fn(Args) -> D + Send + Sync,
{
    fn create(&self, _: &TypeRegistry, args: Args) -> Result<AnyNative, BindError> {
        Ok(Native::new((self.build)(args)).erase())
    }
}

impl<B: ?Sized, D, Args, F> fmt::Debug for NativeFactory<B, D, Args, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFactory")
            .field("base", &type_name::<B>())
            .field("product", &type_name::<D>())
            .finish()
    }
}

/// Builds override objects of type `O` through a scripted constructor.
///
/// Each request creates a host object, binds a new `O` to it and then runs
/// the constructor with that object as receiver. The host object does not
/// own `O`: the native side does, and `O`'s [`ScriptObject`] keeps the host
/// object alive.
pub struct ScriptFactory<B: ?Sized, O, Args, F> {
    constructor: ScriptFunction,
    build: F,
    _marker: PhantomData<(fn(Args) -> O, fn(&B))>,
}

impl<B: ?Sized, O, Args, F> ScriptFactory<B, O, Args, F>
where
    F: Fn(ScriptObject, Args) -> O,
{
    pub fn new(constructor: ScriptFunction, build: F) -> Self {
        Self {
            constructor,
            build,
            _marker: PhantomData,
        }
    }

    pub fn constructor(&self) -> &ScriptFunction {
        &self.constructor
    }
}

impl<B: ?Sized, O, Args, F> ScriptFactory<B, O, Args, F>
where
    O: Send + Sync + 'static,
{
    /// Prototype for new instances: the constructor's `prototype`, chained
    /// to `O`'s registered prototype when it has no parent yet.
    fn instance_prototype(&self, registry: &TypeRegistry) -> Result<Option<ObjectHandle>, BindError> {
        let isolate = registry.isolate();
        let native = registry.prototype_of::<O>();
        let scripted = isolate.get(self.constructor.handle(), "prototype")?.as_object();
        match scripted {
            Some(prototype) => {
                if isolate.prototype_of(prototype).is_none() && native.is_some() {
                    isolate.set_prototype(prototype, native)?;
                }
                Ok(Some(prototype))
            }
            None => Ok(native),
        }
    }
}

impl<B, O, Args, F> Factory<B, Args> for ScriptFactory<B, O, Args, F>
where
    B: ?Sized + 'static,
    O: Upcast<B> + Send + Sync + 'static,
    Args: ToScriptArgs + Clone,
    F: Fn(ScriptObject, Args) -> O + Send + Sync,
{
    fn create(&self, registry: &TypeRegistry, args: Args) -> Result<AnyNative, BindError> {
        registry.isolate().scope(|isolate| -> Result<AnyNative, BindError> {
            let prototype = self.instance_prototype(registry)?;
            let object = isolate.new_object_with_prototype(prototype);
            let script = ScriptObject::new(registry, object);
            let native = Native::new((self.build)(script, args.clone()));
            registry.bind_override(object, &native)?;
            log::debug!(
                target: LOG_TARGET,
                "created {} as {} on {}:{}",
                type_name::<O>(),
                type_name::<B>(),
                object.index,
                object.generation
            );
            self.constructor
                .call_with_this::<_, Value>(registry, Value::Object(object), args)?;
            Ok(native.erase())
        })
    }
}

impl<B: ?Sized, O, Args, F> fmt::Debug for ScriptFactory<B, O, Args, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFactory")
            .field("base", &type_name::<B>())
            .field("product", &type_name::<O>())
            .field("constructor", &self.constructor)
            .finish()
    }
}

// ============================================================================
// Exposing factories
// ============================================================================

impl TypeRegistry {
    /// Publish a native factory as global constructor `name`.
    ///
    /// Products are wrapped as `B` and owned by their host object.
    pub fn register_factory_constructor<B, D, Args, F>(
        &self,
        name: &str,
        factory: NativeFactory<B, D, Args, F>,
    ) -> Result<ObjectHandle, RegistrationError>
    where
        B: Send + Sync + 'static,
        D: Upcast<B> + Send + Sync + 'static,
        Args: FromScriptArgs + 'static,
        F: Fn(Args) -> D + Send + Sync + 'static,
    {
        if !self.is_registered::<B>() {
            return Err(RegistrationError::TypeNotRegistered {
                type_name: type_name::<B>(),
            });
        }
        let weak = self.downgrade();
        let label = name.to_string();
        let isolate = self.isolate();
        let function = isolate.new_native_function(name, move |_, cx| {
            create_from_script::<B, Args, _>(&weak, &label, &factory, cx.args()).map_err(Exception::from)
        });
        isolate.define_property(
            isolate.global(),
            name,
            Value::Object(function),
            PropertyFlags::assigned(),
        )?;
        log::debug!(
            target: "scriptbind::registration",
            "factory constructor {name} for {}",
            type_name::<B>()
        );
        Ok(function)
    }
}

fn create_from_script<B, Args, Fac>(
    weak: &WeakRegistry,
    name: &str,
    factory: &Fac,
    args: &[Value],
) -> Result<Value, BindError>
where
    B: Send + Sync + 'static,
    Args: FromScriptArgs,
    Fac: Factory<B, Args>,
{
    let registry = weak.registry()?;
    check_arity(name, Args::ARITY, args.len())?;
    let args = Args::from_script_args(args, &registry)?;
    let product = guard_native(name, || factory.create(&registry, args))?;
    registry
        .wrap_any::<B>(&product, DisposalPolicy::Delete)
        .map(Value::Object)
}
