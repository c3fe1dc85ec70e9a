//! Fluent registration of a native type.
//!
//! Every builder call applies immediately and returns the builder again,
//! so misuse fails at the offending call:
//!
//! ```ignore
//! registry
//!     .class::<Counter>("Counter")
//!     .constructor("Counter", |start: i64| Counter { value: start })?
//!     .method_mut("add", |c: &mut Counter, n: i64| c.value += n)?
//!     .member_readonly("value", |c: &Counter| c.value)?
//!     .static_method("zero", || 0_i64)?
//!     .finalize(false)?;
//! ```

use std::any::type_name;
use std::sync::Arc;

use scriptbind_core::{
    CallContext, Exception, Getter, Global, IndexedGetter, IndexedInterceptor, IndexedSetter,
    Isolate, NamedGetter, NamedInterceptor, NamedSetter, ObjectHandle, PropertyFlags, Setter,
    Value,
};

use super::descriptor::{
    ConstructorTemplate, DescriptorCore, DescriptorState, Phase, StaticMember, TypeDescriptor,
};
use super::{TypeRegistry, WeakRegistry};
use crate::callable::{
    IntoFunction, IntoMethod, IntoMethodMut, check_arity, fill_defaults, guard_native,
};
use crate::compat::{Obj, Upcast};
use crate::convert::{FromScript, ToScript};
use crate::error::{BindError, RegistrationError};
use crate::lifetime::DisposalPolicy;
use crate::native::Native;

const LOG_TARGET: &str = "scriptbind::registration";

/// Builder for the binding of native type `T`.
pub struct ClassBuilder<T: 'static> {
    registry: TypeRegistry,
    descriptor: Arc<TypeDescriptor<T>>,
}

impl<T: Send + Sync + 'static> ClassBuilder<T> {
    pub(crate) fn new(registry: TypeRegistry, descriptor: Arc<TypeDescriptor<T>>) -> Self {
        Self {
            registry,
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor<T>> {
        &self.descriptor
    }

    fn core(&self) -> &DescriptorCore {
        self.descriptor.core()
    }

    fn isolate(&self) -> &Isolate {
        self.registry.isolate()
    }

    fn label(&self, name: &str) -> String {
        format!("{}.{name}", self.core().name())
    }

    fn ensure_open(&self, state: &DescriptorState) -> Result<(), RegistrationError> {
        match state.phase {
            Phase::Open => Ok(()),
            Phase::Finalized => Err(RegistrationError::AlreadyFinalized {
                type_name: self.core().name().to_string(),
            }),
        }
    }

    fn duplicate(&self, name: &str) -> RegistrationError {
        RegistrationError::DuplicateName {
            type_name: self.core().name().to_string(),
            name: name.to_string(),
        }
    }

    /// Reserve an instance-side name.
    fn claim_instance(&self, name: &str) -> Result<(), RegistrationError> {
        let mut state = self.core().state();
        self.ensure_open(&state)?;
        if !state.instance_names.insert(name.to_string()) {
            return Err(self.duplicate(name));
        }
        state.has_members = true;
        Ok(())
    }

    /// Reserve a static-side name.
    fn claim_static(&self, name: &str) -> Result<(), RegistrationError> {
        let mut state = self.core().state();
        self.ensure_open(&state)?;
        if !state.static_names.insert(name.to_string()) {
            return Err(self.duplicate(name));
        }
        Ok(())
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    /// Publish a constructor as global `name`.
    ///
    /// `new name(...)` converts the arguments, builds a `T` and binds it to
    /// the new object with [`DisposalPolicy::Delete`]. Constructors must be
    /// declared before any method or member.
    pub fn constructor<F, Args>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoFunction<Args, Output = T>,
    {
        let first = {
            let mut state = self.core().state();
            self.ensure_open(&state)?;
            if state.has_members {
                return Err(RegistrationError::ConstructorAfterMembers {
                    type_name: self.core().name().to_string(),
                    name: name.to_string(),
                });
            }
            if !state.constructor_names.insert(name.to_string()) {
                return Err(self.duplicate(name));
            }
            state.constructors.is_empty()
        };

        let label = name.to_string();
        let weak = self.registry.downgrade();
        let function = self.isolate().new_native_function(name, move |_, cx| {
            construct::<T, F, Args>(&weak, &label, &f, cx).map_err(Exception::from)
        });

        let isolate = self.isolate();
        let prototype = self.core().prototype();
        isolate.define_property(
            function,
            "prototype",
            Value::Object(prototype),
            PropertyFlags::empty(),
        )?;
        if first {
            isolate.define_property(
                prototype,
                "constructor",
                Value::Object(function),
                PropertyFlags::WRITABLE,
            )?;
        }
        isolate.define_property(
            isolate.global(),
            name,
            Value::Object(function),
            PropertyFlags::assigned(),
        )?;

        let statics = {
            let mut state = self.core().state();
            state.constructors.push(ConstructorTemplate {
                name: name.to_string(),
                arity: F::ARITY,
                function: Global::new(isolate, function),
            });
            state.statics.clone()
        };
        for (static_name, member) in &statics {
            install_static(isolate, function, static_name, member)?;
        }

        log::debug!(
            target: LOG_TARGET,
            "{}: constructor {name}/{}",
            self.core().name(),
            F::ARITY
        );
        Ok(self)
    }

    // ========================================================================
    // Methods
    // ========================================================================

    /// Instance method taking `&T`.
    pub fn method<F, Args>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoMethod<T, Args>,
        F::Output: ToScript,
    {
        self.method_with_defaults(name, f, Vec::new())
    }

    /// Instance method whose last `defaults.len()` parameters are optional.
    pub fn method_with_defaults<F, Args>(
        self,
        name: &str,
        f: F,
        defaults: Vec<Value>,
    ) -> Result<Self, RegistrationError>
    where
        F: IntoMethod<T, Args>,
        F::Output: ToScript,
    {
        self.check_defaults(name, F::ARITY, &defaults)?;
        self.claim_instance(name)?;
        let label = self.label(name);
        let weak = self.registry.downgrade();
        let function = self.isolate().new_native_function(name, move |_, cx| {
            let call = |registry: &TypeRegistry, receiver: &Obj<T>, args: &[Value]| {
                f.call_with(receiver, args, registry)
            };
            invoke_method(&weak, &label, F::ARITY, &defaults, cx, call).map_err(Exception::from)
        });
        self.install_method(name, function, F::ARITY)
    }

    /// Instance method taking `&mut T`.
    pub fn method_mut<F, Args>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoMethodMut<T, Args>,
        F::Output: ToScript,
    {
        self.claim_instance(name)?;
        let label = self.label(name);
        let weak = self.registry.downgrade();
        let function = self.isolate().new_native_function(name, move |_, cx| {
            let call = |registry: &TypeRegistry, receiver: &Obj<T>, args: &[Value]| {
                f.call_with(receiver, args, registry)
            };
            invoke_method(&weak, &label, F::ARITY, &[], cx, call).map_err(Exception::from)
        });
        self.install_method(name, function, F::ARITY)
    }

    fn check_defaults(
        &self,
        name: &str,
        arity: usize,
        defaults: &[Value],
    ) -> Result<(), RegistrationError> {
        if defaults.len() > arity {
            return Err(RegistrationError::InvalidValue {
                name: self.label(name),
                reason: format!("{} defaults for {arity} parameters", defaults.len()),
            });
        }
        Ok(())
    }

    fn install_method(
        self,
        name: &str,
        function: ObjectHandle,
        arity: usize,
    ) -> Result<Self, RegistrationError> {
        self.isolate().define_property(
            self.core().prototype(),
            name,
            Value::Object(function),
            PropertyFlags::WRITABLE,
        )?;
        log::debug!(target: LOG_TARGET, "{}: method {name}/{arity}", self.core().name());
        Ok(self)
    }

    // ========================================================================
    // Statics
    // ========================================================================

    /// Function attached to every constructor and to the static namespace.
    pub fn static_method<F, Args>(self, name: &str, f: F) -> Result<Self, RegistrationError>
    where
        F: IntoFunction<Args>,
        F::Output: ToScript,
    {
        self.claim_static(name)?;
        let label = self.label(name);
        let weak = self.registry.downgrade();
        let function = self.isolate().new_native_function(name, move |_, cx| {
            invoke_static(&weak, &label, &f, cx).map_err(Exception::from)
        });
        let member = StaticMember::Method(Global::new(self.isolate(), function));
        self.add_static(name, member)
    }

    /// Read-only static value computed on every read.
    pub fn static_property<G, R>(self, name: &str, get: G) -> Result<Self, RegistrationError>
    where
        G: Fn() -> R + Send + Sync + 'static,
        R: ToScript,
    {
        self.claim_static(name)?;
        let label = self.label(name);
        let weak = self.registry.downgrade();
        let getter: Getter = Arc::new(move |_: &Isolate, _: ObjectHandle| {
            let read = || -> Result<Value, BindError> {
                let registry = weak.registry()?;
                guard_native(&label, || Ok(get()))?.to_script(&registry)
            };
            read().map_err(Exception::from)
        });
        self.add_static(name, StaticMember::Property(getter))
    }

    fn add_static(self, name: &str, member: StaticMember) -> Result<Self, RegistrationError> {
        let targets = {
            let mut state = self.core().state();
            state.statics.push((name.to_string(), member.clone()));
            state.static_targets()
        };
        for target in targets {
            install_static(self.isolate(), target, name, &member)?;
        }
        log::debug!(target: LOG_TARGET, "{}: static {name}", self.core().name());
        Ok(self)
    }

    /// Publish the statics as global `name` even without a constructor.
    pub fn expose_static_namespace(self, name: &str) -> Result<Self, RegistrationError> {
        {
            let state = self.core().state();
            self.ensure_open(&state)?;
            if state.namespace.is_some() {
                return Err(self.duplicate(name));
            }
        }
        let isolate = self.isolate();
        let namespace = isolate.new_object();
        let statics = {
            let mut state = self.core().state();
            state.namespace = Some(Global::new(isolate, namespace));
            state.statics.clone()
        };
        for (static_name, member) in &statics {
            install_static(isolate, namespace, static_name, member)?;
        }
        isolate.define_property(
            isolate.global(),
            name,
            Value::Object(namespace),
            PropertyFlags::assigned(),
        )?;
        log::debug!(target: LOG_TARGET, "{}: static namespace {name}", self.core().name());
        Ok(self)
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Read/write property backed by native accessors.
    pub fn member<G, S, R, V>(self, name: &str, get: G, set: S) -> Result<Self, RegistrationError>
    where
        G: Fn(&T) -> R + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
        R: ToScript,
        V: FromScript,
    {
        self.claim_instance(name)?;
        let getter = self.member_getter(name, get);
        let label = self.label(name);
        let member = name.to_string();
        let weak = self.registry.downgrade();
        let setter: Setter = Arc::new(move |isolate: &Isolate, this, value| {
            write_member::<T, _, V>(&weak, &label, &member, isolate, this, value, &set)
                .map_err(Exception::from)
        });
        self.install_member(name, getter, Some(setter))
    }

    /// Read-only property. Host writes to it are ignored.
    pub fn member_readonly<G, R>(self, name: &str, get: G) -> Result<Self, RegistrationError>
    where
        G: Fn(&T) -> R + Send + Sync + 'static,
        R: ToScript,
    {
        self.claim_instance(name)?;
        let getter = self.member_getter(name, get);
        self.install_member(name, getter, None)
    }

    fn member_getter<G, R>(&self, name: &str, get: G) -> Getter
    where
        G: Fn(&T) -> R + Send + Sync + 'static,
        R: ToScript,
    {
        let label = self.label(name);
        let weak = self.registry.downgrade();
        Arc::new(move |_: &Isolate, this: ObjectHandle| {
            let read = || -> Result<Value, BindError> {
                let registry = weak.registry()?;
                let receiver = registry.recover::<T>(&Value::Object(this))?;
                let output = guard_native(&label, || Ok(get(&*receiver.read()?)))?;
                output.to_script(&registry)
            };
            read().map_err(Exception::from)
        })
    }

    fn install_member(
        self,
        name: &str,
        getter: Getter,
        setter: Option<Setter>,
    ) -> Result<Self, RegistrationError> {
        let writable = setter.is_some();
        self.isolate().define_accessor(
            self.core().prototype(),
            name,
            Some(getter),
            setter,
            PropertyFlags::ENUMERABLE,
        )?;
        log::debug!(
            target: LOG_TARGET,
            "{}: member {name}{}",
            self.core().name(),
            if writable { "" } else { " (read-only)" }
        );
        Ok(self)
    }

    /// Run `callback` after every successful member write.
    pub fn on_property_changed<C>(self, callback: C) -> Result<Self, RegistrationError>
    where
        C: Fn(&Isolate, ObjectHandle, &str, &Value) + Send + Sync + 'static,
    {
        {
            let mut state = self.core().state();
            self.ensure_open(&state)?;
            state.property_changed.push(Arc::new(callback));
        }
        Ok(self)
    }

    /// Read-only value on the prototype.
    pub fn constant<V: ToScript>(self, name: &str, value: V) -> Result<Self, RegistrationError> {
        self.claim_instance(name)?;
        let value = value
            .to_script(&self.registry)
            .map_err(|err| RegistrationError::InvalidValue {
                name: self.label(name),
                reason: err.to_string(),
            })?;
        self.isolate().define_property(
            self.core().prototype(),
            name,
            value,
            PropertyFlags::ENUMERABLE,
        )?;
        log::debug!(target: LOG_TARGET, "{}: constant {name}", self.core().name());
        Ok(self)
    }

    /// Read-only object of named integer values on the prototype.
    pub fn enumeration(
        self,
        name: &str,
        variants: &[(&str, i64)],
    ) -> Result<Self, RegistrationError> {
        self.claim_instance(name)?;
        let isolate = self.isolate();
        let values = isolate.new_object();
        for (variant, value) in variants {
            isolate.define_property(
                values,
                variant,
                Value::Int(*value),
                PropertyFlags::ENUMERABLE,
            )?;
        }
        isolate.define_property(
            self.core().prototype(),
            name,
            Value::Object(values),
            PropertyFlags::ENUMERABLE,
        )?;
        log::debug!(
            target: LOG_TARGET,
            "{}: enumeration {name} ({} variants)",
            self.core().name(),
            variants.len()
        );
        Ok(self)
    }

    // ========================================================================
    // Interceptors
    // ========================================================================

    /// Intercept array-index reads on every instance. Returning `None`
    /// falls through to ordinary lookup.
    pub fn index_interceptor<G, R>(self, get: G) -> Result<Self, RegistrationError>
    where
        G: Fn(&T, u32) -> Option<R> + Send + Sync + 'static,
        R: ToScript,
    {
        let getter = self.indexed_getter(get);
        self.install_indexed(IndexedInterceptor {
            getter,
            setter: None,
        })
    }

    /// Intercept array-index reads and writes. The setter returns whether
    /// it handled the write.
    pub fn index_interceptor_with_setter<G, R, S, V>(
        self,
        get: G,
        set: S,
    ) -> Result<Self, RegistrationError>
    where
        G: Fn(&T, u32) -> Option<R> + Send + Sync + 'static,
        R: ToScript,
        S: Fn(&mut T, u32, V) -> bool + Send + Sync + 'static,
        V: FromScript,
    {
        let getter = self.indexed_getter(get);
        let label = self.label("[index]");
        let weak = self.registry.downgrade();
        let setter: IndexedSetter = Arc::new(move |_: &Isolate, this, index, value| {
            let write = || -> Result<bool, BindError> {
                let registry = weak.registry()?;
                let receiver = registry.recover::<T>(&Value::Object(this))?;
                let value = V::from_script(&value, &registry)?;
                guard_native(&label, || Ok(set(&mut *receiver.write()?, index, value)))
            };
            write().map_err(Exception::from)
        });
        self.install_indexed(IndexedInterceptor {
            getter,
            setter: Some(setter),
        })
    }

    fn indexed_getter<G, R>(&self, get: G) -> IndexedGetter
    where
        G: Fn(&T, u32) -> Option<R> + Send + Sync + 'static,
        R: ToScript,
    {
        let label = self.label("[index]");
        let weak = self.registry.downgrade();
        Arc::new(move |_: &Isolate, this: ObjectHandle, index: u32| {
            let read = || -> Result<Option<Value>, BindError> {
                let registry = weak.registry()?;
                let receiver = registry.recover::<T>(&Value::Object(this))?;
                let output = guard_native(&label, || Ok(get(&*receiver.read()?, index)))?;
                output.map(|value| value.to_script(&registry)).transpose()
            };
            read().map_err(Exception::from)
        })
    }

    fn install_indexed(self, interceptor: IndexedInterceptor) -> Result<Self, RegistrationError> {
        {
            let mut state = self.core().state();
            self.ensure_open(&state)?;
            if state.interceptors.indexed.is_some() {
                return Err(self.duplicate("[index]"));
            }
            state.interceptors.indexed = Some(interceptor);
        }
        log::debug!(target: LOG_TARGET, "{}: index interceptor", self.core().name());
        Ok(self)
    }

    /// Intercept string-keyed reads on every instance. Returning `None`
    /// falls through to ordinary lookup.
    pub fn named_interceptor<G, R>(self, get: G) -> Result<Self, RegistrationError>
    where
        G: Fn(&T, &str) -> Option<R> + Send + Sync + 'static,
        R: ToScript,
    {
        let getter = self.named_getter(get);
        self.install_named(NamedInterceptor {
            getter,
            setter: None,
        })
    }

    /// Intercept string-keyed reads and writes. The setter returns whether
    /// it handled the write.
    pub fn named_interceptor_with_setter<G, R, S, V>(
        self,
        get: G,
        set: S,
    ) -> Result<Self, RegistrationError>
    where
        G: Fn(&T, &str) -> Option<R> + Send + Sync + 'static,
        R: ToScript,
        S: Fn(&mut T, &str, V) -> bool + Send + Sync + 'static,
        V: FromScript,
    {
        let getter = self.named_getter(get);
        let label = self.label("[name]");
        let weak = self.registry.downgrade();
        let setter: NamedSetter = Arc::new(move |_: &Isolate, this, key: &str, value| {
            let write = || -> Result<bool, BindError> {
                let registry = weak.registry()?;
                let receiver = registry.recover::<T>(&Value::Object(this))?;
                let value = V::from_script(&value, &registry)?;
                guard_native(&label, || Ok(set(&mut *receiver.write()?, key, value)))
            };
            write().map_err(Exception::from)
        });
        self.install_named(NamedInterceptor {
            getter,
            setter: Some(setter),
        })
    }

    fn named_getter<G, R>(&self, get: G) -> NamedGetter
    where
        G: Fn(&T, &str) -> Option<R> + Send + Sync + 'static,
        R: ToScript,
    {
        let label = self.label("[name]");
        let weak = self.registry.downgrade();
        Arc::new(move |_: &Isolate, this: ObjectHandle, key: &str| {
            let read = || -> Result<Option<Value>, BindError> {
                let registry = weak.registry()?;
                let receiver = registry.recover::<T>(&Value::Object(this))?;
                let output = guard_native(&label, || Ok(get(&*receiver.read()?, key)))?;
                output.map(|value| value.to_script(&registry)).transpose()
            };
            read().map_err(Exception::from)
        })
    }

    fn install_named(self, interceptor: NamedInterceptor) -> Result<Self, RegistrationError> {
        {
            let mut state = self.core().state();
            self.ensure_open(&state)?;
            if state.interceptors.named.is_some() {
                return Err(self.duplicate("[name]"));
            }
            state.interceptors.named = Some(interceptor);
        }
        log::debug!(target: LOG_TARGET, "{}: named interceptor", self.core().name());
        Ok(self)
    }

    // ========================================================================
    // Type relationships
    // ========================================================================

    /// Accept objects of type `D` wherever a `T` is expected.
    ///
    /// Candidates are tried in declaration order.
    pub fn compatible_with<D>(self) -> Result<Self, RegistrationError>
    where
        D: Upcast<T> + Send + Sync + 'static,
    {
        {
            let state = self.core().state();
            self.ensure_open(&state)?;
        }
        self.descriptor.push::<D>();
        log::debug!(
            target: LOG_TARGET,
            "{}: accepts {}",
            self.core().name(),
            type_name::<D>()
        );
        Ok(self)
    }

    /// Inherit the members of registered type `P`.
    ///
    /// `T`'s prototype is chained to `P`'s, and `T` joins `P`'s
    /// compatibility chain so `P`'s methods accept `T` receivers.
    pub fn parent<P>(self) -> Result<Self, RegistrationError>
    where
        P: Send + Sync + 'static,
        T: Upcast<P>,
    {
        {
            let state = self.core().state();
            self.ensure_open(&state)?;
        }
        let parent = self
            .registry
            .descriptor::<P>()
            .ok_or(RegistrationError::TypeNotRegistered {
                type_name: type_name::<P>(),
            })?;
        self.isolate()
            .set_prototype(self.core().prototype(), Some(parent.core().prototype()))?;
        parent.push::<T>();
        self.core().state().parent = Some(type_name::<P>());
        log::debug!(
            target: LOG_TARGET,
            "{}: parent {}",
            self.core().name(),
            parent.core().name()
        );
        Ok(self)
    }

    /// Lock the member set.
    ///
    /// With `most_derived`, values wrapped as `T` take the shape of their
    /// concrete registered type.
    pub fn finalize(self, most_derived: bool) -> Result<(), RegistrationError> {
        let mut state = self.core().state();
        self.ensure_open(&state)?;
        state.phase = Phase::Finalized;
        state.most_derived = most_derived;
        log::debug!(
            target: LOG_TARGET,
            "{}: finalized ({} constructors, {} instance names, {} statics)",
            self.core().name(),
            state.constructors.len(),
            state.instance_names.len(),
            state.statics.len()
        );
        Ok(())
    }
}

// ============================================================================
// Call thunks
// ============================================================================

fn construct<T, F, Args>(
    weak: &WeakRegistry,
    name: &str,
    f: &F,
    cx: &CallContext,
) -> Result<Value, BindError>
where
    T: Send + Sync + 'static,
    F: IntoFunction<Args, Output = T>,
{
    if !cx.is_construct_call() {
        let message = format!("constructor {name} cannot be invoked without 'new'");
        return Err(Exception::type_error(message).into());
    }
    let registry = weak.registry()?;
    check_arity(name, F::ARITY, cx.arg_count())?;
    let receiver = cx
        .this_object()
        .ok_or_else(|| BindError::native(format!("{name}: missing receiver")))?;
    let value = guard_native(name, || f.call_with(cx.args(), &registry))?;
    registry.bind_object(receiver, &Native::new(value), DisposalPolicy::Delete)?;
    log::trace!(
        target: "scriptbind::call",
        "new {name} -> {}:{}",
        receiver.index,
        receiver.generation
    );
    Ok(Value::Object(receiver))
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn invoke_method<T, R>(
    weak: &WeakRegistry,
    name: &str,
    arity: usize,
    defaults: &[Value],
    cx: &CallContext,
    call: impl FnOnce(&TypeRegistry, &Obj<T>, &[Value]) -> Result<R, BindError>,
) -> Result<Value, BindError>
where
    T: Send + Sync + 'static,
    R: ToScript,
{
    let registry = weak.registry()?;
    let args = fill_defaults(name, arity, defaults, cx.args())?;
    let receiver = registry.recover::<T>(cx.this())?;
    log::trace!(
        target: "scriptbind::call",
        "{name} on {} with {} args",
        receiver.concrete_type_name(),
        cx.arg_count()
    );
    let output = guard_native(name, || call(&registry, &receiver, &*args))?;
    output.to_script(&registry)
}

fn invoke_static<F, Args>(
    weak: &WeakRegistry,
    name: &str,
    f: &F,
    cx: &CallContext,
) -> Result<Value, BindError>
where
    F: IntoFunction<Args>,
    F::Output: ToScript,
{
    let registry = weak.registry()?;
    check_arity(name, F::ARITY, cx.arg_count())?;
    log::trace!(target: "scriptbind::call", "{name} with {} args", cx.arg_count());
    let output = guard_native(name, || f.call_with(cx.args(), &registry))?;
    output.to_script(&registry)
}

fn write_member<T, S, V>(
    weak: &WeakRegistry,
    label: &str,
    member: &str,
    isolate: &Isolate,
    this: ObjectHandle,
    value: Value,
    set: &S,
) -> Result<(), BindError>
where
    T: Send + Sync + 'static,
    S: Fn(&mut T, V),
    V: FromScript,
{
    let registry = weak.registry()?;
    let receiver = registry.recover::<T>(&Value::Object(this))?;
    let converted = V::from_script(&value, &registry)?;
    guard_native(label, || {
        set(&mut *receiver.write()?, converted);
        Ok(())
    })?;
    let callbacks = registry
        .descriptor::<T>()
        .map(|descriptor| descriptor.core().property_changed())
        .unwrap_or_default();
    for callback in callbacks {
        callback(isolate, this, member, &value);
    }
    Ok(())
}

fn install_static(
    isolate: &Isolate,
    target: ObjectHandle,
    name: &str,
    member: &StaticMember,
) -> Result<(), Exception> {
    match member {
        StaticMember::Method(function) => {
            isolate.define_property(target, name, function.value(), PropertyFlags::WRITABLE)
        }
        StaticMember::Property(getter) => isolate.define_accessor(
            target,
            name,
            Some(getter.clone()),
            None,
            PropertyFlags::ENUMERABLE,
        ),
    }
}
