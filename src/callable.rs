//! Typed call thunks built from native closures.
//!
//! A registered closure has a fixed parameter list. The traits here turn
//! an untyped, positional host argument list into a typed call: each
//! parameter is converted with [`FromScript`] in order, then the closure
//! runs. Implementations are generated for closures of up to eight
//! parameters (not counting the receiver).
//!
//! - [`IntoFunction`]: `Fn(A1, .., An) -> R`, used for static methods,
//!   constructors and factories
//! - [`IntoMethod`]: `Fn(&T, A1, .., An) -> R`
//! - [`IntoMethodMut`]: `Fn(&mut T, A1, .., An) -> R`
//!
//! Arguments are converted before the receiver is borrowed, and the borrow
//! ends before the result is converted back.

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};

use scriptbind_core::Value;

use crate::compat::Obj;
use crate::convert::FromScript;
use crate::error::BindError;
use crate::registry::TypeRegistry;

/// A native callable without receiver.
pub trait IntoFunction<Args>: Send + Sync + 'static {
    type Output;

    /// Number of declared parameters.
    const ARITY: usize;

    fn call_with(&self, args: &[Value], registry: &TypeRegistry) -> Result<Self::Output, BindError>;
}

/// A native method taking the receiver by shared reference.
pub trait IntoMethod<T, Args>: Send + Sync + 'static {
    type Output;

    const ARITY: usize;

    fn call_with(
        &self,
        receiver: &Obj<T>,
        args: &[Value],
        registry: &TypeRegistry,
    ) -> Result<Self::Output, BindError>;
}

/// A native method taking the receiver by exclusive reference.
pub trait IntoMethodMut<T, Args>: Send + Sync + 'static {
    type Output;

    const ARITY: usize;

    fn call_with(
        &self,
        receiver: &Obj<T>,
        args: &[Value],
        registry: &TypeRegistry,
    ) -> Result<Self::Output, BindError>;
}

macro_rules! impl_callables {
    ($count:expr $(, $arg:ident : $idx:tt)*) => {
        impl<F, R, $($arg,)*> IntoFunction<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromScript,)*
        {
            type Output = R;
            const ARITY: usize = $count;

            #[allow(non_snake_case, unused_variables)]
            fn call_with(&self, args: &[Value], registry: &TypeRegistry) -> Result<R, BindError> {
                $(let $arg = $arg::from_script(argument(args, $idx), registry)?;)*
                Ok(self($($arg),*))
            }
        }

        impl<T, F, R, $($arg,)*> IntoMethod<T, ($($arg,)*)> for F
        where
            T: 'static,
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromScript,)*
        {
            type Output = R;
            const ARITY: usize = $count;

            #[allow(non_snake_case, unused_variables)]
            fn call_with(
                &self,
                receiver: &Obj<T>,
                args: &[Value],
                registry: &TypeRegistry,
            ) -> Result<R, BindError> {
                $(let $arg = $arg::from_script(argument(args, $idx), registry)?;)*
                let guard = receiver.read()?;
                Ok(self(&*guard, $($arg),*))
            }
        }

        impl<T, F, R, $($arg,)*> IntoMethodMut<T, ($($arg,)*)> for F
        where
            T: 'static,
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromScript,)*
        {
            type Output = R;
            const ARITY: usize = $count;

            #[allow(non_snake_case, unused_variables)]
            fn call_with(
                &self,
                receiver: &Obj<T>,
                args: &[Value],
                registry: &TypeRegistry,
            ) -> Result<R, BindError> {
                $(let $arg = $arg::from_script(argument(args, $idx), registry)?;)*
                let mut guard = receiver.write()?;
                Ok(self(&mut *guard, $($arg),*))
            }
        }
    };
}

impl_callables!(0);
impl_callables!(1, A1: 0);
impl_callables!(2, A1: 0, A2: 1);
impl_callables!(3, A1: 0, A2: 1, A3: 2);
impl_callables!(4, A1: 0, A2: 1, A3: 2, A4: 3);
impl_callables!(5, A1: 0, A2: 1, A3: 2, A4: 3, A5: 4);
impl_callables!(6, A1: 0, A2: 1, A3: 2, A4: 3, A5: 4, A6: 5);
impl_callables!(7, A1: 0, A2: 1, A3: 2, A4: 3, A5: 4, A6: 5, A7: 6);
impl_callables!(8, A1: 0, A2: 1, A3: 2, A4: 3, A5: 4, A6: 5, A7: 6, A8: 7);

fn argument(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&Value::Undefined)
}

/// Fail before any conversion if fewer than `required` arguments arrived.
pub(crate) fn check_arity(name: &str, required: usize, supplied: usize) -> Result<(), BindError> {
    if supplied < required {
        return Err(BindError::InsufficientArguments {
            name: name.to_string(),
            required,
            supplied,
        });
    }
    Ok(())
}

/// Complete an argument list with trailing defaults.
///
/// `defaults` cover the last `defaults.len()` of `arity` parameters.
pub(crate) fn fill_defaults<'a>(
    name: &str,
    arity: usize,
    defaults: &[Value],
    args: &'a [Value],
) -> Result<Cow<'a, [Value]>, BindError> {
    let required = arity.saturating_sub(defaults.len());
    check_arity(name, required, args.len())?;
    if args.len() >= arity {
        return Ok(Cow::Borrowed(args));
    }
    let skip = args.len() - required;
    let mut filled = args.to_vec();
    filled.extend(defaults[skip..].iter().cloned());
    Ok(Cow::Owned(filled))
}

/// Run native code, turning a panic into a native error.
///
/// A panic carrying a [`BindError`] (see
/// [`ScriptObject::dispatch_or_base`](crate::ScriptObject::dispatch_or_base))
/// yields that error unchanged.
pub(crate) fn guard_native<R>(
    name: &str,
    call: impl FnOnce() -> Result<R, BindError>,
) -> Result<R, BindError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let payload = match payload.downcast::<BindError>() {
                Ok(err) => {
                    log::debug!(target: "scriptbind::call", "{name} unwound with {err}");
                    return Err(*err);
                }
                Err(payload) => payload,
            };
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "native code panicked".to_string());
            log::error!(target: "scriptbind::call", "{name} panicked: {message}");
            Err(BindError::Native { message })
        }
    }
}
