//! Host function objects and the call context handed to their callbacks.

use std::fmt;
use std::sync::Arc;

use crate::error::Exception;
use crate::heap::ObjectHandle;
use crate::isolate::Isolate;
use crate::value::Value;

/// Callback behind a host function object.
pub type HostFn = Arc<dyn Fn(&Isolate, &mut CallContext) -> Result<Value, Exception> + Send + Sync>;

/// Where a function object came from.
///
/// Engine-generated call thunks are `Native`. Functions standing in for
/// scripted code are `Script`; override dispatch only ever calls those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionOrigin {
    Native,
    Script,
}

/// Payload of a function object.
pub struct FunctionData {
    pub(crate) name: String,
    pub(crate) origin: FunctionOrigin,
    pub(crate) callback: HostFn,
}

impl FunctionData {
    pub fn new(name: impl Into<String>, origin: FunctionOrigin, callback: HostFn) -> Self {
        Self {
            name: name.into(),
            origin,
            callback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> FunctionOrigin {
        self.origin
    }
}

impl fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionData")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

static UNDEFINED: Value = Value::Undefined;

/// Context for a host function call.
///
/// Gives the callback its receiver, its arguments and whether it was invoked
/// as a constructor.
///
/// ```ignore
/// let f = isolate.new_function("add", |_iso, cx| {
///     Ok(Value::Int(cx.arg(0).to_integer() + cx.arg(1).to_integer()))
/// });
/// ```
pub struct CallContext {
    this: Value,
    args: Vec<Value>,
    callee: ObjectHandle,
    construct: bool,
}

impl CallContext {
    pub fn new(this: Value, args: Vec<Value>, callee: ObjectHandle, construct: bool) -> Self {
        Self {
            this,
            args,
            callee,
            construct,
        }
    }

    /// The receiver.
    pub fn this(&self) -> &Value {
        &self.this
    }

    /// The receiver, if it is an object.
    pub fn this_object(&self) -> Option<ObjectHandle> {
        self.this.as_object()
    }

    /// Number of arguments actually supplied.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Argument at `index`, `undefined` when not supplied.
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&UNDEFINED)
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Take the argument list, leaving the context empty.
    pub fn take_args(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.args)
    }

    /// The function object being called.
    pub fn callee(&self) -> ObjectHandle {
        self.callee
    }

    /// True when invoked through `construct`.
    pub fn is_construct_call(&self) -> bool {
        self.construct
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("this", &self.this)
            .field("args", &self.args)
            .field("construct", &self.construct)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_arguments_read_as_undefined() {
        let cx = CallContext::new(
            Value::Undefined,
            vec![Value::Int(1)],
            ObjectHandle::new(0, 0),
            false,
        );
        assert_eq!(cx.arg_count(), 1);
        assert_eq!(cx.arg(0), &Value::Int(1));
        assert_eq!(cx.arg(5), &Value::Undefined);
        assert!(!cx.is_construct_call());
    }

    #[test]
    fn take_args_empties_context() {
        let mut cx = CallContext::new(
            Value::Null,
            vec![Value::Bool(true), Value::Int(2)],
            ObjectHandle::new(0, 0),
            true,
        );
        let args = cx.take_args();
        assert_eq!(args.len(), 2);
        assert_eq!(cx.arg_count(), 0);
        assert!(cx.is_construct_call());
    }
}
