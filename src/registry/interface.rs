//! Trait-object views of registered types.
//!
//! An interface is a view `I` (usually `dyn Trait`) that several concrete
//! types can be recovered as. Unlike a class it has no prototype and no host
//! constructor; it only owns a compatibility chain. Recovering through it
//! keeps dynamic dispatch, so a script override of a trait method is seen by
//! native code holding the interface.
//!
//! # Example
//!
//! ```ignore
//! registry
//!     .interface::<dyn Speaker>()
//!     .implemented_by::<Robot>()
//!     .implemented_by::<ScriptRobot>();
//!
//! registry
//!     .class::<Robot>("Robot")
//!     .static_method("announce", |s: Obj<dyn Speaker>| -> Result<String, BindError> {
//!         Ok(s.read()?.speak())
//!     })?;
//! ```

use std::any::type_name;
use std::fmt;

use crate::compat::Upcast;

use super::{SharedChain, TypeRegistry};

/// Builder adding implementors to an interface view.
///
/// Created by [`TypeRegistry::interface`].
pub struct InterfaceBuilder<I: ?Sized + 'static> {
    registry: TypeRegistry,
    chain: SharedChain<I>,
}

impl<I: ?Sized + 'static> InterfaceBuilder<I> {
    pub(crate) fn new(registry: TypeRegistry, chain: SharedChain<I>) -> Self {
        Self { registry, chain }
    }

    /// Accept `D` wherever an `I` is expected.
    ///
    /// Lookup follows registration order. Adding the same type twice is a
    /// no-op.
    pub fn implemented_by<D>(self) -> Self
    where
        D: Upcast<I> + Send + Sync + 'static,
    {
        let added = {
            let mut chain = self.chain.write();
            let before = chain.len();
            chain.push::<D>();
            chain.len() > before
        };
        if added {
            log::debug!(
                target: "scriptbind::registration",
                "{} implements {}",
                type_name::<D>(),
                type_name::<I>()
            );
        }
        self
    }

    /// Implementors in lookup order.
    pub fn types(&self) -> Vec<&'static str> {
        self.chain.read().type_names()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }
}

impl<I: ?Sized + 'static> fmt::Debug for InterfaceBuilder<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceBuilder")
            .field("interface", &type_name::<I>())
            .field("types", &self.types())
            .finish()
    }
}
