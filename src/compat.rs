//! Recovering a registered type from a type-erased native object.
//!
//! Rust has no inheritance, so "D is-a T" is expressed as composition plus
//! an explicit projection, [`Upcast<T>`]. A [`CompatibilityChain<T>`] lists
//! the concrete types whose objects may be used wherever a `T` is expected.
//! Recovery first tests the holder's concrete type and only then projects,
//! so an incompatible object is always reported, never misread.
//!
//! The base may also be a trait object. A chain for `dyn Shape` lists the
//! types that implement `Shape`; recovering through it keeps dynamic
//! dispatch, so an override type's methods run even when the caller only
//! knows the trait.
//!
//! # Example
//!
//! ```ignore
//! struct Animal { name: String }
//! struct Dog { animal: Animal, tricks: Vec<String> }
//!
//! impl Upcast<Animal> for Dog {
//!     fn upcast(&self) -> &Animal { &self.animal }
//!     fn upcast_mut(&mut self) -> &mut Animal { &mut self.animal }
//! }
//!
//! registry.class::<Animal>("Animal")
//!     .compatible_with::<Dog>()?
//!     .method("name", |a: &Animal| a.name.clone())?
//!     .finalize(false)?;
//!
//! impl Upcast<dyn Speaker> for Dog {
//!     fn upcast(&self) -> &(dyn Speaker + 'static) { self }
//!     fn upcast_mut(&mut self) -> &mut (dyn Speaker + 'static) { self }
//! }
//!
//! registry.interface::<dyn Speaker>().implemented_by::<Dog>();
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use scriptbind_core::ObjectHandle;

use crate::error::BindError;
use crate::native::AnyNative;

/// Same-object projection from a composed type to one of its bases.
///
/// `T` is either a struct embedded in `Self` or a trait object `Self`
/// implements.
pub trait Upcast<T: ?Sized> {
    fn upcast(&self) -> &T;
    fn upcast_mut(&mut self) -> &mut T;
}

impl<T> Upcast<T> for T {
    fn upcast(&self) -> &T {
        self
    }

    fn upcast_mut(&mut self) -> &mut T {
        self
    }
}

type ReadFn<T> = for<'a> fn(&'a (dyn Any + Send + Sync)) -> Option<MappedRwLockReadGuard<'a, T>>;
type WriteFn<T> =
    for<'a> fn(&'a (dyn Any + Send + Sync)) -> Option<MappedRwLockWriteGuard<'a, T>>;

fn read_as<T: ?Sized + 'static, D: Upcast<T> + Send + Sync + 'static>(
    holder: &(dyn Any + Send + Sync),
) -> Option<MappedRwLockReadGuard<'_, T>> {
    let cell = holder.downcast_ref::<RwLock<D>>()?;
    let guard = cell.try_read()?;
    Some(RwLockReadGuard::map(guard, <D as Upcast<T>>::upcast))
}

fn write_as<T: ?Sized + 'static, D: Upcast<T> + Send + Sync + 'static>(
    holder: &(dyn Any + Send + Sync),
) -> Option<MappedRwLockWriteGuard<'_, T>> {
    let cell = holder.downcast_ref::<RwLock<D>>()?;
    let guard = cell.try_write()?;
    Some(RwLockWriteGuard::map(guard, <D as Upcast<T>>::upcast_mut))
}

/// One entry of a compatibility chain: a concrete type `D` viewed as `T`.
pub struct Link<T: ?Sized + 'static> {
    holder_type: TypeId,
    type_name: &'static str,
    read: ReadFn<T>,
    write: WriteFn<T>,
}

impl<T: ?Sized + 'static> Link<T> {
    pub fn of<D: Upcast<T> + Send + Sync + 'static>() -> Self {
        Self {
            holder_type: TypeId::of::<RwLock<D>>(),
            type_name: type_name::<D>(),
            read: read_as::<T, D>,
            write: write_as::<T, D>,
        }
    }

    /// Name of the concrete type this link accepts.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl<T: ?Sized + 'static> Clone for Link<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized + 'static> Copy for Link<T> {}

impl<T: ?Sized + 'static> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Link").field(&self.type_name).finish()
    }
}

/// Ordered set of concrete types recoverable as `T`.
///
/// For a registered struct `T` itself is always the first entry. Lookups
/// try entries in declaration order and the first match wins.
pub struct CompatibilityChain<T: ?Sized + 'static> {
    links: Vec<Link<T>>,
}

impl<T: Send + Sync + 'static> CompatibilityChain<T> {
    /// A chain accepting only `T` itself.
    pub fn new() -> Self {
        Self {
            links: vec![Link::of::<T>()],
        }
    }
}

impl<T: ?Sized + 'static> CompatibilityChain<T> {
    /// A chain accepting nothing yet. Interface chains start here.
    pub fn empty() -> Self {
        Self { links: Vec::new() }
    }

    /// Builder form of [`push`](Self::push).
    pub fn with<D: Upcast<T> + Send + Sync + 'static>(mut self) -> Self {
        self.push::<D>();
        self
    }

    /// Append `D`. Appending a type already in the chain is a no-op.
    pub fn push<D: Upcast<T> + Send + Sync + 'static>(&mut self) {
        let link = Link::of::<D>();
        if !self.links.iter().any(|l| l.holder_type == link.holder_type) {
            self.links.push(link);
        }
    }

    /// Append the links of `other` missing from this chain.
    pub(crate) fn absorb(&mut self, other: &Self) {
        for link in &other.links {
            if !self.links.iter().any(|l| l.holder_type == link.holder_type) {
                self.links.push(*link);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.links.iter().map(Link::type_name).collect()
    }

    /// True if objects with this holder type can be recovered as `T`.
    pub fn accepts(&self, holder_type: TypeId) -> bool {
        self.resolve(holder_type).is_some()
    }

    /// The first link accepting `holder_type`.
    pub fn resolve(&self, holder_type: TypeId) -> Option<Link<T>> {
        self.links
            .iter()
            .find(|link| link.holder_type == holder_type)
            .copied()
    }

    /// Recover a resolved handle, or `None` if the object is incompatible.
    pub fn recover(&self, native: &AnyNative, handle: Option<ObjectHandle>) -> Option<Obj<T>> {
        let link = self.resolve(native.holder_type_id())?;
        Some(Obj {
            link,
            native: native.clone(),
            handle,
        })
    }
}

impl<T: Send + Sync + 'static> Default for CompatibilityChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> fmt::Debug for CompatibilityChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.links.iter()).finish()
    }
}

/// A native object recovered as `T`.
///
/// Holds a strong reference for as long as it lives. Borrows are
/// non-blocking: a conflicting borrow reports [`BindError::Borrowed`]
/// rather than deadlocking a reentrant call.
pub struct Obj<T: ?Sized + 'static> {
    link: Link<T>,
    native: AnyNative,
    handle: Option<ObjectHandle>,
}

impl<T: ?Sized + 'static> Obj<T> {
    pub fn read(&self) -> Result<MappedRwLockReadGuard<'_, T>, BindError> {
        (self.link.read)(&**self.native.erased()).ok_or(BindError::Borrowed {
            type_name: self.native.type_name(),
        })
    }

    pub fn write(&self) -> Result<MappedRwLockWriteGuard<'_, T>, BindError> {
        (self.link.write)(&**self.native.erased()).ok_or(BindError::Borrowed {
            type_name: self.native.type_name(),
        })
    }

    /// The underlying object with its concrete type.
    pub fn native(&self) -> &AnyNative {
        &self.native
    }

    /// Name of the concrete type behind this view.
    pub fn concrete_type_name(&self) -> &'static str {
        self.native.type_name()
    }

    /// The host object this was recovered from, if any.
    pub fn handle(&self) -> Option<ObjectHandle> {
        self.handle
    }
}

impl<T: ?Sized + 'static> Clone for Obj<T> {
    fn clone(&self) -> Self {
        Self {
            link: self.link,
            native: self.native.clone(),
            handle: self.handle,
        }
    }
}

impl<T: ?Sized + 'static> fmt::Debug for Obj<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("as", &type_name::<T>())
            .field("concrete", &self.native.type_name())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Native;

    #[derive(Debug, PartialEq)]
    struct Base {
        id: u32,
    }

    struct Left {
        base: Base,
    }

    struct Right {
        tag: &'static str,
    }

    struct Both {
        left: Left,
        right: Right,
    }

    impl Upcast<Base> for Left {
        fn upcast(&self) -> &Base {
            &self.base
        }
        fn upcast_mut(&mut self) -> &mut Base {
            &mut self.base
        }
    }

    impl Upcast<Base> for Both {
        fn upcast(&self) -> &Base {
            &self.left.base
        }
        fn upcast_mut(&mut self) -> &mut Base {
            &mut self.left.base
        }
    }

    impl Upcast<Right> for Both {
        fn upcast(&self) -> &Right {
            &self.right
        }
        fn upcast_mut(&mut self) -> &mut Right {
            &mut self.right
        }
    }

    fn both() -> Native<Both> {
        Native::new(Both {
            left: Left { base: Base { id: 7 } },
            right: Right { tag: "r" },
        })
    }

    #[test]
    fn exact_only_by_default() {
        let chain = CompatibilityChain::<Base>::new();
        let exact = Native::new(Base { id: 1 }).erase();
        let other = Native::new(Left { base: Base { id: 2 } }).erase();
        assert_eq!(chain.recover(&exact, None).unwrap().read().unwrap().id, 1);
        assert!(chain.recover(&other, None).is_none());
    }

    #[test]
    fn declared_types_project_to_base() {
        let chain = CompatibilityChain::<Base>::new().with::<Left>().with::<Both>();
        assert_eq!(chain.type_names().len(), 3);

        let left = Native::new(Left { base: Base { id: 2 } }).erase();
        assert_eq!(chain.recover(&left, None).unwrap().read().unwrap().id, 2);

        let both = both().erase();
        let obj = chain.recover(&both, None).unwrap();
        obj.write().unwrap().id = 9;
        assert_eq!(obj.read().unwrap().id, 9);
        assert!(obj.concrete_type_name().ends_with("Both"));
    }

    #[test]
    fn one_object_serves_two_unrelated_bases() {
        let native = both();
        let erased = native.erase();
        let as_base = CompatibilityChain::<Base>::new().with::<Both>();
        let as_right = CompatibilityChain::<Right>::new().with::<Both>();

        assert_eq!(as_base.recover(&erased, None).unwrap().read().unwrap().id, 7);
        assert_eq!(as_right.recover(&erased, None).unwrap().read().unwrap().tag, "r");
    }

    #[test]
    fn recovered_views_hold_one_share() {
        let native = Native::new(Base { id: 5 });
        let obj = CompatibilityChain::<Base>::new().recover(&native.erase(), None).unwrap();
        assert_eq!(native.strong_count(), 2);
        let copy = obj.clone();
        assert_eq!(native.strong_count(), 3);
        drop((obj, copy));
        assert_eq!(native.strong_count(), 1);
    }

    #[test]
    fn duplicate_links_are_ignored() {
        let chain = CompatibilityChain::<Base>::new().with::<Left>().with::<Left>().with::<Base>();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn conflicting_borrows_report_instead_of_blocking() {
        let native = Native::new(Base { id: 3 });
        let chain = CompatibilityChain::<Base>::new();
        let obj = chain.recover(&native.erase(), None).unwrap();

        let reading = obj.read().unwrap();
        assert!(obj.read().is_ok());
        assert!(matches!(obj.write(), Err(BindError::Borrowed { .. })));
        drop(reading);
        assert!(obj.write().is_ok());
    }

    trait Named {
        fn name(&self) -> String;
    }

    impl Named for Left {
        fn name(&self) -> String {
            format!("left {}", self.base.id)
        }
    }

    impl Named for Both {
        fn name(&self) -> String {
            format!("both {}", self.right.tag)
        }
    }

    impl Upcast<dyn Named> for Left {
        fn upcast(&self) -> &(dyn Named + 'static) {
            self
        }
        fn upcast_mut(&mut self) -> &mut (dyn Named + 'static) {
            self
        }
    }

    impl Upcast<dyn Named> for Both {
        fn upcast(&self) -> &(dyn Named + 'static) {
            self
        }
        fn upcast_mut(&mut self) -> &mut (dyn Named + 'static) {
            self
        }
    }

    #[test]
    fn trait_object_views_dispatch_to_the_concrete_type() {
        let chain = CompatibilityChain::<dyn Named>::empty().with::<Left>().with::<Both>();
        assert!(CompatibilityChain::<dyn Named>::empty().is_empty());

        let left = Native::new(Left { base: Base { id: 4 } }).erase();
        assert_eq!(chain.recover(&left, None).unwrap().read().unwrap().name(), "left 4");
        assert_eq!(chain.recover(&both().erase(), None).unwrap().read().unwrap().name(), "both r");

        let base = Native::new(Base { id: 1 }).erase();
        assert!(chain.recover(&base, None).is_none());
    }
}
