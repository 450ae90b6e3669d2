//! The identity and lifetime contract and its building blocks
//!
//! Every component object implements [`Unknown`]. A concrete class
//! declares which capabilities it answers to through an explicit interface
//! map ([`Class::INTERFACES`]) instead of an inheritance layout: each entry
//! maps an IID to a function producing that view of the object.

use std::any::Any;
use std::ptr::NonNull;
use crate::types::{iid, Clsid, Iid, Result};

/// A capability contract, implemented for the trait object type of the
/// capability (`dyn IWidget`).
///
/// # Safety
///
/// `IID` must name this contract and no other: views produced for `IID`
/// are reinterpreted as `Self`.
pub unsafe trait Interface: Send + Sync + 'static {
    /// Interface identifier
    const IID: Iid;
}

/// The identity and lifetime contract every component object satisfies.
///
/// # Safety
///
/// Implementors must keep one object-wide count: a successful
/// `query_interface` takes exactly one reference, views stay valid until
/// the last reference is released, and the object is destroyed inside the
/// `release` call that drops the count to zero.
pub unsafe trait Unknown: Send + Sync {
    /// Ask for the capability named by `slot.iid()`.
    ///
    /// On success the slot holds a view of this same object, one
    /// reference has been taken for the caller, and the slot has been
    /// completed with the identity that owns that reference
    /// ([`InterfaceSlot::complete`]). On failure the slot is left empty and
    /// no reference is taken.
    fn query_interface(&self, slot: &mut InterfaceSlot<'_>) -> Result<()>;

    /// Add a reference; returns the resulting count
    fn add_ref(&self) -> u32;

    /// Drop a reference; returns the resulting count.
    ///
    /// # Safety
    ///
    /// The caller must own the reference it releases and must not use it
    /// afterwards. When the result is zero the object no longer exists.
    unsafe fn release(&self) -> u32;
}

unsafe impl Interface for dyn Unknown {
    const IID: Iid = iid::IUNKNOWN;
}

/// Output location of an interface query.
///
/// A slot is typed by the view it expects. A slot for `dyn Unknown`
/// accepts any supported IID and receives the object's identity.
pub struct InterfaceSlot<'a> {
    iid: Iid,
    out: &'a mut (dyn Any + 'static),
    owner: Option<NonNull<dyn Unknown>>,
}

impl<'a> InterfaceSlot<'a> {
    /// Slot asking for `iid`, to be received as an `I` view
    pub fn new<I: ?Sized + Interface>(iid: Iid, out: &'a mut Option<NonNull<I>>) -> Self {
        *out = None;
        Self { iid, out, owner: None }
    }

    /// Slot receiving the non-delegating identity of a new aggregate
    pub(crate) fn for_aggregate(out: &'a mut Option<super::InnerUnknown>) -> Self {
        *out = None;
        Self { iid: iid::IUNKNOWN, out, owner: None }
    }

    /// The requested interface identifier
    pub fn iid(&self) -> &Iid {
        &self.iid
    }

    /// Offer `view` as the answer to this query.
    ///
    /// Returns `false` when the slot expects a different view type.
    pub fn put<I: ?Sized + Interface>(&mut self, view: &I) -> bool {
        if let Some(out) = self.out.downcast_mut::<Option<NonNull<I>>>() {
            *out = Some(NonNull::from(view));
            return true;
        }
        // Untyped slots are completed with the identity by the owner.
        self.is_untyped()
    }

    /// Whether the slot accepts any view
    pub fn is_untyped(&self) -> bool {
        self.out.is::<Option<NonNull<dyn Unknown>>>()
    }

    pub(crate) fn expects_aggregate(&self) -> bool {
        self.out.is::<Option<super::InnerUnknown>>()
    }

    /// Store a new aggregate; hands it back if the slot is not an aggregate slot
    pub(crate) fn put_aggregate(
        &mut self,
        inner: super::InnerUnknown,
    ) -> std::result::Result<(), super::InnerUnknown> {
        match self.out.downcast_mut::<Option<super::InnerUnknown>>() {
            Some(out) => {
                *out = Some(inner);
                Ok(())
            }
            None => Err(inner),
        }
    }

    /// Record the identity that owns the reference taken for this query.
    /// Untyped slots receive `owner` as their view unless one was put.
    ///
    /// # Safety
    ///
    /// One reference on `owner` must have been taken for this query, and
    /// `owner` must be the identity of the object whose view was put.
    pub unsafe fn complete(&mut self, owner: NonNull<dyn Unknown>) {
        if let Some(out) = self.out.downcast_mut::<Option<NonNull<dyn Unknown>>>() {
            if out.is_none() {
                *out = Some(owner);
            }
        }
        self.owner = Some(owner);
    }

    /// Identity recorded by [`InterfaceSlot::complete`]
    pub fn owner(&self) -> Option<NonNull<dyn Unknown>> {
        self.owner
    }
}

/// One row of an interface map
pub struct InterfaceEntry<T> {
    /// Identifier answered by this row
    pub iid: Iid,
    /// Produces the view of `T` for the IID
    pub view: fn(&T, &mut InterfaceSlot<'_>) -> bool,
}

impl<T> InterfaceEntry<T> {
    /// Create a map row
    pub const fn new(iid: Iid, view: fn(&T, &mut InterfaceSlot<'_>) -> bool) -> Self {
        Self { iid, view }
    }
}

impl<T> Clone for InterfaceEntry<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for InterfaceEntry<T> {}

/// A concrete component class
///
/// ```ignore
/// impl Class for Widget {
///     const CLSID: Clsid = CLSID_WIDGET;
///     const NAME: &'static str = "Widget";
///     const INTERFACES: &'static [InterfaceEntry<Self>] = &[
///         InterfaceEntry::new(IID_IA, |w, slot| slot.put::<dyn IA>(w)),
///         InterfaceEntry::new(IID_IB, |w, slot| slot.put::<dyn IB>(w)),
///     ];
/// }
/// ```
pub trait Class: Send + Sync + Sized + 'static {
    /// Class identifier
    const CLSID: Clsid;

    /// Name used in diagnostics
    const NAME: &'static str;

    /// Interface map. `IUnknown` is implicit.
    const INTERFACES: &'static [InterfaceEntry<Self>];

    /// Whether the class answers to `iid`
    fn supports(iid: &Iid) -> bool {
        *iid == iid::IUNKNOWN || Self::INTERFACES.iter().any(|e| e.iid == *iid)
    }

    /// Every IID in the interface map, `IUnknown` first
    fn supported_interfaces() -> Vec<Iid> {
        std::iter::once(iid::IUNKNOWN)
            .chain(Self::INTERFACES.iter().map(|e| e.iid))
            .collect()
    }
}
