//! Heap cell of a component object
//!
//! [`ComObject`] pairs a class value with the single reference count that
//! all of its interface views share. An object is either standalone or
//! aggregated; an aggregated object forwards its identity contract to the
//! outer object and is owned by it through an [`InnerUnknown`].

use std::cell::UnsafeCell;
use std::fmt;
use std::ptr::NonNull;
use crate::factory::InstanceGuard;
use crate::types::{iid, ComError, Result};
use super::interface::{Class, Interface, InterfaceSlot, Unknown};
use super::ptr::ComPtr;
use super::refcount::RefCount;

/// A component object of class `T`
pub struct ComObject<T: Class> {
    // The last release frees the allocation while a `&self` receiver is
    // still live, so no byte of the object may be behind a frozen borrow.
    state: UnsafeCell<ObjectState<T>>,
}

struct ObjectState<T> {
    /// Object-wide count; for an aggregate this is the count held by the outer object
    refs: RefCount,
    /// Controlling unknown when aggregated. Not counted.
    outer: Option<NonNull<dyn Unknown>>,
    /// Keeps the hosting module's instance count while alive
    _instance: Option<InstanceGuard>,
    value: T,
}

// The outer pointer is only dereferenced through `Unknown`, which is Send + Sync.
unsafe impl<T: Class> Send for ComObject<T> {}
unsafe impl<T: Class> Sync for ComObject<T> {}

impl<T: Class> ComObject<T> {
    fn allocate(
        value: T,
        outer: Option<NonNull<dyn Unknown>>,
        instance: Option<InstanceGuard>,
    ) -> NonNull<Self> {
        let object = Box::new(Self {
            state: UnsafeCell::new(ObjectState {
                refs: RefCount::new(1),
                outer,
                _instance: instance,
                value,
            }),
        });
        NonNull::from(Box::leak(object))
    }

    /// Wrap `value` in a standalone object and return its identity
    /// reference, which holds the only count.
    pub fn new(value: T) -> ComPtr<dyn Unknown> {
        Self::standalone(value, None)
    }

    /// Wrap `value` and return a reference to interface `I`.
    ///
    /// Fails with [`ComError::NoInterface`] if `T` does not map `I`; the
    /// object is destroyed in that case.
    pub fn create<I: ?Sized + Interface>(value: T) -> Result<ComPtr<I>> {
        Self::new(value).query::<I>()
    }

    pub(crate) fn standalone(value: T, instance: Option<InstanceGuard>) -> ComPtr<dyn Unknown> {
        let object: NonNull<dyn Unknown> = Self::allocate(value, None, instance);
        // SAFETY: the allocation starts with one count, adopted here.
        unsafe { ComPtr::from_raw(object, object) }
    }

    pub(crate) fn aggregated(
        value: T,
        outer: NonNull<dyn Unknown>,
        instance: Option<InstanceGuard>,
    ) -> InnerUnknown {
        let object: NonNull<dyn NonDelegating> = Self::allocate(value, Some(outer), instance);
        InnerUnknown { object }
    }

    fn state(&self) -> &ObjectState<T> {
        // SAFETY: the state is only mutated by `release_own`, after the last
        // reference is gone.
        unsafe { &*self.state.get() }
    }

    /// The class value
    pub fn value(&self) -> &T {
        &self.state().value
    }

    /// Whether this object is part of an aggregate
    pub fn is_aggregated(&self) -> bool {
        self.state().outer.is_some()
    }

    /// Look `slot.iid()` up in the interface map without touching the count
    fn find_view(&self, slot: &mut InterfaceSlot<'_>) -> bool {
        let iid = *slot.iid();
        T::INTERFACES
            .iter()
            .filter(|entry| entry.iid == iid)
            .any(|entry| (entry.view)(&self.state().value, slot))
    }

    /// Query against this object's own identity
    fn query_own(&self, slot: &mut InterfaceSlot<'_>) -> Result<()> {
        let found = if *slot.iid() == iid::IUNKNOWN {
            slot.put::<dyn Unknown>(self)
        } else {
            self.find_view(slot)
        };
        if !found {
            return Err(ComError::NoInterface(*slot.iid()));
        }

        self.state().refs.retain();
        // SAFETY: the reference was taken on this object's own count.
        unsafe {
            slot.complete(NonNull::from(self as &dyn Unknown));
        }
        Ok(())
    }

    /// Drop one count of `this`, freeing the allocation at zero
    unsafe fn release_own(this: NonNull<Self>) -> u32 {
        let remaining = this.as_ref().state().refs.release();
        if remaining == 0 {
            tracing::trace!(class = T::NAME, "destroying component object");
            // SAFETY: the last count is gone, so nothing else can reach the
            // allocation made in `allocate`.
            drop(Box::from_raw(this.as_ptr()));
        }
        remaining
    }
}

unsafe impl<T: Class> Unknown for ComObject<T> {
    fn query_interface(&self, slot: &mut InterfaceSlot<'_>) -> Result<()> {
        match self.state().outer {
            // SAFETY: the outer object owns this one and outlives it.
            Some(outer) => unsafe { outer.as_ref() }.query_interface(slot),
            None => self.query_own(slot),
        }
    }

    fn add_ref(&self) -> u32 {
        match self.state().outer {
            Some(outer) => unsafe { outer.as_ref() }.add_ref(),
            None => self.state().refs.retain(),
        }
    }

    unsafe fn release(&self) -> u32 {
        match self.state().outer {
            Some(outer) => outer.as_ref().release(),
            None => Self::release_own(NonNull::from(self)),
        }
    }
}

impl<T: Class + fmt::Debug> fmt::Debug for ComObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComObject")
            .field("class", &T::NAME)
            .field("refs", &self.state().refs.get())
            .field("aggregated", &self.is_aggregated())
            .field("value", &self.value())
            .finish()
    }
}

/// Identity contract of an aggregated object as seen by its outer object
pub(crate) unsafe trait NonDelegating: Send + Sync {
    fn query_view(&self, slot: &mut InterfaceSlot<'_>) -> bool;

    fn supports(&self, iid: &crate::types::Iid) -> bool;

    unsafe fn release_inner(&self) -> u32;
}

unsafe impl<T: Class> NonDelegating for ComObject<T> {
    fn query_view(&self, slot: &mut InterfaceSlot<'_>) -> bool {
        // Identity always belongs to the outer object.
        *slot.iid() != iid::IUNKNOWN && self.find_view(slot)
    }

    fn supports(&self, iid: &crate::types::Iid) -> bool {
        *iid != iid::IUNKNOWN && T::INTERFACES.iter().any(|e| e.iid == *iid)
    }

    unsafe fn release_inner(&self) -> u32 {
        Self::release_own(NonNull::from(self))
    }
}

/// Owning handle to the non-delegating identity of an aggregated object.
///
/// The outer object keeps it in its own state and forwards the interfaces
/// it wants to expose from the inner object with [`InnerUnknown::query`].
/// Dropping the handle destroys the inner object.
pub struct InnerUnknown {
    object: NonNull<dyn NonDelegating>,
}

unsafe impl Send for InnerUnknown {}
unsafe impl Sync for InnerUnknown {}

impl InnerUnknown {
    /// Fill `slot` with a view of the inner object.
    ///
    /// For use inside the outer object's interface map: the outer object
    /// takes the reference on its own count and completes the slot with its
    /// own identity, staying the owner of the view.
    pub fn query(&self, slot: &mut InterfaceSlot<'_>) -> bool {
        // SAFETY: this handle holds the inner object's own count.
        unsafe { self.object.as_ref() }.query_view(slot)
    }

    /// Whether the inner object maps `iid`
    pub fn supports(&self, iid: &crate::types::Iid) -> bool {
        unsafe { self.object.as_ref() }.supports(iid)
    }
}

impl Drop for InnerUnknown {
    fn drop(&mut self) {
        // SAFETY: the count taken at construction is released exactly once.
        unsafe {
            self.object.as_ref().release_inner();
        }
    }
}

impl fmt::Debug for InnerUnknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InnerUnknown")
            .field("object", &self.object.cast::<()>())
            .finish()
    }
}
