//! Owned interface references

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use crate::types::{ComError, Iid, Result};
use super::interface::{Interface, InterfaceSlot, Unknown};

/// One counted reference to interface `I` of a component object.
///
/// Cloning takes another reference, dropping releases it. The reference
/// is counted on the object's identity, never on the view, so every
/// `ComPtr` to the same object shares one count.
pub struct ComPtr<I: ?Sized + Interface> {
    /// Identity that owns the count
    owner: NonNull<dyn Unknown>,
    /// The interface view
    view: NonNull<I>,
}

// Interfaces are Send + Sync and the count is atomic.
unsafe impl<I: ?Sized + Interface> Send for ComPtr<I> {}
unsafe impl<I: ?Sized + Interface> Sync for ComPtr<I> {}

impl<I: ?Sized + Interface> ComPtr<I> {
    /// Adopt a reference.
    ///
    /// # Safety
    ///
    /// The caller must own one count on `owner`, and `view` must be a view
    /// of the same object that stays valid while that count is held.
    pub unsafe fn from_raw(owner: NonNull<dyn Unknown>, view: NonNull<I>) -> Self {
        Self { owner, view }
    }

    /// Give up ownership without releasing; pair with [`ComPtr::from_raw`]
    pub fn into_raw(self) -> (NonNull<dyn Unknown>, NonNull<I>) {
        let parts = (self.owner, self.view);
        std::mem::forget(self);
        parts
    }

    /// The identity and lifetime contract of the referenced object
    pub fn as_unknown(&self) -> &dyn Unknown {
        // SAFETY: this reference holds a count.
        unsafe { self.owner.as_ref() }
    }

    /// Query for interface `J`
    pub fn query<J: ?Sized + Interface>(&self) -> Result<ComPtr<J>> {
        self.query_by_iid::<J>(&J::IID)
    }

    /// Query for `iid`, received as a `J` view. Lets an alias IID resolve
    /// to the view type of the interface it aliases.
    pub fn query_by_iid<J: ?Sized + Interface>(&self, iid: &Iid) -> Result<ComPtr<J>> {
        ComPtr::<J>::receive(iid, Some(self.owner), |slot| {
            self.as_unknown().query_interface(slot)
        })
    }

    /// Query for any `iid`, receiving an untyped reference to the object
    pub fn query_interface(&self, iid: &Iid) -> Result<ComPtr<dyn Unknown>> {
        self.query_by_iid::<dyn Unknown>(iid)
    }

    /// The object's identity, as answered by its `IUnknown` query
    pub fn identity(&self) -> Result<ComPtr<dyn Unknown>> {
        self.query::<dyn Unknown>()
    }

    /// Whether both references reach the same object, compared through
    /// the identity contract
    pub fn is_same_object<J: ?Sized + Interface>(&self, other: &ComPtr<J>) -> bool {
        match (self.identity(), other.identity()) {
            (Ok(a), Ok(b)) => a.owner.cast::<()>() == b.owner.cast::<()>(),
            _ => false,
        }
    }

    /// Run `fill` against a slot for `iid` and adopt the reference it
    /// produces. `queried` is the object the fill runs against, if it
    /// already exists.
    pub(crate) fn receive<F>(
        iid: &Iid,
        queried: Option<NonNull<dyn Unknown>>,
        fill: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut InterfaceSlot<'_>) -> Result<()>,
    {
        let mut view: Option<NonNull<I>> = None;
        let mut slot = InterfaceSlot::new(*iid, &mut view);
        fill(&mut slot)?;
        let owner = slot.owner();

        match (owner, view) {
            // SAFETY: a successful fill took one count on `owner` for us.
            (Some(owner), Some(view)) => Ok(unsafe { ComPtr::from_raw(owner, view) }),
            (Some(owner), None) => {
                unsafe {
                    owner.as_ref().release();
                }
                Err(ComError::NoInterface(*iid))
            }
            // An untyped slot filled without completion already holds the identity.
            (None, Some(view)) => match identity_of(view) {
                // SAFETY: a successful fill took one count on the object for us.
                Some(owner) => Ok(unsafe { ComPtr::from_raw(owner, view) }),
                None => {
                    tracing::error!(%iid, "query filled a view without completing the slot");
                    if let Some(queried) = queried {
                        // SAFETY: the count was taken on the queried object.
                        unsafe {
                            queried.as_ref().release();
                        }
                    }
                    Err(ComError::InvalidArgument(format!(
                        "query for {} did not record the owning identity",
                        iid
                    )))
                }
            },
            (None, None) => Err(ComError::NoInterface(*iid)),
        }
    }

    /// The identity pointer that owns this reference's count
    pub(crate) fn owner_ptr(&self) -> NonNull<dyn Unknown> {
        self.owner
    }

    /// Whether both references use the same view pointer
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.view.cast::<()>() == other.view.cast::<()>()
    }
}

/// The view itself when it is an untyped identity view
fn identity_of<I: ?Sized + Interface>(view: NonNull<I>) -> Option<NonNull<dyn Unknown>> {
    (&view as &dyn Any).downcast_ref::<NonNull<dyn Unknown>>().copied()
}

impl<I: ?Sized + Interface> Deref for ComPtr<I> {
    type Target = I;

    fn deref(&self) -> &I {
        // SAFETY: the view is valid while this reference holds a count.
        unsafe { self.view.as_ref() }
    }
}

impl<I: ?Sized + Interface> Clone for ComPtr<I> {
    fn clone(&self) -> Self {
        self.as_unknown().add_ref();
        Self {
            owner: self.owner,
            view: self.view,
        }
    }
}

impl<I: ?Sized + Interface> Drop for ComPtr<I> {
    fn drop(&mut self) {
        // SAFETY: this reference owns exactly one count.
        unsafe {
            self.owner.as_ref().release();
        }
    }
}

impl<I: ?Sized + Interface> fmt::Debug for ComPtr<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComPtr")
            .field("iid", &I::IID)
            .field("owner", &self.owner.cast::<()>())
            .field("view", &self.view.cast::<()>())
            .finish()
    }
}
