//! Identity and lifetime contract
//!
//! - [`Unknown`]: interface querying and reference counting
//! - [`Class`] / [`InterfaceEntry`]: per-class interface maps
//! - [`ComObject`]: the heap cell holding the shared count
//! - [`ComPtr`]: scoped ownership of one counted reference
//! - [`InnerUnknown`]: the non-delegating identity of an aggregate

mod interface;
mod object;
mod ptr;
mod refcount;

pub use interface::{Class, Interface, InterfaceEntry, InterfaceSlot, Unknown};
pub use object::{ComObject, InnerUnknown};
pub use ptr::ComPtr;
pub use refcount::RefCount;
