//! Shared identity infrastructure
//!
//! - Identifiers: GUID, IID, CLSID
//! - Error taxonomy and HRESULT codes
//! - Well-known interface identifiers

mod error;
mod guid;

pub use error::*;
pub use guid::{Clsid, Guid, Iid};

/// Well-known interface identifiers
pub mod iid {
    use super::Iid;

    /// IUnknown: the identity and lifetime contract
    pub const IUNKNOWN: Iid = Iid::from_u128(0x00000000_0000_0000_c000_000000000046);
    /// IClassFactory: the factory contract
    pub const ICLASSFACTORY: Iid = Iid::from_u128(0x00000001_0000_0000_c000_000000000046);
}
