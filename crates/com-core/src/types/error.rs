//! Component model error types
//!
//! Recoverable outcomes of the contracts are ordinary `Result` values.
//! Reference count corruption is not represented here: it is a defect
//! and panics where it is detected.

use thiserror::Error;
use super::guid::{Clsid, Iid};

/// Result type for component model operations
pub type Result<T> = std::result::Result<T, ComError>;

/// Component model errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComError {
    /// The object does not implement the requested interface
    #[error("no such interface supported: {0}")]
    NoInterface(Iid),

    /// The class cannot be created as part of an aggregate
    #[error("class does not support aggregation")]
    NoAggregation,

    /// Resources for a new instance could not be obtained
    #[error("out of memory")]
    OutOfMemory,

    /// The class constructor failed
    #[error("instance construction failed: {0}")]
    ConstructionFailed(String),

    /// An argument violates the calling convention
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No factory is registered for the class
    #[error("class not available: {0}")]
    ClassNotAvailable(Clsid),

    /// Malformed GUID text
    #[error("invalid GUID: {0}")]
    InvalidGuid(String),

    /// Buffer underflow (not enough data)
    #[error("buffer underflow: need {needed} bytes, have {have}")]
    BufferUnderflow { needed: usize, have: usize },

    /// Any other failure HRESULT
    #[error("failed with HRESULT 0x{0:08X}")]
    Hresult(u32),
}

impl ComError {
    /// The HRESULT a native caller would see for this error
    pub fn hresult(&self) -> u32 {
        match self {
            ComError::NoInterface(_) => hresult::E_NOINTERFACE,
            ComError::NoAggregation => hresult::CLASS_E_NOAGGREGATION,
            ComError::OutOfMemory => hresult::E_OUTOFMEMORY,
            ComError::ConstructionFailed(_) => hresult::E_FAIL,
            ComError::InvalidArgument(_)
            | ComError::InvalidGuid(_)
            | ComError::BufferUnderflow { .. } => hresult::E_INVALIDARG,
            ComError::ClassNotAvailable(_) => hresult::CLASS_E_CLASSNOTAVAILABLE,
            ComError::Hresult(hr) => *hr,
        }
    }
}

impl From<ComError> for u32 {
    fn from(e: ComError) -> u32 {
        e.hresult()
    }
}

/// HRESULT codes used by the identity and factory contracts
pub mod hresult {
    use super::{ComError, Result};
    use crate::types::Guid;

    /// Operation successful
    pub const S_OK: u32 = 0x00000000;
    /// Operation successful, returning false
    pub const S_FALSE: u32 = 0x00000001;
    /// Not implemented
    pub const E_NOTIMPL: u32 = 0x80004001;
    /// No such interface supported
    pub const E_NOINTERFACE: u32 = 0x80004002;
    /// Invalid pointer
    pub const E_POINTER: u32 = 0x80004003;
    /// Unspecified error
    pub const E_FAIL: u32 = 0x80004005;
    /// Catastrophic failure
    pub const E_UNEXPECTED: u32 = 0x8000FFFF;
    /// Out of memory
    pub const E_OUTOFMEMORY: u32 = 0x8007000E;
    /// Invalid argument
    pub const E_INVALIDARG: u32 = 0x80070057;
    /// Class does not support aggregation
    pub const CLASS_E_NOAGGREGATION: u32 = 0x80040110;
    /// Class object not available
    pub const CLASS_E_CLASSNOTAVAILABLE: u32 = 0x80040111;

    /// Severity bit clear
    pub fn succeeded(hr: u32) -> bool {
        hr & 0x8000_0000 == 0
    }

    /// Severity bit set
    pub fn failed(hr: u32) -> bool {
        !succeeded(hr)
    }

    /// Collapse a result into the HRESULT returned across the ABI
    pub fn from_result<T>(result: &Result<T>) -> u32 {
        match result {
            Ok(_) => S_OK,
            Err(e) => e.hresult(),
        }
    }

    /// Turn an HRESULT from a native callee back into a result.
    ///
    /// Any success code is `Ok`; codes without richer context map to the
    /// closest variant.
    pub fn check(hr: u32) -> Result<()> {
        if succeeded(hr) {
            return Ok(());
        }
        Err(match hr {
            E_NOINTERFACE => ComError::NoInterface(Guid::NIL),
            CLASS_E_NOAGGREGATION => ComError::NoAggregation,
            E_OUTOFMEMORY => ComError::OutOfMemory,
            CLASS_E_CLASSNOTAVAILABLE => ComError::ClassNotAvailable(Guid::NIL),
            other => ComError::Hresult(other),
        })
    }
}
