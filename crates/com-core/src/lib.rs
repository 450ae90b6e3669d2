//! Minimal component object model core
//!
//! This crate provides the in-process core of a component object model:
//! objects expose capabilities identified by GUIDs, share one reference
//! count across every capability view, and are created through factories
//! that support aggregation and server locks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Factory Contract (factory)                 │
//! │  IClassFactory        │  ClassFactory<T>  │  ServerModule   │
//! │  - CreateInstance     │  - Aggregation    │  - Class table  │
//! │  - LockServer         │  - Server locks   │  - Unload check │
//! ├─────────────────────────────────────────────────────────────┤
//! │             Identity & Lifetime Contract (unknown)          │
//! │  Unknown / Interface  │  ComObject<T>     │  ComPtr<I>      │
//! │  - QueryInterface     │  - Shared count   │  - Scoped refs  │
//! │  - AddRef / Release   │  - Aggregation    │  - Identity     │
//! ├─────────────────────────────────────────────────────────────┤
//! │          Identifiers, errors and HRESULTs (types)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! - **IID**: Interface ID - names a capability contract
//! - **CLSID**: Class ID - names a concrete class
//! - **Interface map**: per-class table from IID to a view of the object
//! - **Identity**: the `IUnknown` view; two references are the same object
//!   iff their identities are equal
//! - **Aggregation**: an inner object whose identity and lifetime belong to
//!   an outer object
//!
//! # Modules
//!
//! - [`types`]: GUIDs, errors and HRESULT codes
//! - [`unknown`]: identity, reference counting and interface maps
//! - [`factory`]: class factories and the hosting module

pub mod types;
pub mod unknown;
pub mod factory;

// Re-export main types
pub use types::{hresult, iid, ComError, Clsid, Guid, Iid, Result};
pub use unknown::{
    Class, ComObject, ComPtr, InnerUnknown, Interface, InterfaceEntry, InterfaceSlot, RefCount,
    Unknown,
};
pub use factory::{
    Aggregation, ClassFactory, IClassFactory, ModuleConfig, ServerLock, ServerLockGuard,
    ServerModule,
};
