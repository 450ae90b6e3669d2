//! Factory contract
//!
//! - [`IClassFactory`]: creation of component objects, optionally inside an
//!   aggregate, and server locks
//! - [`ClassFactory`]: the factory for one class
//! - [`ServerModule`]: the hosting module that hands out factories and
//!   decides when it can be unloaded

mod class_factory;
mod module;

pub use class_factory::{
    Aggregation, ClassFactory, Constructor, IClassFactory, ServerLock, ServerLockGuard,
};
pub use module::{ModuleConfig, ServerModule};
pub(crate) use module::InstanceGuard;
