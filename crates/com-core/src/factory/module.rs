//! Hosting module
//!
//! A [`ServerModule`] is the unit a loader keeps resident. It hands out
//! class factories by CLSID and tracks the two independent reasons to stay
//! loaded: server locks and live instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use crate::types::{ComError, Clsid, Iid, Result};
use crate::unknown::{Class, ComPtr, Unknown};
use super::class_factory::{Aggregation, ClassFactory, Constructor, IClassFactory};

/// Hosting module configuration
#[derive(Clone, Debug)]
pub struct ModuleConfig {
    /// Name used in diagnostics
    pub name: String,
    /// Upper bound on live instances across all classes; `None` is unbounded
    pub max_instances: Option<usize>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: "com-module".to_string(),
            max_instances: None,
        }
    }
}

impl ModuleConfig {
    /// Create a new configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Bound the number of live instances
    pub fn with_max_instances(mut self, max: usize) -> Self {
        self.max_instances = Some(max);
        self
    }
}

/// Entry in the class table
#[derive(Clone)]
struct ClassRegistration {
    name: &'static str,
    aggregation: Aggregation,
    /// The class object; every lookup hands out a reference to this one
    factory: ComPtr<dyn IClassFactory>,
}

/// Hosting module of a set of component classes
pub struct ServerModule {
    config: ModuleConfig,
    /// Outstanding server locks
    locks: AtomicUsize,
    /// Live instances created through this module's factories
    instances: AtomicUsize,
    /// Registered classes by CLSID
    classes: RwLock<HashMap<Clsid, ClassRegistration>>,
}

impl ServerModule {
    /// Create a new module
    pub fn new(config: ModuleConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            locks: AtomicUsize::new(0),
            instances: AtomicUsize::new(0),
            classes: RwLock::new(HashMap::new()),
        })
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Module configuration
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Register class `T`, replacing any earlier registration of its CLSID.
    ///
    /// The class object is built once here; factories handed out for an
    /// earlier registration keep working.
    pub fn register_class<T, F>(
        self: &Arc<Self>,
        constructor: F,
        aggregation: Aggregation,
    ) -> Result<()>
    where
        T: Class,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let constructor: Constructor<T> = Arc::new(constructor);
        let factory = ClassFactory::from_constructor(constructor, aggregation)
            .with_module(self.clone())
            .into_object()?;

        let replaced = {
            let mut classes = self.classes.write();
            classes.insert(
                T::CLSID,
                ClassRegistration {
                    name: T::NAME,
                    aggregation,
                    factory,
                },
            )
        };
        tracing::debug!(
            module = %self.config.name,
            class = T::NAME,
            clsid = %T::CLSID,
            replaced = replaced.is_some(),
            "class registered"
        );
        Ok(())
    }

    /// Unregister a class
    pub fn unregister_class(&self, clsid: &Clsid) -> bool {
        let mut classes = self.classes.write();
        classes.remove(clsid).is_some()
    }

    /// All registered CLSIDs
    pub fn registered_classes(&self) -> Vec<Clsid> {
        let classes = self.classes.read();
        let mut clsids: Vec<Clsid> = classes.keys().copied().collect();
        clsids.sort();
        clsids
    }

    /// Name and aggregation support of a registered class
    pub fn class_info(&self, clsid: &Clsid) -> Option<(&'static str, Aggregation)> {
        let classes = self.classes.read();
        classes.get(clsid).map(|r| (r.name, r.aggregation))
    }

    /// Class object for `clsid`. Every call returns the same object.
    pub fn class_factory(&self, clsid: &Clsid) -> Result<ComPtr<dyn IClassFactory>> {
        let classes = self.classes.read();
        classes
            .get(clsid)
            .map(|r| r.factory.clone())
            .ok_or(ComError::ClassNotAvailable(*clsid))
    }

    /// Class object for `clsid`, queried for `iid`
    pub fn get_class_object(&self, clsid: &Clsid, iid: &Iid) -> Result<ComPtr<dyn Unknown>> {
        self.class_factory(clsid)?.query_interface(iid)
    }

    /// Add a server lock; returns the new lock count
    pub fn lock(&self) -> usize {
        let locks = self.locks.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(module = %self.config.name, locks, "module locked");
        locks
    }

    /// Remove a server lock; returns the new lock count. Never goes below zero.
    pub fn unlock(&self) -> usize {
        match self
            .locks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => {
                tracing::trace!(module = %self.config.name, locks = previous - 1, "module unlocked");
                previous - 1
            }
            Err(_) => {
                tracing::warn!(module = %self.config.name, "unlock of an unlocked module ignored");
                0
            }
        }
    }

    /// Outstanding server locks
    pub fn lock_count(&self) -> usize {
        self.locks.load(Ordering::Acquire)
    }

    /// Live instances
    pub fn instance_count(&self) -> usize {
        self.instances.load(Ordering::Acquire)
    }

    /// True when neither locks nor instances keep the module resident
    pub fn can_unload_now(&self) -> bool {
        self.lock_count() == 0 && self.instance_count() == 0
    }

    /// Reserve one live instance
    pub(crate) fn acquire_instance(self: &Arc<Self>) -> Result<InstanceGuard> {
        let max = self.config.max_instances;
        self.instances
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match max {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            })
            .map_err(|n| {
                tracing::debug!(module = %self.config.name, instances = n, "instance limit reached");
                ComError::OutOfMemory
            })?;
        Ok(InstanceGuard {
            module: self.clone(),
        })
    }
}

impl fmt::Debug for ServerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerModule")
            .field("name", &self.config.name)
            .field("locks", &self.lock_count())
            .field("instances", &self.instance_count())
            .field("classes", &self.registered_classes())
            .finish()
    }
}

/// One live instance counted against a module
pub(crate) struct InstanceGuard {
    module: Arc<ServerModule>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.module.instances.fetch_sub(1, Ordering::AcqRel);
    }
}
