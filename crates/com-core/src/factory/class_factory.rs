//! IClassFactory: construction of component objects and server locks

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use crate::types::{iid, ComError, Clsid, Iid, Result};
use crate::unknown::{
    Class, ComObject, ComPtr, InnerUnknown, Interface, InterfaceEntry, InterfaceSlot, Unknown,
};
use super::module::{InstanceGuard, ServerModule};

/// Constructor of a class value
pub type Constructor<T> = Arc<dyn Fn() -> Result<T> + Send + Sync>;

/// The factory contract.
pub trait IClassFactory: Send + Sync {
    /// Construct a new object and answer the query in `slot`.
    ///
    /// With `outer` present the new object becomes part of that
    /// aggregate: the request must be for `IUnknown` and the slot receives
    /// the inner object's non-delegating identity.
    fn create_instance(
        &self,
        outer: Option<&ComPtr<dyn Unknown>>,
        slot: &mut InterfaceSlot<'_>,
    ) -> Result<()>;

    /// Add (`true`) or remove (`false`) a reason to keep the hosting server loaded
    fn lock_server(&self, lock: bool) -> Result<()>;
}

unsafe impl Interface for dyn IClassFactory {
    const IID: Iid = iid::ICLASSFACTORY;
}

/// Whether a class can be created inside an aggregate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Aggregation {
    /// Creation with an outer object fails with [`ComError::NoAggregation`]
    #[default]
    NotSupported,
    /// The class can be aggregated
    Supported,
}

/// Server lock state of a factory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerLock {
    /// No outstanding locks
    Unlocked,
    /// Number of outstanding locks, never zero
    Locked(u32),
}

/// Class factory for class `T`
pub struct ClassFactory<T: Class> {
    constructor: Constructor<T>,
    aggregation: Aggregation,
    /// Hosting module. Not owned: the module keeps its class objects alive.
    module: Option<Weak<ServerModule>>,
    locks: AtomicU32,
}

impl<T: Class> ClassFactory<T> {
    /// Create a factory building instances with `constructor`
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::from_constructor(Arc::new(constructor), Aggregation::NotSupported)
    }

    pub(crate) fn from_constructor(constructor: Constructor<T>, aggregation: Aggregation) -> Self {
        Self {
            constructor,
            aggregation,
            module: None,
            locks: AtomicU32::new(0),
        }
    }

    /// Allow instances to be created inside an aggregate
    pub fn aggregatable(mut self) -> Self {
        self.aggregation = Aggregation::Supported;
        self
    }

    /// Count instances and server locks against `module`.
    ///
    /// Once the module is gone, creation fails with
    /// [`ComError::ClassNotAvailable`].
    pub fn with_module(mut self, module: Arc<ServerModule>) -> Self {
        self.module = Some(Arc::downgrade(&module));
        self
    }

    fn hosting_module(&self) -> Option<Arc<ServerModule>> {
        self.module.as_ref().and_then(Weak::upgrade)
    }

    /// Class built by this factory
    pub fn clsid(&self) -> Clsid {
        T::CLSID
    }

    /// Aggregation support of the class
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Current server lock state
    pub fn lock_state(&self) -> ServerLock {
        match self.locks.load(Ordering::Acquire) {
            0 => ServerLock::Unlocked,
            n => ServerLock::Locked(n),
        }
    }

    /// Wrap the factory in a component object of its own
    pub fn into_object(self) -> Result<ComPtr<dyn IClassFactory>> {
        ComObject::create::<dyn IClassFactory>(self)
    }

    fn construct(&self) -> Result<(T, Option<InstanceGuard>)> {
        // Reserve the instance slot first so an exhausted module never runs the constructor.
        let instance = match &self.module {
            Some(module) => {
                let module = module.upgrade().ok_or(ComError::ClassNotAvailable(T::CLSID))?;
                Some(module.acquire_instance()?)
            }
            None => None,
        };
        let value = (self.constructor)().map_err(|e| {
            tracing::debug!(class = T::NAME, error = %e, "constructor failed");
            e
        })?;
        Ok((value, instance))
    }
}

impl<T: Class> IClassFactory for ClassFactory<T> {
    fn create_instance(
        &self,
        outer: Option<&ComPtr<dyn Unknown>>,
        slot: &mut InterfaceSlot<'_>,
    ) -> Result<()> {
        let Some(outer) = outer else {
            if slot.expects_aggregate() {
                return Err(ComError::InvalidArgument(
                    "aggregate slot given without an outer object".to_string(),
                ));
            }
            let (value, instance) = self.construct()?;
            let unknown = ComObject::standalone(value, instance);
            // The construction reference is released when `unknown` drops,
            // destroying the object if the query failed.
            let result = unknown.as_unknown().query_interface(slot);
            if let Err(e) = &result {
                tracing::debug!(class = T::NAME, error = %e, "created instance rejected query");
            }
            return result;
        };

        if self.aggregation == Aggregation::NotSupported {
            tracing::debug!(class = T::NAME, "aggregation refused");
            return Err(ComError::NoAggregation);
        }
        if *slot.iid() != iid::IUNKNOWN {
            return Err(ComError::InvalidArgument(format!(
                "aggregated {} must be created for IUnknown, not {}",
                T::NAME,
                slot.iid()
            )));
        }
        if !slot.expects_aggregate() {
            return Err(ComError::InvalidArgument(
                "aggregated creation needs an InnerUnknown slot".to_string(),
            ));
        }

        let (value, instance) = self.construct()?;
        let inner = ComObject::aggregated(value, outer.owner_ptr(), instance);
        slot.put_aggregate(inner).map_err(|_| {
            ComError::InvalidArgument("aggregated creation needs an InnerUnknown slot".to_string())
        })?;
        tracing::debug!(class = T::NAME, "created aggregated instance");
        Ok(())
    }

    fn lock_server(&self, lock: bool) -> Result<()> {
        if lock {
            let locks = self.locks.fetch_add(1, Ordering::AcqRel) + 1;
            if let Some(module) = self.hosting_module() {
                module.lock();
            }
            tracing::debug!(class = T::NAME, locks, "server locked");
            return Ok(());
        }

        match self
            .locks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => {
                if let Some(module) = self.hosting_module() {
                    module.unlock();
                }
                tracing::debug!(class = T::NAME, locks = previous - 1, "server unlocked");
            }
            Err(_) => {
                tracing::warn!(class = T::NAME, "unlock of an unlocked class factory ignored");
            }
        }
        Ok(())
    }
}

impl<T: Class> Class for ClassFactory<T> {
    const CLSID: Clsid = T::CLSID;
    const NAME: &'static str = "ClassFactory";
    const INTERFACES: &'static [InterfaceEntry<Self>] = &[InterfaceEntry::new(
        iid::ICLASSFACTORY,
        |factory, slot| slot.put::<dyn IClassFactory>(factory),
    )];
}

impl<T: Class> fmt::Debug for ClassFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassFactory")
            .field("class", &T::NAME)
            .field("clsid", &T::CLSID)
            .field("aggregation", &self.aggregation)
            .field("locks", &self.lock_state())
            .finish()
    }
}

impl ComPtr<dyn IClassFactory> {
    /// Create a standalone instance and query it for `I`
    pub fn create<I: ?Sized + Interface>(&self) -> Result<ComPtr<I>> {
        ComPtr::<I>::receive(&I::IID, None, |slot| self.create_instance(None, slot))
    }

    /// Create a standalone instance and query it for any `iid`
    pub fn create_untyped(&self, iid: &Iid) -> Result<ComPtr<dyn Unknown>> {
        ComPtr::<dyn Unknown>::receive(iid, None, |slot| self.create_instance(None, slot))
    }

    /// Create an instance aggregated into `outer`
    pub fn create_aggregate(&self, outer: &ComPtr<dyn Unknown>) -> Result<InnerUnknown> {
        let mut inner = None;
        let mut slot = InterfaceSlot::for_aggregate(&mut inner);
        self.create_instance(Some(outer), &mut slot)?;
        inner.ok_or_else(|| {
            ComError::InvalidArgument("factory did not produce an aggregate".to_string())
        })
    }

    /// Lock the server until the returned guard is dropped
    pub fn lock(&self) -> Result<ServerLockGuard> {
        self.lock_server(true)?;
        Ok(ServerLockGuard {
            factory: self.clone(),
        })
    }
}

/// Holds one server lock on a factory
#[derive(Debug)]
pub struct ServerLockGuard {
    factory: ComPtr<dyn IClassFactory>,
}

impl Drop for ServerLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.factory.lock_server(false) {
            tracing::warn!(error = %e, "failed to release server lock");
        }
    }
}
