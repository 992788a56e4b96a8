//! Service registry — capability-keyed lookup of shared services.
//!
//! Components depend on *named capabilities* instead of on each other, so
//! the state store can reach the event bus, integrations can reach the
//! poller, and nobody needs a particular construction order. An entry is
//! either a ready instance or a factory that is run on first lookup.
//!
//! Factories may look up other services. A shared resolution stack detects
//! a factory that (directly or transitively) asks for its own key and fails
//! with [`RegistryError::CircularDependency`] instead of recursing forever.
//! The stack assumes the cooperative, single-loop model of the core: two
//! unrelated async resolutions interleaving on it can report a false cycle.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use homedash_domain::capability::Capability;
use homedash_domain::error::RegistryError;

type Instance = Arc<dyn Any + Send + Sync>;

type SyncFactory = Arc<dyn Fn(&Registry) -> Result<Instance, RegistryError> + Send + Sync>;

type InstanceFuture = Pin<Box<dyn Future<Output = Result<Instance, RegistryError>> + Send>>;

type AsyncFactory = Arc<dyn Fn(Registry) -> InstanceFuture + Send + Sync>;

/// A capability paired with the type every instance under it must have.
///
/// Well-known keys live in [`crate::keys`].
pub struct ServiceKey<T> {
    capability: Capability,
    _contract: PhantomData<fn() -> T>,
}

impl<T> ServiceKey<T> {
    #[must_use]
    pub const fn new(capability: Capability) -> Self {
        Self {
            capability,
            _contract: PhantomData,
        }
    }

    #[must_use]
    pub const fn capability(&self) -> Capability {
        self.capability
    }
}

impl<T> Clone for ServiceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ServiceKey<T> {}

impl<T> fmt::Debug for ServiceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.capability).finish()
    }
}

impl<T> From<ServiceKey<T>> for Capability {
    fn from(key: ServiceKey<T>) -> Self {
        key.capability
    }
}

#[derive(Clone)]
enum Factory {
    Sync(SyncFactory),
    Async(AsyncFactory),
}

struct Entry {
    instance: Option<Instance>,
    factory: Option<Factory>,
}

impl Entry {
    fn is_resolved(&self) -> bool {
        self.instance.is_some()
    }
}

enum Lookup {
    Resolved(Instance),
    Pending(Factory),
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<Capability, Entry>>,
    resolving: Mutex<Vec<Capability>>,
}

/// Process-wide service registry.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready instance.
    ///
    /// A key that is already resolved keeps its instance; the call is a no-op.
    pub fn register_instance<T: Any + Send + Sync>(&self, key: ServiceKey<T>, instance: Arc<T>) {
        self.insert(
            key.capability(),
            Entry {
                instance: Some(instance),
                factory: None,
            },
        );
    }

    /// Register a factory run on the first [`get`](Self::get) of `key`.
    pub fn register_factory<T, F>(&self, key: ServiceKey<T>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Registry) -> Result<Arc<T>, RegistryError> + Send + Sync + 'static,
    {
        let factory: SyncFactory = Arc::new(move |registry| {
            factory(registry).map(|instance| instance as Instance)
        });
        self.insert(
            key.capability(),
            Entry {
                instance: None,
                factory: Some(Factory::Sync(factory)),
            },
        );
    }

    /// Register an asynchronous factory; only [`get_async`](Self::get_async)
    /// can resolve it.
    pub fn register_async_factory<T, F, Fut>(&self, key: ServiceKey<T>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(Registry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, RegistryError>> + Send + 'static,
    {
        let factory: AsyncFactory = Arc::new(move |registry| {
            let pending = factory(registry);
            Box::pin(async move { pending.await.map(|instance| instance as Instance) })
        });
        self.insert(
            key.capability(),
            Entry {
                instance: None,
                factory: Some(Factory::Async(factory)),
            },
        );
    }

    /// Resolve `key`, running a synchronous factory if needed.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotRegistered`] if `key` was never registered
    /// - [`RegistryError::CircularDependency`] if its factory re-enters `key`
    /// - [`RegistryError::AsyncFactoryMisuse`] if its factory is asynchronous
    /// - [`RegistryError::TypeMismatch`] if the instance is not a `T`
    pub fn get<T: Any + Send + Sync>(&self, key: ServiceKey<T>) -> Result<Arc<T>, RegistryError> {
        let capability = key.capability();
        let instance = match self.lookup(capability)? {
            Lookup::Resolved(instance) => instance,
            Lookup::Pending(Factory::Async(_)) => {
                return Err(RegistryError::AsyncFactoryMisuse { key: capability });
            }
            Lookup::Pending(Factory::Sync(factory)) => {
                let _frame = self.enter(capability)?;
                let created = factory(self)?;
                self.store_resolved(capability, created)
            }
        };
        downcast(capability, instance)
    }

    /// Resolve `key`, awaiting an asynchronous factory if needed.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), minus `AsyncFactoryMisuse`.
    pub async fn get_async<T: Any + Send + Sync>(
        &self,
        key: ServiceKey<T>,
    ) -> Result<Arc<T>, RegistryError> {
        let capability = key.capability();
        let factory = match self.lookup(capability)? {
            Lookup::Resolved(instance) => return downcast(capability, instance),
            Lookup::Pending(Factory::Sync(_)) => return self.get(key),
            Lookup::Pending(Factory::Async(factory)) => factory,
        };
        let frame = self.enter(capability)?;
        let created = factory(self.clone()).await;
        drop(frame);
        let instance = self.store_resolved(capability, created?);
        downcast(capability, instance)
    }

    /// Resolve `key`, treating any failure as absence.
    ///
    /// Unregistered keys are silently `None`; other failures are logged.
    #[must_use]
    pub fn get_optional<T: Any + Send + Sync>(&self, key: ServiceKey<T>) -> Option<Arc<T>> {
        match self.get(key) {
            Ok(instance) => Some(instance),
            Err(RegistryError::NotRegistered { .. }) => None,
            Err(err) => {
                tracing::warn!(key = %key.capability(), error = %err, "optional service unavailable");
                None
            }
        }
    }

    /// Whether anything is registered under `key`.
    #[must_use]
    pub fn has(&self, key: impl Into<Capability>) -> bool {
        self.lock_entries().contains_key(&key.into())
    }

    /// Whether `key` holds a constructed instance.
    #[must_use]
    pub fn is_resolved(&self, key: impl Into<Capability>) -> bool {
        self.lock_entries()
            .get(&key.into())
            .is_some_and(Entry::is_resolved)
    }

    /// Overwrite `key` with `instance`, resolved or not. Meant for test harnesses.
    pub fn replace<T: Any + Send + Sync>(&self, key: ServiceKey<T>, instance: Arc<T>) {
        tracing::debug!(key = %key.capability(), "replacing registry entry");
        self.lock_entries().insert(
            key.capability(),
            Entry {
                instance: Some(instance),
                factory: None,
            },
        );
    }

    /// Drop every entry and the resolution stack. Meant for test isolation.
    pub fn clear(&self) {
        self.lock_entries().clear();
        self.lock_resolving().clear();
    }

    /// Every registered capability, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<Capability> {
        let mut keys: Vec<Capability> = self.lock_entries().keys().copied().collect();
        keys.sort();
        keys
    }

    fn insert(&self, capability: Capability, entry: Entry) {
        let mut entries = self.lock_entries();
        if entries.get(&capability).is_some_and(Entry::is_resolved) {
            tracing::debug!(key = %capability, "already resolved, ignoring registration");
            return;
        }
        entries.insert(capability, entry);
    }

    fn lookup(&self, capability: Capability) -> Result<Lookup, RegistryError> {
        let entries = self.lock_entries();
        let entry = entries
            .get(&capability)
            .ok_or(RegistryError::NotRegistered { key: capability })?;
        match (&entry.instance, &entry.factory) {
            (Some(instance), _) => Ok(Lookup::Resolved(Arc::clone(instance))),
            (None, Some(factory)) => Ok(Lookup::Pending(factory.clone())),
            (None, None) => Err(RegistryError::NotRegistered { key: capability }),
        }
    }

    /// Store a freshly built instance, unless another resolution won the race.
    fn store_resolved(&self, capability: Capability, created: Instance) -> Instance {
        let mut entries = self.lock_entries();
        let entry = entries.entry(capability).or_insert(Entry {
            instance: None,
            factory: None,
        });
        if let Some(existing) = &entry.instance {
            return Arc::clone(existing);
        }
        entry.instance = Some(Arc::clone(&created));
        entry.factory = None;
        tracing::debug!(key = %capability, "resolved service");
        created
    }

    fn enter(&self, capability: Capability) -> Result<ResolutionFrame<'_>, RegistryError> {
        let mut stack = self.lock_resolving();
        if let Some(start) = stack.iter().position(|key| *key == capability) {
            let mut path = stack[start..].to_vec();
            path.push(capability);
            return Err(RegistryError::CircularDependency { path });
        }
        stack.push(capability);
        Ok(ResolutionFrame {
            stack: &self.inner.resolving,
            capability,
        })
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<Capability, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_resolving(&self) -> std::sync::MutexGuard<'_, Vec<Capability>> {
        self.inner
            .resolving
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}

/// Pops its capability off the resolution stack when dropped.
struct ResolutionFrame<'a> {
    stack: &'a Mutex<Vec<Capability>>,
    capability: Capability,
}

impl Drop for ResolutionFrame<'_> {
    fn drop(&mut self) {
        let mut stack = self.stack.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = stack.iter().rposition(|key| *key == self.capability) {
            stack.remove(pos);
        }
    }
}

fn downcast<T: Any + Send + Sync>(
    capability: Capability,
    instance: Instance,
) -> Result<Arc<T>, RegistryError> {
    instance
        .downcast::<T>()
        .map_err(|_| RegistryError::TypeMismatch { key: capability })
}
