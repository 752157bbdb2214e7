//! Service identity tokens and the resolved-service registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lattice_core::Fault;

/// Identity token for one service. Tokens are `'static` names declared by
/// the service type itself, so they are unique per process by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(&'static str);

impl ServiceId {
    /// Creates a token from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The token's name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A service's identity plus the identities it depends on.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    pub requires: Vec<ServiceId>,
}

impl ServiceDescriptor {
    /// Descriptor with no service dependencies.
    #[must_use]
    pub fn new(id: ServiceId) -> Self {
        Self {
            id,
            requires: Vec::new(),
        }
    }

    /// Adds a declared dependency on another service.
    #[must_use]
    pub fn requires(mut self, dependency: ServiceId) -> Self {
        self.requires.push(dependency);
        self
    }
}

/// Capability-set interface per identity token: a concrete service type
/// names its token and declared dependencies, which is what lets
/// [`ServiceRegistry::resolve`] check lookups at the type level.
pub trait GraphService: Send + Sync + 'static {
    /// The process-unique identity token of this service.
    const ID: ServiceId;

    /// The descriptor used during graph resolution. The default declares no
    /// dependencies; services that need others override it.
    #[must_use]
    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(Self::ID)
    }
}

/// The frozen map of live service instances keyed by identity token.
///
/// Built once during runtime construction and immutable afterwards;
/// programs share it read-only, so concurrent executions cannot observe
/// half-updated state.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<ServiceId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: ServiceId, instance: Arc<dyn Any + Send + Sync>) {
        self.services.insert(id, instance);
    }

    /// Looks up the live instance for `S`'s identity token.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::NotFound`] naming the token when no instance is
    /// registered under it (or the registered instance has a different
    /// type, which only an unregistered foreign token can cause).
    pub fn resolve<S: GraphService>(&self) -> Result<Arc<S>, Fault> {
        let instance = self
            .services
            .get(&S::ID)
            .ok_or_else(|| Fault::not_found(S::ID.name()))?;
        Arc::clone(instance)
            .downcast::<S>()
            .map_err(|_| Fault::not_found(S::ID.name()))
    }

    /// Returns `true` when a live instance is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: ServiceId) -> bool {
        self.services.contains_key(&id)
    }

    /// Number of live services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` when no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.services.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl GraphService for Echo {
        const ID: ServiceId = ServiceId::new("echo");
    }

    struct Other;

    impl GraphService for Other {
        const ID: ServiceId = ServiceId::new("other");
    }

    #[test]
    fn resolve_returns_registered_instance() {
        let mut registry = ServiceRegistry::new();
        registry.insert(Echo::ID, Arc::new(Echo));

        assert!(registry.contains(Echo::ID));
        assert!(registry.resolve::<Echo>().is_ok());
    }

    #[test]
    fn resolve_unregistered_token_is_not_found() {
        let registry = ServiceRegistry::new();
        let fault = registry.resolve::<Other>().err().unwrap();
        assert_eq!(fault, Fault::not_found("other"));
    }

    #[test]
    fn descriptor_default_has_no_dependencies() {
        let descriptor = Echo::descriptor();
        assert_eq!(descriptor.id, Echo::ID);
        assert!(descriptor.requires.is_empty());
    }

    #[test]
    fn descriptor_builder_accumulates_dependencies() {
        let descriptor = ServiceDescriptor::new(Other::ID)
            .requires(Echo::ID)
            .requires(ServiceId::new("third"));
        assert_eq!(descriptor.requires.len(), 2);
        assert_eq!(descriptor.requires[0], Echo::ID);
    }

    #[test]
    fn clone_shares_instances() {
        let mut registry = ServiceRegistry::new();
        registry.insert(Echo::ID, Arc::new(Echo));

        let snapshot = registry.clone();
        let a = registry.resolve::<Echo>().unwrap();
        let b = snapshot.resolve::<Echo>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
