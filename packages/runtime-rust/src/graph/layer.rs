//! Layers: pure descriptions that build live services from resolved
//! dependencies.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use lattice_core::Fault;

use super::service::{GraphService, ServiceDescriptor, ServiceId, ServiceRegistry};
use crate::resource::ResourceHandle;
use crate::storage::StoreBackend;

type BoxedBuild = Pin<Box<dyn Future<Output = Result<Arc<dyn Any + Send + Sync>, Fault>> + Send>>;
type BuildFn = Box<dyn FnOnce(BuildContext) -> BoxedBuild + Send>;

/// Everything a layer's build closure may draw on: the services already
/// instantiated ahead of it in topological order, plus the scope's one
/// shared [`ResourceHandle`].
pub struct BuildContext {
    services: ServiceRegistry,
    resource: Arc<ResourceHandle>,
}

impl BuildContext {
    pub(crate) fn new(services: ServiceRegistry, resource: Arc<ResourceHandle>) -> Self {
        Self { services, resource }
    }

    /// Resolves an already-built dependency by its token.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::NotFound`] if `S` was not declared in this layer's
    /// descriptor (and therefore has not been built yet).
    pub fn resolve<S: GraphService>(&self) -> Result<Arc<S>, Fault> {
        self.services.resolve::<S>()
    }

    /// Acquires the scope's shared storage connection.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ResourceUnavailable`] when the pool cannot be
    /// reached.
    pub async fn acquire_store(&self) -> Result<Arc<dyn StoreBackend>, Fault> {
        self.resource.acquire().await
    }

    /// The scope's resource handle, for layers that defer acquisition.
    #[must_use]
    pub fn resource(&self) -> Arc<ResourceHandle> {
        Arc::clone(&self.resource)
    }
}

/// Pure description `(dependencies) -> ServiceInstance`.
///
/// The build closure runs at most once, during runtime construction, after
/// every token in the descriptor's `requires` list has been built.
pub struct Layer {
    descriptor: ServiceDescriptor,
    build: BuildFn,
}

impl Layer {
    /// Creates a layer for service type `S` from an async build closure.
    pub fn new<S, F, Fut>(build: F) -> Self
    where
        S: GraphService,
        F: FnOnce(BuildContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<S, Fault>> + Send + 'static,
    {
        Self {
            descriptor: S::descriptor(),
            build: Box::new(move |ctx| {
                Box::pin(async move {
                    let service = build(ctx).await?;
                    Ok(Arc::new(service) as Arc<dyn Any + Send + Sync>)
                })
            }),
        }
    }

    /// The identity and declared dependencies of the provided service.
    #[must_use]
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub(crate) async fn build(self, ctx: BuildContext) -> Result<Arc<dyn Any + Send + Sync>, Fault> {
        (self.build)(ctx).await
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// A mergeable collection of layers with disjoint identity tokens.
///
/// Overlap is a composition-time error: registering two providers for one
/// token fails loudly with [`Fault::AlreadyExists`] instead of silently
/// letting the last registration win.
#[derive(Debug, Default)]
pub struct LayerSet {
    layers: Vec<Layer>,
}

impl LayerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer to the set.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AlreadyExists`] naming the token when a provider
    /// for the same identity is already present.
    pub fn with(mut self, layer: Layer) -> Result<Self, Fault> {
        let id = layer.descriptor().id;
        if self.provides(id) {
            return Err(Fault::already_exists(id.name()));
        }
        self.layers.push(layer);
        Ok(self)
    }

    /// Merges two sets.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AlreadyExists`] on the first overlapping token.
    pub fn merge(self, other: LayerSet) -> Result<Self, Fault> {
        let mut merged = self;
        for layer in other.layers {
            merged = merged.with(layer)?;
        }
        Ok(merged)
    }

    /// Returns `true` when a provider for `id` is registered.
    #[must_use]
    pub fn provides(&self, id: ServiceId) -> bool {
        self.layers.iter().any(|layer| layer.descriptor().id == id)
    }

    /// Number of registered layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` when the set holds no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub(crate) fn into_layers(self) -> Vec<Layer> {
        self.layers
    }
}
