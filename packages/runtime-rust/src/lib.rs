//! Lattice Runtime - service graph resolution, scoped resource lifecycle, and
//! program execution against a live service graph.

pub mod graph;
pub mod resource;
pub mod runtime;
pub mod services;
pub mod storage;

pub use graph::{
    BuildContext, GraphService, Layer, LayerSet, ServiceDescriptor, ServiceId, ServiceRegistry,
};
pub use resource::ResourceHandle;
pub use runtime::{Runtime, RuntimeState, ServiceProgram};
pub use storage::{MemoryPool, MemoryStore, Pool, StoreBackend, UnreachablePool};
