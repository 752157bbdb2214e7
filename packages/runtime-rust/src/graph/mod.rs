//! Service identity, layers, and dependency graph resolution.
//!
//! - [`ServiceId`] / [`ServiceDescriptor`]: identity tokens and declared
//!   dependencies, unique per process.
//! - [`GraphService`]: ties a concrete service type to its token so lookups
//!   are type-checked at the seam.
//! - [`Layer`] / [`LayerSet`]: pure descriptions `(dependencies) -> service`
//!   that compose by merging; overlapping providers are rejected when the
//!   set is assembled, never resolved by last-registration-wins.
//! - [`resolve`]: topological ordering with construction-time cycle
//!   detection; a cycle aborts the build before any layer runs.

pub mod layer;
pub mod resolve;
pub mod service;

pub use layer::{BuildContext, Layer, LayerSet};
pub use service::{GraphService, ServiceDescriptor, ServiceId, ServiceRegistry};
