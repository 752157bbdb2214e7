//! The closed fault taxonomy shared by every Lattice operation.
//!
//! Faults are plain values: they are returned inside an
//! [`Outcome`](crate::Outcome), compared structurally, and carried across
//! crate boundaries. Nothing in Lattice throws; nothing here is a panic.
//!
//! The set is closed. New kinds may be added over time, but existing kinds
//! are never widened into catch-alls.

use serde::{Deserialize, Serialize};

/// One member of the closed failure taxonomy.
///
/// Every service operation declares (through its signature) exactly which of
/// these kinds it may produce. A transport layer maps each kind to a status
/// code via [`Fault::code`] without inspecting payload fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Fault {
    /// A referenced entity is absent.
    #[error("entity not found: {entity_id}")]
    NotFound { entity_id: String },

    /// Uniqueness violation on create.
    #[error("already exists: {key}")]
    AlreadyExists { key: String },

    /// Caller-supplied input failed a precondition.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The actor lacks rights over the target.
    #[error("actor {actor_id} is not authorized for {target_id}")]
    Unauthorized { actor_id: String, target_id: String },

    /// The backing resource could not be acquired, or a call to it failed.
    /// Backend errors are always wrapped into this kind; raw backend error
    /// types never cross the Lattice surface.
    #[error("resource unavailable: {cause}")]
    ResourceUnavailable { cause: String },

    /// A cycle among service identity tokens. Construction-time only:
    /// this kind is produced while building a runtime, never by a running
    /// program, and it aborts the build.
    #[error("cyclic service dependency: {}", tokens.join(" -> "))]
    CyclicDependency { tokens: Vec<String> },
}

impl Fault {
    /// Creates a [`Fault::NotFound`] for the given entity id.
    pub fn not_found(entity_id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_id: entity_id.into(),
        }
    }

    /// Creates a [`Fault::AlreadyExists`] for the given key.
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    /// Creates a [`Fault::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a [`Fault::Unauthorized`] for the given actor/target pair.
    pub fn unauthorized(actor_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor_id: actor_id.into(),
            target_id: target_id.into(),
        }
    }

    /// Creates a [`Fault::ResourceUnavailable`] wrapping the given cause.
    pub fn resource_unavailable(cause: impl ToString) -> Self {
        Self::ResourceUnavailable {
            cause: cause.to_string(),
        }
    }

    /// Returns the fieldless discriminant for this fault.
    ///
    /// Transport layers key their status tables on this code rather than
    /// matching on payload fields.
    #[must_use]
    pub fn code(&self) -> FaultCode {
        match self {
            Self::NotFound { .. } => FaultCode::NotFound,
            Self::AlreadyExists { .. } => FaultCode::AlreadyExists,
            Self::Validation { .. } => FaultCode::Validation,
            Self::Unauthorized { .. } => FaultCode::Unauthorized,
            Self::ResourceUnavailable { .. } => FaultCode::ResourceUnavailable,
            Self::CyclicDependency { .. } => FaultCode::CyclicDependency,
        }
    }
}

/// Fieldless discriminant of a [`Fault`], one per taxonomy member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultCode {
    NotFound,
    AlreadyExists,
    Validation,
    Unauthorized,
    ResourceUnavailable,
    CyclicDependency,
}
