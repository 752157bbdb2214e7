//! Success-or-typed-failure result of an operation.
//!
//! [`Outcome`] is the value every Lattice operation returns. Unlike a bare
//! `Result`, the failure channel is always one of the statically declared
//! fault kinds, and the combinators make error-kind changes explicit:
//! sequencing short-circuits on the first failure, and the only way to turn
//! kind A into kind B is a visible [`Outcome::map_failure`] step.

use serde::{Deserialize, Serialize};

use crate::fault::Fault;

/// Tagged union of `Success(T)` or `Failure(E)`.
///
/// `E` defaults to [`Fault`], the closed taxonomy; programs composing
/// operations from several services share that single failure channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome<T, E = Fault> {
    /// The operation produced a value.
    Success(T),
    /// The operation failed with one of its declared fault kinds.
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    /// Returns `true` if this outcome is a `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` if this outcome is a `Failure`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Consumes the outcome, returning the success value if present.
    #[must_use]
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Consumes the outcome, returning the failure if present.
    #[must_use]
    pub fn failure(self) -> Option<E> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// Transforms the success value with a pure function.
    ///
    /// The error channel is untouched: a `Failure` passes through unchanged.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Sequences a dependent operation.
    ///
    /// Short-circuits: when `self` is a `Failure`, `f` is never called and
    /// the failure propagates unchanged.
    #[must_use]
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U, E>) -> Outcome<U, E> {
        match self {
            Self::Success(value) => f(value),
            Self::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Maps the failure to a different declared kind.
    ///
    /// This is the only way a failure changes kind between steps; there is
    /// no implicit coercion anywhere in the composition surface.
    #[must_use]
    pub fn map_failure<E2>(self, f: impl FnOnce(E) -> E2) -> Outcome<T, E2> {
        match self {
            Self::Success(value) => Outcome::Success(value),
            Self::Failure(error) => Outcome::Failure(f(error)),
        }
    }

    /// Borrows both channels.
    #[must_use]
    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Self::Success(value) => Outcome::Success(value),
            Self::Failure(error) => Outcome::Failure(error),
        }
    }

    /// Bridges into `Result` so callers can use `?` at crate seams.
    ///
    /// # Errors
    ///
    /// Returns `Err` with the failure when this outcome is a `Failure`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        outcome.into_result()
    }
}
