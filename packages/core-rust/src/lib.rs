//! Lattice Core - typed outcomes, the closed fault taxonomy, and program combinators.

pub mod fault;
pub mod outcome;
pub mod program;

pub use fault::{Fault, FaultCode};
pub use outcome::Outcome;
pub use program::Program;
