//! Structural invariants over the scene graph.
//!
//! Everything here is a pure function of the diagram: the executor applies
//! the computed corrections, these modules never mutate anything themselves.

pub mod connection;
pub mod embedding;
pub mod layering;

pub use connection::{can_connect, check_connect};
pub use embedding::{can_embed, check_embed};
pub use layering::{subtree_corrections, validate_and_correct, Correction};
