//! Category tree domain model.
//!
//! # Responsibility
//! - Define visibility modes and the category tree engine.
//! - Define the persisted tree shape.
//!
//! # Invariants
//! - Every category satisfies its mode invariant after every operation.
//! - Failed operations leave the tree unchanged.

pub mod category;
pub mod mode;
pub mod record;
