//! API handlers module

pub mod eval;
pub mod feedback;
pub mod health;
pub mod memory;
pub mod query;
