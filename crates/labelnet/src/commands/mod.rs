//! CLI command implementations.

pub mod evaluate;
pub mod serve;
pub mod train;
