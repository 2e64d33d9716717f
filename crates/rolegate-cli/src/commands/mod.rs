//! CLI command implementations.

pub mod audit;
pub mod evaluate;
pub mod roles;
pub mod summary;
pub mod templates;
pub mod version;
