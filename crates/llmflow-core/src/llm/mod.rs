//! Provider abstraction and the deterministic mock provider.

pub mod mock;
pub mod provider;
