//! Infrastructure adapters - concrete implementations of the application
//! ports.

pub mod events;
pub mod persistence;
pub mod sandbox;
