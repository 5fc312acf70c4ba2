//! Application layer - port definitions for external collaborators.

pub mod ports;
