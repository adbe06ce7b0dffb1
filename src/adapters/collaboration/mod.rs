//! Collaboration coordination adapters.

mod coordinator;

pub use coordinator::{CollaborationConfig, CollaborationCoordinator};
