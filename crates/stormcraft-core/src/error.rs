//! Domain error types.

use thiserror::Error;

use crate::event::EventId;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Configuration failed an invariant check at load or reload time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A world, party, claim, storm, or economy collaborator call failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// An event was not found in the registry.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// The registry has been shut down and accepts no further work.
    #[error("event registry is shut down")]
    ShutDown,

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure error (poisoned lock, unreadable file).
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
