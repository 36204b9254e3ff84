//! Error types for the synchronization core.
//!
//! The error policy favors local recovery: one malformed or
//! temporarily-unresolved config entry must never block synchronization of
//! unrelated entries. Only identifier-table integrity violations and
//! construction failures are surfaced as hard errors; divergences like an
//! unresolved cross reference or a path segment missing on the live object
//! are logged as warnings at the point of recovery and never reach this enum.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the synchronization core.
#[derive(Debug, Error)]
pub enum Error {
    /// A module type was registered twice. Fatal at registration.
    #[error("module type already registered: {0}")]
    DuplicateType(String),

    /// Lookup of an unregistered module type.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// A patch arrived for a vid with no live runtime object. Fatal to that
    /// compile call only.
    #[error("no runtime object for vid: {0}")]
    UnknownVid(String),

    /// A config entry carries a `type` discriminator no processor handles.
    #[error("no processor registered for config type: {0}")]
    UnknownConfigType(String),

    /// A config entry is missing a required field (`vid` or `type`).
    #[error("config entry missing required field: {0}")]
    MissingField(&'static str),

    /// A store operation addressed a path that does not exist.
    #[error("config path not found: {0}")]
    PathNotFound(String),

    /// A store operation addressed a node of the wrong container kind, for
    /// example a sequence mutator aimed at an object, or keyed deletion
    /// aimed at a sequence.
    #[error("config node at {0} is not a container of the required kind")]
    NotAContainer(String),

    /// A runtime object could not be built. The compiler must not register
    /// map entries for a failed construct.
    #[error("failed to construct runtime object {vid} ({type_name}): {reason}")]
    ConstructFailure {
        vid: String,
        type_name: String,
        reason: String,
    },
}

impl Error {
    /// Convenience constructor for [`Error::ConstructFailure`].
    pub fn construct_failure(
        vid: impl Into<String>,
        type_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConstructFailure {
            vid: vid.into(),
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}
