//! Symbolic identifiers.
//!
//! Every config entry is keyed by a `vid`: a globally unique symbolic string
//! that also identifies the runtime object the entry compiles into. Two
//! formats are accepted by default:
//!
//! - Generated identifiers: UUID v4 strings, produced by [`generate`].
//! - Reserved well-known names of the form `DEFAULT-<type>`, produced by
//!   [`reserved`], used for singleton instances (a default scene, a default
//!   renderer) that other configs need to reference by a stable name.
//!
//! Modules may override the validity rule in their definition; [`default_rule`]
//! is used when they do not.

use uuid::Uuid;

/// Prefix of reserved well-known identifiers.
pub const RESERVED_PREFIX: &str = "DEFAULT-";

/// Generate a fresh unique vid.
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}

/// The reserved vid for the singleton instance of a concrete type.
pub fn reserved(type_name: &str) -> String {
    format!("{RESERVED_PREFIX}{type_name}")
}

/// The default vid validity rule: a UUID or a reserved well-known name.
pub fn default_rule(vid: &str) -> bool {
    Uuid::parse_str(vid).is_ok() || vid.starts_with(RESERVED_PREFIX)
}
