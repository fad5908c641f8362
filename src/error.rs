//! Error type for the changemark library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced across the library boundary.
///
/// Nothing in here is allowed to escape into the host's notification
/// dispatch; callers handle these where detected and degrade the affected
/// feature instead of propagating.
#[derive(Debug, Error)]
pub enum ChangeMarkError {
    /// Marker-number negotiation with the host never produced a reply.
    #[error("marker negotiation with the host failed after {attempts} attempt(s)")]
    MarkerNegotiation { attempts: u32 },

    /// The host could not supply enough free marker numbers.
    #[error("host has {found} free marker number(s), {needed} needed")]
    MarkersExhausted { needed: usize, found: usize },

    /// A configuration file could not be read or written.
    #[error("configuration file {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// A configuration value failed to parse.
    #[error("configuration value {section}.{attribute} is not valid: {value:?}")]
    ConfigValue {
        section: String,
        attribute: String,
        value: String,
    },
}
