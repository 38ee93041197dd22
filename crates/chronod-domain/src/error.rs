//! Error taxonomy shared by the core and its ambient stack (config, persistence, transport).

use thiserror::Error;

/// The errors the core surfaces to callers, plus the passthrough variants the
/// ambient config/persistence layer needs on top of them.
#[derive(Debug, Error)]
pub enum Error {
    /// Five-field split failed, or a term did not match any accepted shape.
    #[error("malformed time expression in field '{field}': {detail}")]
    MalformedExpression { field: &'static str, detail: String },

    /// A field integer lies outside the field's natural domain.
    #[error("value {value} out of range {min}..={max} for field '{field}'")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// A Schedule-level invariant is violated (empty label, reserved
    /// character, duplicate label).
    #[error("invalid schedule: {0}")]
    ConfigInvalid(String),

    /// `find_by_label` missed after both the direct and underscore-to-space
    /// retry.
    #[error("no job with label '{0}'")]
    NotFound(String),

    /// The control channel received a signal it does not implement.
    #[error("unknown control signal: {0}")]
    UnknownSignal(String),

    /// Process start or pipe acquisition failed. Logged, per-run only, not
    /// fatal to the daemon.
    #[error("failed to spawn job '{label}': {source}")]
    SpawnFailure {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
