use thiserror::Error;

/// Programmer errors: bad definitions, unknown field kinds. Invalid user
/// input is never reported through this type.
#[derive(Error, Debug)]
pub enum FormError {
    #[error("unknown field kind: {0}")]
    UnknownFieldKind(String),

    #[error("invalid mask pattern {pattern}: {source}")]
    InvalidMask {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("form definition error: {0}")]
    Definition(#[from] json5::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field {key}: {message}")]
    Field { key: String, message: String },
}
