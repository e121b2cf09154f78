use pktlink_frame::{FrameError, Malformed};

/// Errors raised while defining, encoding, or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A field with this name already exists in the schema.
    #[error("schema {schema:?} already has a field named {field:?}")]
    FieldNameCollision { schema: String, field: String },

    /// A value cannot be represented in its field's type.
    #[error("cannot encode field {field:?}: {reason}")]
    Encoding { field: String, reason: String },

    /// The number of values does not match the number of fields.
    #[error("expected {expected} values, got {actual}")]
    ValueCount { expected: usize, actual: usize },

    /// The schema's payload would not fit in a frame.
    #[error("payload of {size} bytes exceeds the frame limit")]
    TooLarge { size: usize },

    /// The frame does not match the schema.
    #[error("malformed frame: {0}")]
    Malformed(#[from] Malformed),

    /// Frame encoding failed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// No schema is registered under this id.
    #[error("unknown message id {0:#04x}")]
    UnknownMessageId(u8),

    /// The schema has no field with this name.
    #[error("message {id:#04x} has no field {field:?}")]
    UnknownField { id: u8, field: String },

    /// A struct-format string could not be parsed.
    #[error("invalid struct format {0:?}")]
    InvalidFormat(String),

    /// A field type name is not recognized.
    #[error("unknown field type {0:?}")]
    UnknownType(String),

    /// Message definitions could not be loaded.
    #[error("failed to load message definitions: {0}")]
    LoadFailed(String),

    /// Message definitions are not valid JSON.
    #[error("message definitions are not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A thread panicked while holding this message's value lock.
    #[error("value lock for message {0:#04x} is poisoned")]
    Poisoned(u8),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
