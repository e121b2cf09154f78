//! Fixed-layout message schemas and the registry that decodes into them.
//!
//! A [`MessageSchema`] names a message id and an ordered list of typed
//! fields; its payload is those fields in little-endian, either packed or
//! aligned like a C struct (see [`Layout`]).
//! The [`Registry`] maps ids to schemas and holds the current ("live") values
//! of every registered message, updated as frames are dispatched.

pub mod config;
pub mod error;
pub mod field;
pub mod registry;
pub mod schema;
pub mod value;

pub use config::{Definitions, FieldDefinition, MessageDefinition, RegistryConfig};
pub use error::{Result, SchemaError};
pub use field::{parse_format, FieldType, Format, Layout};
pub use registry::{Dispatch, Registry};
pub use schema::{Field, MessageSchema};
pub use value::Value;
