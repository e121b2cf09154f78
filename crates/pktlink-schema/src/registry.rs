use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use pktlink_frame::{parse_header, Checksum, Frame, Placeholder};
use tracing::{debug, info, warn};

use crate::config::{Definitions, RegistryConfig};
use crate::error::{Result, SchemaError};
use crate::schema::MessageSchema;
use crate::value::Value;

/// What happened to a dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The frame decoded and the message's live values were replaced.
    Decoded(u8),
    /// No schema is registered for this id; the frame was dropped.
    UnknownId(u8),
}

struct Entry {
    schema: Arc<MessageSchema>,
    values: Mutex<Vec<Value>>,
}

/// Id-keyed message schemas plus the live values for each.
///
/// Schemas are registered during setup; afterwards the registry is normally
/// shared behind an `Arc`. Each message's values sit behind their own lock,
/// and no I/O happens while a lock is held.
pub struct Registry {
    entries: HashMap<u8, Entry>,
    checksum: Arc<dyn Checksum>,
    config: RegistryConfig,
}

impl Registry {
    /// Create an empty registry that writes placeholder trailers.
    pub fn new() -> Self {
        Self::with_checksum(Arc::new(Placeholder))
    }

    /// Create an empty registry with an explicit trailer checksum.
    pub fn with_checksum(checksum: Arc<dyn Checksum>) -> Self {
        Self {
            entries: HashMap::new(),
            checksum,
            config: RegistryConfig::default(),
        }
    }

    /// Register `schema`, seeding its live values from the initial values.
    ///
    /// An existing schema with the same id is replaced and returned.
    pub fn register(&mut self, schema: MessageSchema) -> Option<Arc<MessageSchema>> {
        let id = schema.id();
        let entry = Entry {
            values: Mutex::new(schema.initial_values()),
            schema: Arc::new(schema),
        };
        info!(
            id,
            name = entry.schema.name(),
            payload_len = entry.schema.payload_len(),
            "message registered"
        );

        let previous = self.entries.insert(id, entry).map(|old| old.schema);
        if let Some(old) = &previous {
            warn!(id, previous = old.name(), "duplicate registration, last one wins");
        }
        previous
    }

    /// The schema registered under `id`.
    pub fn resolve(&self, id: u8) -> Option<&Arc<MessageSchema>> {
        self.entries.get(&id).map(|entry| &entry.schema)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trailer checksum used by [`Registry::pack`].
    pub fn checksum(&self) -> &Arc<dyn Checksum> {
        &self.checksum
    }

    /// Replace the trailer checksum, e.g. after loading definitions.
    pub fn set_checksum(&mut self, checksum: Arc<dyn Checksum>) {
        self.checksum = checksum;
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Decode `frame` with its schema and replace the live values.
    ///
    /// An unregistered id is reported as [`Dispatch::UnknownId`], not an
    /// error. A frame that does not fit its schema fails with
    /// [`SchemaError::Malformed`] and leaves the live values untouched.
    pub fn dispatch(&self, frame: &Frame) -> Result<Dispatch> {
        self.unpack(frame.as_bytes())
    }

    /// [`Registry::dispatch`] for raw frame bytes.
    pub fn unpack(&self, frame: &[u8]) -> Result<Dispatch> {
        let id = parse_header(frame)?.id;
        let Some(entry) = self.entries.get(&id) else {
            warn!(id, "unknown message id, frame dropped");
            return Ok(Dispatch::UnknownId(id));
        };

        let decoded = entry.schema.unpack(frame)?;
        *lock(entry, id)? = decoded;
        debug!(id, name = entry.schema.name(), "values updated");
        Ok(Dispatch::Decoded(id))
    }

    /// Current value of one field.
    pub fn get(&self, id: u8, field: &str) -> Result<Value> {
        let (entry, index) = self.field(id, field)?;
        let values = lock(entry, id)?;
        Ok(values[index].clone())
    }

    /// Overwrite one field.
    ///
    /// The value is checked against the field type when the message is packed.
    pub fn set(&self, id: u8, field: &str, value: impl Into<Value>) -> Result<()> {
        let (entry, index) = self.field(id, field)?;
        lock(entry, id)?[index] = value.into();
        Ok(())
    }

    /// Copy of all live values in field order.
    pub fn snapshot(&self, id: u8) -> Result<Vec<Value>> {
        let entry = self.entry(id)?;
        let values = lock(entry, id)?;
        Ok(values.clone())
    }

    /// Live values paired with their field names.
    pub fn named_snapshot(&self, id: u8) -> Result<Vec<(String, Value)>> {
        let entry = self.entry(id)?;
        let values = lock(entry, id)?.clone();
        Ok(entry
            .schema
            .fields()
            .iter()
            .map(|field| field.name.clone())
            .zip(values)
            .collect())
    }

    /// Run `f` with exclusive access to a message's live values.
    pub fn update<R>(&self, id: u8, f: impl FnOnce(&mut [Value]) -> R) -> Result<R> {
        let entry = self.entry(id)?;
        let mut values = lock(entry, id)?;
        Ok(f(&mut values))
    }

    /// Encode a message's live values as a frame.
    pub fn pack(&self, id: u8) -> Result<Bytes> {
        let entry = self.entry(id)?;
        let values = lock(entry, id)?.clone();
        entry.schema.pack(&values, self.checksum.as_ref())
    }

    /// Build a registry from parsed definitions.
    pub fn from_definitions(definitions: &Definitions) -> Result<Self> {
        Self::from_definitions_with_config(definitions, RegistryConfig::default())
    }

    /// Build a registry from parsed definitions with explicit config.
    pub fn from_definitions_with_config(
        definitions: &Definitions,
        config: RegistryConfig,
    ) -> Result<Self> {
        if definitions.messages.len() > config.max_messages {
            return Err(SchemaError::LoadFailed(format!(
                "message count exceeds configured max ({}): {}",
                config.max_messages,
                definitions.messages.len()
            )));
        }

        let mut registry = Self::new();
        registry.config = config;
        for definition in &definitions.messages {
            registry.register(definition.to_schema()?);
        }
        Ok(registry)
    }

    /// Build a registry from a JSON definitions document.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_definitions(&Definitions::from_json(json)?)
    }

    /// Load a JSON definitions file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_file_with_config(path, RegistryConfig::default())
    }

    /// Load a JSON definitions file with explicit config.
    pub fn from_file_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;
        let metadata = file
            .metadata()
            .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
        if !metadata.is_file() {
            return Err(SchemaError::LoadFailed(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        if metadata.len() > config.max_definition_file_size as u64 {
            return Err(SchemaError::LoadFailed(format!(
                "definitions file too large ({} bytes): {}",
                metadata.len(),
                path.display()
            )));
        }

        let max_bytes = config.max_definition_file_size;
        let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(read_limit)
            .read_to_string(&mut content)
            .map_err(|err| {
                SchemaError::LoadFailed(format!("failed reading {}: {err}", path.display()))
            })?;
        if content.len() > max_bytes {
            return Err(SchemaError::LoadFailed(format!(
                "definitions file too large while reading: {}",
                path.display()
            )));
        }

        let definitions = Definitions::from_json(&content)?;
        Self::from_definitions_with_config(&definitions, config)
    }

    fn entry(&self, id: u8) -> Result<&Entry> {
        self.entries
            .get(&id)
            .ok_or(SchemaError::UnknownMessageId(id))
    }

    fn field(&self, id: u8, field: &str) -> Result<(&Entry, usize)> {
        let entry = self.entry(id)?;
        let index = entry
            .schema
            .field_index(field)
            .ok_or_else(|| SchemaError::UnknownField {
                id,
                field: field.to_string(),
            })?;
        Ok((entry, index))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("ids", &self.ids())
            .field("checksum", &self.checksum)
            .finish()
    }
}

fn lock(entry: &Entry, id: u8) -> Result<MutexGuard<'_, Vec<Value>>> {
    entry.values.lock().map_err(|_| SchemaError::Poisoned(id))
}
