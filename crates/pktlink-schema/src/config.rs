use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::field::{FieldType, Layout};
use crate::schema::MessageSchema;
use crate::value::Value;

/// Limits applied when loading message definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum bytes read from a definitions file.
    pub max_definition_file_size: usize,
    /// Maximum number of messages in one definitions document.
    pub max_messages: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_definition_file_size: 256 * 1024,
            max_messages: 256,
        }
    }
}

/// A JSON document describing message schemas.
///
/// ```json
/// {"messages": [
///   {"id": 1, "name": "Server Value",
///    "fields": [{"name": "value", "type": "f32", "initial": 0.0}]},
///   {"id": 3, "name": "Test Packet", "format": "iIcf12s",
///    "names": ["SIGNED_INT", "UNSIGNED_INT", "CHAR", "FLOAT", "STRING"]}
/// ]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    pub messages: Vec<MessageDefinition>,
}

/// One message: either an explicit field list or a struct-format string.
///
/// `layout` applies to field lists; a format string carries its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDefinition {
    pub id: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "is_packed")]
    pub layout: Layout,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

fn is_packed(layout: &Layout) -> bool {
    *layout == Layout::Packed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<serde_json::Value>,
}

impl Definitions {
    /// Parse a JSON definitions document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Describe existing schemas as definitions.
    pub fn from_schemas<'a>(schemas: impl IntoIterator<Item = &'a MessageSchema>) -> Self {
        let messages = schemas
            .into_iter()
            .map(|schema| MessageDefinition {
                id: schema.id(),
                name: schema.name().to_string(),
                layout: schema.layout(),
                fields: schema
                    .fields()
                    .iter()
                    .map(|field| FieldDefinition {
                        name: field.name.clone(),
                        ty: field.ty.to_string(),
                        initial: Some(field.initial.to_json()),
                    })
                    .collect(),
                format: None,
                names: Vec::new(),
            })
            .collect();
        Self { messages }
    }
}

impl MessageDefinition {
    /// Build the schema this definition describes.
    pub fn to_schema(&self) -> Result<MessageSchema> {
        match &self.format {
            Some(format) => {
                if !self.fields.is_empty() {
                    return Err(SchemaError::LoadFailed(format!(
                        "message {:#04x} sets both \"format\" and \"fields\"",
                        self.id
                    )));
                }
                let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
                MessageSchema::from_format(self.id, &self.name, format, &names)
            }
            None => {
                let mut schema = MessageSchema::with_layout(self.id, &self.name, self.layout);
                for field in &self.fields {
                    let ty: FieldType = field.ty.parse()?;
                    let initial = match &field.initial {
                        Some(json) => Value::from_json(ty, json)?,
                        None => ty.zero(),
                    };
                    schema.add_field(&field.name, ty, initial)?;
                }
                Ok(schema)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let config = RegistryConfig::default();
        assert_eq!(config.max_definition_file_size, 256 * 1024);
        assert_eq!(config.max_messages, 256);
    }

    #[test]
    fn field_list_definition() {
        let defs = Definitions::from_json(
            r#"{"messages":[{"id":1,"name":"Server Value",
                "fields":[{"name":"value","type":"f32","initial":2.5}]}]}"#,
        )
        .unwrap();
        let schema = defs.messages[0].to_schema().unwrap();

        assert_eq!(schema.id(), 1);
        assert_eq!(schema.payload_len(), 4);
        assert_eq!(schema.initial_values(), vec![Value::F32(2.5)]);
    }

    #[test]
    fn format_definition() {
        let defs = Definitions::from_json(
            r#"{"messages":[{"id":3,"name":"Test Packet","format":"iIcf12s",
                "names":["SIGNED_INT","UNSIGNED_INT","CHAR","FLOAT","STRING"]}]}"#,
        )
        .unwrap();
        let schema = defs.messages[0].to_schema().unwrap();
        assert_eq!(schema.fields().len(), 5);
        assert_eq!(schema.payload_len(), 28);
    }

    #[test]
    fn format_and_fields_conflict() {
        let defs = Definitions::from_json(
            r#"{"messages":[{"id":3,"name":"x","format":"B","names":["a"],
                "fields":[{"name":"b","type":"u8"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            defs.messages[0].to_schema(),
            Err(SchemaError::LoadFailed(_))
        ));
    }

    #[test]
    fn unknown_type_name() {
        let defs = Definitions::from_json(
            r#"{"messages":[{"id":1,"name":"x","fields":[{"name":"a","type":"float"}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            defs.messages[0].to_schema(),
            Err(SchemaError::UnknownType(_))
        ));
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            Definitions::from_json("{"),
            Err(SchemaError::InvalidJson(_))
        ));
        assert!(Definitions::from_json(r#"{"messages":[{"id":300,"name":"x"}]}"#).is_err());
    }

    #[test]
    fn schemas_describe_themselves() {
        let schema = MessageSchema::new(2, "Server Value 2")
            .with_field("value_2", FieldType::F32, 0.0f32)
            .unwrap();
        let defs = Definitions::from_schemas([&schema]);

        let json = serde_json::to_string(&defs).unwrap();
        let back = Definitions::from_json(&json).unwrap();
        assert_eq!(back.messages[0].to_schema().unwrap().fields()[0].ty, FieldType::F32);
    }

    #[test]
    fn native_layout_survives_description() {
        let schema = MessageSchema::from_format(4, "mixed", "Bd", &["flag", "reading"]).unwrap();
        let defs = Definitions::from_schemas([&schema]);

        let json = serde_json::to_string(&defs).unwrap();
        assert!(json.contains(r#""layout":"native""#));
        let back = Definitions::from_json(&json).unwrap().messages[0]
            .to_schema()
            .unwrap();
        assert_eq!(back.payload_len(), 16);
        assert_eq!(back.fields()[1].offset, 8);
    }
}
