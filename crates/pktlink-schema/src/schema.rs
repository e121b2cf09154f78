use bytes::{BufMut, Bytes, BytesMut};
use pktlink_frame::{
    encode_frame, parse_header, Checksum, Malformed, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD,
    TRAILER_SIZE,
};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::field::{parse_format, FieldType, Layout};
use crate::value::Value;

/// One named, typed field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    /// Byte offset within the payload.
    pub offset: usize,
    /// Value the field holds until the first write or decode, in canonical form.
    pub initial: Value,
}

/// Layout of one message type: id, name, and ordered fields.
///
/// The payload width is fixed by the field list and the [`Layout`]. Padding
/// bytes are written as zero and ignored on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSchema {
    id: u8,
    name: String,
    layout: Layout,
    fields: Vec<Field>,
    payload_len: usize,
}

impl MessageSchema {
    /// An empty packed schema.
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self::with_layout(id, name, Layout::Packed)
    }

    /// An empty schema placing fields by `layout`.
    pub fn with_layout(id: u8, name: impl Into<String>, layout: Layout) -> Self {
        Self {
            id,
            name: name.into(),
            layout,
            fields: Vec::new(),
            payload_len: 0,
        }
    }

    /// Build a schema from a struct-format string and field names.
    ///
    /// Every field starts at its type's zero value. See [`parse_format`] for
    /// how the prefix selects the layout.
    pub fn from_format(
        id: u8,
        name: impl Into<String>,
        format: &str,
        names: &[&str],
    ) -> Result<Self> {
        let format = parse_format(format)?;
        if format.fields.len() != names.len() {
            return Err(SchemaError::ValueCount {
                expected: format.fields.len(),
                actual: names.len(),
            });
        }

        let mut schema = Self::with_layout(id, name, format.layout);
        for (ty, field) in format.fields.into_iter().zip(names) {
            schema.add_field(*field, ty, ty.zero())?;
        }
        Ok(schema)
    }

    /// Append a field.
    ///
    /// Fails without changing the schema if the name is taken, the initial
    /// value does not fit `ty`, or the payload would outgrow a frame.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        ty: FieldType,
        initial: Value,
    ) -> Result<()> {
        let name = name.into();
        if self.field_index(&name).is_some() {
            return Err(SchemaError::FieldNameCollision {
                schema: self.name.clone(),
                field: name,
            });
        }

        let mut scratch = BytesMut::with_capacity(ty.width());
        ty.encode(&initial, &mut scratch)
            .map_err(|reason| SchemaError::Encoding {
                field: name.clone(),
                reason,
            })?;

        let initial = ty.decode(&scratch);

        let offset = self.layout.place(self.payload_len, ty);
        let payload_len = offset + ty.width();
        if payload_len > MAX_PAYLOAD {
            return Err(SchemaError::TooLarge { size: payload_len });
        }

        debug!(schema = %self.name, field = %name, %ty, offset, "field added");
        self.payload_len = payload_len;
        self.fields.push(Field {
            name,
            ty,
            offset,
            initial,
        });
        Ok(())
    }

    /// Builder form of [`MessageSchema::add_field`].
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        ty: FieldType,
        initial: impl Into<Value>,
    ) -> Result<Self> {
        self.add_field(name, ty, initial.into())?;
        Ok(self)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Position of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Fixed payload width in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Total encoded frame size.
    pub fn frame_len(&self) -> usize {
        self.payload_len + FRAME_OVERHEAD
    }

    /// Initial values in field order.
    pub fn initial_values(&self) -> Vec<Value> {
        self.fields.iter().map(|field| field.initial.clone()).collect()
    }

    /// Append the payload for `values` to `dst`.
    ///
    /// On error `dst` is left as it was.
    pub fn encode_payload(&self, values: &[Value], dst: &mut BytesMut) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(SchemaError::ValueCount {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }

        let start = dst.len();
        dst.reserve(self.payload_len);
        for (field, value) in self.fields.iter().zip(values) {
            dst.put_bytes(0, start + field.offset - dst.len());
            if let Err(reason) = field.ty.encode(value, dst) {
                dst.truncate(start);
                return Err(SchemaError::Encoding {
                    field: field.name.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Encode `values` as a complete frame.
    ///
    /// Nothing is produced unless every value encodes.
    pub fn pack(&self, values: &[Value], checksum: &dyn Checksum) -> Result<Bytes> {
        let mut payload = BytesMut::with_capacity(self.payload_len);
        self.encode_payload(values, &mut payload)?;

        let mut frame = BytesMut::with_capacity(self.frame_len());
        encode_frame(self.id, &payload, checksum, &mut frame)?;
        Ok(frame.freeze())
    }

    /// Decode a payload of exactly [`MessageSchema::payload_len`] bytes.
    pub fn decode_payload(&self, payload: &[u8]) -> std::result::Result<Vec<Value>, Malformed> {
        if payload.len() != self.payload_len {
            return Err(Malformed::PayloadWidth {
                expected: self.payload_len,
                actual: payload.len(),
            });
        }

        let values = self
            .fields
            .iter()
            .map(|field| field.ty.decode(&payload[field.offset..field.offset + field.ty.width()]))
            .collect();
        Ok(values)
    }

    /// Validate a complete frame against this schema and decode its values.
    ///
    /// Checks the marker, the id, the declared length against the byte
    /// count, and the payload width. The trailer is not checked here.
    pub fn unpack(&self, frame: &[u8]) -> std::result::Result<Vec<Value>, Malformed> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(Malformed::Truncated(frame.len()));
        }
        let header = parse_header(frame)?;
        if header.id != self.id {
            return Err(Malformed::IdMismatch {
                expected: self.id,
                actual: header.id,
            });
        }
        if usize::from(header.length) != frame.len() {
            return Err(Malformed::LengthMismatch {
                declared: usize::from(header.length),
                actual: frame.len(),
            });
        }

        self.decode_payload(&frame[HEADER_SIZE..frame.len() - TRAILER_SIZE])
    }
}
