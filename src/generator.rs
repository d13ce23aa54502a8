//! # Schema Generation
//!
//! The [`Generator`] turns a JSON schema document into a live [`Node`]
//! tree, either over a fresh allocation or bound zero-copy onto caller
//! memory. The JSON tokenizer is a black box: everything here consumes an
//! already-parsed `serde_json::Value` tree.
//!
//! ## Protocols
//!
//! | Protocol | Document shape | Leaf types |
//! |----------|----------------|------------|
//! | `json` | plain data | inferred: number -> float64, bool -> uint8, string -> char8_str |
//! | `detailed` | objects may carry `dtype`/`length`/`offset`/`stride`/`element_bytes`/`endianness`/`value` | explicit |
//! | `base64_json` | `{"schema": <detailed>, "data": <base64>}` | explicit, bytes from the payload |
//!
//! ## The walk
//!
//! The walker threads a byte cursor through the document. An object without
//! `dtype` recurses into its members in document order; an array recurses
//! positionally; a string is a leaf type name; an object with `dtype` emits
//! a leaf at the current cursor with the parsed layout fields. After each
//! child the cursor advances by the child's strided footprint. Explicit
//! `offset` pins a leaf; explicit `stride` below the element width is a
//! schema error.
//!
//! Inline `value` fields populate freshly allocated trees. They are ignored
//! when binding external memory: the caller's bytes are the values.

use base64::Engine;
use eyre::{bail, ensure, Result};
use serde_json::Value as Json;

use crate::array::Element;
use crate::endian::Endianness;
use crate::error::{ErrorKind, TreeError};
use crate::node::Node;
use crate::schema::{ObjectSchema, Schema};
use crate::types::{DataType, TypeTag};

/// How a tree is encoded to or decoded from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Plain JSON data; types inferred, metadata lost.
    Json,
    /// Every leaf spelled out as a descriptor object; round-trip faithful.
    #[default]
    Detailed,
    /// A detailed schema beside a base64-encoded compact payload.
    Base64Json,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Json => "json",
            Protocol::Detailed => "detailed",
            Protocol::Base64Json => "base64_json",
        }
    }

    pub fn from_name(name: &str) -> Result<Protocol> {
        match name {
            "json" => Ok(Protocol::Json),
            "detailed" => Ok(Protocol::Detailed),
            "base64_json" => Ok(Protocol::Base64Json),
            other => bail!(TreeError::new(
                ErrorKind::InvalidArgument,
                format!("unknown protocol '{other}'"),
            )),
        }
    }
}

/// Parses a JSON schema and produces allocated or externally-bound trees.
#[derive(Debug, Clone)]
pub struct Generator<'a> {
    schema: &'a str,
    protocol: Protocol,
}

/// A leaf descriptor paired with the inline value that populates it.
type PendingValue<'a> = (DataType, &'a Json);

impl<'a> Generator<'a> {
    pub fn new(schema: &'a str, protocol: Protocol) -> Generator<'a> {
        Generator { schema, protocol }
    }

    /// Builds a tree owning a fresh buffer, populated from inline values.
    pub fn generate(&self) -> Result<Node> {
        let doc = parse_document(self.schema)?;
        match self.protocol {
            Protocol::Base64Json => generate_base64(&doc),
            protocol => {
                let mut cursor = 0usize;
                let mut values = Vec::new();
                let schema = walk(&doc, protocol, &mut cursor, &mut values)?;
                let mut buf = vec![0u8; schema.required_bytes()];
                for (dtype, value) in &values {
                    apply_value(&mut buf, dtype, value)?;
                }
                let mut node = Node::new();
                node.adopt_buffer(&schema, buf);
                Ok(node)
            }
        }
    }

    /// Builds a tree bound onto caller memory; schema offsets address
    /// `ptr`, and inline values in the document are ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the whole
    /// life of the returned tree, and nothing else may alias the region
    /// while the tree is in use.
    pub unsafe fn generate_external(&self, ptr: *mut u8, len: usize) -> Result<Node> {
        ensure!(
            !ptr.is_null(),
            TreeError::new(ErrorKind::InvalidArgument, "external pointer is null")
        );
        ensure!(
            self.protocol != Protocol::Base64Json,
            TreeError::new(
                ErrorKind::InvalidArgument,
                "base64_json embeds its own payload and cannot bind external memory",
            )
        );
        let doc = parse_document(self.schema)?;
        let mut cursor = 0usize;
        let mut values = Vec::new();
        let schema = walk(&doc, self.protocol, &mut cursor, &mut values)?;
        ensure!(
            len >= schema.required_bytes(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "external region holds {len} bytes but the schema requires {}",
                    schema.required_bytes()
                ),
            )
        );
        Ok(Node::bind_tree(&schema, ptr, len, true))
    }

    /// Parses the document down to its descriptor tree without building a
    /// node.
    pub fn parse_schema(&self) -> Result<Schema> {
        let doc = parse_document(self.schema)?;
        let mut cursor = 0usize;
        let mut values = Vec::new();
        match self.protocol {
            Protocol::Base64Json => {
                let envelope = envelope_fields(&doc)?;
                walk(envelope.0, Protocol::Detailed, &mut cursor, &mut values)
            }
            protocol => walk(&doc, protocol, &mut cursor, &mut values),
        }
    }
}

impl Node {
    /// Shorthand for [`Generator::generate`].
    pub fn generate(schema: &str, protocol: Protocol) -> Result<Node> {
        Generator::new(schema, protocol).generate()
    }
}

fn parse_document(text: &str) -> Result<Json> {
    serde_json::from_str(text)
        .map_err(|e| TreeError::new(ErrorKind::Parse, format!("invalid JSON: {e}")).into())
}

fn envelope_fields(doc: &Json) -> Result<(&Json, &str)> {
    let obj = doc.as_object().ok_or_else(|| {
        TreeError::new(ErrorKind::Schema, "base64_json document must be an object")
    })?;
    let schema = obj.get("schema").ok_or_else(|| {
        TreeError::new(ErrorKind::Schema, "base64_json document is missing 'schema'")
    })?;
    let data = obj
        .get("data")
        .and_then(Json::as_str)
        .ok_or_else(|| {
            TreeError::new(ErrorKind::Schema, "base64_json document is missing 'data'")
        })?;
    Ok((schema, data))
}

fn generate_base64(doc: &Json) -> Result<Node> {
    let (schema_doc, data) = envelope_fields(doc)?;
    let mut cursor = 0usize;
    let mut values = Vec::new();
    let schema = walk(schema_doc, Protocol::Detailed, &mut cursor, &mut values)?;
    let buf = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| TreeError::new(ErrorKind::Schema, format!("invalid base64 payload: {e}")))?;
    ensure!(
        buf.len() >= schema.required_bytes(),
        TreeError::new(
            ErrorKind::Schema,
            format!(
                "base64 payload holds {} bytes but the schema requires {}",
                buf.len(),
                schema.required_bytes()
            ),
        )
    );
    let mut node = Node::new();
    node.adopt_buffer(&schema, buf);
    Ok(node)
}

fn walk<'a>(
    value: &'a Json,
    protocol: Protocol,
    cursor: &mut usize,
    values: &mut Vec<PendingValue<'a>>,
) -> Result<Schema> {
    match protocol {
        Protocol::Detailed => walk_detailed(value, cursor, values),
        Protocol::Json => walk_inferred(value, cursor, values),
        Protocol::Base64Json => unreachable!("envelope is unwrapped before walking"),
    }
}

fn walk_detailed<'a>(
    value: &'a Json,
    cursor: &mut usize,
    values: &mut Vec<PendingValue<'a>>,
) -> Result<Schema> {
    match value {
        Json::Object(members) if members.contains_key("dtype") => {
            let dtype = parse_leaf(members, cursor)?;
            if let Some(v) = members.get("value") {
                values.push((dtype, v));
            }
            *cursor += dtype.total_bytes();
            Ok(Schema::Leaf(dtype))
        }
        Json::Object(members) => {
            let mut obj = ObjectSchema::new();
            for (name, member) in members {
                obj.insert(name, walk_detailed(member, cursor, values)?);
            }
            Ok(Schema::Object(obj))
        }
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(walk_detailed(item, cursor, values)?);
            }
            Ok(Schema::List(out))
        }
        Json::String(name) => {
            let dtype = leaf_shorthand(name, cursor)?;
            *cursor += dtype.total_bytes();
            Ok(Schema::Leaf(dtype))
        }
        Json::Null => Ok(Schema::Empty),
        other => bail!(TreeError::new(
            ErrorKind::Schema,
            format!("unexpected schema element: {other}"),
        )),
    }
}

/// `"TYPE"` is shorthand for `{"dtype": TYPE, "length": 1}` at the cursor.
fn leaf_shorthand(name: &str, cursor: &usize) -> Result<DataType> {
    let template = DataType::default_dtype(name)?;
    ensure!(
        template.is_leaf(),
        TreeError::new(
            ErrorKind::Schema,
            format!("'{name}' is not a leaf type name"),
        )
    );
    Ok(template.with_offset(*cursor))
}

fn field_usize(members: &serde_json::Map<String, Json>, key: &str) -> Result<Option<usize>> {
    match members.get(key) {
        None => Ok(None),
        Some(v) => {
            let n = v.as_u64().ok_or_else(|| {
                TreeError::new(
                    ErrorKind::Schema,
                    format!("'{key}' must be a non-negative integer, got {v}"),
                )
            })?;
            Ok(Some(n as usize))
        }
    }
}

fn parse_leaf(members: &serde_json::Map<String, Json>, cursor: &usize) -> Result<DataType> {
    let name = members
        .get("dtype")
        .and_then(Json::as_str)
        .ok_or_else(|| TreeError::new(ErrorKind::Schema, "'dtype' must be a type name"))?;
    let tag = TypeTag::from_name(name)?;
    ensure!(
        tag.is_leaf(),
        TreeError::new(ErrorKind::Schema, format!("'{name}' is not a leaf type"))
    );
    let natural = tag.element_bytes().expect("leaf tags have a width");

    let length = match field_usize(members, "length")? {
        Some(n) => n,
        None => match members.get("value") {
            Some(Json::Array(items)) => items.len(),
            Some(Json::String(s)) => s.len(),
            Some(_) => 1,
            None => bail!(TreeError::new(
                ErrorKind::Schema,
                format!("leaf '{name}' is missing 'length' and has no value to infer it from"),
            )),
        },
    };

    let element_bytes = field_usize(members, "element_bytes")?.unwrap_or(natural);
    let stride = field_usize(members, "stride")?.unwrap_or(element_bytes);
    let offset = field_usize(members, "offset")?.unwrap_or(*cursor);
    let endianness = match members.get("endianness") {
        None => Endianness::Default,
        Some(v) => {
            let name = v.as_str().ok_or_else(|| {
                TreeError::new(ErrorKind::Schema, format!("'endianness' must be a name, got {v}"))
            })?;
            Endianness::from_name(name)?
        }
    };

    DataType::new(tag, length, offset, stride, element_bytes, endianness)
}

fn walk_inferred<'a>(
    value: &'a Json,
    cursor: &mut usize,
    values: &mut Vec<PendingValue<'a>>,
) -> Result<Schema> {
    match value {
        Json::Object(members) => {
            let mut obj = ObjectSchema::new();
            for (name, member) in members {
                obj.insert(name, walk_inferred(member, cursor, values)?);
            }
            Ok(Schema::Object(obj))
        }
        Json::Array(items) if items.iter().all(Json::is_number) && !items.is_empty() => {
            // Homogeneous numeric arrays become float64 leaves; the json
            // protocol is documented lossy for 64-bit integers.
            let dtype = DataType::array(TypeTag::Float64, items.len()).with_offset(*cursor);
            values.push((dtype, value));
            *cursor += dtype.total_bytes();
            Ok(Schema::Leaf(dtype))
        }
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(walk_inferred(item, cursor, values)?);
            }
            Ok(Schema::List(out))
        }
        Json::Number(_) => {
            let dtype = DataType::scalar(TypeTag::Float64).with_offset(*cursor);
            values.push((dtype, value));
            *cursor += dtype.total_bytes();
            Ok(Schema::Leaf(dtype))
        }
        Json::Bool(_) => {
            let dtype = DataType::scalar(TypeTag::UInt8).with_offset(*cursor);
            values.push((dtype, value));
            *cursor += dtype.total_bytes();
            Ok(Schema::Leaf(dtype))
        }
        Json::String(s) => {
            let dtype = DataType::array(TypeTag::Char8Str, s.len()).with_offset(*cursor);
            values.push((dtype, value));
            *cursor += dtype.total_bytes();
            Ok(Schema::Leaf(dtype))
        }
        Json::Null => Ok(Schema::Empty),
    }
}

fn write_number<T: Element>(out: &mut [u8], swap: bool, v: &Json) -> Result<()> {
    let value = if let Some(i) = v.as_i64() {
        T::from_i64_wrapping(i)
    } else if let Some(u) = v.as_u64() {
        T::from_u64_wrapping(u)
    } else if let Some(f) = v.as_f64() {
        T::from_f64_saturating(f)
    } else if let Some(b) = v.as_bool() {
        T::from_u64_wrapping(b as u64)
    } else {
        bail!(TreeError::new(
            ErrorKind::Schema,
            format!("expected a numeric value, got {v}"),
        ));
    };
    value.write_element(out, swap);
    Ok(())
}

fn write_element_json(buf: &mut [u8], dtype: &DataType, i: usize, v: &Json) -> Result<()> {
    let at = dtype.element_index(i);
    let out = &mut buf[at..at + dtype.element_bytes()];
    let swap = !dtype.endianness().matches_machine();
    match dtype.tag() {
        TypeTag::Int8 => write_number::<i8>(out, swap, v),
        TypeTag::Int16 => write_number::<i16>(out, swap, v),
        TypeTag::Int32 => write_number::<i32>(out, swap, v),
        TypeTag::Int64 => write_number::<i64>(out, swap, v),
        TypeTag::UInt8 => write_number::<u8>(out, swap, v),
        TypeTag::UInt16 => write_number::<u16>(out, swap, v),
        TypeTag::UInt32 => write_number::<u32>(out, swap, v),
        TypeTag::UInt64 => write_number::<u64>(out, swap, v),
        TypeTag::Float32 => write_number::<f32>(out, swap, v),
        TypeTag::Float64 => write_number::<f64>(out, swap, v),
        other => bail!(TreeError::new(
            ErrorKind::Schema,
            format!("'{}' leaves take string values", other.name()),
        )),
    }
}

/// Writes an inline schema value into the buffer per the leaf descriptor.
fn apply_value(buf: &mut [u8], dtype: &DataType, v: &Json) -> Result<()> {
    match (dtype.tag(), v) {
        (TypeTag::Char8Str, Json::String(s)) => {
            ensure!(
                s.len() == dtype.count(),
                TreeError::new(
                    ErrorKind::Schema,
                    format!(
                        "string value holds {} bytes but the leaf length is {}",
                        s.len(),
                        dtype.count()
                    ),
                )
            );
            for (i, b) in s.bytes().enumerate() {
                buf[dtype.element_index(i)] = b;
            }
            Ok(())
        }
        (TypeTag::Char8Str, other) => bail!(TreeError::new(
            ErrorKind::Schema,
            format!("char8_str leaves take string values, got {other}"),
        )),
        (_, Json::Array(items)) => {
            ensure!(
                items.len() == dtype.count(),
                TreeError::new(
                    ErrorKind::Schema,
                    format!(
                        "value holds {} elements but the leaf length is {}",
                        items.len(),
                        dtype.count()
                    ),
                )
            );
            for (i, item) in items.iter().enumerate() {
                write_element_json(buf, dtype, i, item)?;
            }
            Ok(())
        }
        (_, scalar) => {
            ensure!(
                dtype.count() == 1,
                TreeError::new(
                    ErrorKind::Schema,
                    format!("scalar value for a leaf of length {}", dtype.count()),
                )
            );
            write_element_json(buf, dtype, 0, scalar)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detailed_leaf_with_explicit_layout() {
        let gen = Generator::new(
            r#"{"dtype": "uint32", "length": 4, "offset": 8, "stride": 8, "endianness": "little"}"#,
            Protocol::Detailed,
        );
        let schema = gen.parse_schema().unwrap();
        let dt = *schema.dtype().unwrap();
        assert_eq!(dt.tag(), TypeTag::UInt32);
        assert_eq!(dt.count(), 4);
        assert_eq!(dt.offset(), 8);
        assert_eq!(dt.stride(), 8);
        assert_eq!(dt.element_bytes(), 4);
        assert_eq!(dt.endianness(), Endianness::Little);
    }

    #[test]
    fn object_members_are_laid_out_in_document_order() {
        let gen = Generator::new(
            r#"{"b": "int32", "a": {"dtype": "float64", "length": 2}, "c": "uint8"}"#,
            Protocol::Detailed,
        );
        let schema = gen.parse_schema().unwrap();
        assert_eq!(schema.child_names(), ["b", "a", "c"]);
        assert_eq!(schema.get("b").unwrap().dtype().unwrap().offset(), 0);
        assert_eq!(schema.get("a").unwrap().dtype().unwrap().offset(), 4);
        assert_eq!(schema.get("c").unwrap().dtype().unwrap().offset(), 20);
    }

    #[test]
    fn generate_populates_inline_values() {
        let node = Node::generate(
            r#"{"a": {"dtype": "int32", "value": 5},
                "b": {"dtype": "float64", "length": 3, "value": [1.0, 2.0, 3.0]}}"#,
            Protocol::Detailed,
        )
        .unwrap();
        assert_eq!(node.get("a").to_int32().unwrap(), 5);
        assert_eq!(node.get("b").as_float64().unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(node.total_bytes_compact(), 4 + 24);
    }

    #[test]
    fn length_is_inferred_from_values() {
        let node = Node::generate(
            r#"{"s": {"dtype": "char8_str", "value": "hello"},
                "v": {"dtype": "uint16", "value": [1, 2, 3]}}"#,
            Protocol::Detailed,
        )
        .unwrap();
        assert_eq!(node.get("s").as_str().unwrap(), "hello");
        assert_eq!(node.get("v").as_uint16().unwrap().len(), 3);
    }

    #[test]
    fn missing_length_without_value_is_a_schema_error() {
        let err = Node::generate(r#"{"a": {"dtype": "int32"}}"#, Protocol::Detailed).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TreeError>().unwrap().kind(),
            ErrorKind::Schema
        );
    }

    #[test]
    fn stride_below_element_bytes_is_rejected() {
        let err = Node::generate(
            r#"{"a": {"dtype": "int32", "length": 2, "stride": 2}}"#,
            Protocol::Detailed,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<TreeError>().unwrap().kind(),
            ErrorKind::Schema
        );
    }

    #[test]
    fn unknown_dtype_name_is_a_schema_error() {
        let err =
            Node::generate(r#"{"a": {"dtype": "quark", "length": 1}}"#, Protocol::Detailed)
                .unwrap_err();
        assert_eq!(
            err.downcast_ref::<TreeError>().unwrap().kind(),
            ErrorKind::Schema
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = Node::generate("{not json", Protocol::Detailed).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TreeError>().unwrap().kind(),
            ErrorKind::Parse
        );
    }

    #[test]
    fn json_protocol_infers_types() {
        let node = Node::generate(
            r#"{"n": 2.5, "flag": true, "name": "orin", "vec": [1, 2, 3]}"#,
            Protocol::Json,
        )
        .unwrap();
        assert_eq!(node.get("n").dtype().tag(), TypeTag::Float64);
        assert_eq!(node.get("flag").dtype().tag(), TypeTag::UInt8);
        assert_eq!(node.get("flag").to_uint8().unwrap(), 1);
        assert_eq!(node.get("name").as_str().unwrap(), "orin");
        assert_eq!(node.get("vec").dtype().tag(), TypeTag::Float64);
        assert_eq!(node.get("vec").as_float64().unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn json_protocol_mixed_arrays_become_lists() {
        let node = Node::generate(r#"[1, "two", [3]]"#, Protocol::Json).unwrap();
        assert!(node.is_list());
        assert_eq!(node.number_of_children(), 3);
        assert_eq!(node.get_index(1).as_str().unwrap(), "two");
    }

    #[test]
    fn shorthand_string_form_is_a_unit_leaf() {
        let node = Node::generate(r#"{"x": "int64"}"#, Protocol::Detailed).unwrap();
        assert_eq!(node.get("x").dtype().tag(), TypeTag::Int64);
        assert_eq!(node.get("x").dtype().count(), 1);
    }
}
