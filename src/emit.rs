//! # JSON Emission
//!
//! The emission side of the three protocols, symmetric to the generator's
//! intake:
//!
//! | Protocol | Output | Round-trip |
//! |----------|--------|------------|
//! | `json` | plain JSON with inline values | lossy (metadata dropped) |
//! | `detailed` | every leaf as a full descriptor object with its value | faithful |
//! | `base64_json` | `{"schema": <detailed, no values>, "data": <base64>}` | byte-faithful after compaction |
//!
//! Pretty-printing is controlled by [`JsonOpts`]: `indent` pad-units per
//! depth level, a starting `depth`, the `pad` string and the end-of-entry
//! separator `eoe`. Leaf descriptor objects are emitted inline; composites
//! nest one depth level per tier.

use base64::Engine;
use eyre::{bail, Result};

use crate::error::{ErrorKind, TreeError};
use crate::generator::Protocol;
use crate::node::Node;
use crate::schema::Schema;
use crate::types::{DataType, TypeTag};

/// Pretty-printing parameters for JSON emission.
#[derive(Debug, Clone)]
pub struct JsonOpts {
    /// Pad-units per depth level.
    pub indent: usize,
    /// Starting depth.
    pub depth: usize,
    /// The indentation unit.
    pub pad: String,
    /// End-of-entry separator.
    pub eoe: String,
}

impl Default for JsonOpts {
    fn default() -> Self {
        JsonOpts {
            indent: 2,
            depth: 0,
            pad: " ".to_string(),
            eoe: "\n".to_string(),
        }
    }
}

impl JsonOpts {
    fn break_line(&self, out: &mut String, depth: usize) {
        out.push_str(&self.eoe);
        for _ in 0..self.indent * depth {
            out.push_str(&self.pad);
        }
    }
}

impl Node {
    /// Emits this tree as JSON under `protocol`.
    pub fn to_json(&self, protocol: Protocol, opts: &JsonOpts) -> Result<String> {
        let mut out = String::new();
        match protocol {
            Protocol::Json => emit_pure(self, opts, opts.depth, &mut out)?,
            Protocol::Detailed => {
                let mut cursor = 0usize;
                emit_detailed(self, opts, opts.depth, &mut cursor, &mut out)?;
            }
            Protocol::Base64Json => emit_base64(self, opts, &mut out)?,
        }
        Ok(out)
    }

    /// Emits this tree as compact detailed JSON.
    pub fn to_detailed_json(&self) -> Result<String> {
        self.to_json(Protocol::Detailed, &JsonOpts::default())
    }
}

impl Schema {
    /// Emits this descriptor tree as detailed JSON, values omitted.
    pub fn to_json(&self, opts: &JsonOpts) -> String {
        let mut out = String::new();
        schema_to_json(self, opts, opts.depth, &mut out);
        out
    }
}

/// Emits a descriptor tree as detailed JSON, values omitted. This is what
/// travels beside a binary payload in the `pair` file protocol and the
/// `base64_json` envelope.
pub fn schema_to_json(schema: &Schema, opts: &JsonOpts, depth: usize, out: &mut String) {
    match schema {
        Schema::Empty => out.push_str("null"),
        Schema::Leaf(dt) => emit_leaf_descriptor(dt, None, out),
        Schema::Object(obj) => {
            out.push('{');
            let mut first = true;
            for (name, child) in obj.names().iter().zip(obj.children()) {
                if !first {
                    out.push(',');
                }
                first = false;
                opts.break_line(out, depth + 1);
                out.push_str(&escape(name));
                out.push_str(": ");
                schema_to_json(child, opts, depth + 1, out);
            }
            opts.break_line(out, depth);
            out.push('}');
        }
        Schema::List(items) => {
            out.push('[');
            let mut first = true;
            for child in items {
                if !first {
                    out.push(',');
                }
                first = false;
                opts.break_line(out, depth + 1);
                schema_to_json(child, opts, depth + 1, out);
            }
            opts.break_line(out, depth);
            out.push(']');
        }
    }
}

fn emit_pure(node: &Node, opts: &JsonOpts, depth: usize, out: &mut String) -> Result<()> {
    match node.tag() {
        TypeTag::Empty => out.push_str("null"),
        TypeTag::Object => {
            out.push('{');
            let mut first = true;
            for (name, child) in node.child_names().iter().zip(node.children()) {
                if !first {
                    out.push(',');
                }
                first = false;
                opts.break_line(out, depth + 1);
                out.push_str(&escape(name));
                out.push_str(": ");
                emit_pure(child, opts, depth + 1, out)?;
            }
            opts.break_line(out, depth);
            out.push('}');
        }
        TypeTag::List => {
            out.push('[');
            let mut first = true;
            for child in node.children() {
                if !first {
                    out.push(',');
                }
                first = false;
                opts.break_line(out, depth + 1);
                emit_pure(child, opts, depth + 1, out)?;
            }
            opts.break_line(out, depth);
            out.push(']');
        }
        _ => emit_leaf_value(node, out)?,
    }
    Ok(())
}

/// Detailed emission describes the tree at its compact layout: leaf offsets
/// are cursor-assigned and strides collapse to the element width, so the
/// emitted descriptors are mutually consistent over one dense buffer no
/// matter how the live tree's storage is scattered or strided.
fn emit_detailed(
    node: &Node,
    opts: &JsonOpts,
    depth: usize,
    cursor: &mut usize,
    out: &mut String,
) -> Result<()> {
    match node.tag() {
        TypeTag::Empty => out.push_str("null"),
        TypeTag::Object => {
            out.push('{');
            let mut first = true;
            for (name, child) in node.child_names().iter().zip(node.children()) {
                if !first {
                    out.push(',');
                }
                first = false;
                opts.break_line(out, depth + 1);
                out.push_str(&escape(name));
                out.push_str(": ");
                emit_detailed(child, opts, depth + 1, cursor, out)?;
            }
            opts.break_line(out, depth);
            out.push('}');
        }
        TypeTag::List => {
            out.push('[');
            let mut first = true;
            for child in node.children() {
                if !first {
                    out.push(',');
                }
                first = false;
                opts.break_line(out, depth + 1);
                emit_detailed(child, opts, depth + 1, cursor, out)?;
            }
            opts.break_line(out, depth);
            out.push(']');
        }
        _ => {
            let mut value = String::new();
            emit_leaf_value(node, &mut value)?;
            let compact = node.dtype().compacted_at(*cursor);
            *cursor += compact.total_bytes_compact();
            emit_leaf_descriptor(&compact, Some(&value), out);
        }
    }
    Ok(())
}

fn emit_base64(node: &Node, opts: &JsonOpts, out: &mut String) -> Result<()> {
    let mut cursor = 0usize;
    let compact_schema = node.schema().compact_to(&mut cursor);
    let payload = base64::engine::general_purpose::STANDARD.encode(node.serialize());

    let depth = opts.depth;
    out.push('{');
    opts.break_line(out, depth + 1);
    out.push_str("\"schema\": ");
    schema_to_json(&compact_schema, opts, depth + 1, out);
    out.push(',');
    opts.break_line(out, depth + 1);
    out.push_str("\"data\": ");
    out.push_str(&escape(&payload));
    opts.break_line(out, depth);
    out.push('}');
    Ok(())
}

/// One descriptor object on a single line, optionally with its value.
fn emit_leaf_descriptor(dt: &DataType, value: Option<&str>, out: &mut String) {
    out.push_str("{\"dtype\": ");
    out.push_str(&escape(dt.tag().name()));
    out.push_str(&format!(
        ", \"length\": {}, \"offset\": {}, \"stride\": {}, \"element_bytes\": {}",
        dt.count(),
        dt.offset(),
        dt.stride(),
        dt.element_bytes()
    ));
    out.push_str(", \"endianness\": ");
    out.push_str(&escape(dt.endianness().name()));
    if let Some(v) = value {
        out.push_str(", \"value\": ");
        out.push_str(v);
    }
    out.push('}');
}

fn emit_leaf_value(node: &Node, out: &mut String) -> Result<()> {
    let dt = node.dtype();
    if dt.tag() == TypeTag::Char8Str {
        out.push_str(&escape(&leaf_string(node)?));
        return Ok(());
    }
    if dt.count() == 1 {
        push_element(node, 0, out)?;
        return Ok(());
    }
    out.push('[');
    for i in 0..dt.count() {
        if i > 0 {
            out.push_str(", ");
        }
        push_element(node, i, out)?;
    }
    out.push(']');
    Ok(())
}

fn push_element(node: &Node, i: usize, out: &mut String) -> Result<()> {
    match node.dtype().tag() {
        TypeTag::Int8 => out.push_str(&node.as_int8()?.get(i).to_string()),
        TypeTag::Int16 => out.push_str(&node.as_int16()?.get(i).to_string()),
        TypeTag::Int32 => out.push_str(&node.as_int32()?.get(i).to_string()),
        TypeTag::Int64 => out.push_str(&node.as_int64()?.get(i).to_string()),
        TypeTag::UInt8 => out.push_str(&node.as_uint8()?.get(i).to_string()),
        TypeTag::UInt16 => out.push_str(&node.as_uint16()?.get(i).to_string()),
        TypeTag::UInt32 => out.push_str(&node.as_uint32()?.get(i).to_string()),
        TypeTag::UInt64 => out.push_str(&node.as_uint64()?.get(i).to_string()),
        TypeTag::Float32 => push_float(node.as_float32()?.get(i) as f64, out),
        TypeTag::Float64 => push_float(node.as_float64()?.get(i), out),
        other => bail!(TreeError::new(
            ErrorKind::TypeMismatch,
            format!("'{}' has no element values", other.name()),
        )),
    }
    Ok(())
}

/// JSON has no NaN or infinity; non-finite values emit as null.
fn push_float(v: f64, out: &mut String) {
    if v.is_finite() {
        out.push_str(&v.to_string());
    } else {
        out.push_str("null");
    }
}

/// The string value of a `char8_str` leaf, gathered across any stride.
fn leaf_string(node: &Node) -> Result<String> {
    let dt = node.dtype();
    let region = node.region();
    let bytes: Vec<u8> = (0..dt.count()).map(|i| region[dt.element_index(i)]).collect();
    String::from_utf8(bytes).map_err(|e| {
        TreeError::new(ErrorKind::TypeMismatch, format!("invalid UTF-8 in char8_str: {e}")).into()
    })
}

/// JSON string escaping through the tokenizer's own formatter.
fn escape(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_json_emits_plain_values() {
        let mut node = Node::new();
        node.fetch("a").unwrap().set_int32(5);
        node.fetch("b").unwrap().set_float64_slice(&[1.0, 2.5]);
        node.fetch("s").unwrap().set_string("hi");

        let text = node.to_json(Protocol::Json, &JsonOpts::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["a"], 5);
        assert_eq!(parsed["b"][1], 2.5);
        assert_eq!(parsed["s"], "hi");
    }

    #[test]
    fn detailed_json_spells_out_descriptors() {
        let mut node = Node::new();
        node.fetch("a").unwrap().set_uint16_slice(&[7, 8]);

        let text = node.to_detailed_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["a"]["dtype"], "uint16");
        assert_eq!(parsed["a"]["length"], 2);
        assert_eq!(parsed["a"]["element_bytes"], 2);
        assert_eq!(parsed["a"]["endianness"], "default");
        assert_eq!(parsed["a"]["value"][0], 7);
    }

    #[test]
    fn empty_children_emit_null() {
        let mut node = Node::new();
        node.fetch("gap").unwrap();
        let text = node.to_json(Protocol::Json, &JsonOpts::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed["gap"].is_null());
    }

    #[test]
    fn schema_emission_omits_values() {
        let mut node = Node::new();
        node.fetch("x").unwrap().set_int64(42);
        let mut out = String::new();
        schema_to_json(&node.schema(), &JsonOpts::default(), 0, &mut out);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["x"]["dtype"], "int64");
        assert!(parsed["x"].get("value").is_none());
    }

    #[test]
    fn emitted_json_is_parseable_with_custom_padding() {
        let mut node = Node::new();
        node.fetch("deep/nest/leaf").unwrap().set_int8(1);
        let opts = JsonOpts {
            indent: 1,
            depth: 0,
            pad: "\t".to_string(),
            eoe: "\n".to_string(),
        };
        let text = node.to_json(Protocol::Detailed, &opts).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
        assert!(text.contains('\t'));
    }
}
