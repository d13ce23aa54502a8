//! # Canopy - Hierarchical, Schema-Described Data Trees
//!
//! Canopy is an in-memory data tree with bit-exact layout control. A node is
//! either a composite (an ordered named map or a positional list) or a typed
//! leaf describing a raw memory region by (scalar type, count, offset,
//! stride, element size, endianness). The same tree works over three memory
//! regimes, indistinguishable to consumers:
//!
//! - values owned and allocated by the tree
//! - zero-copy views into caller-provided memory described by a schema
//! - a memory-mapped file backing
//!
//! Round-trips between a descriptive JSON schema, the in-memory tree, and a
//! compact binary serialization are the reason the crate exists.
//!
//! ## Quick Start
//!
//! ```ignore
//! use canopy::{JsonOpts, Node, Protocol};
//!
//! // Build by path, read strongly typed.
//! let mut n = Node::new();
//! n.fetch("mesh/coords")?.set_float64_slice(&[0.0, 0.5, 1.0]);
//! n.fetch("mesh/dims")?.set_int32(3);
//! assert_eq!(n.get("mesh/dims").to_int32()?, 3);
//!
//! // Describe existing memory instead of copying it.
//! let n = Node::generate(
//!     r#"{"coords": {"dtype": "float64", "length": 3}}"#,
//!     Protocol::Detailed,
//! )?;
//!
//! // Round-trip through JSON or a schema + binary pair on disk.
//! let text = n.to_json(Protocol::Base64Json, &JsonOpts::default())?;
//! n.save("mesh_snapshot")?;
//! let back = Node::load("mesh_snapshot")?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------+
//! |                  Node (tree API)                  |
//! +------------------+-------------------------------+
//! |  Generator       |  JSON emission / serializer   |
//! |  (JSON intake)   |  (json/detailed/base64_json)  |
//! +------------------+-------------------------------+
//! |      Schema (descriptor tree, offsets)           |
//! +--------------------------------------------------+
//! |  DataArray<T> (strided views)  |  coercion       |
//! +--------------------------------------------------+
//! |  DataType / TypeTag / Endianness (layout model)  |
//! +--------------------------------------------------+
//! |  Storage: owned | bound | external | mmap        |
//! +--------------------------------------------------+
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: the closed tag set and the leaf layout descriptor
//! - [`endian`]: byte-order ids and swap primitives
//! - [`schema`]: descriptor trees, path traversal, compaction plans
//! - [`array`]: typed strided views over leaf bytes
//! - [`node`]: the tree entity and every accessor
//! - [`generator`]: JSON schema intake in three protocols
//! - [`emit`]: JSON emission in three protocols
//! - [`io`]: schema + binary file pairs, mmap binding
//! - [`error`]: the typed failure taxonomy
//!
//! ## Concurrency
//!
//! A tree is single-threaded: exclusive access from one task at a time, no
//! internal locking. Shared read-only access is safe when no writer is
//! active; enforcement is the caller's responsibility.

pub mod array;
pub mod emit;
pub mod endian;
pub mod error;
pub mod generator;
pub mod io;
pub mod node;
pub mod schema;
pub mod types;

pub use array::{DataArray, DataArrayMut, Element};
pub use emit::JsonOpts;
pub use endian::Endianness;
pub use error::{ErrorKind, TreeError};
pub use generator::{Generator, Protocol};
pub use node::Node;
pub use schema::Schema;
pub use types::{DataType, TypeTag};
