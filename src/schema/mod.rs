//! # Schema Trees
//!
//! A [`Schema`] is the descriptor side of a data tree: a hierarchy of
//! [`DataType`] leaves under OBJECT and LIST composites, mirroring the
//! `Node` tree but carrying no bytes. Schemas are what the generator
//! produces from JSON, what binds a tree onto external memory, and what
//! travels beside a compact binary serialization to make it readable.
//!
//! ## Shape
//!
//! | Variant | Children | Order |
//! |---------|----------|-------|
//! | `Empty` | - | - |
//! | `Leaf` | - | - |
//! | `Object` | named | insertion order, observable in serialization |
//! | `List` | positional | positional |
//!
//! OBJECT child names are unique; lookup is O(1) through a name index kept
//! beside the ordered child vector.
//!
//! ## Footprints
//!
//! - `total_bytes`: sum of leaf strided footprints.
//! - `total_bytes_compact`: sum of leaf content bytes (`count * element_bytes`).
//! - `required_bytes`: the minimum backing-region length for every element
//!   to be addressable, honoring explicit offsets and holes.

pub(crate) mod path;

use eyre::{bail, ensure, Result};
use hashbrown::HashMap;

use crate::error::{ErrorKind, TreeError};
use crate::types::{DataType, TypeTag};

/// An OBJECT schema: ordered named children plus an O(1) name index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    names: Vec<String>,
    children: Vec<Schema>,
    index: HashMap<String, usize>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn children(&self) -> &[Schema] {
        &self.children
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.index.get(name).map(|&i| &self.children[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Schema> {
        self.index.get(name).map(|&i| &mut self.children[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Appends `child` under `name`, replacing any existing child of that
    /// name in place (order is preserved on replacement).
    pub fn insert(&mut self, name: &str, child: Schema) -> &mut Schema {
        match self.index.get(name) {
            Some(&i) => {
                self.children[i] = child;
                &mut self.children[i]
            }
            None => {
                let i = self.children.len();
                self.names.push(name.to_string());
                self.children.push(child);
                self.index.insert(name.to_string(), i);
                &mut self.children[i]
            }
        }
    }

    /// Fetches the child under `name`, creating an empty one if missing.
    pub fn entry(&mut self, name: &str) -> &mut Schema {
        if !self.index.contains_key(name) {
            self.insert(name, Schema::Empty)
        } else {
            let i = self.index[name];
            &mut self.children[i]
        }
    }

    /// Removes the child under `name`; sibling order shifts down.
    pub fn remove(&mut self, name: &str) -> Option<Schema> {
        let i = self.index.remove(name)?;
        self.names.remove(i);
        let removed = self.children.remove(i);
        for v in self.index.values_mut() {
            if *v > i {
                *v -= 1;
            }
        }
        Some(removed)
    }

    pub fn remove_index(&mut self, i: usize) -> Option<Schema> {
        if i >= self.children.len() {
            return None;
        }
        let name = self.names[i].clone();
        self.remove(&name)
    }
}

/// Tree of layout descriptors parallel to a `Node` tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Schema {
    #[default]
    Empty,
    Leaf(DataType),
    Object(ObjectSchema),
    List(Vec<Schema>),
}

impl Schema {
    pub fn leaf(dtype: DataType) -> Schema {
        if dtype.is_empty() {
            Schema::Empty
        } else {
            Schema::Leaf(dtype)
        }
    }

    pub fn object() -> Schema {
        Schema::Object(ObjectSchema::new())
    }

    pub fn list() -> Schema {
        Schema::List(Vec::new())
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            Schema::Empty => TypeTag::Empty,
            Schema::Leaf(dt) => dt.tag(),
            Schema::Object(_) => TypeTag::Object,
            Schema::List(_) => TypeTag::List,
        }
    }

    pub fn dtype(&self) -> Option<&DataType> {
        match self {
            Schema::Leaf(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Schema::Empty)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Schema::Leaf(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Schema::Object(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Schema::List(_))
    }

    pub fn number_of_children(&self) -> usize {
        match self {
            Schema::Object(obj) => obj.len(),
            Schema::List(items) => items.len(),
            _ => 0,
        }
    }

    pub fn child(&self, i: usize) -> Option<&Schema> {
        match self {
            Schema::Object(obj) => obj.children().get(i),
            Schema::List(items) => items.get(i),
            _ => None,
        }
    }

    /// OBJECT child names in insertion order; empty for other kinds.
    pub fn child_names(&self) -> &[String] {
        match self {
            Schema::Object(obj) => obj.names(),
            _ => &[],
        }
    }

    /// Non-mutating path lookup.
    pub fn get(&self, path: &str) -> Option<&Schema> {
        let mut cursor = self;
        for part in path::components(path) {
            match cursor {
                Schema::Object(obj) => cursor = obj.get(part)?,
                _ => return None,
            }
        }
        Some(cursor)
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Mutating path traversal: OBJECT children are created along the way,
    /// and EMPTY nodes on the path are promoted to OBJECT. A mid-path leaf
    /// or list is a path error.
    pub fn fetch(&mut self, path: &str) -> Result<&mut Schema> {
        let mut cursor = self;
        let mut walked = String::new();
        for part in path::components(path) {
            if cursor.is_empty() {
                *cursor = Schema::object();
            }
            match cursor {
                Schema::Object(obj) => {
                    walked = path::join(&walked, part);
                    cursor = obj.entry(part);
                }
                other => bail!(TreeError::with_path(
                    ErrorKind::Path,
                    walked,
                    format!("expected an object, found '{}'", other.tag().name()),
                )),
            }
        }
        Ok(cursor)
    }

    /// Removes the child at `path`; sibling order shifts down.
    pub fn remove(&mut self, path: &str) -> Result<Schema> {
        let parts = path::components(path);
        ensure!(
            !parts.is_empty(),
            TreeError::new(ErrorKind::InvalidArgument, "cannot remove the root")
        );
        let (leaf_name, parents) = parts.split_last().expect("non-empty components");
        let mut cursor = &mut *self;
        let mut walked = String::new();
        for part in parents {
            walked = path::join(&walked, part);
            match cursor {
                Schema::Object(obj) => {
                    cursor = obj.get_mut(part).ok_or_else(|| {
                        TreeError::with_path(ErrorKind::Path, walked.clone(), "no such child")
                    })?;
                }
                other => bail!(TreeError::with_path(
                    ErrorKind::Path,
                    walked,
                    format!("expected an object, found '{}'", other.tag().name()),
                )),
            }
        }
        match cursor {
            Schema::Object(obj) => obj.remove(leaf_name).ok_or_else(|| {
                TreeError::with_path(ErrorKind::Path, path.to_string(), "no such child").into()
            }),
            other => bail!(TreeError::with_path(
                ErrorKind::Path,
                path.to_string(),
                format!("expected an object, found '{}'", other.tag().name()),
            )),
        }
    }

    pub fn remove_index(&mut self, i: usize) -> Result<Schema> {
        match self {
            Schema::Object(obj) => obj.remove_index(i).ok_or_else(|| {
                TreeError::new(ErrorKind::InvalidArgument, format!("no child at index {i}")).into()
            }),
            Schema::List(items) => {
                ensure!(
                    i < items.len(),
                    TreeError::new(
                        ErrorKind::InvalidArgument,
                        format!("no child at index {i}"),
                    )
                );
                Ok(items.remove(i))
            }
            other => bail!(TreeError::new(
                ErrorKind::TypeMismatch,
                format!("cannot remove children from a '{}'", other.tag().name()),
            )),
        }
    }

    /// Attaches a fresh empty child to a LIST, promoting EMPTY to LIST.
    pub fn append(&mut self) -> Result<&mut Schema> {
        if self.is_empty() {
            *self = Schema::list();
        }
        match self {
            Schema::List(items) => {
                items.push(Schema::Empty);
                Ok(items.last_mut().expect("just pushed"))
            }
            other => bail!(TreeError::new(
                ErrorKind::TypeMismatch,
                format!("append requires a list, found '{}'", other.tag().name()),
            )),
        }
    }

    /// Sum of leaf strided footprints over the subtree.
    pub fn total_bytes(&self) -> usize {
        match self {
            Schema::Empty => 0,
            Schema::Leaf(dt) => dt.total_bytes(),
            Schema::Object(obj) => obj.children().iter().map(Schema::total_bytes).sum(),
            Schema::List(items) => items.iter().map(Schema::total_bytes).sum(),
        }
    }

    /// Sum of leaf content bytes over the subtree.
    pub fn total_bytes_compact(&self) -> usize {
        match self {
            Schema::Empty => 0,
            Schema::Leaf(dt) => dt.total_bytes_compact(),
            Schema::Object(obj) => obj.children().iter().map(Schema::total_bytes_compact).sum(),
            Schema::List(items) => items.iter().map(Schema::total_bytes_compact).sum(),
        }
    }

    /// Minimum backing-region length for every leaf element to be
    /// addressable. Honors explicit offsets, so a sparse layout requires
    /// more than `total_bytes`.
    pub fn required_bytes(&self) -> usize {
        match self {
            Schema::Empty => 0,
            Schema::Leaf(dt) => dt.spanned_bytes(),
            Schema::Object(obj) => obj
                .children()
                .iter()
                .map(Schema::required_bytes)
                .max()
                .unwrap_or(0),
            Schema::List(items) => items.iter().map(Schema::required_bytes).max().unwrap_or(0),
        }
    }

    /// True when every leaf is dense and offsets pack the tree with no holes
    /// from offset 0 in walk order.
    pub fn is_compact(&self) -> bool {
        let mut cursor = 0usize;
        self.check_compact(&mut cursor)
    }

    fn check_compact(&self, cursor: &mut usize) -> bool {
        match self {
            Schema::Empty => true,
            Schema::Leaf(dt) => {
                if !dt.is_contiguous() || dt.offset() != *cursor {
                    return false;
                }
                *cursor += dt.total_bytes_compact();
                true
            }
            Schema::Object(obj) => obj.children().iter().all(|c| c.check_compact(cursor)),
            Schema::List(items) => items.iter().all(|c| c.check_compact(cursor)),
        }
    }

    /// A parallel schema with every leaf rewritten dense at the advancing
    /// cursor. Composite ordering is preserved exactly.
    pub fn compact_to(&self, cursor: &mut usize) -> Schema {
        match self {
            Schema::Empty => Schema::Empty,
            Schema::Leaf(dt) => {
                let compacted = dt.compacted_at(*cursor);
                *cursor += dt.total_bytes_compact();
                Schema::Leaf(compacted)
            }
            Schema::Object(obj) => {
                let mut out = ObjectSchema::new();
                for (name, child) in obj.names().iter().zip(obj.children()) {
                    out.insert(name, child.compact_to(cursor));
                }
                Schema::Object(out)
            }
            Schema::List(items) => {
                Schema::List(items.iter().map(|c| c.compact_to(cursor)).collect())
            }
        }
    }

    /// Calls `f` for every leaf descriptor in depth-first walk order.
    pub fn for_each_leaf(&self, f: &mut impl FnMut(&DataType)) {
        match self {
            Schema::Empty => {}
            Schema::Leaf(dt) => f(dt),
            Schema::Object(obj) => obj.children().iter().for_each(|c| c.for_each_leaf(f)),
            Schema::List(items) => items.iter().for_each(|c| c.for_each_leaf(f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::Endianness;

    fn strided_u32(count: usize, offset: usize, stride: usize) -> DataType {
        DataType::new(TypeTag::UInt32, count, offset, stride, 4, Endianness::Default).unwrap()
    }

    #[test]
    fn fetch_creates_objects_along_the_path() {
        let mut schema = Schema::Empty;
        *schema.fetch("a/b/c").unwrap() = Schema::leaf(DataType::scalar(TypeTag::Int32));

        assert!(schema.is_object());
        assert!(schema.has_path("a/b/c"));
        assert_eq!(schema.get("a/b/c").unwrap().tag(), TypeTag::Int32);
        assert!(schema.get("a/missing").is_none());
    }

    #[test]
    fn fetch_tolerates_extra_separators() {
        let mut schema = Schema::Empty;
        schema.fetch("/a/b/").unwrap();
        assert!(schema.has_path("a/b"));
        assert!(schema.has_path("/a//b/"));
    }

    #[test]
    fn fetch_through_a_leaf_is_a_path_error() {
        let mut schema = Schema::Empty;
        *schema.fetch("a").unwrap() = Schema::leaf(DataType::scalar(TypeTag::Int32));
        let err = schema.fetch("a/b").unwrap_err();
        let tree_err = err.downcast_ref::<TreeError>().unwrap();
        assert_eq!(tree_err.kind(), ErrorKind::Path);
    }

    #[test]
    fn object_children_keep_insertion_order() {
        let mut schema = Schema::Empty;
        for name in ["zeta", "alpha", "mid"] {
            *schema.fetch(name).unwrap() = Schema::leaf(DataType::scalar(TypeTag::UInt8));
        }
        assert_eq!(schema.child_names(), ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn remove_shifts_sibling_indices() {
        let mut schema = Schema::Empty;
        for name in ["a", "b", "c"] {
            *schema.fetch(name).unwrap() = Schema::leaf(DataType::scalar(TypeTag::UInt8));
        }
        schema.remove("b").unwrap();
        assert_eq!(schema.child_names(), ["a", "c"]);
        assert_eq!(
            match &schema {
                Schema::Object(obj) => obj.position("c"),
                _ => None,
            },
            Some(1)
        );
        assert!(schema.remove("b").is_err());
    }

    #[test]
    fn append_promotes_empty_to_list() {
        let mut schema = Schema::Empty;
        *schema.append().unwrap() = Schema::leaf(DataType::scalar(TypeTag::Int64));
        schema.append().unwrap();
        assert!(schema.is_list());
        assert_eq!(schema.number_of_children(), 2);

        let mut leaf = Schema::leaf(DataType::scalar(TypeTag::Int8));
        assert!(leaf.append().is_err());
    }

    #[test]
    fn footprints_sum_over_the_tree() {
        let mut schema = Schema::Empty;
        *schema.fetch("a").unwrap() = Schema::leaf(DataType::scalar(TypeTag::Int32));
        *schema.fetch("b").unwrap() = Schema::leaf(strided_u32(4, 4, 8));

        assert_eq!(schema.total_bytes(), 4 + (3 * 8 + 4));
        assert_eq!(schema.total_bytes_compact(), 4 + 16);
        assert_eq!(schema.required_bytes(), 4 + 3 * 8 + 4);
    }

    #[test]
    fn compact_to_collapses_strides_and_packs_offsets() {
        let mut schema = Schema::Empty;
        *schema.fetch("a").unwrap() = Schema::leaf(strided_u32(4, 16, 8));
        *schema.fetch("b").unwrap() = Schema::leaf(DataType::scalar(TypeTag::Float64));

        assert!(!schema.is_compact());

        let mut cursor = 0;
        let compact = schema.compact_to(&mut cursor);
        assert_eq!(cursor, 16 + 8);
        assert!(compact.is_compact());
        assert_eq!(compact.child_names(), schema.child_names());
        assert_eq!(compact.get("a").unwrap().dtype().unwrap().offset(), 0);
        assert_eq!(compact.get("b").unwrap().dtype().unwrap().offset(), 16);
    }

    #[test]
    fn compact_is_idempotent_on_schemas() {
        let mut schema = Schema::Empty;
        *schema.fetch("x").unwrap() = Schema::leaf(strided_u32(2, 0, 12));
        let mut c1 = 0;
        let once = schema.compact_to(&mut c1);
        let mut c2 = 0;
        let twice = once.compact_to(&mut c2);
        assert_eq!(once, twice);
        assert_eq!(c1, c2);
    }
}
