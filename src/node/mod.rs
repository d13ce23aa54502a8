//! # The Node Tree
//!
//! [`Node`] is the tree entity consumers hold: a composite (ordered named
//! OBJECT or positional LIST) or a typed leaf whose descriptor addresses a
//! raw byte region. The same API serves three memory regimes:
//!
//! | Regime | Root storage | Leaf storage |
//! |--------|--------------|--------------|
//! | tree-owned | `Owned` allocation | `Bound` into the root's buffer, or own `Owned` |
//! | external (zero-copy) | `External` caller pointer | `External` into the same base |
//! | memory-mapped | `Mmap` region | `Bound` into the mapping |
//!
//! Consumers cannot tell the regimes apart: every accessor resolves element
//! addresses through the leaf descriptor against whatever region backs it.
//!
//! ## Lookup vs traversal
//!
//! `get` never mutates: missing paths resolve to the process-wide empty
//! sentinel, so lookup chains over absent paths neither allocate nor fault.
//! `fetch` is the mutating traversal: it creates OBJECT children along the
//! path and promotes EMPTY nodes to OBJECT.
//!
//! ## Mutation and the tag state machine
//!
//! An EMPTY node becomes a leaf via `set_*`, an OBJECT via `fetch`, a LIST
//! via `append`. Mutators that would change a non-empty tag release the old
//! storage first; `reset` returns any node to EMPTY and drops what it owned.

pub(crate) mod storage;

mod accessors;
#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use eyre::{bail, ensure, Result};
use hashbrown::HashMap;

use crate::array::{DataArray, DataArrayMut, Element};
use crate::endian::Endianness;
use crate::error::{ErrorKind, TreeError};
use crate::schema::{path, ObjectSchema, Schema};
use crate::types::{DataType, TypeTag};

use storage::Storage;

/// A tree node: composite or typed leaf over raw bytes.
///
/// See the module docs for the storage regimes and the mutation model.
#[derive(Debug, Default)]
pub struct Node {
    dtype: DataType,
    storage: Storage,
    children: Vec<Node>,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

struct EmptySentinel(Node);

// SAFETY: Node is !Sync only because the Bound/External storage variants
// carry raw pointers. The sentinel is constructed with Storage::None and is
// only ever reachable through a shared reference, and Node has no interior
// mutability, so cross-thread shared access cannot race.
unsafe impl Sync for EmptySentinel {}
// SAFETY: as above; with Storage::None there is no pointer to alias.
unsafe impl Send for EmptySentinel {}

static EMPTY: LazyLock<EmptySentinel> = LazyLock::new(|| EmptySentinel(Node::new()));

impl Node {
    /// A fresh EMPTY node. Does not allocate.
    pub fn new() -> Node {
        Node::default()
    }

    /// The process-wide empty sentinel returned by failing lookups.
    pub fn empty_ref() -> &'static Node {
        &EMPTY.0
    }

    pub fn tag(&self) -> TypeTag {
        self.dtype.tag()
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn is_empty(&self) -> bool {
        self.dtype.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.dtype.is_leaf()
    }

    pub fn is_object(&self) -> bool {
        self.tag() == TypeTag::Object
    }

    pub fn is_list(&self) -> bool {
        self.tag() == TypeTag::List
    }

    /// True when this node's bytes live in caller-provided memory.
    pub fn is_data_external(&self) -> bool {
        match &self.storage {
            Storage::External { .. } => true,
            Storage::None if !self.children.is_empty() => {
                self.children.iter().all(Node::is_data_external)
            }
            _ => false,
        }
    }

    pub fn is_data_mmapped(&self) -> bool {
        self.storage.is_mmapped()
    }

    /// Releases everything this node owns and returns it to EMPTY.
    pub fn reset(&mut self) {
        self.dtype = DataType::empty();
        self.storage = Storage::None;
        self.children.clear();
        self.names.clear();
        self.index.clear();
    }

    // ------------------------------------------------------------------
    // shape and footprint
    // ------------------------------------------------------------------

    /// Strided bytes covered by this subtree's leaves.
    pub fn total_bytes(&self) -> usize {
        if self.dtype.is_leaf() {
            self.dtype.total_bytes()
        } else {
            self.children.iter().map(Node::total_bytes).sum()
        }
    }

    /// Content bytes with all striding collapsed.
    pub fn total_bytes_compact(&self) -> usize {
        if self.dtype.is_leaf() {
            self.dtype.total_bytes_compact()
        } else {
            self.children.iter().map(Node::total_bytes_compact).sum()
        }
    }

    pub fn is_compact(&self) -> bool {
        self.schema().is_compact()
    }

    /// The descriptor tree of this node.
    pub fn schema(&self) -> Schema {
        match self.tag() {
            TypeTag::Empty => Schema::Empty,
            TypeTag::Object => {
                let mut obj = ObjectSchema::new();
                for (name, child) in self.names.iter().zip(&self.children) {
                    obj.insert(name, child.schema());
                }
                Schema::Object(obj)
            }
            TypeTag::List => Schema::List(self.children.iter().map(Node::schema).collect()),
            _ => Schema::Leaf(self.dtype),
        }
    }

    pub fn number_of_children(&self) -> usize {
        self.children.len()
    }

    /// OBJECT child names in insertion order; empty for other kinds.
    pub fn child_names(&self) -> &[String] {
        &self.names
    }

    pub fn child(&self, i: usize) -> Option<&Node> {
        self.children.get(i)
    }

    pub fn child_mut(&mut self, i: usize) -> Option<&mut Node> {
        self.children.get_mut(i)
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    // ------------------------------------------------------------------
    // lookup and traversal
    // ------------------------------------------------------------------

    /// Non-mutating path lookup; absent paths and non-object hops resolve to
    /// the empty sentinel.
    pub fn get(&self, p: &str) -> &Node {
        let mut cursor = self;
        for part in path::components(p) {
            match cursor.index.get(part) {
                Some(&i) if cursor.is_object() => cursor = &cursor.children[i],
                _ => return Node::empty_ref(),
            }
        }
        cursor
    }

    /// Non-mutating index lookup; out-of-range resolves to the empty
    /// sentinel.
    pub fn get_index(&self, i: usize) -> &Node {
        self.children.get(i).unwrap_or_else(|| Node::empty_ref())
    }

    pub fn has_path(&self, p: &str) -> bool {
        let mut cursor = self;
        for part in path::components(p) {
            if !cursor.is_object() {
                return false;
            }
            match cursor.index.get(part) {
                Some(&i) => cursor = &cursor.children[i],
                None => return false,
            }
        }
        true
    }

    /// Mutating path traversal: creates OBJECT children along the path and
    /// promotes EMPTY nodes to OBJECT. A mid-path leaf or list fails.
    pub fn fetch(&mut self, p: &str) -> Result<&mut Node> {
        let mut cursor = self;
        let mut walked = String::new();
        for part in path::components(p) {
            if cursor.is_empty() {
                cursor.dtype = DataType::object();
            }
            if !cursor.is_object() {
                bail!(TreeError::with_path(
                    ErrorKind::Path,
                    walked,
                    format!("expected an object, found '{}'", cursor.tag().name()),
                ));
            }
            walked = path::join(&walked, part);
            let i = match cursor.index.get(part) {
                Some(&i) => i,
                None => {
                    let i = cursor.children.len();
                    cursor.names.push(part.to_string());
                    cursor.children.push(Node::new());
                    cursor.index.insert(part.to_string(), i);
                    i
                }
            };
            cursor = &mut cursor.children[i];
        }
        Ok(cursor)
    }

    /// Mutable child access by index for composites.
    pub fn fetch_index(&mut self, i: usize) -> Result<&mut Node> {
        ensure!(
            self.tag().is_composite(),
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!("'{}' has no indexed children", self.tag().name()),
            )
        );
        let len = self.children.len();
        self.children.get_mut(i).ok_or_else(|| {
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!("child index {i} out of bounds (children={len})"),
            )
            .into()
        })
    }

    /// Attaches a fresh empty child to a LIST, promoting EMPTY to LIST.
    pub fn append(&mut self) -> Result<&mut Node> {
        if self.is_empty() {
            self.dtype = DataType::list();
        }
        ensure!(
            self.is_list(),
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!("append requires a list, found '{}'", self.tag().name()),
            )
        );
        self.children.push(Node::new());
        Ok(self.children.last_mut().expect("just pushed"))
    }

    /// Removes and returns the child at `path`; sibling order shifts down.
    pub fn remove(&mut self, p: &str) -> Result<Node> {
        let parts = path::components(p);
        ensure!(
            !parts.is_empty(),
            TreeError::new(ErrorKind::InvalidArgument, "cannot remove the root")
        );
        let (leaf_name, parents) = parts.split_last().expect("non-empty components");
        let mut cursor = &mut *self;
        let mut walked = String::new();
        for &part in parents {
            walked = path::join(&walked, part);
            ensure!(
                cursor.is_object(),
                TreeError::with_path(
                    ErrorKind::Path,
                    walked.clone(),
                    format!("expected an object, found '{}'", cursor.tag().name()),
                )
            );
            let i = *cursor.index.get(part).ok_or_else(|| {
                TreeError::with_path(ErrorKind::Path, walked.clone(), "no such child")
            })?;
            cursor = &mut cursor.children[i];
        }
        ensure!(
            cursor.is_object(),
            TreeError::with_path(
                ErrorKind::Path,
                p.to_string(),
                format!("expected an object, found '{}'", cursor.tag().name()),
            )
        );
        let i = *cursor.index.get(*leaf_name).ok_or_else(|| {
            TreeError::with_path(ErrorKind::Path, p.to_string(), "no such child")
        })?;
        cursor.names.remove(i);
        cursor.index.remove(*leaf_name);
        for v in cursor.index.values_mut() {
            if *v > i {
                *v -= 1;
            }
        }
        Ok(cursor.children.remove(i))
    }

    /// Removes and returns the child at index `i`; subsequent siblings
    /// shift down.
    pub fn remove_index(&mut self, i: usize) -> Result<Node> {
        ensure!(
            self.tag().is_composite(),
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!("cannot remove children from a '{}'", self.tag().name()),
            )
        );
        ensure!(
            i < self.children.len(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!("child index {i} out of bounds (children={})", self.children.len()),
            )
        );
        if self.is_object() {
            let name = self.names.remove(i);
            self.index.remove(&name);
            for v in self.index.values_mut() {
                if *v > i {
                    *v -= 1;
                }
            }
        }
        Ok(self.children.remove(i))
    }

    /// Paths of this node's children. With `expand`, recurses through
    /// OBJECT children and returns fully-qualified paths to everything
    /// below them.
    pub fn paths(&self, expand: bool) -> Vec<String> {
        let mut out = Vec::new();
        if expand {
            self.collect_paths("", &mut out);
        } else {
            out.extend(self.names.iter().cloned());
        }
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, child) in self.names.iter().zip(&self.children) {
            let full = path::join(prefix, name);
            if child.is_object() && !child.children.is_empty() {
                child.collect_paths(&full, out);
            } else {
                out.push(full);
            }
        }
    }

    // ------------------------------------------------------------------
    // set family
    // ------------------------------------------------------------------

    /// Deep copy from `other`. Leaves land compact in fresh or reused owned
    /// storage; byte order is preserved.
    pub fn set_node(&mut self, other: &Node) {
        match other.tag() {
            TypeTag::Empty => self.reset(),
            TypeTag::Object => {
                self.become_object();
                for (name, child) in other.names.iter().zip(&other.children) {
                    self.fetch(name)
                        .expect("fresh object fetch cannot fail")
                        .set_node(child);
                }
            }
            TypeTag::List => {
                self.become_list();
                for child in &other.children {
                    self.append()
                        .expect("append on a list cannot fail")
                        .set_node(child);
                }
            }
            _ => {
                if other.storage.is_none() {
                    // Descriptor-only leaves copy as descriptor-only.
                    self.set_dtype(other.dtype);
                    return;
                }
                let want = other.dtype.compacted_at(0);
                self.prepare_leaf(want);
                let src = other.storage.bytes();
                let eb = other.dtype.element_bytes();
                // The in-place path may keep a descriptor whose byte order
                // differs from the source; reorder element words to match.
                let reorder =
                    self.dtype.endianness().resolve() != other.dtype.endianness().resolve();
                let dtype = self.dtype;
                let out = self.storage.bytes_mut();
                for i in 0..other.dtype.count() {
                    let from = other.dtype.element_index(i);
                    let to = dtype.element_index(i);
                    out[to..to + eb].copy_from_slice(&src[from..from + eb]);
                    if reorder {
                        out[to..to + eb].reverse();
                    }
                }
            }
        }
    }

    /// Adopts a descriptor without storage: the node becomes a leaf (or
    /// composite marker) whose bytes are unset.
    pub fn set_dtype(&mut self, dtype: DataType) {
        self.reset();
        self.dtype = dtype;
    }

    /// Shapes this node per `schema`, allocating one zeroed buffer for the
    /// whole subtree and binding descendant leaves into it.
    pub fn set_schema(&mut self, schema: &Schema) {
        self.reset();
        let buf = vec![0u8; schema.required_bytes()];
        self.adopt_buffer(schema, buf);
    }

    /// Writes a single scalar. Reuses the current layout and storage when
    /// compatible (including external storage, which is what makes bound
    /// trees writable in place); otherwise reinitializes compact and owned.
    pub fn set_scalar<T: Element>(&mut self, value: T) {
        self.prepare_leaf(DataType::scalar(T::TAG));
        let dtype = self.dtype;
        let swap = !dtype.endianness().matches_machine();
        let at = dtype.element_index(0);
        let out = self.storage.bytes_mut();
        value.write_element(&mut out[at..at + dtype.element_bytes()], swap);
    }

    /// Copies a dense slice in. Same reuse rule as [`Node::set_scalar`].
    pub fn set_slice<T: Element>(&mut self, values: &[T]) {
        self.prepare_leaf(DataType::array(T::TAG, values.len()));
        let dtype = self.dtype;
        let swap = !dtype.endianness().matches_machine();
        let eb = dtype.element_bytes();
        let out = self.storage.bytes_mut();
        for (i, v) in values.iter().enumerate() {
            let at = dtype.element_index(i);
            v.write_element(&mut out[at..at + eb], swap);
        }
    }

    /// Stores a UTF-8 string as a `char8_str` leaf.
    pub fn set_string(&mut self, value: &str) {
        self.prepare_leaf(DataType::array(TypeTag::Char8Str, value.len()));
        let dtype = self.dtype;
        let out = self.storage.bytes_mut();
        let stride = dtype.stride();
        for (i, b) in value.bytes().enumerate() {
            out[dtype.offset() + i * stride] = b;
        }
    }

    /// Copies the elements of a strided typed view in; the copy lands dense.
    pub fn set_array<T: Element>(&mut self, view: &DataArray<'_, T>) {
        let values = view.to_vec();
        self.set_slice(&values);
    }

    /// Copy-set `value` at `path`, creating OBJECT nodes along the way.
    pub fn set_path(&mut self, p: &str, value: &Node) -> Result<()> {
        self.fetch(p)?.set_node(value);
        Ok(())
    }

    /// Binds the node at `path` to caller memory, creating OBJECT nodes
    /// along the way.
    ///
    /// # Safety
    ///
    /// Same contract as [`Node::set_external`].
    pub unsafe fn set_path_external(
        &mut self,
        p: &str,
        ptr: *mut u8,
        len: usize,
        dtype: DataType,
    ) -> Result<()> {
        self.fetch(p)?.set_external(ptr, len, dtype)
    }

    /// Binds this node to caller memory described by `dtype`. The node
    /// never frees the pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the whole
    /// life of this node (until it is reset, dropped, or re-set), and no
    /// other code may alias the region while the tree is in use.
    pub unsafe fn set_external(&mut self, ptr: *mut u8, len: usize, dtype: DataType) -> Result<()> {
        ensure!(
            !ptr.is_null(),
            TreeError::new(ErrorKind::InvalidArgument, "external pointer is null")
        );
        ensure!(
            dtype.is_leaf(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!("external binding requires a leaf dtype, got '{}'", dtype.tag().name()),
            )
        );
        ensure!(
            len >= dtype.spanned_bytes(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "external region holds {len} bytes but the descriptor spans {}",
                    dtype.spanned_bytes()
                ),
            )
        );
        self.reset();
        self.dtype = dtype;
        self.storage = Storage::External { ptr, len };
        Ok(())
    }

    /// Binds this node tree to caller memory described by `schema`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Node::set_external`], for every leaf the schema
    /// addresses within `len` bytes of `ptr`.
    pub unsafe fn set_external_schema(
        &mut self,
        ptr: *mut u8,
        len: usize,
        schema: &Schema,
    ) -> Result<()> {
        ensure!(
            !ptr.is_null(),
            TreeError::new(ErrorKind::InvalidArgument, "external pointer is null")
        );
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
        *self = Node::bind_tree(schema, ptr, len, true);
        Ok(())
    }

    /// For every path in `src`, copy-set that path into `self`. OBJECTs
    /// merge recursively; leaves and lists replace wholesale.
    pub fn update(&mut self, src: &Node) -> Result<()> {
        if !src.is_object() {
            self.set_node(src);
            return Ok(());
        }
        if self.is_empty() {
            self.become_object();
        }
        ensure!(
            self.is_object(),
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!("cannot merge an object into a '{}'", self.tag().name()),
            )
        );
        for (name, child) in src.names.iter().zip(&src.children) {
            let target = self.fetch(name)?;
            if child.is_object() && target.is_object() {
                target.update(child)?;
            } else {
                target.set_node(child);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // compaction, serialization, byte order
    // ------------------------------------------------------------------

    /// Rebuilds `dest` as the compact equivalent of this tree: one dense
    /// buffer, strides collapsed, values normalized to machine byte order.
    pub fn compact_to(&self, dest: &mut Node) {
        let mut cursor = 0usize;
        let schema = normalize_schema(&self.schema().compact_to(&mut cursor));
        let mut buf = vec![0u8; cursor];
        let mut at = 0usize;
        self.write_elements(&mut buf, &mut at, true);
        dest.reset();
        dest.adopt_buffer(&schema, buf);
    }

    /// Replaces this tree's storage with its compact equivalent.
    pub fn compact(&mut self) {
        let mut dest = Node::new();
        self.compact_to(&mut dest);
        *self = dest;
    }

    /// Appends exactly `total_bytes_compact()` bytes: a depth-first,
    /// schema-order concatenation of each leaf's content bytes, byte order
    /// preserved verbatim. No framing; the companion schema is required to
    /// interpret the output.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + self.total_bytes_compact(), 0);
        let mut at = start;
        self.write_elements(out, &mut at, false);
    }

    /// See [`Node::serialize_into`].
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize_into(&mut out);
        out
    }

    fn write_elements(&self, out: &mut [u8], at: &mut usize, normalize: bool) {
        if self.dtype.is_leaf() {
            let region = self.storage.bytes();
            let eb = self.dtype.element_bytes();
            if region.len() < self.dtype.spanned_bytes() {
                // Descriptor-only leaves contribute zeros.
                *at += self.dtype.count() * eb;
                return;
            }
            let swap = normalize && !self.dtype.endianness().matches_machine();
            for i in 0..self.dtype.count() {
                let from = self.dtype.element_index(i);
                let dst = &mut out[*at..*at + eb];
                dst.copy_from_slice(&region[from..from + eb]);
                if swap {
                    dst.reverse();
                }
                *at += eb;
            }
        } else {
            for child in &self.children {
                child.write_elements(out, at, normalize);
            }
        }
    }

    /// Converts every leaf to `target` byte order in place and updates the
    /// descriptors.
    pub fn endian_swap(&mut self, target: Endianness) -> Result<()> {
        if self.dtype.is_leaf() {
            if self.dtype.endianness().resolve() != target.resolve() && self.dtype.count() > 0 {
                let eb = self.dtype.element_bytes();
                let dtype = self.dtype;
                if dtype.is_contiguous() {
                    let start = dtype.offset();
                    let span = &mut self.storage.bytes_mut()[start..start + dtype.total_bytes()];
                    crate::endian::swap_in_place(span, eb)?;
                } else {
                    ensure!(
                        matches!(eb, 1 | 2 | 4 | 8),
                        TreeError::new(
                            ErrorKind::InvalidArgument,
                            format!("cannot byte-swap elements of width {eb}; expected 1, 2, 4 or 8"),
                        )
                    );
                    let region = self.storage.bytes_mut();
                    for i in 0..dtype.count() {
                        let at = dtype.element_index(i);
                        region[at..at + eb].reverse();
                    }
                }
            }
            self.dtype = self.dtype.with_endianness(target);
        } else {
            for child in &mut self.children {
                child.endian_swap(target)?;
            }
        }
        Ok(())
    }

    pub fn endian_swap_to_machine_default(&mut self) -> Result<()> {
        self.endian_swap(Endianness::Default)
    }

    pub fn endian_swap_to_little(&mut self) -> Result<()> {
        self.endian_swap(Endianness::Little)
    }

    pub fn endian_swap_to_big(&mut self) -> Result<()> {
        self.endian_swap(Endianness::Big)
    }

    // ------------------------------------------------------------------
    // leaf access
    // ------------------------------------------------------------------

    /// A read-only strided view over this leaf's elements.
    pub fn as_array<T: Element>(&self) -> Result<DataArray<'_, T>> {
        DataArray::new(self.storage.bytes(), self.dtype)
    }

    /// A mutable strided view over this leaf's elements.
    pub fn as_array_mut<T: Element>(&mut self) -> Result<DataArrayMut<'_, T>> {
        DataArrayMut::new(self.storage.bytes_mut(), self.dtype)
    }

    /// Raw pointer to element 0. Requires a dense element layout.
    pub fn as_ptr<T: Element>(&self) -> Result<*const T> {
        ensure!(
            self.dtype.tag() == T::TAG,
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "pointer element type '{}' does not match leaf tag '{}'",
                    T::TAG.name(),
                    self.dtype.tag().name()
                ),
            )
        );
        ensure!(
            self.dtype.is_contiguous(),
            TreeError::new(
                ErrorKind::Layout,
                "raw pointer access requires a compact element layout",
            )
        );
        let region = self.storage.bytes();
        ensure!(
            region.len() >= self.dtype.spanned_bytes(),
            TreeError::new(ErrorKind::InvalidArgument, "backing region too small")
        );
        Ok(region[self.dtype.offset()..].as_ptr() as *const T)
    }

    /// The string value of a `char8_str` leaf. Requires a dense layout and
    /// valid UTF-8.
    pub fn as_str(&self) -> Result<&str> {
        ensure!(
            self.dtype.tag() == TypeTag::Char8Str,
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!("expected a char8_str leaf, found '{}'", self.tag().name()),
            )
        );
        ensure!(
            self.dtype.is_contiguous(),
            TreeError::new(
                ErrorKind::Layout,
                "string access requires a compact element layout",
            )
        );
        let start = self.dtype.offset();
        let bytes = &self.storage.bytes()[start..start + self.dtype.count()];
        std::str::from_utf8(bytes).map_err(|e| {
            TreeError::new(ErrorKind::TypeMismatch, format!("invalid UTF-8 in char8_str: {e}"))
                .into()
        })
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn become_object(&mut self) {
        if !self.is_object() {
            self.reset();
            self.dtype = DataType::object();
        }
    }

    fn become_list(&mut self) {
        if !self.is_list() {
            self.reset();
            self.dtype = DataType::list();
        }
    }

    /// Readies this node as a leaf shaped like `want`. Keeps the current
    /// descriptor and storage when they can absorb the new value in place;
    /// otherwise releases them and allocates fresh compact owned storage.
    fn prepare_leaf(&mut self, want: DataType) {
        let in_place = self.dtype.is_leaf()
            && self.dtype.tag() == want.tag()
            && self.dtype.count() == want.count()
            && self.dtype.element_bytes() == want.element_bytes()
            && !self.storage.is_none()
            && self.storage.len() >= self.dtype.spanned_bytes();
        if in_place {
            return;
        }
        self.reset();
        self.dtype = want;
        self.storage = Storage::Owned(vec![0u8; want.spanned_bytes()]);
    }

    /// Builds a tree over `base` per `schema`. Leaves carry the schema's
    /// absolute offsets; `external` selects caller-owned vs ancestor-owned
    /// pointer semantics.
    pub(crate) fn bind_tree(schema: &Schema, base: *mut u8, len: usize, external: bool) -> Node {
        let mut node = Node::new();
        match schema {
            Schema::Empty => {}
            Schema::Leaf(dt) => {
                node.dtype = *dt;
                node.storage = if external {
                    Storage::External { ptr: base, len }
                } else {
                    Storage::Bound { ptr: base, len }
                };
            }
            Schema::Object(obj) => {
                node.dtype = DataType::object();
                for (name, child) in obj.names().iter().zip(obj.children()) {
                    let i = node.children.len();
                    node.names.push(name.clone());
                    node.index.insert(name.clone(), i);
                    node.children.push(Node::bind_tree(child, base, len, external));
                }
            }
            Schema::List(items) => {
                node.dtype = DataType::list();
                for child in items {
                    node.children.push(Node::bind_tree(child, base, len, external));
                }
            }
        }
        node
    }

    /// Takes ownership of `buf` as the backing for the whole subtree
    /// described by `schema`, binding descendant leaves into it.
    pub(crate) fn adopt_buffer(&mut self, schema: &Schema, buf: Vec<u8>) {
        self.reset();
        match schema {
            Schema::Empty => {}
            Schema::Leaf(dt) => {
                self.dtype = *dt;
                self.storage = Storage::Owned(buf);
            }
            composite => {
                let mut buf = buf;
                let base = buf.as_mut_ptr();
                let len = buf.len();
                let mut bound = Node::bind_tree(composite, base, len, false);
                // The composite root keeps the allocation alive; element
                // access flows only through the children's bound pointers.
                bound.storage = Storage::Owned(buf);
                *self = bound;
            }
        }
    }

    /// Takes ownership of a mapped region as the backing for the subtree
    /// described by `schema`.
    pub(crate) fn adopt_mmap(&mut self, schema: &Schema, mut region: storage::MmapRegion) {
        self.reset();
        let base = region.base_ptr();
        let len = region.len();
        match schema {
            Schema::Empty => {}
            Schema::Leaf(dt) => {
                self.dtype = *dt;
                self.storage = Storage::Mmap(region);
            }
            composite => {
                let mut bound = Node::bind_tree(composite, base, len, false);
                bound.storage = Storage::Mmap(region);
                *self = bound;
            }
        }
    }

    pub(crate) fn region(&self) -> &[u8] {
        self.storage.bytes()
    }

    fn shape_matches(&self, other: &Node) -> bool {
        if self.tag() != other.tag() {
            return false;
        }
        match self.tag() {
            TypeTag::Object => {
                self.names == other.names
                    && self.children.len() == other.children.len()
                    && self
                        .children
                        .iter()
                        .zip(&other.children)
                        .all(|(a, b)| a.shape_matches(b))
            }
            TypeTag::List => {
                self.children.len() == other.children.len()
                    && self
                        .children
                        .iter()
                        .zip(&other.children)
                        .all(|(a, b)| a.shape_matches(b))
            }
            TypeTag::Empty => true,
            _ => self.dtype.count() == other.dtype.count(),
        }
    }

    fn normalized_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.total_bytes_compact()];
        let mut at = 0;
        self.write_elements(&mut out, &mut at, true);
        out
    }
}

/// Resets every leaf's byte-order id to `Default`; used after compaction
/// normalizes values to the machine order.
fn normalize_schema(schema: &Schema) -> Schema {
    match schema {
        Schema::Empty => Schema::Empty,
        Schema::Leaf(dt) => Schema::Leaf(dt.with_endianness(Endianness::Default)),
        Schema::Object(obj) => {
            let mut out = ObjectSchema::new();
            for (name, child) in obj.names().iter().zip(obj.children()) {
                out.insert(name, normalize_schema(child));
            }
            Schema::Object(out)
        }
        Schema::List(items) => Schema::List(items.iter().map(normalize_schema).collect()),
    }
}

/// Equality is semantic: same tag, same shape, and elementwise byte
/// equality after both sides are compacted and normalized to machine byte
/// order.
impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.shape_matches(other) && self.normalized_bytes() == other.normalized_bytes()
    }
}

impl Clone for Node {
    fn clone(&self) -> Node {
        let mut n = Node::new();
        n.set_node(self);
        n
    }
}
