//! # Leaf Layout Descriptors
//!
//! A [`DataType`] describes how a leaf's elements sit in a raw byte region:
//! (tag, count, offset, stride, element_bytes, endianness). It is a pure
//! value; no bytes are attached.
//!
//! ## Layout Arithmetic
//!
//! ```text
//! element i:           base + offset + i * stride
//! strided footprint:   (count - 1) * stride + element_bytes    (count > 0)
//! spanned bytes:       offset + strided footprint
//! content bytes:       count * element_bytes
//! ```
//!
//! A descriptor is *contiguous* when `stride == element_bytes`; the backing
//! region then holds the elements densely starting at `offset`. "Compact"
//! across a whole tree additionally requires offsets to pack with no holes;
//! that judgement lives in [`crate::schema::Schema`], which can see the
//! containing window.

use eyre::{bail, ensure, Result};

use crate::endian::Endianness;
use crate::error::{ErrorKind, TreeError};
use crate::types::tag::TypeTag;

/// A leaf's layout descriptor. Composite and empty nodes use the canonical
/// descriptors from [`DataType::object`], [`DataType::list`] and
/// [`DataType::empty`], which carry no storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    tag: TypeTag,
    count: usize,
    offset: usize,
    stride: usize,
    element_bytes: usize,
    endianness: Endianness,
}

impl DataType {
    /// Builds a leaf descriptor, validating the layout invariants.
    pub fn new(
        tag: TypeTag,
        count: usize,
        offset: usize,
        stride: usize,
        element_bytes: usize,
        endianness: Endianness,
    ) -> Result<DataType> {
        ensure!(
            tag.is_leaf(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!("'{}' is not a leaf tag", tag.name()),
            )
        );
        ensure!(
            element_bytes >= 1,
            TreeError::new(ErrorKind::InvalidArgument, "element_bytes must be at least 1")
        );
        if stride < element_bytes {
            bail!(TreeError::new(
                ErrorKind::Schema,
                format!("stride {stride} is smaller than element_bytes {element_bytes}"),
            ));
        }
        Ok(DataType {
            tag,
            count,
            offset,
            stride,
            element_bytes,
            endianness,
        })
    }

    /// A compact single-element descriptor at offset 0.
    pub fn scalar(tag: TypeTag) -> DataType {
        DataType::array(tag, 1)
    }

    /// A compact `count`-element descriptor at offset 0.
    pub fn array(tag: TypeTag, count: usize) -> DataType {
        let width = tag
            .element_bytes()
            .expect("composite tags have no array layout");
        DataType {
            tag,
            count,
            offset: 0,
            stride: width,
            element_bytes: width,
            endianness: Endianness::Default,
        }
    }

    pub fn empty() -> DataType {
        DataType {
            tag: TypeTag::Empty,
            count: 0,
            offset: 0,
            stride: 0,
            element_bytes: 0,
            endianness: Endianness::Default,
        }
    }

    pub fn object() -> DataType {
        DataType {
            tag: TypeTag::Object,
            ..DataType::empty()
        }
    }

    pub fn list() -> DataType {
        DataType {
            tag: TypeTag::List,
            ..DataType::empty()
        }
    }

    /// Canonical compact descriptor for a schema type name.
    ///
    /// Leaf names yield single-element descriptors; `"object"` and `"list"`
    /// yield the composite markers.
    pub fn default_dtype(name: &str) -> Result<DataType> {
        let tag = TypeTag::from_name(name)?;
        Ok(match tag {
            TypeTag::Empty => DataType::empty(),
            TypeTag::Object => DataType::object(),
            TypeTag::List => DataType::list(),
            leaf => DataType::scalar(leaf),
        })
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn element_bytes(&self) -> usize {
        self.element_bytes
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn is_leaf(&self) -> bool {
        self.tag.is_leaf()
    }

    pub fn is_empty(&self) -> bool {
        self.tag.is_empty()
    }

    /// Byte offset of element `i` from the base of the containing region.
    pub fn element_index(&self, i: usize) -> usize {
        self.offset + i * self.stride
    }

    /// Bytes covered from element 0 through the end of the last element,
    /// excluding the leading `offset`. Zero for empty leaves.
    pub fn total_bytes(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            (self.count - 1) * self.stride + self.element_bytes
        }
    }

    /// Bytes a backing region must hold for every element to be addressable:
    /// `offset + total_bytes()`.
    pub fn spanned_bytes(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            self.offset + self.total_bytes()
        }
    }

    /// Content bytes with all striding collapsed: `count * element_bytes`.
    pub fn total_bytes_compact(&self) -> usize {
        self.count * self.element_bytes
    }

    /// True when elements sit densely (`stride == element_bytes`).
    pub fn is_contiguous(&self) -> bool {
        self.stride == self.element_bytes
    }

    /// True when elements are dense *and* start at the base of the region.
    pub fn is_compact(&self) -> bool {
        self.is_contiguous() && self.offset == 0
    }

    /// Whether a `set` into storage shaped by `self` can reuse that storage
    /// for a value shaped by `other`: both leaves, same tag, same content
    /// footprint.
    pub fn compatible_storage(&self, other: &DataType) -> bool {
        self.tag.is_leaf()
            && self.tag == other.tag
            && self.total_bytes_compact() == other.total_bytes_compact()
    }

    /// This descriptor rewritten compact at `offset`, same tag, count and
    /// endianness.
    pub fn compacted_at(&self, offset: usize) -> DataType {
        DataType {
            tag: self.tag,
            count: self.count,
            offset,
            stride: self.element_bytes,
            element_bytes: self.element_bytes,
            endianness: self.endianness,
        }
    }

    /// Same layout, different byte-order id.
    pub fn with_endianness(&self, endianness: Endianness) -> DataType {
        DataType { endianness, ..*self }
    }

    /// Same layout, re-based at `offset`.
    pub fn with_offset(&self, offset: usize) -> DataType {
        DataType { offset, ..*self }
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::empty()
    }
}
