//! # Strided Typed Views
//!
//! [`DataArray`] and [`DataArrayMut`] are lightweight views pairing a raw
//! byte region with a [`DataType`]. Element access walks
//! `offset + i * stride` and swaps byte order on the fly when the descriptor
//! disagrees with the machine, so a view over foreign-endian or strided data
//! reads exactly like a dense native slice.
//!
//! The [`Element`] trait is sealed over the closed scalar set; one generic
//! implementation serves every tag, and the typed convenience accessors on
//! `Node` are thin wrappers over it.
//!
//! ## Zero-copy fast path
//!
//! When the descriptor is contiguous and machine-endian, [`DataArray::as_slice`]
//! reinterprets the region as `&[T]` through `zerocopy` instead of copying
//! element by element. Alignment is checked at runtime; callers fall back to
//! [`DataArray::to_vec`] when the region is not naturally aligned.

use std::marker::PhantomData;

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{ErrorKind, TreeError};
use crate::types::{DataType, TypeTag};

mod sealed {
    pub trait Sealed {}
}

/// A scalar element of the closed type set.
///
/// Implemented for the ten numeric scalar types; `Char8Str` leaves are
/// accessed as strings through `Node`, not element views.
pub trait Element:
    sealed::Sealed + Copy + PartialEq + FromBytes + IntoBytes + Immutable + KnownLayout + 'static
{
    const TAG: TypeTag;

    /// Reads one element from exactly `size_of::<Self>()` bytes, reversing
    /// byte order when `swap` is set.
    fn read_element(bytes: &[u8], swap: bool) -> Self;

    /// Writes one element into exactly `size_of::<Self>()` bytes, reversing
    /// byte order when `swap` is set.
    fn write_element(self, out: &mut [u8], swap: bool);

    /// Saturating conversion; NaN becomes zero.
    fn from_f64_saturating(v: f64) -> Self;
    /// Two's-complement truncation.
    fn from_i64_wrapping(v: i64) -> Self;
    /// Two's-complement truncation.
    fn from_u64_wrapping(v: u64) -> Self;
}

macro_rules! impl_element {
    ($($t:ty => $tag:expr),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl Element for $t {
                const TAG: TypeTag = $tag;

                fn read_element(bytes: &[u8], swap: bool) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    if swap {
                        raw.reverse();
                    }
                    <$t>::from_ne_bytes(raw)
                }

                fn write_element(self, out: &mut [u8], swap: bool) {
                    let mut raw = self.to_ne_bytes();
                    if swap {
                        raw.reverse();
                    }
                    out.copy_from_slice(&raw);
                }

                fn from_f64_saturating(v: f64) -> Self {
                    v as $t
                }

                fn from_i64_wrapping(v: i64) -> Self {
                    v as $t
                }

                fn from_u64_wrapping(v: u64) -> Self {
                    v as $t
                }
            }
        )*
    };
}

impl_element! {
    i8  => TypeTag::Int8,
    i16 => TypeTag::Int16,
    i32 => TypeTag::Int32,
    i64 => TypeTag::Int64,
    u8  => TypeTag::UInt8,
    u16 => TypeTag::UInt16,
    u32 => TypeTag::UInt32,
    u64 => TypeTag::UInt64,
    f32 => TypeTag::Float32,
    f64 => TypeTag::Float64,
}

fn check_view<T: Element>(data: &[u8], dtype: &DataType) -> Result<bool> {
    ensure!(
        dtype.tag() == T::TAG,
        TreeError::new(
            ErrorKind::TypeMismatch,
            format!(
                "view element type '{}' does not match leaf tag '{}'",
                T::TAG.name(),
                dtype.tag().name()
            ),
        )
    );
    ensure!(
        std::mem::size_of::<T>() == dtype.element_bytes(),
        TreeError::new(
            ErrorKind::TypeMismatch,
            format!(
                "view element size {} does not match element_bytes {}",
                std::mem::size_of::<T>(),
                dtype.element_bytes()
            ),
        )
    );
    ensure!(
        data.len() >= dtype.spanned_bytes(),
        TreeError::new(
            ErrorKind::InvalidArgument,
            format!(
                "backing region holds {} bytes but the descriptor spans {}",
                data.len(),
                dtype.spanned_bytes()
            ),
        )
    );
    Ok(!dtype.endianness().matches_machine())
}

/// Read-only strided view over a leaf's bytes.
#[derive(Debug, Clone, Copy)]
pub struct DataArray<'a, T: Element> {
    data: &'a [u8],
    dtype: DataType,
    swap: bool,
    _marker: PhantomData<T>,
}

impl<'a, T: Element> DataArray<'a, T> {
    /// Binds a typed view to `data` described by `dtype`.
    pub fn new(data: &'a [u8], dtype: DataType) -> Result<Self> {
        let swap = check_view::<T>(data, &dtype)?;
        Ok(Self {
            data,
            dtype,
            swap,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.dtype.count()
    }

    pub fn is_empty(&self) -> bool {
        self.dtype.count() == 0
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    /// Reads element `i`, swapping byte order if the descriptor requires it.
    ///
    /// Panics when `i` is out of bounds, like slice indexing.
    pub fn get(&self, i: usize) -> T {
        assert!(
            i < self.dtype.count(),
            "element index {i} out of bounds (count={})",
            self.dtype.count()
        );
        let at = self.dtype.element_index(i);
        T::read_element(&self.data[at..at + self.dtype.element_bytes()], self.swap)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Copies the elements out into a dense, machine-endian vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Zero-copy reinterpretation as `&[T]`.
    ///
    /// Available only when the elements are contiguous, machine-endian and
    /// the region is naturally aligned for `T`; otherwise `None`.
    pub fn as_slice(&self) -> Option<&'a [T]> {
        if self.swap || !self.dtype.is_contiguous() {
            return None;
        }
        let start = self.dtype.offset();
        let bytes = &self.data[start..start + self.dtype.total_bytes_compact()];
        <[T]>::ref_from_bytes(bytes).ok()
    }
}

/// Mutable strided view over a leaf's bytes.
#[derive(Debug)]
pub struct DataArrayMut<'a, T: Element> {
    data: &'a mut [u8],
    dtype: DataType,
    swap: bool,
    _marker: PhantomData<T>,
}

impl<'a, T: Element> DataArrayMut<'a, T> {
    pub fn new(data: &'a mut [u8], dtype: DataType) -> Result<Self> {
        let swap = check_view::<T>(data, &dtype)?;
        Ok(Self {
            data,
            dtype,
            swap,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.dtype.count()
    }

    pub fn is_empty(&self) -> bool {
        self.dtype.count() == 0
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn get(&self, i: usize) -> T {
        assert!(
            i < self.dtype.count(),
            "element index {i} out of bounds (count={})",
            self.dtype.count()
        );
        let at = self.dtype.element_index(i);
        T::read_element(&self.data[at..at + self.dtype.element_bytes()], self.swap)
    }

    /// Writes element `i` in the descriptor's byte order.
    ///
    /// Panics when `i` is out of bounds, like slice indexing.
    pub fn set(&mut self, i: usize, value: T) {
        assert!(
            i < self.dtype.count(),
            "element index {i} out of bounds (count={})",
            self.dtype.count()
        );
        let at = self.dtype.element_index(i);
        value.write_element(
            &mut self.data[at..at + self.dtype.element_bytes()],
            self.swap,
        );
    }

    /// Copies a dense machine-endian slice in, element by element, honoring
    /// stride and byte order. Lengths must match.
    pub fn copy_from_slice(&mut self, src: &[T]) -> Result<()> {
        ensure!(
            src.len() == self.len(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "source has {} elements but the view holds {}",
                    src.len(),
                    self.len()
                ),
            )
        );
        for (i, v) in src.iter().enumerate() {
            self.set(i, *v);
        }
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        for i in 0..self.len() {
            self.set(i, value);
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}
