//! # Typed Accessors and Coercion
//!
//! One generic implementation serves the whole closed scalar set; the named
//! per-tag families (`set_int8`, `as_float64`, `to_uint32`, ...) are thin
//! macro-generated wrappers kept for API ergonomics at the public surface.
//!
//! ## Coercion matrix
//!
//! `to_scalar` (and the `to_<tag>` wrappers) read a single-element leaf with
//! byte-order normalization, then convert by source/destination category:
//!
//! | src \ dst | integer | float |
//! |-----------|---------|-------|
//! | signed | two's-complement truncation | exact widening / nearest |
//! | unsigned | two's-complement truncation | exact widening / nearest |
//! | float | truncate toward zero, saturating at the bounds; NaN -> 0 | platform conversion |
//!
//! Composite nodes and `char8_str` leaves do not coerce to scalars.
//! `to_array` applies the same matrix elementwise into a fresh compact leaf.

use eyre::{bail, ensure, Result};
use paste::paste;

use crate::array::{DataArray, DataArrayMut, Element};
use crate::error::{ErrorKind, TreeError};
use crate::types::TypeTag;

use super::Node;

/// A scalar read out of a leaf, categorized for conversion.
#[derive(Debug, Clone, Copy)]
enum ScalarValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl ScalarValue {
    fn convert<T: Element>(self) -> T {
        match self {
            ScalarValue::Signed(v) => T::from_i64_wrapping(v),
            ScalarValue::Unsigned(v) => T::from_u64_wrapping(v),
            ScalarValue::Float(v) => T::from_f64_saturating(v),
        }
    }
}

impl Node {
    fn read_scalar(&self, i: usize) -> Result<ScalarValue> {
        let tag = self.dtype().tag();
        ensure!(
            tag.is_number(),
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!("cannot coerce a '{}' to a scalar", tag.name()),
            )
        );
        Ok(match tag {
            TypeTag::Int8 => ScalarValue::Signed(self.as_array::<i8>()?.get(i) as i64),
            TypeTag::Int16 => ScalarValue::Signed(self.as_array::<i16>()?.get(i) as i64),
            TypeTag::Int32 => ScalarValue::Signed(self.as_array::<i32>()?.get(i) as i64),
            TypeTag::Int64 => ScalarValue::Signed(self.as_array::<i64>()?.get(i)),
            TypeTag::UInt8 => ScalarValue::Unsigned(self.as_array::<u8>()?.get(i) as u64),
            TypeTag::UInt16 => ScalarValue::Unsigned(self.as_array::<u16>()?.get(i) as u64),
            TypeTag::UInt32 => ScalarValue::Unsigned(self.as_array::<u32>()?.get(i) as u64),
            TypeTag::UInt64 => ScalarValue::Unsigned(self.as_array::<u64>()?.get(i)),
            TypeTag::Float32 => ScalarValue::Float(self.as_array::<f32>()?.get(i) as f64),
            TypeTag::Float64 => ScalarValue::Float(self.as_array::<f64>()?.get(i)),
            _ => unreachable!("guarded by is_number"),
        })
    }

    /// Coerces a single-element numeric leaf into `T` per the module's
    /// conversion matrix.
    pub fn to_scalar<T: Element>(&self) -> Result<T> {
        ensure!(
            self.dtype().count() == 1,
            TreeError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "scalar coercion requires a single element, leaf holds {}",
                    self.dtype().count()
                ),
            )
        );
        Ok(self.read_scalar(0)?.convert())
    }

    /// Elementwise coercion into `dest`, which becomes a fresh compact leaf
    /// of the same length.
    pub fn to_array<T: Element>(&self, dest: &mut Node) -> Result<()> {
        if self.dtype().count() > 0 {
            // Validates tag and layout once up front.
            self.read_scalar(0)?;
        } else {
            let tag = self.dtype().tag();
            if !tag.is_number() {
                bail!(TreeError::new(
                    ErrorKind::TypeMismatch,
                    format!("cannot coerce a '{}' to a scalar array", tag.name()),
                ));
            }
        }
        let mut values = Vec::with_capacity(self.dtype().count());
        for i in 0..self.dtype().count() {
            values.push(self.read_scalar(i)?.convert::<T>());
        }
        dest.set_slice(&values);
        Ok(())
    }
}

macro_rules! typed_accessors {
    ($($name:ident : $t:ty),* $(,)?) => {
        paste! {
            impl Node {
                $(
                    #[doc = concat!("Sets this node to a single `", stringify!($name), "` value.")]
                    pub fn [<set_ $name>](&mut self, value: $t) {
                        self.set_scalar(value)
                    }

                    #[doc = concat!("Sets this node to a dense `", stringify!($name), "` array.")]
                    pub fn [<set_ $name _slice>](&mut self, values: &[$t]) {
                        self.set_slice(values)
                    }

                    #[doc = concat!("A read-only strided view over a `", stringify!($name), "` leaf.")]
                    pub fn [<as_ $name>](&self) -> Result<DataArray<'_, $t>> {
                        self.as_array()
                    }

                    #[doc = concat!("A mutable strided view over a `", stringify!($name), "` leaf.")]
                    pub fn [<as_ $name _mut>](&mut self) -> Result<DataArrayMut<'_, $t>> {
                        self.as_array_mut()
                    }

                    #[doc = concat!("Raw pointer to element 0 of a dense `", stringify!($name), "` leaf.")]
                    pub fn [<as_ $name _ptr>](&self) -> Result<*const $t> {
                        self.as_ptr()
                    }

                    #[doc = concat!("Coerces a single-element leaf to `", stringify!($t), "`.")]
                    pub fn [<to_ $name>](&self) -> Result<$t> {
                        self.to_scalar()
                    }

                    #[doc = concat!("Elementwise coercion into a fresh `", stringify!($name), "` leaf.")]
                    pub fn [<to_ $name _array>](&self, dest: &mut Node) -> Result<()> {
                        self.to_array::<$t>(dest)
                    }
                )*
            }

            $(
                impl From<$t> for Node {
                    fn from(value: $t) -> Node {
                        let mut n = Node::new();
                        n.set_scalar(value);
                        n
                    }
                }

                impl From<&[$t]> for Node {
                    fn from(values: &[$t]) -> Node {
                        let mut n = Node::new();
                        n.set_slice(values);
                        n
                    }
                }
            )*
        }
    };
}

typed_accessors! {
    int8: i8,
    int16: i16,
    int32: i32,
    int64: i64,
    uint8: u8,
    uint16: u16,
    uint32: u32,
    uint64: u64,
    float32: f32,
    float64: f64,
}

impl From<&str> for Node {
    fn from(value: &str) -> Node {
        let mut n = Node::new();
        n.set_string(value);
        n
    }
}
