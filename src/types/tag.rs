//! # Type Tags
//!
//! The closed set of node kinds. A tag is either a composite (`Object`,
//! `List`), the empty sentinel, or one of the bitwidth-tagged scalar leaf
//! kinds. Widths are implied by the tag.
//!
//! ## Tag Set
//!
//! | Category | Tags | Natural width |
//! |----------|------|---------------|
//! | Sentinel | Empty | - |
//! | Composite | Object, List | - |
//! | Signed | Int8, Int16, Int32, Int64 | 1, 2, 4, 8 |
//! | Unsigned | UInt8, UInt16, UInt32, UInt64 | 1, 2, 4, 8 |
//! | Float | Float32, Float64 | 4, 8 |
//! | String | Char8Str | 1 |
//!
//! The `#[repr(u8)]` discriminant keeps the tag a single byte in descriptor
//! storage; schema names (`"int8"`, `"float64"`, ...) are the external form.

use eyre::{bail, Result};

use crate::error::{ErrorKind, TreeError};

/// Closed enumeration of leaf scalar kinds and composite kinds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeTag {
    #[default]
    Empty = 0,
    Object = 1,
    List = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    UInt8 = 7,
    UInt16 = 8,
    UInt32 = 9,
    UInt64 = 10,
    Float32 = 11,
    Float64 = 12,
    Char8Str = 13,
}

impl TypeTag {
    /// Natural element width in bytes, `None` for composites and the sentinel.
    pub fn element_bytes(&self) -> Option<usize> {
        match self {
            TypeTag::Int8 | TypeTag::UInt8 | TypeTag::Char8Str => Some(1),
            TypeTag::Int16 | TypeTag::UInt16 => Some(2),
            TypeTag::Int32 | TypeTag::UInt32 | TypeTag::Float32 => Some(4),
            TypeTag::Int64 | TypeTag::UInt64 | TypeTag::Float64 => Some(8),
            TypeTag::Empty | TypeTag::Object | TypeTag::List => None,
        }
    }

    /// True for scalar leaf tags, including `Char8Str`.
    pub fn is_leaf(&self) -> bool {
        self.element_bytes().is_some()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, TypeTag::Object | TypeTag::List)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TypeTag::Empty)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeTag::Int8
                | TypeTag::Int16
                | TypeTag::Int32
                | TypeTag::Int64
                | TypeTag::UInt8
                | TypeTag::UInt16
                | TypeTag::UInt32
                | TypeTag::UInt64
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            TypeTag::Int8 | TypeTag::Int16 | TypeTag::Int32 | TypeTag::Int64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TypeTag::Float32 | TypeTag::Float64)
    }

    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// The schema name of this tag (`"int8"`, `"object"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Empty => "empty",
            TypeTag::Object => "object",
            TypeTag::List => "list",
            TypeTag::Int8 => "int8",
            TypeTag::Int16 => "int16",
            TypeTag::Int32 => "int32",
            TypeTag::Int64 => "int64",
            TypeTag::UInt8 => "uint8",
            TypeTag::UInt16 => "uint16",
            TypeTag::UInt32 => "uint32",
            TypeTag::UInt64 => "uint64",
            TypeTag::Float32 => "float32",
            TypeTag::Float64 => "float64",
            TypeTag::Char8Str => "char8_str",
        }
    }

    pub fn from_name(name: &str) -> Result<TypeTag> {
        match name {
            "empty" => Ok(TypeTag::Empty),
            "object" => Ok(TypeTag::Object),
            "list" => Ok(TypeTag::List),
            "int8" => Ok(TypeTag::Int8),
            "int16" => Ok(TypeTag::Int16),
            "int32" => Ok(TypeTag::Int32),
            "int64" => Ok(TypeTag::Int64),
            "uint8" => Ok(TypeTag::UInt8),
            "uint16" => Ok(TypeTag::UInt16),
            "uint32" => Ok(TypeTag::UInt32),
            "uint64" => Ok(TypeTag::UInt64),
            "float32" => Ok(TypeTag::Float32),
            "float64" => Ok(TypeTag::Float64),
            "char8_str" => Ok(TypeTag::Char8Str),
            other => bail!(TreeError::new(
                ErrorKind::Schema,
                format!("unknown dtype name '{other}'"),
            )),
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TypeTag::Empty),
            1 => Ok(TypeTag::Object),
            2 => Ok(TypeTag::List),
            3 => Ok(TypeTag::Int8),
            4 => Ok(TypeTag::Int16),
            5 => Ok(TypeTag::Int32),
            6 => Ok(TypeTag::Int64),
            7 => Ok(TypeTag::UInt8),
            8 => Ok(TypeTag::UInt16),
            9 => Ok(TypeTag::UInt32),
            10 => Ok(TypeTag::UInt64),
            11 => Ok(TypeTag::Float32),
            12 => Ok(TypeTag::Float64),
            13 => Ok(TypeTag::Char8Str),
            other => bail!(TreeError::new(
                ErrorKind::InvalidArgument,
                format!("invalid type tag discriminant {other}"),
            )),
        }
    }
}
