//! # Error Taxonomy
//!
//! Canopy reports failures through `eyre::Result`, carrying a typed
//! [`TreeError`] payload so callers can dispatch on the failure category
//! with `err.downcast_ref::<TreeError>()`.
//!
//! ## Error Kinds
//!
//! | Kind | Raised by |
//! |------|-----------|
//! | `InvalidArgument` | element widths outside {1,2,4,8}, undersized buffers |
//! | `TypeMismatch` | accessor tag vs leaf tag, view element size vs `element_bytes`, composite-to-scalar coercion |
//! | `Layout` | raw-pointer access on a non-compact leaf |
//! | `Schema` | malformed schema documents, unknown dtype names, `stride < element_bytes` |
//! | `Path` | a mid-path leaf where an OBJECT is required |
//! | `Io` | file open/read/write/mmap failures |
//! | `Parse` | upstream JSON tokenizer failures |
//!
//! Lookups are not errors: `get` returns the empty sentinel and `has_path`
//! returns `false` for missing paths. Drop paths never fail.

use std::fmt;

/// Failure categories for tree operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    TypeMismatch,
    Layout,
    Schema,
    Path,
    Io,
    Parse,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::Layout => "layout error",
            ErrorKind::Schema => "schema error",
            ErrorKind::Path => "path error",
            ErrorKind::Io => "io error",
            ErrorKind::Parse => "parse error",
        }
    }
}

/// Typed error payload carried inside `eyre::Report`.
///
/// `path` is the `/`-separated tree location the failure refers to, when one
/// is meaningful at the failure site.
#[derive(Debug)]
pub struct TreeError {
    pub kind: ErrorKind,
    pub path: Option<String>,
    pub message: String,
}

impl TreeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            message: message.into(),
        }
    }

    pub fn with_path(kind: ErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} at '{}': {}", self.kind.name(), path, self.message),
            None => write!(f, "{}: {}", self.kind.name(), self.message),
        }
    }
}

impl std::error::Error for TreeError {}
