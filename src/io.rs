//! # File Persistence
//!
//! The `pair` protocol writes two sibling files for a tree rooted at a
//! base path:
//!
//! ```text
//! <path>.schema.json    detailed schema of the compact layout, no values
//! <path>.bin            the serialized bytes, exactly total_bytes_compact
//! ```
//!
//! `load` rebuilds an owning tree from the pair. `mmap` opens `<path>.bin`
//! read/write and binds a tree onto the mapping, so leaf writes land in the
//! file through the OS page cache.
//!
//! The binary file is frameless; the schema file is required to interpret
//! it. Mapping with a foreign schema is possible through
//! [`Node::mmap_with_schema`] when the caller knows the layout from
//! elsewhere.
//!
//! File failures carry [`ErrorKind::Io`] with the path and operation; the
//! OS error stays in the chain.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};

use crate::emit::{schema_to_json, JsonOpts};
use crate::error::{ErrorKind, TreeError};
use crate::generator::{Generator, Protocol};
use crate::node::storage::MmapRegion;
use crate::node::Node;
use crate::schema::Schema;

fn schema_path(base: &Path) -> PathBuf {
    PathBuf::from(format!("{}.schema.json", base.display()))
}

fn bin_path(base: &Path) -> PathBuf {
    PathBuf::from(format!("{}.bin", base.display()))
}

fn io_context(op: &str, path: &Path) -> TreeError {
    TreeError::new(ErrorKind::Io, format!("failed to {op} '{}'", path.display()))
}

fn read_schema_file(base: &Path) -> Result<Schema> {
    let path = schema_path(base);
    let text = fs::read_to_string(&path).wrap_err(io_context("read schema file", &path))?;
    Generator::new(&text, Protocol::Detailed).parse_schema()
}

impl Node {
    /// Writes this tree as a `pair`: `<path>.schema.json` + `<path>.bin`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let base = path.as_ref();

        let mut cursor = 0usize;
        let compact_schema = self.schema().compact_to(&mut cursor);
        let mut schema_text = String::new();
        schema_to_json(&compact_schema, &JsonOpts::default(), 0, &mut schema_text);

        let spath = schema_path(base);
        fs::write(&spath, schema_text).wrap_err(io_context("write schema file", &spath))?;

        let bpath = bin_path(base);
        fs::write(&bpath, self.serialize()).wrap_err(io_context("write data file", &bpath))?;

        Ok(())
    }

    /// Rebuilds a tree from a `pair` written by [`Node::save`]. The
    /// returned tree owns its buffer.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Node> {
        let base = path.as_ref();
        let schema = read_schema_file(base)?;

        let bpath = bin_path(base);
        let buf = fs::read(&bpath).wrap_err(io_context("read data file", &bpath))?;
        ensure!(
            buf.len() >= schema.required_bytes(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "data file '{}' holds {} bytes but the schema requires {}",
                    bpath.display(),
                    buf.len(),
                    schema.required_bytes()
                ),
            )
        );

        let mut node = Node::new();
        node.adopt_buffer(&schema, buf);
        Ok(node)
    }

    /// Maps `<path>.bin` read/write and binds a tree onto it using the
    /// sibling schema file.
    pub fn mmap<P: AsRef<Path>>(path: P) -> Result<Node> {
        let base = path.as_ref();
        let schema = read_schema_file(base)?;
        Node::mmap_with_schema(base, &schema)
    }

    /// Maps `<path>.bin` read/write and binds a tree onto it per `schema`.
    pub fn mmap_with_schema<P: AsRef<Path>>(path: P, schema: &Schema) -> Result<Node> {
        let base = path.as_ref();
        let bpath = bin_path(base);
        let region = MmapRegion::open(&bpath).wrap_err(io_context("memory-map data file", &bpath))?;
        ensure!(
            region.len() >= schema.required_bytes(),
            TreeError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "mapped file holds {} bytes but the schema requires {}",
                    region.len(),
                    schema.required_bytes()
                ),
            )
        );
        let mut node = Node::new();
        node.adopt_mmap(schema, region);
        Ok(node)
    }
}
