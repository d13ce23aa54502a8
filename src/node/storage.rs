//! # Node Storage Variants
//!
//! The storage discriminator is authoritative for resource ownership: the
//! drop path dispatches on the variant, so owned allocations are freed,
//! memory maps are released through the OS, and borrowed pointers are left
//! alone. There is no flag bookkeeping to get out of sync.
//!
//! | Variant | Bytes live in | Freed on drop |
//! |---------|---------------|---------------|
//! | `None` | nowhere (composites, empty) | - |
//! | `Owned` | a tree-owned allocation | yes |
//! | `Bound` | an ancestor node's allocation | no (the ancestor frees) |
//! | `External` | caller-provided memory | no |
//! | `Mmap` | a memory-mapped file | unmapped |
//!
//! `Bound` and `External` have identical mechanics (a raw base pointer and a
//! length) but different ownership meaning: `Bound` aliases a buffer some
//! ancestor in the same tree owns, `External` aliases caller memory whose
//! lifetime the caller guarantees. Only `External` makes
//! `Node::is_data_external` report true.
//!
//! ## Aliasing discipline
//!
//! A composite node that owns a buffer for its leaf descendants never reads
//! that buffer through its own storage; all element access flows through the
//! leaves' `Bound` pointers. The owning `Vec` (or map) is held purely so the
//! allocation lives exactly as long as the tree, and it is never resized
//! while children are bound, so the base pointer stays stable.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

/// A writable memory-mapped file region backing a node tree.
#[derive(Debug)]
pub struct MmapRegion {
    map: MmapMut,
    path: PathBuf,
}

impl MmapRegion {
    /// Opens `path` read/write and maps the whole file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open data file '{}'", path.display()))?;

        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?;

        ensure!(
            metadata.len() > 0,
            "cannot map empty data file '{}'",
            path.display()
        );

        // SAFETY: MmapMut::map_mut is unsafe because externally-modified
        // mappings lead to undefined behavior. This is safe because:
        // 1. The file is opened read+write by this process for data it wrote
        // 2. The mapping's lifetime is tied to MmapRegion, which the owning
        //    node tree keeps alive for as long as any bound leaf exists
        // 3. All access is bounds-checked against the mapped length
        let map = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            map,
            path: path.to_path_buf(),
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_ptr(&mut self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Flushes dirty pages back to the file.
    pub fn sync(&self) -> Result<()> {
        self.map
            .flush()
            .wrap_err_with(|| format!("failed to sync mmap for '{}'", self.path.display()))
    }
}

/// Where a node's bytes live. See the module docs for the variant table.
#[derive(Debug, Default)]
pub enum Storage {
    #[default]
    None,
    Owned(Vec<u8>),
    Bound {
        ptr: *mut u8,
        len: usize,
    },
    External {
        ptr: *mut u8,
        len: usize,
    },
    Mmap(MmapRegion),
}

impl Storage {
    pub fn len(&self) -> usize {
        match self {
            Storage::None => 0,
            Storage::Owned(buf) => buf.len(),
            Storage::Bound { len, .. } | Storage::External { len, .. } => *len,
            Storage::Mmap(region) => region.len(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Storage::None)
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Storage::Owned(_))
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Storage::External { .. })
    }

    pub fn is_mmapped(&self) -> bool {
        matches!(self, Storage::Mmap(_))
    }

    /// The byte region this storage describes. Empty for `None`.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Storage::None => &[],
            Storage::Owned(buf) => buf,
            // SAFETY: constructing a shared slice from the raw base is safe
            // because:
            // 1. Bound pointers target an ancestor-owned allocation that
            //    outlives this node (children are part of the tree) and is
            //    never resized while bound
            // 2. External pointers are covered by the caller contract of
            //    `set_external`: the memory outlives the node and is valid
            //    for `len` bytes
            // 3. The tree is single-writer by contract, so no &mut alias is
            //    live while this shared borrow exists
            Storage::Bound { ptr, len } | Storage::External { ptr, len } => unsafe {
                std::slice::from_raw_parts(*ptr, *len)
            },
            Storage::Mmap(region) => region.bytes(),
        }
    }

    /// Mutable access to the byte region. Empty for `None`.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::None => &mut [],
            Storage::Owned(buf) => buf,
            // SAFETY: as in `bytes`, plus exclusivity: this method takes
            // `&mut self`, and the single-threaded tree contract means no
            // other reference into the shared base is live for the duration
            // of the returned borrow.
            Storage::Bound { ptr, len } | Storage::External { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(*ptr, *len)
            },
            Storage::Mmap(region) => region.bytes_mut(),
        }
    }
}
