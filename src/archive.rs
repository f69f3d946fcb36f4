//! Zip container with duplicate elision for export
//!
//! [`ZipSeen`] wraps a zip writer with a set of archive-relative paths that
//! are considered already delivered. Paths belonging to catalogs the
//! recipient is known to possess are marked via [`ZipSeen::ignore`] without
//! writing anything; [`ZipSeen::add`] then skips every path seen before, so
//! each object lands in the archive at most once.

use crate::error::Result;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip writer that elides entries the recipient already has
pub struct ZipSeen<W: Write + Seek> {
    writer: ZipWriter<W>,
    seen: HashSet<String>,
    options: FileOptions,
}

impl<W: Write + Seek> ZipSeen<W> {
    /// Wrap a writer; `compress` selects deflate over stored entries
    pub fn new(inner: W, compress: bool) -> Self {
        let method = if compress {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        Self {
            writer: ZipWriter::new(inner),
            seen: HashSet::new(),
            options: FileOptions::default().compression_method(method),
        }
    }

    /// Mark an archive-relative path as already delivered
    pub fn ignore(&mut self, relative: &str) {
        self.seen.insert(relative.to_string());
    }

    /// Add the file at `full` under `relative`, unless seen before
    pub fn add(&mut self, full: &Path, relative: &str) -> Result<()> {
        if self.seen.contains(relative) {
            return Ok(());
        }
        self.seen.insert(relative.to_string());

        let mut source = File::open(full)?;
        self.writer.start_file(relative, self.options)?;
        io::copy(&mut source, &mut self.writer)?;
        Ok(())
    }

    /// Finalize the archive
    pub fn finish(mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}

impl ZipSeen<File> {
    /// Create an archive file at `path`
    pub fn create(path: &Path, compress: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(File::create(path)?, compress))
    }
}
