//! Content-addressed object library
//!
//! Objects are immutable files keyed by their content digest and stored in a
//! sharded directory tree: `<library>/<aa>/<bb>/<cc>/<digest>`. Insertion is
//! atomic (same-directory temp plus rename) and prefers hardlinking the
//! source straight into the library, which makes recording a staged tree
//! mostly a metadata operation. Every published object gets a pinned mtime,
//! so a materialized hardlink can later be told apart from a file the user
//! has modified.

use crate::digest::digest_file;
use crate::error::{HolotreeError, Result};
use crate::pathops;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::trace;

/// Canonical mtime of every library object (seconds since the Unix epoch)
///
/// A materialized file whose mtime still equals this value is an untouched
/// hardlink of its library object.
pub const OBJECT_EPOCH: i64 = 1610000000;

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Archive-relative path of an object, mirroring the on-disk sharding
///
/// Export archives place objects under this path so that unzipping into a
/// hololib root lands them at their canonical location.
pub fn relative_location(digest: &str) -> String {
    format!(
        "library/{}/{}/{}/{}",
        &digest[0..2],
        &digest[2..4],
        &digest[4..6],
        digest
    )
}

/// Sharded store of immutable content-addressed objects
#[derive(Debug, Clone)]
pub struct ObjectLibrary {
    root: PathBuf,
}

impl ObjectLibrary {
    /// Create a handle over the library root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Shard directory holding the object for `digest`
    pub fn location(&self, digest: &str) -> PathBuf {
        self.root
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(&digest[4..6])
    }

    /// Canonical full path of the object for `digest`
    pub fn exact_location(&self, digest: &str) -> PathBuf {
        self.location(digest).join(digest)
    }

    /// Whether the object for `digest` is present
    pub fn has_object(&self, digest: &str) -> bool {
        digest.len() >= 6 && self.exact_location(digest).is_file()
    }

    /// Insert the file at `source` as the object for `digest`
    ///
    /// The object lands through a same-directory temp name and an atomic
    /// rename. Hardlinking the source is attempted first; on filesystems
    /// that refuse (or across devices) the bytes are copied instead. Losing
    /// an insertion race to another writer of the same digest is success.
    ///
    /// Returns `true` when the published object shares its inode with the
    /// source file.
    pub fn insert(&self, source: &Path, digest: &str) -> Result<bool> {
        let target = self.exact_location(digest);
        if target.is_file() {
            return Ok(false);
        }
        let shard = self.location(digest);
        fs::create_dir_all(&shard)?;

        let linked = match self.link_into(source, digest, &target) {
            Ok(()) => true,
            Err(_) => {
                self.copy_into(source, &shard, &target)?;
                false
            }
        };

        // mode bits are catalog metadata; the object may share an inode
        // with the staged source
        pathops::touch_when(&target, OBJECT_EPOCH)?;
        trace!("Inserted object {} (linked: {})", &digest[..8.min(digest.len())], linked);
        Ok(linked)
    }

    fn link_into(&self, source: &Path, digest: &str, target: &Path) -> Result<()> {
        let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .location(digest)
            .join(format!("{digest}.t{}-{sequence}", std::process::id()));
        fs::hard_link(source, &temp)?;
        if let Err(err) = fs::rename(&temp, target) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(())
    }

    fn copy_into(&self, source: &Path, shard: &Path, target: &Path) -> Result<()> {
        let mut reader = File::open(source)?;
        let mut temp = NamedTempFile::new_in(shard)?;
        io::copy(&mut reader, temp.as_file_mut())?;
        temp.as_file().sync_all()?;
        temp.persist(target)
            .map_err(|err| HolotreeError::Io(err.error))?;
        Ok(())
    }

    /// Verify the stored object still hashes to its digest
    pub fn integrity(&self, digest: &str) -> Result<()> {
        let location = self.exact_location(digest);
        if !location.is_file() {
            return Err(HolotreeError::ObjectNotFound(digest.to_string()));
        }
        let actual = digest_file(&location)?;
        if actual != digest {
            return Err(HolotreeError::HashMismatch {
                expected: digest.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Stream the content of the object for `digest`
    ///
    /// Objects are stored as raw bytes; any transport compression is the
    /// caller's concern.
    pub fn open(&self, digest: &str) -> Result<BufReader<File>> {
        let location = self.exact_location(digest);
        if !location.is_file() {
            return Err(HolotreeError::ObjectNotFound(digest.to_string()));
        }
        Ok(BufReader::new(File::open(location)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_bytes;
    use std::io::Read;
    use tempfile::TempDir;

    fn library_with_source(content: &[u8]) -> (TempDir, ObjectLibrary, PathBuf, String) {
        let temp_dir = TempDir::new().unwrap();
        let library = ObjectLibrary::new(temp_dir.path().join("library"));
        let source = temp_dir.path().join("source.bin");
        fs::write(&source, content).unwrap();
        let digest = digest_bytes(content);
        (temp_dir, library, source, digest)
    }

    #[test]
    fn test_sharded_location() {
        let library = ObjectLibrary::new("/lib");
        let digest = "aabbccddee00";
        assert_eq!(
            library.exact_location(digest),
            PathBuf::from("/lib/aa/bb/cc/aabbccddee00")
        );
        assert_eq!(relative_location(digest), "library/aa/bb/cc/aabbccddee00");
    }

    #[test]
    fn test_insert_links_and_pins_mtime() {
        let (_keep, library, source, digest) = library_with_source(b"content bytes");
        assert!(!library.has_object(&digest));

        let linked = library.insert(&source, &digest).unwrap();
        assert!(linked);
        assert!(library.has_object(&digest));
        assert_eq!(
            pathops::modtime(&library.exact_location(&digest)).unwrap(),
            OBJECT_EPOCH
        );

        // second insert of the same content is a clean no-op
        let linked_again = library.insert(&source, &digest).unwrap();
        assert!(!linked_again);
    }

    #[test]
    fn test_integrity_detects_drift() {
        let (_keep, library, source, digest) = library_with_source(b"original");
        library.insert(&source, &digest).unwrap();
        library.integrity(&digest).unwrap();

        let location = library.exact_location(&digest);
        fs::write(&location, b"tampered").unwrap();
        let err = library.integrity(&digest).unwrap_err();
        assert!(matches!(err, HolotreeError::HashMismatch { .. }));

        let missing = library.integrity(&digest_bytes(b"absent")).unwrap_err();
        assert!(matches!(missing, HolotreeError::ObjectNotFound(_)));
    }

    #[test]
    fn test_open_streams_raw_bytes() {
        let (_keep, library, source, digest) = library_with_source(b"streamed");
        library.insert(&source, &digest).unwrap();

        let mut reader = library.open(&digest).unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"streamed");
    }
}
