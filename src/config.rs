//! Configuration for a holotree instance
//!
//! Everything that used to be ambient global state - the product home, the
//! platform tag, lock sharing, worker counts - is threaded through an explicit
//! [`HolotreeConfig`] record handed to [`crate::Hololib::new`]. The record
//! also owns the path layout of the on-disk hololib so that the rest of the
//! crate never hardcodes directory names.
//!
//! ## On-disk layout
//!
//! ```text
//! <home>/
//! ├── hololib/
//! │   ├── library/<aa>/<bb>/<cc>/<digest>   # content-addressed objects
//! │   ├── catalog/<key>v12.<platform>       # serialized catalogs
//! │   ├── used/<key>.<identity>             # LRU touch sentinels
//! │   └── compress.marker                   # disables export compression
//! └── holotree/
//!     ├── <identity>/                       # recording stage
//!     ├── <space-name>/                     # materialized targets
//!     ├── <space-name>.meta                 # last materialized catalog
//!     └── <space-name>.lck                  # per-target lock
//! ```

use crate::digest::{sipit, textual};
use std::env;
use std::path::{Path, PathBuf};

/// Width of the user-home identity component in generated names
const HOME_IDENTITY_WIDTH: usize = 8;

/// Configuration record for a holotree instance
///
/// Construct with [`HolotreeConfig::new`] and adjust fields before handing
/// the record to [`crate::Hololib::new`]. Cloning is cheap and the record is
/// immutable once the library is built.
#[derive(Debug, Clone)]
pub struct HolotreeConfig {
    /// Product home directory under which hololib and holotree live
    pub home: PathBuf,
    /// Platform tag used in catalog filenames (`<os>_<arch>`, lowercase)
    pub platform: String,
    /// Widen lock file permissions so other users can serialize against them
    pub shared: bool,
    /// Worker threads for per-file pipelines (0 = number of CPUs)
    pub workers: usize,
    /// Controller label restores default to when none is given
    pub controller: String,
    /// Space label restores default to when none is given
    pub space: String,
}

impl HolotreeConfig {
    /// Create a configuration anchored at the given product home
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            platform: default_platform(),
            shared: false,
            workers: 0,
            controller: "user".to_string(),
            space: "user".to_string(),
        }
    }

    /// Root of the shared library and catalog store
    pub fn hololib_location(&self) -> PathBuf {
        self.home.join("hololib")
    }

    /// Directory holding content-addressed objects
    pub fn library_location(&self) -> PathBuf {
        self.hololib_location().join("library")
    }

    /// Directory holding serialized catalogs
    pub fn catalog_location(&self) -> PathBuf {
        self.hololib_location().join("catalog")
    }

    /// Directory receiving LRU usage sentinels
    pub fn usage_location(&self) -> PathBuf {
        self.hololib_location().join("used")
    }

    /// Base directory under which stages and target spaces are materialized
    pub fn holotree_location(&self) -> PathBuf {
        self.home.join("holotree")
    }

    /// Marker file whose presence disables zip-content compression in export
    pub fn compress_marker(&self) -> PathBuf {
        self.hololib_location().join("compress.marker")
    }

    /// Whether export archives should compress their entries
    pub fn compress(&self) -> bool {
        !self.compress_marker().is_file()
    }

    /// Short process-stable identity of the product home
    ///
    /// Used as the common prefix of stage and space names, and as the suffix
    /// of usage sentinels, so that several homes can share one filesystem
    /// without colliding.
    pub fn user_home_identity(&self) -> String {
        textual(sipit(home_bytes(&self.home)), HOME_IDENTITY_WIDTH)
    }
}

fn home_bytes(home: &Path) -> &[u8] {
    home.as_os_str().as_encoded_bytes()
}

/// Platform tag of the running process, `<os>_<arch>` lowercase
pub fn default_platform() -> String {
    format!("{}_{}", env::consts::OS, env::consts::ARCH).to_lowercase()
}
