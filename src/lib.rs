//! # Holotree - content-addressed environment cache
//!
//! A library that stores the files of reproducible execution environments
//! once on disk and materializes them into arbitrary target directories by
//! hardlinking. Disk usage grows with unique file content, not with the
//! number of environments.
//!
//! ## Overview
//!
//! Three pieces cooperate:
//!
//! - **Object library**: files stored once under their SHA-256 digest in a
//!   sharded tree, immutable, with a pinned canonical mtime
//! - **Catalogs**: serialized directory trees keyed by the hash of an
//!   environment *blueprint*, referencing file content by digest
//! - **Spaces**: target directories materialized from a catalog, reusing
//!   whatever a previous restore already put in place
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use holotree::{Hololib, HolotreeConfig};
//! use std::fs;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let library = Hololib::new(HolotreeConfig::new("/opt/product"))?;
//!
//! // assemble an environment into the stage, then record it
//! let blueprint = b"channels:\n- conda-forge\n";
//! fs::write(library.stage()?.join("hello.txt"), "hello")?;
//! library.record(blueprint)?;
//!
//! // materialize it for a consumer
//! let restored = library.restore(blueprint, "cli", "user")?;
//! println!("environment lives in {:?}", restored.path);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Blueprints and catalogs
//!
//! A blueprint is an opaque byte string describing an environment; its hex
//! SHA-256 is the *key*. Recording a staged directory writes a catalog named
//! `<key>v12.<platform>` whose tree references every file by content digest.
//!
//! ### Restore reuse
//!
//! Each space keeps a sibling meta-catalog recording what was last
//! materialized there. A later restore compares claims against that meta and
//! against the canonical object mtime, hardlinking only what actually
//! changed. Restores of the same space serialize behind a sibling lock file.
//!
//! ### Export
//!
//! Selected catalogs and their objects can be packaged into a zip archive
//! whose layout mirrors the on-disk hololib; objects the recipient already
//! has are left out. Unzipping into a hololib root imports everything at its
//! canonical location.
//!
//! ## Concurrency
//!
//! Per-file work (hashing, linking, zipping) is fanned out over a bounded
//! worker pool; catalog traversal itself stays single-threaded. Within one
//! target, directory creation strictly precedes file materialization, and
//! the authoritative meta-catalog is rewritten only after every file task
//! has settled.
//!
//! ## Module Organization
//!
//! - [`catalog`]: the `Root`/`DirNode`/`FileNode` tree and its traversals
//! - [`library`]: the `Hololib` facade with record/restore/export
//! - [`objects`]: the sharded content-addressed object store
//! - [`config`]: explicit configuration record and path layout
//! - [`pool`]: bounded worker pool with submit/settle semantics
//! - [`digest`]: content digests and short naming hashes
//! - [`pathops`]: atomic publishes, locks, touches, globbing
//! - [`error`]: error types and handling

pub mod archive;
pub mod catalog;
pub mod config;
pub mod digest;
pub mod error;
pub mod library;
pub mod objects;
pub mod pathops;
pub mod pool;
pub mod stats;

// Re-export main types for convenience
pub use catalog::{DirNode, FileNode, Root, CATALOG_FORMAT};
pub use config::HolotreeConfig;
pub use error::{HolotreeError, Result};
pub use library::{catalog_name, Hololib, Restored, SpaceMode};
pub use objects::{ObjectLibrary, OBJECT_EPOCH};
pub use pool::WorkerPool;
pub use stats::{RunStats, StatsSnapshot};
