//! The hololib facade: record, restore, export
//!
//! [`Hololib`] ties the object library, the catalog model and the worker
//! pool together into the three pipelines:
//!
//! - **record** lifts a staged directory, fills digests, persists the
//!   catalog and populates the object library
//! - **restore** materializes a catalog into a target space by hardlinking,
//!   reusing whatever an earlier restore already left in place
//! - **export** packages catalogs plus their objects into a portable zip,
//!   eliding objects the recipient is known to already possess
//!
//! Restores against one target directory are serialized through a sibling
//! lock file with a 30 second acquisition timeout. The meta-catalog beside
//! the target is only rewritten after every file operation has settled, so a
//! crash mid-restore leaves a state the next run converges from.

use crate::archive::ZipSeen;
use crate::catalog::{DirNode, FileNode, Root};
use crate::config::HolotreeConfig;
use crate::digest::{blueprint_hash, sipit, textual};
use crate::error::{HolotreeError, Result};
use crate::objects::{self, ObjectLibrary, OBJECT_EPOCH};
use crate::pathops;
use crate::pool::WorkerPool;
use crate::stats::{RunStats, StatsSnapshot};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// How long a restore may wait for the per-target lock
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalog filename for a blueprint key
pub fn catalog_name(key: &str, platform: &str) -> String {
    format!("{key}v12.{platform}")
}

/// How a restore found its target directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceMode {
    /// The target did not exist before
    New,
    /// The target already held this blueprint
    CleanedUp,
    /// The target held a different blueprint
    Converted {
        /// Blueprint key the target held before
        previous: String,
    },
}

impl std::fmt::Display for SpaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpaceMode::New => write!(f, "new space"),
            SpaceMode::CleanedUp => write!(f, "cleaned up space"),
            SpaceMode::Converted { previous } => {
                write!(f, "converted space from {previous:?}")
            }
        }
    }
}

/// Outcome of one restore run
#[derive(Debug, Clone)]
pub struct Restored {
    /// The materialized target directory
    pub path: PathBuf,
    /// Per-file counters of the run
    pub stats: StatsSnapshot,
    /// How the target was found
    pub mode: SpaceMode,
}

/// Content-addressed library of environments with catalog-driven restores
pub struct Hololib {
    config: HolotreeConfig,
    identity: u64,
    objects: ObjectLibrary,
    pool: Arc<WorkerPool>,
    query_cache: DashMap<String, bool>,
}

impl std::fmt::Debug for Hololib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hololib")
            .field("home", &self.config.home)
            .field("platform", &self.config.platform)
            .finish()
    }
}

impl Hololib {
    /// Open (creating on demand) the hololib under the configured home
    pub fn new(config: HolotreeConfig) -> Result<Self> {
        pathops::make_shared_dir(&config.library_location())?;
        pathops::make_shared_dir(&config.catalog_location())?;
        let identity = sipit(config.platform.to_lowercase().as_bytes());
        let objects = ObjectLibrary::new(config.library_location());
        let pool = Arc::new(WorkerPool::new(config.workers)?);
        Ok(Self {
            config,
            identity,
            objects,
            pool,
            query_cache: DashMap::new(),
        })
    }

    /// The configuration this library was built with
    pub fn config(&self) -> &HolotreeConfig {
        &self.config
    }

    /// Stage identity name for this platform and home
    ///
    /// By construction this is exactly as long as any
    /// [`Hololib::controller_space_name`] under the same home, so rewrite
    /// windows recorded against the stage always fit a space path.
    pub fn identity(&self) -> String {
        let suffix = format!("{:016x}", self.identity);
        format!("h{}_{}t", self.config.user_home_identity(), &suffix[..14])
    }

    /// Directory name of the space owned by a controller/space label pair
    pub fn controller_space_name(&self, controller: &str, space: &str) -> String {
        let prefix = textual(sipit(controller.as_bytes()), 7);
        let suffix = textual(sipit(space.as_bytes()), 8);
        format!("{}_{prefix}_{suffix}", self.config.user_home_identity())
    }

    /// Lock file guarding the space of a controller/space label pair
    pub fn space_lockfile(&self, controller: &str, space: &str) -> PathBuf {
        let name = self.controller_space_name(controller, space);
        self.config.holotree_location().join(format!("{name}.lck"))
    }

    /// Lock file of this configuration's default restore target
    ///
    /// Derived from the controller/space labels carried by the
    /// configuration, so external callers can find the lock path without
    /// staging or restoring anything first.
    pub fn user_holotree_lockfile(&self) -> PathBuf {
        self.space_lockfile(&self.config.controller, &self.config.space)
    }

    /// The staging directory new environments are assembled into
    pub fn stage(&self) -> Result<PathBuf> {
        let stage = self.config.holotree_location().join(self.identity());
        fs::create_dir_all(&stage)?;
        Ok(stage)
    }

    /// Persist the blueprint as `identity.yaml` inside the stage
    pub fn write_identity(&self, blueprint: &[u8]) -> Result<()> {
        let marker = self.stage()?.join("identity.yaml");
        pathops::write_file(&marker, blueprint, 0o644)
    }

    /// Full path of the catalog for a blueprint key
    pub fn catalog_path(&self, key: &str) -> PathBuf {
        self.config
            .catalog_location()
            .join(catalog_name(key, &self.config.platform))
    }

    /// Names of all catalogs in the hololib, `.info` sidecars excluded
    pub fn catalog_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            pathops::glob_files(&self.config.catalog_location(), "[0-9a-f]*v12.*")
                .into_iter()
                .filter(|path| path.extension().map(|ext| ext != "info").unwrap_or(true))
                .filter_map(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .map(str::to_string)
                })
                .collect();
        names.dedup();
        names
    }

    /// Accept a blueprint for recording
    ///
    /// Blueprints are opaque bytes; any content is valid.
    pub fn validate_blueprint(&self, _blueprint: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Whether a usable catalog for this blueprint exists locally
    ///
    /// The check verifies that every object the catalog references is
    /// present. Load failures mean "no". Results are cached per instance.
    pub fn has_blueprint(&self, blueprint: &[u8]) -> bool {
        let key = blueprint_hash(blueprint);
        if let Some(found) = self.query_cache.get(&key) {
            return *found;
        }
        let found = self.query_blueprint(&key);
        self.query_cache.insert(key, found);
        found
    }

    fn query_blueprint(&self, key: &str) -> bool {
        let catalog = self.catalog_path(key);
        if !catalog.is_file() {
            return false;
        }
        let mut shadow = match Root::new(&self.config.holotree_location()) {
            Ok(root) => root,
            Err(_) => return false,
        };
        if let Err(err) = shadow.load_from(&catalog) {
            debug!("Catalog load failed, reason: {}", err);
            return false;
        }
        let objects = self.objects.clone();
        let outcome = shadow.treetop(&self.pool, move |_path, dir| {
            for file in dir.files.values() {
                if !objects.has_object(&file.digest) {
                    return Err(HolotreeError::ObjectNotFound(file.digest.clone()));
                }
            }
            Ok(())
        });
        if let Err(err) = outcome {
            debug!("Catalog check failed, reason: {}", err);
            return false;
        }
        true
    }

    /// Resolve the target directory a blueprint would restore into
    pub fn target_dir(&self, blueprint: &[u8], controller: &str, space: &str) -> PathBuf {
        let key = blueprint_hash(blueprint);
        let name = self.controller_space_name(controller, space);
        let mut root = match Root::new(&self.config.holotree_location()) {
            Ok(root) => root,
            Err(_) => return self.config.holotree_location().join(name),
        };
        match root.load_from(&self.catalog_path(&key)) {
            Ok(()) => root.holotree_base().join(name),
            Err(_) => self.config.holotree_location().join(name),
        }
    }

    /// Stream the raw content of one library object
    pub fn open(&self, digest: &str) -> Result<BufReader<File>> {
        self.objects.open(digest)
    }

    /// Verify one stored object against its digest
    pub fn integrity(&self, digest: &str) -> Result<()> {
        self.objects.integrity(digest)
    }

    /// Canonical on-disk location of one object
    pub fn exact_location(&self, digest: &str) -> PathBuf {
        self.objects.exact_location(digest)
    }

    /// Record the current stage as the environment for `blueprint`
    ///
    /// Writes the catalog and populates the object library; returns the
    /// per-file statistics of the run. Re-recording an unchanged stage
    /// produces a byte-identical catalog and a zero dirty count.
    pub fn record(&self, blueprint: &[u8]) -> Result<StatsSnapshot> {
        let started = Instant::now();
        self.write_identity(blueprint)?;
        let key = blueprint_hash(blueprint);
        debug!("holotree record start {}", key);

        let stage = self.stage()?;
        let mut root = Root::new(&stage)?;
        root.lift()?;
        let sentinel = root.path.clone();
        root.locator(&sentinel)?;
        root.blueprint = key.clone();
        root.platform = self.config.platform.clone();

        let catalog = self.catalog_path(&key);
        root.save_as(&catalog)?;

        let score = Arc::new(RunStats::new());
        let objects = self.objects.clone();
        let pool = Arc::clone(&self.pool);
        let tally = Arc::clone(&score);
        root.treetop(&self.pool, move |path, dir| {
            schedule_lifters(&pool, &objects, &tally, path, dir);
            Ok(())
        })?;

        self.query_cache.remove(&key);
        let snapshot = score.snapshot();
        debug!(
            "Holotree new workload: {}/{} (duplicate: {}, links: {}, dirtyness: {:.1}%) took {:?}",
            snapshot.dirty,
            snapshot.total,
            snapshot.duplicate,
            snapshot.links,
            score.dirtyness(),
            started.elapsed()
        );
        Ok(snapshot)
    }

    /// Materialize `blueprint` into the space owned by controller/space
    pub fn restore(&self, blueprint: &[u8], controller: &str, space: &str) -> Result<Restored> {
        self.restore_to(
            blueprint,
            &self.controller_space_name(controller, space),
            controller,
            space,
            false,
        )
    }

    /// Materialize `blueprint` into the space named `label`
    ///
    /// At most one restore per target runs at a time; a sibling `.lck` file
    /// serializes the rest, failing with
    /// [`HolotreeError::LockTimeout`] after 30 seconds. Partial restores
    /// skip the user-facing plan log lines but behave identically.
    pub fn restore_to(
        &self,
        blueprint: &[u8],
        label: &str,
        controller: &str,
        space: &str,
        partial: bool,
    ) -> Result<Restored> {
        let started = Instant::now();
        let key = blueprint_hash(blueprint);
        let catalog = self.catalog_path(&key);
        debug!("holotree space restore start [{}]", key);

        let mut root = Root::new(&self.stage()?)?;
        root.load_from(&catalog)?;
        if root.platform != self.config.platform {
            return Err(HolotreeError::PlatformMismatch {
                catalog: root.platform,
                runtime: self.config.platform.clone(),
            });
        }

        let targetdir = root.holotree_base().join(label);
        let metafile = sibling_file(&targetdir, "meta");
        let lockfile = sibling_file(&targetdir, "lck");
        let _locker = pathops::Locker::acquire(&lockfile, LOCK_TIMEOUT, self.config.shared)?;

        let mut current_state = HashMap::new();
        let mut mode = SpaceMode::New;
        if let Ok(mut shadow) = Root::new(&targetdir) {
            if shadow.load_from(&metafile).is_ok() {
                mode = if shadow.blueprint == key {
                    SpaceMode::CleanedUp
                } else {
                    SpaceMode::Converted {
                        previous: shadow.blueprint.clone(),
                    }
                };
                current_state = shadow.digest_map();
            }
        }
        debug!("Holotree operating mode is: {} for {:?}", mode, key);

        root.relocate(&targetdir)?;
        root.treetop(&self.pool, make_branches)?;

        let score = Arc::new(RunStats::new());
        let state = Arc::new(current_state);
        let filler = Arc::new(root.rewrite_filler().map(<[u8]>::to_vec));
        {
            let base = targetdir.clone();
            let objects = self.objects.clone();
            let pool = Arc::clone(&self.pool);
            let tally = Arc::clone(&score);
            root.all_dirs(&mut |path, dir| {
                restore_directory(
                    &pool, &objects, &tally, &state, &filler, &base, path, dir,
                )
            })?;
        }
        self.pool.sync()?;

        root.controller = controller.to_string();
        root.space = space.to_string();
        root.save_as(&metafile)?;
        pathops::touch_when(&catalog, unix_now())?;
        self.touch_used(&key);

        if !partial {
            let planfile = targetdir.join("rcc_plan.log");
            if planfile.is_file() {
                info!("Installation plan is: {:?}", planfile);
            }
            let identityfile = targetdir.join("identity.yaml");
            if identityfile.is_file() {
                info!("Environment configuration descriptor is: {:?}", identityfile);
            }
        }

        let snapshot = score.snapshot();
        debug!(
            "Holotree dirty workload: {}/{} (duplicate: {}, links: {}, dirtyness: {:.1}%) took {:?}",
            snapshot.dirty,
            snapshot.total,
            snapshot.duplicate,
            snapshot.links,
            score.dirtyness(),
            started.elapsed()
        );
        Ok(Restored {
            path: targetdir,
            stats: snapshot,
            mode,
        })
    }

    fn touch_used(&self, key: &str) {
        let filename = format!("{key}.{}", self.config.user_home_identity());
        let fullpath = self.config.usage_location().join(filename);
        pathops::force_touch_when(&fullpath, unix_now());
    }

    /// Package catalogs and their objects into a portable zip archive
    ///
    /// Objects referenced by any catalog in `known` are marked as already
    /// delivered and skipped; unloadable known catalogs are ignored, they
    /// only affect deduplication. Fails with
    /// [`HolotreeError::ExportEmpty`] when nothing was exported.
    pub fn export(&self, catalogs: &[String], known: &[String], archive: &Path) -> Result<()> {
        debug!("holotree export start");
        let zipper = Arc::new(Mutex::new(ZipSeen::create(archive, self.config.compress())?));

        for name in known {
            let catalog = self.config.catalog_location().join(name);
            let mut root = Root::new(&self.config.holotree_location())?;
            if root.load_from(&catalog).is_err() {
                continue;
            }
            let sink = Arc::clone(&zipper);
            root.treetop(&self.pool, move |_path, dir| {
                let mut zipper = sink.lock();
                for file in dir.files.values() {
                    zipper.ignore(&objects::relative_location(&file.digest));
                }
                Ok(())
            })?;
        }

        let mut exported = false;
        for name in catalogs {
            let catalog = self.config.catalog_location().join(name);
            let mut root = Root::new(&self.config.holotree_location())?;
            root.load_from(&catalog)?;

            let sink = Arc::clone(&zipper);
            let objects = self.objects.clone();
            root.treetop(&self.pool, move |_path, dir| {
                for file in dir.files.values() {
                    let full = objects.exact_location(&file.digest);
                    sink.lock()
                        .add(&full, &objects::relative_location(&file.digest))?;
                }
                Ok(())
            })?;

            zipper.lock().add(&catalog, &format!("catalog/{name}"))?;
            exported = true;
        }
        if !exported {
            return Err(HolotreeError::ExportEmpty);
        }

        let zipper = Arc::into_inner(zipper)
            .ok_or_else(|| HolotreeError::internal("archive writer still shared"))?;
        zipper.into_inner().finish()
    }

    /// Remove catalogs by name; objects stay for an external sweeper
    pub fn remove(&self, catalogs: &[String]) -> Result<()> {
        debug!("holotree remove start");
        for name in catalogs {
            let catalog = self.config.catalog_location().join(name);
            if !catalog.is_file() {
                warn!("Catalog {} ({:?}) is not a file! Ignored!", name, catalog);
                continue;
            }
            fs::remove_file(&catalog)?;
        }
        self.query_cache.clear();
        Ok(())
    }
}

fn sibling_file(target: &Path, extension: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(extension);
    target.with_file_name(name)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// Schedule one library insertion task per file in the directory
fn schedule_lifters(
    pool: &WorkerPool,
    objects: &ObjectLibrary,
    score: &Arc<RunStats>,
    path: &Path,
    dir: &DirNode,
) {
    for file in dir.files.values() {
        let source = path.join(&file.name);
        let digest = file.digest.clone();
        let objects = objects.clone();
        let score = Arc::clone(score);
        pool.backlog(move || {
            if objects.has_object(&digest) {
                score.duplicate();
                return Ok(());
            }
            let linked = objects.insert(&source, &digest)?;
            score.dirty(true);
            if linked {
                score.linked_insert();
            }
            Ok(())
        });
    }
}

/// Create the directory skeleton and symlinks for one catalog directory
fn make_branches(path: &Path, dir: &DirNode) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(path) {
        // a converted space may hold a file where the catalog wants a dir
        if !meta.is_dir() {
            fs::remove_file(path)?;
        }
    }
    fs::create_dir_all(path)?;
    if dir.mode != 0 {
        pathops::set_mode(path, dir.mode)?;
    }
    for (name, target) in &dir.symlinks {
        let link = path.join(name);
        match fs::read_link(&link) {
            Ok(existing) if existing.as_os_str() == target.as_str() => continue,
            Ok(_) => fs::remove_file(&link)?,
            Err(_) => {
                if link.exists() {
                    if link.is_dir() {
                        fs::remove_dir_all(&link)?;
                    } else {
                        fs::remove_file(&link)?;
                    }
                }
            }
        }
        pathops::create_symlink(target, &link)?;
    }
    Ok(())
}

/// Reconcile one target directory against its catalog entry
///
/// Runs on the traversal thread; the per-file work is backlogged to the
/// pool. Entries on disk that the catalog does not know are removed.
#[allow(clippy::too_many_arguments)]
fn restore_directory(
    pool: &WorkerPool,
    objects: &ObjectLibrary,
    score: &Arc<RunStats>,
    state: &Arc<HashMap<String, String>>,
    filler: &Arc<Option<Vec<u8>>>,
    base: &Path,
    path: &Path,
    dir: &DirNode,
) -> Result<()> {
    if let Ok(listing) = fs::read_dir(path) {
        for entry in listing.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                remove_entry(&entry.path())?;
                continue;
            };
            if dir.files.contains_key(name)
                || dir.dirs.contains_key(name)
                || dir.symlinks.contains_key(name)
            {
                continue;
            }
            remove_entry(&entry.path())?;
        }
    }

    for file in dir.files.values() {
        let target = path.join(&file.name);
        let relative = target
            .strip_prefix(base)
            .map_err(|_| HolotreeError::PathConversion(target.clone()))?
            .to_string_lossy()
            .replace('\\', "/");
        let claim = state.get(&relative).cloned();
        let node = file.clone();
        let objects = objects.clone();
        let score = Arc::clone(score);
        let filler = Arc::clone(filler);
        pool.backlog(move || restore_file(&objects, &score, &filler, &target, &node, claim));
    }
    Ok(())
}

fn remove_entry(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Materialize one catalog file into the target directory
fn restore_file(
    objects: &ObjectLibrary,
    score: &RunStats,
    filler: &Option<Vec<u8>>,
    target: &Path,
    file: &FileNode,
    claim: Option<String>,
) -> Result<()> {
    let claimed = claim.as_deref() == Some(file.digest.as_str());
    if claimed && target.is_file() && pathops::modtime(target)? == OBJECT_EPOCH {
        let untouched = if file.rewrite.is_empty() {
            true
        } else {
            rewrite_applied(target, &file.rewrite, filler.as_deref())?
        };
        if untouched {
            score.link();
            return Ok(());
        }
    }

    if let Ok(meta) = fs::symlink_metadata(target) {
        if meta.is_dir() {
            fs::remove_dir_all(target)?;
        } else {
            fs::remove_file(target)?;
        }
    }

    let location = objects.exact_location(&file.digest);
    if !location.is_file() {
        return Err(HolotreeError::ObjectNotFound(file.digest.clone()));
    }

    if file.rewrite.is_empty() {
        if fs::hard_link(&location, target).is_err() {
            // cross-device or unsupported filesystem; copy instead
            copy_object(&location, target)?;
            pathops::touch_when(target, OBJECT_EPOCH)?;
        }
        pathops::set_mode(target, file.mode)?;
    } else {
        rewrite_object(&location, target, file, filler.as_deref())?;
        pathops::set_mode(target, file.mode)?;
        pathops::touch_when(target, OBJECT_EPOCH)?;
    }

    if claimed {
        score.duplicate();
    } else {
        score.dirty(true);
    }
    Ok(())
}

/// Whether the target already carries the relocation at every offset
fn rewrite_applied(target: &Path, offsets: &[u64], filler: Option<&[u8]>) -> Result<bool> {
    let Some(replacement) = filler else {
        return Ok(false);
    };
    use std::io::{Seek, SeekFrom};
    let mut file = File::open(target)?;
    let mut window = vec![0u8; replacement.len()];
    for &offset in offsets {
        file.seek(SeekFrom::Start(offset))?;
        if file.read_exact(&mut window).is_err() || window != replacement {
            return Ok(false);
        }
    }
    Ok(true)
}

fn copy_object(location: &Path, target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| HolotreeError::internal(format!("no parent directory for {:?}", target)))?;
    let mut reader = File::open(location)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    io::copy(&mut reader, temp.as_file_mut())?;
    temp.persist(target)
        .map_err(|err| HolotreeError::Io(err.error))?;
    Ok(())
}

/// Copy-on-write materialization applying the rewrite plan
///
/// The shared object is never mutated; the target gets its own copy with
/// the relocation window replaced at every recorded offset.
fn rewrite_object(
    location: &Path,
    target: &Path,
    file: &FileNode,
    filler: Option<&[u8]>,
) -> Result<()> {
    let mut content = Vec::with_capacity(file.size as usize);
    File::open(location)?.read_to_end(&mut content)?;

    if let Some(replacement) = filler {
        for &offset in &file.rewrite {
            let start = offset as usize;
            let end = start + replacement.len();
            if end > content.len() {
                return Err(HolotreeError::internal(format!(
                    "rewrite window {}..{} outside object of {} bytes",
                    start,
                    end,
                    content.len()
                )));
            }
            content[start..end].copy_from_slice(replacement);
        }
    }

    let parent = target
        .parent()
        .ok_or_else(|| HolotreeError::internal(format!("no parent directory for {:?}", target)))?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(&content)?;
    temp.persist(target)
        .map_err(|err| HolotreeError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_library() -> (TempDir, Hololib) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = HolotreeConfig::new(temp_dir.path());
        config.workers = 2;
        let library = Hololib::new(config).unwrap();
        (temp_dir, library)
    }

    fn stage_files(library: &Hololib, files: &[(&str, &[u8])]) {
        let stage = library.stage().unwrap();
        for (relative, content) in files {
            let full = stage.join(relative);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
    }

    #[test]
    fn test_names_have_matching_lengths() {
        let (_keep, library) = test_library();
        assert_eq!(
            library.identity().len(),
            library.controller_space_name("controller", "space").len()
        );
    }

    #[test]
    fn test_user_holotree_lockfile_uses_config_identity() {
        let (_keep, library) = test_library();
        let lockfile = library.user_holotree_lockfile();
        assert_eq!(lockfile, library.space_lockfile("user", "user"));
        assert_eq!(lockfile.extension().unwrap(), "lck");
        assert!(lockfile.starts_with(library.config().holotree_location()));
    }

    #[test]
    fn test_catalog_name_carries_version_and_platform() {
        assert_eq!(catalog_name("00ff", "linux_x86_64"), "00ffv12.linux_x86_64");
    }

    #[test]
    fn test_record_counts_duplicates_and_links() {
        let (_keep, library) = test_library();
        stage_files(
            &library,
            &[
                ("a/x.txt", b"hello"),
                ("a/y.txt", b"hello"),
                ("b/z.txt", b"world"),
            ],
        );
        let stats = library.record(b"blueprint-1").unwrap();

        // identity.yaml is staged alongside, so one extra unique file
        assert_eq!(stats.total, 4);
        assert_eq!(stats.duplicate, 1);
        assert_eq!(stats.dirty, 3);
        assert_eq!(stats.links, 3);
        assert!(library.has_blueprint(b"blueprint-1"));
    }

    #[test]
    fn test_record_is_idempotent() {
        let (_keep, library) = test_library();
        stage_files(&library, &[("a/x.txt", b"hello"), ("b/z.txt", b"world")]);
        library.record(b"blueprint-1").unwrap();
        let key = blueprint_hash(b"blueprint-1");
        let first = fs::read(library.catalog_path(&key)).unwrap();

        let again = library.record(b"blueprint-1").unwrap();
        let second = fs::read(library.catalog_path(&key)).unwrap();
        assert_eq!(first, second);
        assert_eq!(again.dirty, 0);
        assert_eq!(again.duplicate, again.total);
    }

    #[test]
    fn test_restore_materializes_hardlinks() {
        let (_keep, library) = test_library();
        stage_files(&library, &[("a/x.txt", b"hello"), ("b/z.txt", b"world")]);
        library.record(b"blueprint-1").unwrap();

        let restored = library.restore(b"blueprint-1", "ctrl", "sp").unwrap();
        assert_eq!(restored.mode, SpaceMode::New);
        let target = &restored.path;
        assert_eq!(fs::read(target.join("a/x.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(target.join("b/z.txt")).unwrap(), b"world");
        assert_eq!(
            pathops::modtime(&target.join("a/x.txt")).unwrap(),
            OBJECT_EPOCH
        );
        assert!(sibling_file(target, "meta").is_file());
        assert_eq!(restored.stats.dirty, restored.stats.total);
    }

    #[test]
    fn test_restore_missing_catalog_fails() {
        let (_keep, library) = test_library();
        let err = library.restore(b"never-recorded", "c", "s").unwrap_err();
        assert!(matches!(err, HolotreeError::CatalogNotFound(_)));
    }

    #[test]
    fn test_restore_rejects_platform_mismatch() {
        let (_keep, library) = test_library();
        stage_files(&library, &[("a/x.txt", b"hello")]);
        library.record(b"blueprint-1").unwrap();

        let key = blueprint_hash(b"blueprint-1");
        let catalog = library.catalog_path(&key);
        let text = fs::read_to_string(&catalog)
            .unwrap()
            .replace(&library.config.platform, "somewhere_else");
        fs::write(&catalog, text).unwrap();

        let err = library.restore(b"blueprint-1", "c", "s").unwrap_err();
        assert!(matches!(err, HolotreeError::PlatformMismatch { .. }));
    }

    #[test]
    fn test_remove_deletes_catalog_only() {
        let (_keep, library) = test_library();
        stage_files(&library, &[("a/x.txt", b"hello")]);
        library.record(b"blueprint-1").unwrap();

        let key = blueprint_hash(b"blueprint-1");
        let names = library.catalog_names();
        assert_eq!(names.len(), 1);
        library.remove(&names).unwrap();
        assert!(library.catalog_names().is_empty());
        assert!(!library.catalog_path(&key).is_file());
        // objects survive for the external sweeper
        assert!(library
            .exact_location(&crate::digest::digest_bytes(b"hello"))
            .is_file());
    }

    #[test]
    fn test_has_blueprint_is_false_for_unknown() {
        let (_keep, library) = test_library();
        assert!(!library.has_blueprint(b"unknown"));
    }
}
