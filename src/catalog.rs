//! Catalog model: a serialized directory tree keyed by blueprint
//!
//! A [`Root`] describes one environment as a tree of [`DirNode`]s and
//! [`FileNode`]s anchored at a filesystem path. Catalogs are built either by
//! walking a live directory ([`Root::lift`]) or by deserializing a previously
//! saved catalog ([`Root::load_from`]). After a lift, [`Root::locator`] fills
//! in content digests and records rewrite plans; [`Root::relocate`] retargets
//! the tree at a new base directory before materialization.
//!
//! ## Determinism
//!
//! Children are kept in `BTreeMap`s keyed by name, so traversal order and the
//! serialized JSON are stable for identical trees. Re-recording an unchanged
//! stage therefore produces a byte-identical catalog file.
//!
//! ## Format
//!
//! The on-disk encoding is compact JSON carrying a `format` field; format 12
//! is the only one this crate reads or writes, and the same tag appears in
//! catalog filenames (`<key>v12.<platform>`).

use crate::config::default_platform;
use crate::error::{HolotreeError, Result};
use crate::pool::WorkerPool;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Catalog format version, part of the on-disk contract
pub const CATALOG_FORMAT: u32 = 12;

const SCAN_BUFFER: usize = 64 * 1024;

/// A regular file inside a catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileNode {
    /// Entry name relative to the containing directory
    pub name: String,
    /// Original size in bytes
    pub size: u64,
    /// POSIX mode bits
    pub mode: u32,
    /// Content digest, empty until the locator pass has run
    #[serde(default)]
    pub digest: String,
    /// Byte offsets where the relocation sentinel occurs in the content
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewrite: Vec<u64>,
}

/// A directory inside a catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirNode {
    /// Entry name relative to the containing directory (empty for the root)
    pub name: String,
    /// POSIX mode bits
    pub mode: u32,
    /// Subdirectories ordered by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dirs: BTreeMap<String, DirNode>,
    /// Files ordered by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, FileNode>,
    /// Symlinks ordered by name, mapping entry name to target
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub symlinks: BTreeMap<String, String>,
}

impl DirNode {
    fn named(name: String, mode: u32) -> Self {
        Self {
            name,
            mode,
            ..Self::default()
        }
    }

    /// Whether any file in this subtree carries a rewrite plan
    pub fn has_rewrites(&self) -> bool {
        self.files.values().any(|file| !file.rewrite.is_empty())
            || self.dirs.values().any(DirNode::has_rewrites)
    }

    /// Number of files in this subtree
    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.values().map(DirNode::file_count).sum::<usize>()
    }
}

/// Root of a catalog tree anchored at a filesystem path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Catalog format version
    pub format: u32,
    /// Absolute base directory the tree describes
    pub path: String,
    /// Platform tag the catalog was recorded on
    pub platform: String,
    /// Blueprint key this catalog belongs to
    #[serde(default)]
    pub blueprint: String,
    /// Controller label of the last consumer
    #[serde(default)]
    pub controller: String,
    /// Space label of the last consumer
    #[serde(default)]
    pub space: String,
    /// The directory tree itself
    pub tree: DirNode,
    /// Replacement bytes for rewrite windows, derived at relocate time
    #[serde(skip)]
    rewrite_filler: Option<Vec<u8>>,
}

impl Root {
    /// Construct an empty catalog anchored at `basedir`
    ///
    /// The base directory does not need to exist yet; it only needs to be
    /// representable as UTF-8, since its bytes double as the relocation
    /// sentinel embedded in recorded files.
    pub fn new(basedir: &Path) -> Result<Self> {
        let path = basedir
            .to_str()
            .ok_or_else(|| HolotreeError::PathConversion(basedir.to_path_buf()))?
            .to_string();
        Ok(Self {
            format: CATALOG_FORMAT,
            path,
            platform: default_platform(),
            blueprint: String::new(),
            controller: String::new(),
            space: String::new(),
            tree: DirNode::named(String::new(), 0o755),
            rewrite_filler: None,
        })
    }

    /// Base directory as a path
    pub fn basedir(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    /// Parent directory under which sibling spaces live
    pub fn holotree_base(&self) -> PathBuf {
        self.basedir()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.basedir())
    }

    /// Replacement bytes to splice into rewrite windows, when relocated
    pub fn rewrite_filler(&self) -> Option<&[u8]> {
        self.rewrite_filler.as_deref()
    }

    /// Populate the tree by walking the base directory
    ///
    /// Symlinks are recorded as links and never followed. Unreadable entries
    /// fail the walk; a catalog must describe the whole tree or nothing.
    pub fn lift(&mut self) -> Result<()> {
        let base = self.basedir();
        let meta = fs::symlink_metadata(&base)?;
        let mut tree = DirNode::named(String::new(), mode_of(&meta));
        lift_into(&mut tree, &base)?;
        self.tree = tree;
        Ok(())
    }

    /// Fill digests and rewrite plans for every file
    ///
    /// `sentinel` is the absolute stage path whose occurrences inside file
    /// content are recorded as rewrite offsets; it is normally the catalog's
    /// own base path. Digesting and scanning happen in one streaming pass.
    pub fn locator(&mut self, sentinel: &str) -> Result<()> {
        let seek = sentinel.as_bytes().to_vec();
        self.all_files_mut(&mut |full, file| {
            let (digest, size, offsets) = digest_and_scan(full, &seek)?;
            file.digest = digest;
            file.size = size;
            file.rewrite = offsets;
            Ok(())
        })
    }

    /// Retarget the catalog at a new base directory
    ///
    /// When the tree carries rewrite plans, the new base must fit the byte
    /// window reserved by the sentinel; shorter bases are padded with path
    /// separators, longer ones fail with
    /// [`HolotreeError::RelocationOverflow`].
    pub fn relocate(&mut self, new_base: &Path) -> Result<()> {
        let target = new_base
            .to_str()
            .ok_or_else(|| HolotreeError::PathConversion(new_base.to_path_buf()))?;
        let window = self.path.len();
        if self.tree.has_rewrites() {
            if target.len() > window {
                return Err(HolotreeError::RelocationOverflow {
                    target: new_base.to_path_buf(),
                    window,
                });
            }
            let mut filler = target.as_bytes().to_vec();
            filler.resize(window, b'/');
            self.rewrite_filler = Some(filler);
        }
        self.path = target.to_string();
        Ok(())
    }

    /// Depth-first visit of every file with its absolute path
    pub fn all_files<F>(&self, visitor: &mut F) -> Result<()>
    where
        F: FnMut(&Path, &FileNode) -> Result<()>,
    {
        walk_files(&self.basedir(), &self.tree, visitor)
    }

    /// Depth-first mutable visit of every file with its absolute path
    pub fn all_files_mut<F>(&mut self, visitor: &mut F) -> Result<()>
    where
        F: FnMut(&Path, &mut FileNode) -> Result<()>,
    {
        let base = self.basedir();
        walk_files_mut(&base, &mut self.tree, visitor)
    }

    /// Depth-first visit of every directory with its absolute path
    pub fn all_dirs<F>(&self, visitor: &mut F) -> Result<()>
    where
        F: FnMut(&Path, &DirNode) -> Result<()>,
    {
        walk_dirs(&self.basedir(), &self.tree, visitor)
    }

    /// Parallel visit fanning out per top-level directory
    ///
    /// The root directory itself is visited inline, then each top-level
    /// subtree is handed to the worker pool as one task that walks its whole
    /// branch. The call returns after the pool settles; the first visitor
    /// error aborts the traversal result.
    pub fn treetop<F>(&self, pool: &WorkerPool, visitor: F) -> Result<()>
    where
        F: Fn(&Path, &DirNode) -> Result<()> + Send + Sync + 'static,
    {
        let visitor = Arc::new(visitor);
        let base = self.basedir();
        visitor(&base, &self.tree)?;
        for (name, dir) in &self.tree.dirs {
            let branch = dir.clone();
            let path = base.join(name);
            let visitor = Arc::clone(&visitor);
            pool.backlog(move || visit_branch(visitor.as_ref(), &path, &branch));
        }
        pool.sync()
    }

    /// Map of relative file path to claimed digest
    ///
    /// Used on a previously materialized meta-catalog to recover what the
    /// last restore left on disk; the digests are the catalog's claims and
    /// are not re-hashed here.
    pub fn digest_map(&self) -> HashMap<String, String> {
        let mut state = HashMap::new();
        record_digests(String::new(), &self.tree, &mut state);
        state
    }

    /// Persist the catalog atomically at `path`
    ///
    /// Serialization is deterministic; saving the same tree twice yields
    /// byte-identical files. Catalogs with located trees must not contain
    /// empty digests.
    pub fn save_as(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let encoded = serde_json::to_vec(self)?;
        crate::pathops::write_file(path, &encoded, 0o644)
    }

    /// Load a catalog from `path`, enforcing structural invariants
    pub fn load_from(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(HolotreeError::CatalogNotFound(path.display().to_string()));
        }
        let bytes = fs::read(path)?;
        let loaded: Root = serde_json::from_slice(&bytes)?;
        loaded.validate()?;
        *self = loaded;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.format != CATALOG_FORMAT {
            return Err(HolotreeError::CatalogFormat(self.format, CATALOG_FORMAT));
        }
        validate_dir(&self.tree, true)
    }
}

fn validate_dir(dir: &DirNode, is_root: bool) -> Result<()> {
    if !is_root && !well_formed_name(&dir.name) {
        return Err(HolotreeError::invalid_catalog(format!(
            "malformed directory name {:?}",
            dir.name
        )));
    }
    for (key, file) in &dir.files {
        if key != &file.name || !well_formed_name(&file.name) {
            return Err(HolotreeError::invalid_catalog(format!(
                "malformed file entry {:?}",
                key
            )));
        }
        if file.digest.is_empty() {
            return Err(HolotreeError::invalid_catalog(format!(
                "file {:?} has no digest",
                file.name
            )));
        }
        if file.digest.len() != 64
            || !file
                .digest
                .bytes()
                .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(HolotreeError::invalid_catalog(format!(
                "file {:?} has malformed digest {:?}",
                file.name, file.digest
            )));
        }
        if file.mode > 0o177777 {
            return Err(HolotreeError::invalid_catalog(format!(
                "file {:?} has malformed mode {:o}",
                file.name, file.mode
            )));
        }
    }
    for (key, sub) in &dir.dirs {
        if key != &sub.name {
            return Err(HolotreeError::invalid_catalog(format!(
                "malformed directory entry {:?}",
                key
            )));
        }
        validate_dir(sub, false)?;
    }
    for name in dir.symlinks.keys() {
        if !well_formed_name(name) {
            return Err(HolotreeError::invalid_catalog(format!(
                "malformed symlink name {:?}",
                name
            )));
        }
    }
    for name in dir.files.keys() {
        if dir.dirs.contains_key(name) || dir.symlinks.contains_key(name) {
            return Err(HolotreeError::invalid_catalog(format!(
                "duplicate sibling {:?}",
                name
            )));
        }
    }
    for name in dir.dirs.keys() {
        if dir.symlinks.contains_key(name) {
            return Err(HolotreeError::invalid_catalog(format!(
                "duplicate sibling {:?}",
                name
            )));
        }
    }
    Ok(())
}

fn well_formed_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\0')
}

fn lift_into(node: &mut DirNode, dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| HolotreeError::PathConversion(entry.path()))?;
        let meta = fs::symlink_metadata(entry.path())?;
        if meta.file_type().is_symlink() {
            let target = fs::read_link(entry.path())?;
            let target = target
                .to_str()
                .ok_or_else(|| HolotreeError::PathConversion(entry.path()))?
                .to_string();
            node.symlinks.insert(name, target);
        } else if meta.is_dir() {
            let mut sub = DirNode::named(name.clone(), mode_of(&meta));
            lift_into(&mut sub, &entry.path())?;
            node.dirs.insert(name, sub);
        } else {
            node.files.insert(
                name.clone(),
                FileNode {
                    name,
                    size: meta.len(),
                    mode: mode_of(&meta),
                    digest: String::new(),
                    rewrite: Vec::new(),
                },
            );
        }
    }
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn walk_files<F>(path: &Path, dir: &DirNode, visitor: &mut F) -> Result<()>
where
    F: FnMut(&Path, &FileNode) -> Result<()>,
{
    for file in dir.files.values() {
        visitor(&path.join(&file.name), file)?;
    }
    for (name, sub) in &dir.dirs {
        walk_files(&path.join(name), sub, visitor)?;
    }
    Ok(())
}

fn walk_files_mut<F>(path: &Path, dir: &mut DirNode, visitor: &mut F) -> Result<()>
where
    F: FnMut(&Path, &mut FileNode) -> Result<()>,
{
    for file in dir.files.values_mut() {
        visitor(&path.join(&file.name), file)?;
    }
    for (name, sub) in dir.dirs.iter_mut() {
        let sub_path = path.join(name);
        walk_files_mut(&sub_path, sub, visitor)?;
    }
    Ok(())
}

fn walk_dirs<F>(path: &Path, dir: &DirNode, visitor: &mut F) -> Result<()>
where
    F: FnMut(&Path, &DirNode) -> Result<()>,
{
    visitor(path, dir)?;
    for (name, sub) in &dir.dirs {
        walk_dirs(&path.join(name), sub, visitor)?;
    }
    Ok(())
}

fn visit_branch<F>(visitor: &F, path: &Path, dir: &DirNode) -> Result<()>
where
    F: Fn(&Path, &DirNode) -> Result<()>,
{
    visitor(path, dir)?;
    for (name, sub) in &dir.dirs {
        visit_branch(visitor, &path.join(name), sub)?;
    }
    Ok(())
}

fn record_digests(prefix: String, dir: &DirNode, state: &mut HashMap<String, String>) {
    for (name, file) in &dir.files {
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        state.insert(rel, file.digest.clone());
    }
    for (name, sub) in &dir.dirs {
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        record_digests(rel, sub, state);
    }
}

/// Digest a file and locate sentinel occurrences in one streaming pass
///
/// Returns the hex digest, the byte size, and the absolute offsets of every
/// sentinel occurrence. The chunk boundary is bridged by carrying the last
/// `sentinel.len() - 1` bytes between reads.
fn digest_and_scan(path: &Path, sentinel: &[u8]) -> Result<(String, u64, Vec<u64>)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut offsets = Vec::new();
    let mut size: u64 = 0;

    let scan = !sentinel.is_empty();
    let keep = sentinel.len().saturating_sub(1);
    let mut window: Vec<u8> = Vec::new();
    let mut window_start: u64 = 0;
    let mut buffer = vec![0u8; SCAN_BUFFER];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        let chunk = &buffer[..bytes_read];
        hasher.update(chunk);
        size += bytes_read as u64;

        if scan {
            window.extend_from_slice(chunk);
            if window.len() >= sentinel.len() {
                for at in find_all(&window, sentinel) {
                    offsets.push(window_start + at as u64);
                }
                let consumed = window.len() - keep;
                window.drain(..consumed);
                window_start += consumed as u64;
            }
        }
    }

    Ok((hex::encode(hasher.finalize()), size, offsets))
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut found = Vec::new();
    if needle.is_empty() || haystack.len() < needle.len() {
        return found;
    }
    let mut from = 0;
    while from + needle.len() <= haystack.len() {
        match haystack[from..]
            .windows(needle.len())
            .position(|window| window == needle)
        {
            Some(at) => {
                found.push(from + at);
                from += at + needle.len();
            }
            None => break,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_bytes;
    use tempfile::TempDir;

    fn staged_tree() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let stage = temp_dir.path().join("stage");
        fs::create_dir_all(stage.join("a")).unwrap();
        fs::create_dir_all(stage.join("b")).unwrap();
        fs::write(stage.join("a/x.txt"), b"hello").unwrap();
        fs::write(stage.join("a/y.txt"), b"hello").unwrap();
        fs::write(stage.join("b/z.txt"), b"world").unwrap();
        (temp_dir, stage)
    }

    #[test]
    fn test_lift_records_structure() {
        let (_keep, stage) = staged_tree();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();

        assert_eq!(root.tree.dirs.len(), 2);
        assert_eq!(root.tree.file_count(), 3);
        let a = &root.tree.dirs["a"];
        assert!(a.files.contains_key("x.txt"));
        assert!(a.files.contains_key("y.txt"));
        assert_eq!(a.files["x.txt"].size, 5);
        assert!(a.files["x.txt"].digest.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_lift_records_symlinks_without_following() {
        let (_keep, stage) = staged_tree();
        std::os::unix::fs::symlink("a/x.txt", stage.join("link")).unwrap();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();

        assert_eq!(root.tree.symlinks["link"], "a/x.txt");
        assert_eq!(root.tree.file_count(), 3);
    }

    #[test]
    fn test_locator_fills_digests() {
        let (_keep, stage) = staged_tree();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        let sentinel = root.path.clone();
        root.locator(&sentinel).unwrap();

        assert_eq!(root.tree.dirs["a"].files["x.txt"].digest, digest_bytes(b"hello"));
        assert_eq!(root.tree.dirs["b"].files["z.txt"].digest, digest_bytes(b"world"));
    }

    #[test]
    fn test_locator_finds_sentinel_offsets() {
        let (_keep, stage) = staged_tree();
        let base = stage.to_str().unwrap().to_string();
        let script = format!("#!{base}/bin/python\nimport sys\nsys.path.insert(0, \"{base}/lib\")\n");
        fs::write(stage.join("a/run.sh"), script.as_bytes()).unwrap();

        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        root.locator(&base).unwrap();

        let plan = &root.tree.dirs["a"].files["run.sh"].rewrite;
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0], 2);
    }

    #[test]
    fn test_save_load_roundtrip_is_deterministic() {
        let (keep, stage) = staged_tree();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        let sentinel = root.path.clone();
        root.locator(&sentinel).unwrap();
        root.blueprint = "00ff".to_string();

        let first = keep.path().join("catalog-1");
        let second = keep.path().join("catalog-2");
        root.save_as(&first).unwrap();
        root.save_as(&second).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

        let mut reloaded = Root::new(Path::new(".")).unwrap();
        reloaded.load_from(&first).unwrap();
        assert_eq!(reloaded.blueprint, "00ff");
        assert_eq!(reloaded.tree, root.tree);
    }

    #[test]
    fn test_save_rejects_missing_digest() {
        let (keep, stage) = staged_tree();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        let out = keep.path().join("catalog");
        let err = root.save_as(&out).unwrap_err();
        assert!(matches!(err, HolotreeError::InvalidCatalog(_)));
    }

    #[test]
    fn test_load_rejects_wrong_format() {
        let (keep, stage) = staged_tree();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        let sentinel = root.path.clone();
        root.locator(&sentinel).unwrap();

        let out = keep.path().join("catalog");
        root.save_as(&out).unwrap();
        let mut text = fs::read_to_string(&out).unwrap();
        text = text.replace("\"format\":12", "\"format\":11");
        fs::write(&out, text).unwrap();

        let mut reloaded = Root::new(Path::new(".")).unwrap();
        let err = reloaded.load_from(&out).unwrap_err();
        assert!(matches!(err, HolotreeError::CatalogFormat(11, 12)));
    }

    #[test]
    fn test_relocate_pads_shorter_base() {
        let (_keep, stage) = staged_tree();
        let base = stage.to_str().unwrap().to_string();
        fs::write(stage.join("a/run.sh"), format!("#!{base}/bin/sh\n")).unwrap();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        root.locator(&base).unwrap();

        root.relocate(Path::new("/t")).unwrap();
        let filler = root.rewrite_filler().unwrap();
        assert_eq!(filler.len(), base.len());
        assert!(filler.starts_with(b"/t"));
        assert!(filler[2..].iter().all(|&b| b == b'/'));
    }

    #[test]
    fn test_relocate_rejects_longer_base() {
        let (_keep, stage) = staged_tree();
        let base = stage.to_str().unwrap().to_string();
        fs::write(stage.join("a/run.sh"), format!("#!{base}/bin/sh\n")).unwrap();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        root.locator(&base).unwrap();

        let longer = format!("{base}_much_longer_target");
        let err = root.relocate(Path::new(&longer)).unwrap_err();
        assert!(matches!(err, HolotreeError::RelocationOverflow { .. }));
    }

    #[test]
    fn test_digest_map_uses_relative_paths() {
        let (_keep, stage) = staged_tree();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();
        let sentinel = root.path.clone();
        root.locator(&sentinel).unwrap();

        let state = root.digest_map();
        assert_eq!(state.len(), 3);
        assert_eq!(state["a/x.txt"], digest_bytes(b"hello"));
        assert_eq!(state["b/z.txt"], digest_bytes(b"world"));
    }

    #[test]
    fn test_treetop_visits_every_directory() {
        let (_keep, stage) = staged_tree();
        let mut root = Root::new(&stage).unwrap();
        root.lift().unwrap();

        let pool = WorkerPool::new(2).unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        root.treetop(&pool, move |path, _dir| {
            sink.lock().push(path.to_path_buf());
            Ok(())
        })
        .unwrap();

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec![stage.clone(), stage.join("a"), stage.join("b")]);
    }

    #[test]
    fn test_find_all_handles_adjacent_matches() {
        assert_eq!(find_all(b"abab", b"ab"), vec![0, 2]);
        assert_eq!(find_all(b"aaa", b"aa"), vec![0]);
        assert_eq!(find_all(b"xyz", b"ab"), Vec::<usize>::new());
    }
}
