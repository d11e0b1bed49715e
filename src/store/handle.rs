//! Shared store handle and group proxies.
//!
//! A [`Store`] owns the open file and the materialized group tree. Clones of
//! a store, and every [`Group`] obtained from it, share that single state;
//! closing any of them closes the file for all.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tempfile::NamedTempFile;

use super::reader::{read_tree, IStreams};
use super::tree::{base_name, join_path, normalize_path, split_path, Dataset, Entry, GroupNode};
use super::value::{AttrValue, Attrs};
use super::writer::encode_tree;
use crate::util::{Error, Result};

/// Default value of the `__version__` marker.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Options for opening a store.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Memory-map the file while loading it.
    pub use_mmap: bool,
    /// fsync after every flush that wrote data.
    pub sync_on_flush: bool,
    /// Version marker written to new files.
    pub default_version: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            use_mmap: true,
            sync_on_flush: true,
            default_version: DEFAULT_VERSION.to_string(),
        }
    }
}

impl StoreOptions {
    pub fn use_mmap(mut self, enabled: bool) -> Self {
        self.use_mmap = enabled;
        self
    }

    pub fn sync_on_flush(mut self, enabled: bool) -> Self {
        self.sync_on_flush = enabled;
        self
    }

    pub fn default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = version.into();
        self
    }
}

struct State {
    /// None once closed
    file: Option<File>,
    /// Backing temp file of a temporary store; deleted on release
    temp: Option<NamedTempFile>,
    root: GroupNode,
    dirty: bool,
}

struct Shared {
    path: PathBuf,
    options: StoreOptions,
    state: RwLock<State>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.file.is_some() && state.dirty {
            if let Err(e) = write_out(&self.path, self.options.sync_on_flush, state) {
                tracing::warn!(path = %self.path.display(), error = %e, "flush on drop failed");
            }
        }
    }
}

/// Rewrite the whole file from the tree if anything changed.
///
/// The image is written to a sibling temp file which then replaces the
/// store file, so an interrupted flush leaves the previous image in place.
fn write_out(path: &Path, sync: bool, state: &mut State) -> Result<()> {
    if !state.dirty {
        return Ok(());
    }
    let current = state.file.as_ref().ok_or_else(|| Error::Closed(path.to_path_buf()))?;
    let permissions = current.metadata()?.permissions();
    let image = encode_tree(&state.root)?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut next = tempfile::Builder::new()
        .prefix(".wt5-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    next.write_all(&image)?;
    next.as_file().set_permissions(permissions)?;
    if sync {
        next.as_file().sync_all()?;
    }
    let file = next.persist(path).map_err(|e| e.error)?;

    state.file = Some(file);
    state.dirty = false;
    tracing::debug!(path = %path.display(), bytes = image.len(), "store flushed");
    Ok(())
}

/// Handle to an open store file.
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Store {
    /// Open (or create) a store file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, StoreOptions::default())
    }

    /// Open (or create) a store file.
    ///
    /// Any failure, including a corrupt file, is reported as
    /// [`Error::StorageUnavailable`].
    pub fn open_opts(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let load = || -> Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            Self::from_file(path.clone(), file, None, options)
        };
        load().map_err(|e| Error::unavailable(&path, e))
    }

    /// Create a store in a fresh temp file, deleted when the store is
    /// closed or dropped.
    pub fn temporary() -> Result<Self> {
        Self::temporary_opts(StoreOptions::default())
    }

    pub fn temporary_opts(options: StoreOptions) -> Result<Self> {
        let create = || -> Result<Self> {
            let temp = tempfile::Builder::new().prefix("wt5-").suffix(".wt5").tempfile()?;
            let file = temp.reopen()?;
            Self::from_file(temp.path().to_path_buf(), file, Some(temp), options)
        };
        create().map_err(|e| Error::unavailable(std::env::temp_dir(), e))
    }

    fn from_file(
        path: PathBuf,
        file: File,
        temp: Option<NamedTempFile>,
        options: StoreOptions,
    ) -> Result<Self> {
        let size = file.metadata()?.len();
        let (root, dirty) = if size == 0 {
            (GroupNode::new(), true)
        } else {
            let streams = Arc::new(IStreams::from_file(&file, options.use_mmap)?);
            (read_tree(streams)?, false)
        };
        tracing::debug!(path = %path.display(), size, "store opened");

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                options,
                state: RwLock::new(State { file: Some(file), temp, root, dirty }),
            }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.shared.options
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.read().file.is_none()
    }

    /// True if the tree holds changes not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.shared.state.read().dirty
    }

    /// True if both handles share the same open state.
    pub fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Handle for the root group.
    pub fn root(&self) -> Group {
        Group::new(self.clone(), "/".to_string())
    }

    /// Open a group, failing with [`Error::KeyNotFound`] if it is absent.
    pub fn group(&self, path: &str) -> Result<Group> {
        let path = normalize_path(path);
        self.read(|root| {
            let parts: Vec<&str> = split_path(&path).collect();
            let Some((last, parents)) = parts.split_last() else {
                return Ok(());
            };
            let parent = root
                .resolve(parents.iter().copied())
                .ok_or_else(|| Error::KeyNotFound(path.clone()))?;
            match parent.entry(last) {
                Some(Entry::Group(_)) => Ok(()),
                Some(Entry::Dataset(_)) => Err(Error::mismatch("group", "dataset")),
                None => Err(Error::KeyNotFound(path.clone())),
            }
        })?;
        Ok(Group::new(self.clone(), path))
    }

    /// Open a group, creating it and any missing parents.
    pub fn require_group(&self, path: &str) -> Result<Group> {
        let path = normalize_path(path);
        self.write(|root| {
            let (_, created) = root.require(split_path(&path))?;
            if created {
                tracing::trace!(path = %path, "group created");
            }
            Ok(((), created))
        })?;
        Ok(Group::new(self.clone(), path))
    }

    /// True if a group exists at `path`.
    pub fn contains(&self, path: &str) -> Result<bool> {
        self.read(|root| Ok(root.resolve(split_path(path)).is_some()))
    }

    /// Write pending changes to disk. Cheap when nothing changed.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.shared.state.write();
        if state.file.is_none() {
            return Err(Error::Closed(self.shared.path.clone()));
        }
        write_out(&self.shared.path, self.shared.options.sync_on_flush, &mut state)
    }

    /// Flush and release the file handle.
    ///
    /// Closing a closed store is a no-op. A failing final flush is logged
    /// and returned as [`Error::CloseFailed`]; the handle is released anyway.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.state.write();
        if state.file.is_none() {
            tracing::debug!(path = %self.shared.path.display(), "store already closed");
            return Ok(());
        }

        let flushed = write_out(&self.shared.path, self.shared.options.sync_on_flush, &mut state);
        state.file = None;
        state.temp = None;
        state.root = GroupNode::new();
        state.dirty = false;
        tracing::info!(path = %self.shared.path.display(), "closing");

        flushed.map_err(|e| {
            tracing::warn!(path = %self.shared.path.display(), error = %e, "flush during close failed");
            Error::CloseFailed {
                path: self.shared.path.clone(),
                source: Box::new(e),
            }
        })
    }

    /// Run `f` against the tree of an open store.
    fn read<T>(&self, f: impl FnOnce(&GroupNode) -> Result<T>) -> Result<T> {
        let state = self.shared.state.read();
        if state.file.is_none() {
            return Err(Error::Closed(self.shared.path.clone()));
        }
        f(&state.root)
    }

    /// Run a mutation; `f` reports whether anything changed.
    fn write<T>(&self, f: impl FnOnce(&mut GroupNode) -> Result<(T, bool)>) -> Result<T> {
        let mut state = self.shared.state.write();
        if state.file.is_none() {
            return Err(Error::Closed(self.shared.path.clone()));
        }
        let (out, changed) = f(&mut state.root)?;
        state.dirty |= changed;
        Ok(out)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.shared.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Handle to one group inside a store: the store plus an absolute path.
///
/// Handles are cheap and hold no data themselves; every call resolves the
/// path against the current tree.
#[derive(Clone)]
pub struct Group {
    store: Store,
    path: String,
}

impl Group {
    pub(crate) fn new(store: Store, path: String) -> Self {
        Self { store, path }
    }

    /// Absolute path inside the store.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        base_name(&self.path)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Path of the backing file.
    pub fn filepath(&self) -> &Path {
        self.store.path()
    }

    fn missing(&self) -> Error {
        Error::KeyNotFound(self.path.clone())
    }

    fn with_node<T>(&self, f: impl FnOnce(&GroupNode) -> Result<T>) -> Result<T> {
        self.store.read(|root| {
            let node = root.resolve(split_path(&self.path)).ok_or_else(|| self.missing())?;
            f(node)
        })
    }

    fn with_node_mut<T>(&self, f: impl FnOnce(&mut GroupNode) -> Result<(T, bool)>) -> Result<T> {
        self.store.write(|root| {
            let node = root.resolve_mut(split_path(&self.path)).ok_or_else(|| self.missing())?;
            f(node)
        })
    }

    /// Snapshot of all attributes.
    pub fn attrs(&self) -> Result<Attrs> {
        self.with_node(|node| Ok(node.attrs().clone()))
    }

    pub fn attr(&self, key: &str) -> Result<Option<AttrValue>> {
        self.with_node(|node| Ok(node.attrs().get(key).cloned()))
    }

    pub fn set_attr(&self, key: impl Into<String>, value: impl Into<AttrValue>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.with_node_mut(|node| {
            if node.attrs().get(&key) == Some(&value) {
                return Ok(((), false));
            }
            node.attrs_mut().set(key, value);
            Ok(((), true))
        })
    }

    /// Merge `attrs` into the group's attributes, `attrs` winning.
    pub fn update_attrs(&self, attrs: Attrs) -> Result<()> {
        if attrs.is_empty() {
            return Ok(());
        }
        self.with_node_mut(|node| {
            let changed = attrs.iter().any(|(k, v)| node.attrs().get(k) != Some(v));
            node.attrs_mut().merge(attrs);
            Ok(((), changed))
        })
    }

    /// Return the attribute, first writing `default` if it is absent.
    pub fn require_attr(&self, key: &str, default: impl Into<AttrValue>) -> Result<AttrValue> {
        let default = default.into();
        self.with_node_mut(|node| match node.attrs().get(key) {
            Some(existing) => Ok((existing.clone(), false)),
            None => {
                node.attrs_mut().set(key, default.clone());
                Ok((default, true))
            }
        })
    }

    /// Names of every member (groups and datasets) in insertion order.
    pub fn member_names(&self) -> Result<Vec<String>> {
        self.with_node(|node| Ok(node.names()))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        self.with_node(|node| Ok(node.entry(name).is_some()))
    }

    /// Open a direct sub-group.
    pub fn child_group(&self, name: &str) -> Result<Group> {
        self.store.group(&join_path(&self.path, name))
    }

    /// Open or create a direct sub-group.
    pub fn require_group(&self, name: &str) -> Result<Group> {
        self.store.require_group(&join_path(&self.path, name))
    }

    /// Insert or replace a dataset member.
    pub fn write_dataset(&self, name: &str, dataset: Dataset) -> Result<()> {
        self.with_node_mut(|node| {
            node.put_dataset(name, dataset)?;
            Ok(((), true))
        })
    }

    pub fn read_dataset(&self, name: &str) -> Result<Dataset> {
        self.with_node(|node| match node.entry(name) {
            Some(Entry::Dataset(ds)) => Ok(ds.clone()),
            Some(Entry::Group(_)) => Err(Error::mismatch("dataset", "group")),
            None => Err(Error::KeyNotFound(join_path(&self.path, name))),
        })
    }

    /// Names of dataset members only.
    pub fn dataset_names(&self) -> Result<Vec<String>> {
        self.with_node(|node| {
            Ok(node
                .entries
                .iter()
                .filter(|(_, e)| matches!(e, Entry::Dataset(_)))
                .map(|(n, _)| n.clone())
                .collect())
        })
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.store.path() == other.store.path()
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Group {:?} in {}>", self.path, self.store.path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.wt5");
        (dir, path)
    }

    #[test]
    fn test_new_file_is_created() {
        let (_dir, path) = scratch();
        let store = Store::open(&path).unwrap();
        store.flush().unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_groups_and_attrs_persist() {
        let (_dir, path) = scratch();
        {
            let store = Store::open(&path).unwrap();
            let g = store.require_group("/a/b").unwrap();
            g.set_attr("class", "Collection").unwrap();
            g.write_dataset("x", Dataset::from_slice(&[1.0f64, 2.0])).unwrap();
            store.close().unwrap();
        }

        let store = Store::open(&path).unwrap();
        let g = store.group("a/b").unwrap();
        assert_eq!(g.name(), "b");
        assert_eq!(g.attr("class").unwrap(), Some(AttrValue::from("Collection")));
        assert_eq!(g.read_dataset("x").unwrap().to_vec::<f64>().unwrap(), [1.0, 2.0]);
        assert_eq!(g.dataset_names().unwrap(), ["x"]);
    }

    #[test]
    fn test_missing_group() {
        let store = Store::temporary().unwrap();
        assert!(matches!(store.group("/nope"), Err(Error::KeyNotFound(_))));
        assert!(!store.contains("/nope").unwrap());
    }

    #[test]
    fn test_dataset_is_not_a_group() {
        let store = Store::temporary().unwrap();
        store.root().write_dataset("x", Dataset::from_slice(&[1u8])).unwrap();
        assert!(matches!(store.group("/x"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(store.root().read_dataset("y"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_require_attr_keeps_existing() {
        let store = Store::temporary().unwrap();
        let root = store.root();
        assert_eq!(root.require_attr("__version__", "0.0.0").unwrap(), AttrValue::from("0.0.0"));
        root.set_attr("__version__", "1.2.3").unwrap();
        assert_eq!(root.require_attr("__version__", "0.0.0").unwrap(), AttrValue::from("1.2.3"));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let store = Store::temporary().unwrap();
        let temp_path = store.path().to_path_buf();
        let g = store.require_group("/g").unwrap();

        store.close().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(!temp_path.exists());
        assert!(matches!(g.attrs(), Err(Error::Closed(_))));
        assert!(matches!(store.flush(), Err(Error::Closed(_))));
    }

    #[test]
    fn test_corrupt_file_is_unavailable() {
        let (_dir, path) = scratch();
        std::fs::write(&path, b"definitely not a store file").unwrap();
        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
    }

    #[test]
    fn test_buffered_reads() {
        let (_dir, path) = scratch();
        let opts = StoreOptions::default().use_mmap(false).sync_on_flush(false);
        {
            let store = Store::open_opts(&path, opts.clone()).unwrap();
            store.require_group("/x").unwrap();
        }
        let store = Store::open_opts(&path, opts).unwrap();
        assert!(store.contains("/x").unwrap());
    }

    #[test]
    fn test_unchanged_writes_stay_clean() {
        let (_dir, path) = scratch();
        let store = Store::open(&path).unwrap();
        let g = store.require_group("/g").unwrap();
        g.set_attr("class", "Data").unwrap();
        assert!(store.is_dirty());
        store.flush().unwrap();
        assert!(!store.is_dirty());

        store.require_group("/g").unwrap();
        g.set_attr("class", "Data").unwrap();
        g.require_attr("class", "Collection").unwrap();
        g.update_attrs(Attrs::new().with("class", "Data")).unwrap();
        assert!(!store.is_dirty());

        g.set_attr("class", "Collection").unwrap();
        assert!(store.is_dirty());
    }

    #[test]
    fn test_flush_leaves_no_stray_files() {
        let (dir, path) = scratch();
        let store = Store::open(&path).unwrap();
        store.require_group("/a").unwrap();
        store.flush().unwrap();
        store.require_group("/b").unwrap();
        store.close().unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["store.wt5"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_flush_replaces_file_whole() {
        use std::io::Read;
        use std::os::unix::fs::PermissionsExt;

        let (_dir, path) = scratch();
        let store = Store::open(&path).unwrap();
        store.require_group("/a").unwrap();
        store.flush().unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
        let before = std::fs::read(&path).unwrap();
        let mut old = File::open(&path).unwrap();

        store.require_group("/b").unwrap();
        store.flush().unwrap();

        // The previous image was never overwritten in place
        let mut seen = Vec::new();
        old.read_to_end(&mut seen).unwrap();
        assert_eq!(seen, before);
        assert_ne!(std::fs::read(&path).unwrap(), before);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_group_equality_is_structural() {
        let store = Store::temporary().unwrap();
        let a = store.require_group("/a").unwrap();
        let b = store.group("a/").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, store.root());
    }
}
