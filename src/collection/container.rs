//! The collection node: an ordered, named, file-backed container.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::{
    resolve_natural_name, Node, CLASS_KEY, COLLECTION_CLASS, DEFAULT_EXTENSION, ITEM_NAMES_KEY,
    NAME_KEY, VERSION_KEY,
};
use crate::data::Data;
use crate::store::{check_name, join_path, normalize_path, AttrValue, Attrs, Group, Store, StoreOptions};
use crate::util::{Error, Result};

use super::child::{Child, Key};

/// Nestable collection of data and further collections.
///
/// A collection is bound to one store group. Its children are listed, in
/// order, by the `item_names` attribute of that group; the in-memory cache
/// (`items`) is kept index-aligned with that list.
#[derive(Clone)]
pub struct Collection {
    group: Group,
    natural_name: String,
    items: Vec<Child>,
}

impl Collection {
    /// Natural name of a root collection with no `name` attribute.
    pub const DEFAULT_NAME: &'static str = "collection";

    /// Open (or create) the store at `filepath` and bind to `parent/name`.
    ///
    /// With no `name` the collection binds to `parent` itself (the store
    /// root when `parent` is also absent).
    pub fn open(
        filepath: impl AsRef<Path>,
        parent: Option<&str>,
        name: Option<&str>,
        attrs: Attrs,
    ) -> Result<Self> {
        Self::open_opts(filepath, StoreOptions::default(), parent, name, attrs)
    }

    pub fn open_opts(
        filepath: impl AsRef<Path>,
        options: StoreOptions,
        parent: Option<&str>,
        name: Option<&str>,
        attrs: Attrs,
    ) -> Result<Self> {
        let store = Store::open_opts(filepath, options)?;
        tracing::info!(filepath = %store.path().display(), "filepath");
        Self::new(&store, parent, name, attrs)
    }

    /// Collection backed by a temp file that disappears on close.
    pub fn temporary(name: Option<&str>, attrs: Attrs) -> Result<Self> {
        let store = Store::temporary()?;
        tracing::info!(filepath = %store.path().display(), "filepath");
        Self::new(&store, None, name, attrs)
    }

    /// Bind to `parent/name` inside an already open store.
    pub fn new(store: &Store, parent: Option<&str>, name: Option<&str>, attrs: Attrs) -> Result<Self> {
        let parent = parent.unwrap_or("/");
        let path = match name {
            Some(name) => {
                check_name(name)?;
                join_path(parent, name)
            }
            None => normalize_path(parent),
        };

        store
            .root()
            .require_attr(VERSION_KEY, store.options().default_version.as_str())?;
        let group = store.require_group(&path)?;
        if let Some(name) = name {
            group.set_attr(NAME_KEY, name)?;
        }
        group.update_attrs(attrs)?;
        Self::bind(group)
    }

    /// Wrap an existing group: force the tag, then load every listed child.
    pub(crate) fn bind(group: Group) -> Result<Self> {
        group.set_attr(CLASS_KEY, COLLECTION_CLASS)?;
        group.require_attr(VERSION_KEY, group.store().options().default_version.as_str())?;
        let names = read_item_names(&group)?;
        let natural_name = resolve_natural_name(&group, Self::DEFAULT_NAME)?;

        let mut collection = Self {
            group,
            natural_name,
            items: Vec::new(),
        };
        collection.items = collection.load_items(&names)?;
        Ok(collection)
    }

    /// Open every listed child, failing on names with no store entry.
    fn load_items(&self, names: &[String]) -> Result<Vec<Child>> {
        let mut items = Vec::with_capacity(names.len());
        for name in names {
            if !self.group.contains(name)? {
                return Err(Error::InconsistentState(format!(
                    "{} lists {:?} but the store has no such entry",
                    self.group.path(),
                    name
                )));
            }
            items.push(self.get(name)?);
        }
        Ok(items)
    }

    /// Reload the cache if it no longer matches the persisted name list.
    ///
    /// Returns whether anything was reloaded.
    fn sync_items(&mut self) -> Result<bool> {
        let names = self.item_names()?;
        let aligned = names.len() == self.items.len()
            && names.iter().zip(&self.items).all(|(n, c)| c.natural_name() == n);
        if aligned {
            return Ok(false);
        }
        self.items = self.load_items(&names)?;
        tracing::debug!(path = self.group.path(), items = names.len(), "child cache reloaded");
        Ok(true)
    }

    /// Bring the cached children of this node, and of every nested
    /// collection, back in line with the store.
    ///
    /// Needed only when the tree was changed through another proxy, such as
    /// one returned by [`get`](Self::get).
    pub fn refresh(&mut self) -> Result<()> {
        if !self.sync_items()? {
            for item in &mut self.items {
                if let Child::Collection(c) = item {
                    c.refresh()?;
                }
            }
        }
        Ok(())
    }

    /// Backing store shared by this node and all its children.
    pub fn store(&self) -> &Store {
        self.group.store()
    }

    /// Persisted child names, in order.
    pub fn item_names(&self) -> Result<Vec<String>> {
        read_item_names(&self.group)
    }

    /// Number of persisted children; 0 once the store is closed.
    pub fn len(&self) -> usize {
        self.item_names().map_or(0, |names| names.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached children in item order.
    ///
    /// The cache follows every change made through this node. Changes made
    /// through another proxy show up after [`refresh`](Self::refresh).
    pub fn children(&self) -> &[Child] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Child> {
        self.items.iter()
    }

    /// Cached child at `index`.
    pub fn child(&self, index: usize) -> Option<&Child> {
        self.items.get(index)
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut Child> {
        self.items.get_mut(index)
    }

    /// Cached child by name.
    pub fn get_child(&self, name: &str) -> Option<&Child> {
        self.items.iter().find(|c| c.natural_name() == name)
    }

    pub fn get_child_mut(&mut self, name: &str) -> Option<&mut Child> {
        self.items.iter_mut().find(|c| c.natural_name() == name)
    }

    /// Re-open a child from the store by position or name.
    ///
    /// Every call builds a fresh proxy; two results for the same key compare
    /// equal (same file, same path) but do not share state.
    pub fn get<'k>(&self, key: impl Into<Key<'k>>) -> Result<Child> {
        let name = match key.into() {
            Key::Index(index) => {
                let names = self.item_names()?;
                let count = names.len();
                names
                    .into_iter()
                    .nth(index)
                    .ok_or(Error::IndexOutOfRange { index, count })?
            }
            Key::Name(name) => name.to_string(),
        };
        Child::open(self.group.child_group(&name)?)
    }

    /// Create a nested collection and register it at `position` (append
    /// when `None`).
    pub fn create_collection(
        &mut self,
        name: &str,
        position: Option<usize>,
        attrs: Attrs,
    ) -> Result<&mut Collection> {
        self.sync_items()?;
        let position = self.check_new_item(name, position)?;
        let child = Collection::new(self.store(), Some(self.group.path()), Some(name), attrs)?;
        let index = self.commit(position, Child::Collection(child))?;
        self.items[index]
            .as_collection_mut()
            .ok_or_else(|| Error::InconsistentState(format!("{} is not a collection", name)))
    }

    /// Create a data child and register it at `position` (append when
    /// `None`).
    pub fn create_data(&mut self, name: &str, position: Option<usize>, attrs: Attrs) -> Result<&Data> {
        self.sync_items()?;
        let position = self.check_new_item(name, position)?;
        let child = Data::new(self.store(), self.group.path(), name, attrs)?;
        let index = self.commit(position, Child::Data(child))?;
        self.items[index]
            .as_data()
            .ok_or_else(|| Error::InconsistentState(format!("{} is not data", name)))
    }

    /// Validate a new child name and resolve its insert position.
    fn check_new_item(&self, name: &str, position: Option<usize>) -> Result<usize> {
        check_name(name)?;
        let names = self.item_names()?;
        if names.iter().any(|n| n == name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        match position {
            None => Ok(names.len()),
            Some(p) if p <= names.len() => Ok(p),
            Some(p) => Err(Error::IndexOutOfRange {
                index: p,
                count: names.len(),
            }),
        }
    }

    /// Register a constructed child. The name list write is the commit
    /// point; the cache is only touched once it succeeded.
    fn commit(&mut self, position: usize, child: Child) -> Result<usize> {
        let name = child.natural_name().to_string();
        if !self.group.contains(&name)? {
            return Err(Error::InconsistentState(format!(
                "child group {} missing after creation",
                join_path(self.group.path(), &name)
            )));
        }

        let mut names = self.item_names()?;
        names.insert(position, name);
        self.group.set_attr(ITEM_NAMES_KEY, AttrValue::byte_strings(&names))?;
        self.items.insert(position, child);
        debug_assert_eq!(self.items.len(), names.len());
        Ok(position)
    }

    /// Membership lookup by arbitrary key. Not supported.
    pub fn index(&self, _key: &str) -> Result<usize> {
        Err(Error::NotImplemented("Collection::index"))
    }

    /// Keyed assignment of a child. Not supported.
    pub fn set_item(&mut self, _key: &str, _value: Child) -> Result<()> {
        Err(Error::NotImplemented("Collection::set_item"))
    }

    /// Flush every cached child depth-first, then the store.
    pub fn flush(&self) -> Result<()> {
        for item in &self.items {
            item.flush()?;
        }
        self.store().flush()
    }

    /// Flush, then copy the whole store file to `filepath`.
    ///
    /// Without a target the file lands in the current directory as
    /// `<natural_name>.wt5`; a target whose file name has no `.` at all gets
    /// `.wt5` appended. A leading `~` expands to the home directory. Returns
    /// the resolved target path.
    pub fn save(&self, filepath: Option<&Path>) -> Result<PathBuf> {
        self.flush()?;

        let target = match filepath {
            None => std::env::current_dir()?
                .join(format!("{}.{}", self.natural_name, DEFAULT_EXTENSION)),
            Some(path) => with_default_extension(expand_user(path)),
        };

        let source = self.store().path();
        if same_file(source, &target) {
            tracing::debug!(path = %target.display(), "save target is the backing file");
        } else {
            std::fs::copy(source, &target)?;
        }
        tracing::info!(path = %target.display(), "file saved");
        Ok(target)
    }

    /// Release the backing file. Safe to call more than once.
    ///
    /// The store is shared, so this closes it for every node of the tree.
    pub fn close(&mut self) -> Result<()> {
        tracing::info!(filepath = %self.store().path().display(), "Closing");
        self.items.clear();
        self.store().close()
    }
}

impl Node for Collection {
    fn group(&self) -> &Group {
        &self.group
    }

    fn natural_name(&self) -> &str {
        &self.natural_name
    }

    fn flush(&self) -> Result<()> {
        Collection::flush(self)
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Child;
    type IntoIter = std::slice::Iter<'a, Child>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.item_names().unwrap_or_else(|_| {
            self.items.iter().map(|c| c.natural_name().to_string()).collect()
        });
        write!(
            f,
            "<Collection '{}' {:?} at {}::{}>",
            self.natural_name,
            names,
            self.store().path().display(),
            self.group.path()
        )
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Read the persisted name list, creating it empty if absent.
fn read_item_names(group: &Group) -> Result<Vec<String>> {
    match group.require_attr(ITEM_NAMES_KEY, AttrValue::ByteStrings(Vec::new()))? {
        AttrValue::ByteStrings(items) => items
            .into_iter()
            .map(|b| String::from_utf8(b).map_err(Error::from))
            .collect(),
        other => Err(Error::mismatch("byte string array", other.type_name())),
    }
}

fn expand_user(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Append `.wt5` unless the file name already contains a dot. Dotfiles
/// such as `.hidden` count as named and are left alone.
fn with_default_extension(mut path: PathBuf) -> PathBuf {
    let has_dot = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().contains('.'));
    if !has_dot {
        path.set_extension(DEFAULT_EXTENSION);
    }
    path
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
