//! Leaf data node.
//!
//! A [`Data`] is a store group tagged `class = "Data"` holding named numeric
//! datasets. It carries no unit or axis semantics of its own; a collection
//! treats it as an opaque child it can address, list and flush.

use std::fmt;

use crate::core::{resolve_natural_name, Node, CLASS_KEY, DATA_CLASS};
use crate::store::{check_name, join_path, Attrs, Dataset, Group, Store};
use crate::util::{Element, Result};

/// Leaf node proxy bound to one group.
#[derive(Clone)]
pub struct Data {
    group: Group,
    natural_name: String,
}

impl Data {
    /// Name used when a caller has no better one.
    pub const DEFAULT_NAME: &'static str = "data";

    /// Bind to `parent/name`, creating the group if needed.
    ///
    /// `attrs` are merged into the group's attributes, then the type tag is
    /// forced to `"Data"`.
    pub fn new(store: &Store, parent: &str, name: &str, attrs: Attrs) -> Result<Self> {
        check_name(name)?;
        let group = store.require_group(&join_path(parent, name))?;
        group.update_attrs(attrs)?;
        Self::bind(group)
    }

    /// Wrap an existing group, tagging it if the tag is missing or wrong.
    pub(crate) fn bind(group: Group) -> Result<Self> {
        group.set_attr(CLASS_KEY, DATA_CLASS)?;
        let natural_name = resolve_natural_name(&group, Self::DEFAULT_NAME)?;
        Ok(Self { group, natural_name })
    }

    /// Store (or replace) a dataset with the given shape.
    pub fn create_dataset<T: Element>(&self, name: &str, shape: &[u64], values: &[T]) -> Result<()> {
        check_name(name)?;
        self.group.write_dataset(name, Dataset::from_values(shape, values)?)
    }

    pub fn dataset(&self, name: &str) -> Result<Dataset> {
        self.group.read_dataset(name)
    }

    pub fn dataset_names(&self) -> Result<Vec<String>> {
        self.group.dataset_names()
    }
}

impl Node for Data {
    fn group(&self) -> &Group {
        &self.group
    }

    fn natural_name(&self) -> &str {
        &self.natural_name
    }

    fn flush(&self) -> Result<()> {
        self.group.store().flush()
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Data {:?} at {}::{}>", self.natural_name, self.filepath().display(), self.path())
    }
}
