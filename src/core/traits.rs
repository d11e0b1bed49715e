//! The capability set shared by every node kind.

use std::path::Path;

use crate::store::{Attrs, Group};
use crate::util::Result;

use super::{CLASS_KEY, NAME_KEY};

/// A typed view over one store group.
///
/// Implemented by [`Collection`](crate::collection::Collection),
/// [`Data`](crate::data::Data) and raw [`Group`]s, so code walking a tree
/// can flush or inspect any child without knowing its kind.
pub trait Node {
    /// The bound store group.
    fn group(&self) -> &Group;

    /// Logical name: last path segment, or the `name` attribute at the root.
    fn natural_name(&self) -> &str;

    /// Write pending changes of this node (and anything below it) to disk.
    fn flush(&self) -> Result<()>;

    /// Absolute path inside the store.
    fn path(&self) -> &str {
        self.group().path()
    }

    /// Path of the backing file.
    fn filepath(&self) -> &Path {
        self.group().filepath()
    }

    /// Snapshot of the node's attributes.
    fn attrs(&self) -> Result<Attrs> {
        self.group().attrs()
    }

    /// Stored type tag, if any.
    fn class(&self) -> Result<Option<String>> {
        Ok(self
            .group()
            .attr(CLASS_KEY)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}

impl Node for Group {
    fn group(&self) -> &Group {
        self
    }

    fn natural_name(&self) -> &str {
        self.name()
    }

    fn flush(&self) -> Result<()> {
        self.store().flush()
    }
}

/// Resolve the natural name of a freshly bound group.
pub(crate) fn resolve_natural_name(group: &Group, default: &str) -> Result<String> {
    let name = group.name();
    if !name.is_empty() {
        return Ok(name.to_string());
    }
    Ok(group
        .attr(NAME_KEY)?
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| default.to_string()))
}
