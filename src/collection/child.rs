//! Child kinds of a collection and the keys used to address them.

use crate::core::{Node, COLLECTION_CLASS, DATA_CLASS};
use crate::data::Data;
use crate::store::Group;
use crate::util::Result;

use super::Collection;

/// Positional or named address of a child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key<'a> {
    /// Position in the item name list
    Index(usize),
    /// Name of the child group
    Name(&'a str),
}

impl From<usize> for Key<'_> {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Key::Name(name)
    }
}

impl<'a> From<&'a String> for Key<'a> {
    fn from(name: &'a String) -> Self {
        Key::Name(name)
    }
}

/// A child of a collection, materialized by its stored type tag.
#[derive(Clone, Debug, PartialEq)]
pub enum Child {
    /// Tagged `"Collection"`
    Collection(Collection),
    /// Tagged `"Data"`
    Data(Data),
    /// Untagged (or unknown tag); returned unconverted
    Raw(Group),
}

impl Child {
    /// Instantiate the right kind for a group by reading its `class` tag.
    pub fn open(group: Group) -> Result<Self> {
        let child = match group.class()?.as_deref() {
            Some(COLLECTION_CLASS) => Child::Collection(Collection::bind(group)?),
            Some(DATA_CLASS) => Child::Data(Data::bind(group)?),
            _ => Child::Raw(group),
        };
        tracing::trace!(path = child.path(), kind = child.kind(), "child opened");
        Ok(child)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Child::Collection(_) => COLLECTION_CLASS,
            Child::Data(_) => DATA_CLASS,
            Child::Raw(_) => "Group",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Child::Collection(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Child::Data(_))
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Child::Raw(_))
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Child::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut Collection> {
        match self {
            Child::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Data> {
        match self {
            Child::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Group> {
        match self {
            Child::Raw(g) => Some(g),
            _ => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Child::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Data> {
        match self {
            Child::Data(d) => Some(d),
            _ => None,
        }
    }
}

impl Node for Child {
    fn group(&self) -> &Group {
        match self {
            Child::Collection(c) => c.group(),
            Child::Data(d) => d.group(),
            Child::Raw(g) => g,
        }
    }

    fn natural_name(&self) -> &str {
        match self {
            Child::Collection(c) => c.natural_name(),
            Child::Data(d) => d.natural_name(),
            Child::Raw(g) => g.name(),
        }
    }

    fn flush(&self) -> Result<()> {
        match self {
            Child::Collection(c) => c.flush(),
            Child::Data(d) => d.flush(),
            Child::Raw(g) => g.store().flush(),
        }
    }
}
