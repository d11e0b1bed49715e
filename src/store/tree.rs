//! In-memory group tree held by an open store.
//!
//! The whole file is materialized into [`GroupNode`]s on open and written
//! back in one pass on flush. Entries keep their insertion order.

use crate::util::{Element, Error, PlainOldDataType, Result};

use super::value::Attrs;

/// Path separator inside a store.
pub const SEPARATOR: char = '/';

/// A group: attributes plus ordered named entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupNode {
    pub(crate) attrs: Attrs,
    pub(crate) entries: Vec<(String, Entry)>,
}

/// A named member of a group.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Group(GroupNode),
    Dataset(Dataset),
}

impl Entry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Group(_) => "group",
            Self::Dataset(_) => "dataset",
        }
    }
}

impl GroupNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    /// Entry names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    /// Direct sub-group by name.
    pub fn group(&self, name: &str) -> Option<&GroupNode> {
        match self.entry(name)? {
            Entry::Group(g) => Some(g),
            Entry::Dataset(_) => None,
        }
    }

    /// Walk a sequence of path segments.
    pub fn resolve<'a, I>(&self, segments: I) -> Option<&GroupNode>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        for seg in segments {
            node = node.group(seg)?;
        }
        Some(node)
    }

    /// Mutable counterpart of [`resolve`](Self::resolve).
    pub fn resolve_mut<'a, I>(&mut self, segments: I) -> Option<&mut GroupNode>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        for seg in segments {
            node = match node.entry_mut(seg)? {
                Entry::Group(g) => g,
                Entry::Dataset(_) => return None,
            };
        }
        Some(node)
    }

    /// Walk the path, creating missing groups along the way.
    ///
    /// Returns the target group and whether anything was created. Fails if
    /// a segment names an existing dataset.
    pub fn require<'a, I>(&mut self, segments: I) -> Result<(&mut GroupNode, bool)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        let mut created = false;
        for seg in segments {
            let pos = match node.entries.iter().position(|(n, _)| n == seg) {
                Some(pos) => pos,
                None => {
                    node.entries.push((seg.to_string(), Entry::Group(GroupNode::new())));
                    created = true;
                    node.entries.len() - 1
                }
            };
            node = match &mut node.entries[pos].1 {
                Entry::Group(g) => g,
                Entry::Dataset(_) => return Err(Error::mismatch("group", format!("dataset {:?}", seg))),
            };
        }
        Ok((node, created))
    }

    /// Insert or replace a dataset entry.
    pub fn put_dataset(&mut self, name: &str, dataset: Dataset) -> Result<()> {
        match self.entry_mut(name) {
            Some(Entry::Dataset(existing)) => {
                *existing = dataset;
                Ok(())
            }
            Some(Entry::Group(_)) => Err(Error::mismatch("dataset", format!("group {:?}", name))),
            None => {
                self.entries.push((name.to_string(), Entry::Dataset(dataset)));
                Ok(())
            }
        }
    }
}

/// Split an absolute or relative store path into its non-empty segments.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Canonical absolute form of a path: leading separator, no trailing one.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::from(SEPARATOR);
    out.push_str(&split_path(path).collect::<Vec<_>>().join("/"));
    out
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = normalize_path(parent);
    if parent.len() == 1 {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Reject names that cannot be a single path segment.
///
/// NUL is rejected too: name lists are stored as null-padded fixed-width
/// strings, so a trailing NUL would not survive a reopen.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains(SEPARATOR)
        || name.contains('\0')
        || name == "."
        || name == ".."
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Last segment of a path; empty for the root.
pub fn base_name(path: &str) -> &str {
    split_path(path).last().unwrap_or("")
}

/// An n-dimensional numeric array stored as raw little-endian bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    dtype: PlainOldDataType,
    shape: Vec<u64>,
    bytes: Vec<u8>,
}

impl Dataset {
    /// Build a dataset from typed values. The shape's element count must
    /// match `values.len()`.
    pub fn from_values<T: Element>(shape: &[u64], values: &[T]) -> Result<Self> {
        let count = element_count(shape)?;
        if count != values.len() as u64 {
            return Err(Error::invalid(format!(
                "shape {:?} holds {} elements, got {}",
                shape,
                count,
                values.len()
            )));
        }
        Ok(Self {
            dtype: T::POD_TYPE,
            shape: shape.to_vec(),
            bytes: bytemuck::cast_slice::<T, u8>(values).to_vec(),
        })
    }

    /// One-dimensional dataset.
    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        Self {
            dtype: T::POD_TYPE,
            shape: vec![values.len() as u64],
            bytes: bytemuck::cast_slice::<T, u8>(values).to_vec(),
        }
    }

    pub fn dtype(&self) -> PlainOldDataType {
        self.dtype
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.bytes.len().checked_div(self.dtype.num_bytes()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy the payload out as typed values.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::POD_TYPE != self.dtype {
            return Err(Error::mismatch(T::POD_TYPE.name(), self.dtype.name()));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.bytes))
    }

    /// Serialize to a dataset blob.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(5 + self.shape.len() * 8 + self.bytes.len());
        out.push(self.dtype as u8);
        super::value::write_len(&mut out, self.shape.len())?;
        for dim in &self.shape {
            out.extend_from_slice(&dim.to_le_bytes());
        }
        out.extend_from_slice(&self.bytes);
        Ok(out)
    }

    /// Parse a dataset blob.
    pub(crate) fn decode(blob: &[u8]) -> Result<Self> {
        use super::value::{read_exact, read_len, read_u64, read_u8};

        let mut cur = std::io::Cursor::new(blob);
        let dtype = PlainOldDataType::from_u8(read_u8(&mut cur)?);
        if !dtype.is_numeric() {
            return Err(Error::invalid(format!("dataset element type {}", dtype)));
        }
        let rank = read_len(&mut cur)?;
        let mut shape = Vec::with_capacity(rank.min(32));
        for _ in 0..rank {
            shape.push(read_u64(&mut cur)?);
        }
        let expected = element_count(&shape)?
            .checked_mul(dtype.num_bytes() as u64)
            .ok_or_else(|| Error::invalid("dataset size overflow"))?;
        let bytes = read_exact(&mut cur, expected as usize)?;
        Ok(Self { dtype, shape, bytes })
    }
}

/// Product of the dimensions, failing instead of wrapping.
fn element_count(shape: &[u64]) -> Result<u64> {
    shape
        .iter()
        .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| Error::invalid(format!("dataset size overflow for shape {:?}", shape)))
}
