//! Store file reader: block-level access and tree materialization.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use super::tree::{Dataset, Entry, GroupNode};
use super::value::{read_exact, read_len, Attrs};
use crate::util::{Error, Result};

/// Input streams for reading store blocks.
/// Supports both memory-mapped and buffered I/O modes.
pub struct IStreams {
    inner: StreamsInner,
    version: u16,
    frozen: bool,
    size: u64,
}

enum StreamsInner {
    /// Memory-mapped file (preferred for large files)
    Mmap(Mmap),
    /// Buffered file access (fallback)
    File(Mutex<File>),
}

impl IStreams {
    /// Read from an already opened file.
    pub fn from_file(file: &File, use_mmap: bool) -> Result<Self> {
        let size = file.metadata()?.len();

        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        let inner = if use_mmap {
            // Safety: the store is the only writer of this file and does not
            // write while a reader is alive
            let mmap = unsafe { Mmap::map(file) }?;
            StreamsInner::Mmap(mmap)
        } else {
            StreamsInner::File(Mutex::new(file.try_clone()?))
        };

        let mut header = [0u8; HEADER_SIZE];
        match &inner {
            StreamsInner::Mmap(mmap) => header.copy_from_slice(&mmap[..HEADER_SIZE]),
            StreamsInner::File(file) => {
                let mut f = file.lock();
                f.seek(SeekFrom::Start(0))?;
                f.read_exact(&mut header)?;
            }
        }
        let (version, frozen) = Self::parse_header(&header)?;

        Ok(Self { inner, version, frozen, size })
    }

    /// Parse and validate the header.
    fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
        if data.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof(data.len() as u64));
        }

        if &data[0..5] != STORE_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;

        // Version is stored big-endian
        let version = u16::from_be_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);
        if version == 0 || version > CURRENT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        Ok((version, frozen))
    }

    /// Check if the last write completed.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Format version from the header.
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the root group position from the header.
    pub fn root_pos(&self) -> Result<u64> {
        self.read_u64(ROOT_POS_OFFSET as u64)
    }

    /// End of the byte range `pos..pos + len`, if the file holds it.
    pub fn check_range(&self, pos: u64, len: u64) -> Result<u64> {
        let end = pos.checked_add(len).ok_or(Error::UnexpectedEof(u64::MAX))?;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }
        Ok(end)
    }

    /// Read bytes at a specific position.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        // Validate before allocating; `len` may come from a corrupt block
        self.check_range(pos, len as u64)?;
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Read bytes into an existing buffer.
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = self.check_range(pos, buf.len() as u64)?;

        match &self.inner {
            StreamsInner::Mmap(mmap) => {
                buf.copy_from_slice(&mmap[pos as usize..end as usize]);
                Ok(())
            }
            StreamsInner::File(file) => {
                let mut f = file.lock();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf)?;
                Ok(())
            }
        }
    }

    /// Read a u64 value at the given position.
    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// A group block: a list of child offsets.
#[derive(Clone)]
pub struct IGroup {
    streams: Arc<IStreams>,
    pos: u64,
    child_offsets: Vec<u64>,
}

impl IGroup {
    /// Read the group block at the given position.
    pub fn new(streams: Arc<IStreams>, pos: u64) -> Result<Self> {
        let num_children = if pos == 0 { 0 } else { streams.read_u64(pos)? };

        // Every offset takes 8 bytes; reject counts the file cannot hold
        if num_children > streams.size() / 8 {
            return Err(Error::invalid(format!(
                "group at {} claims {} children",
                pos, num_children
            )));
        }

        let mut child_offsets = Vec::with_capacity(num_children as usize);
        for i in 0..num_children {
            child_offsets.push(streams.read_u64(pos + 8 + i * 8)?);
        }

        Ok(Self { streams, pos, child_offsets })
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn num_children(&self) -> u64 {
        self.child_offsets.len() as u64
    }

    /// Get the raw offset for a child (with group/data flag).
    pub fn child_offset(&self, index: u64) -> Result<u64> {
        self.child_offsets
            .get(index as usize)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index: index as usize,
                count: self.child_offsets.len(),
            })
    }

    /// Get a child group.
    pub fn group(&self, index: u64) -> Result<IGroup> {
        let offset = self.child_offset(index)?;
        if !is_group_offset(offset) {
            return Err(Error::mismatch("group", "data"));
        }
        IGroup::new(self.streams.clone(), extract_offset(offset))
    }

    /// Get child data.
    pub fn data(&self, index: u64) -> Result<IData> {
        let offset = self.child_offset(index)?;
        if !is_data_offset(offset) {
            return Err(Error::mismatch("data", "group"));
        }
        IData::new(self.streams.clone(), extract_offset(offset))
    }
}

/// Data block: a length-prefixed byte run.
pub struct IData {
    streams: Arc<IStreams>,
    pos: u64,
    size: u64,
}

impl IData {
    pub fn new(streams: Arc<IStreams>, pos: u64) -> Result<Self> {
        if pos == 0 {
            return Ok(Self { streams, pos, size: 0 });
        }
        let size = streams.read_u64(pos)?;
        streams.check_range(pos + 8, size)?;
        Ok(Self { streams, pos, size })
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read all data as bytes.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        if self.size == 0 {
            return Ok(Vec::new());
        }
        let len = usize::try_from(self.size).map_err(|_| Error::UnexpectedEof(self.size))?;
        self.streams.read_bytes(self.pos + 8, len)
    }
}

/// Deepest group nesting accepted when reading a file.
pub const MAX_DEPTH: usize = 512;

/// Materialize the whole group tree of a frozen store file.
pub fn read_tree(streams: Arc<IStreams>) -> Result<GroupNode> {
    if !streams.is_frozen() {
        return Err(Error::invalid("file was not completely written"));
    }
    tracing::trace!(version = streams.version(), size = streams.size(), "reading store tree");
    let root_pos = streams.root_pos()?;
    let root = IGroup::new(streams, root_pos)?;
    read_group(&root, 0)
}

/// Blocks are written bottom-up, so every child group sits strictly below
/// its parent. Anything else is a corrupt (possibly cyclic) file.
fn read_group(block: &IGroup, depth: usize) -> Result<GroupNode> {
    if depth > MAX_DEPTH {
        return Err(Error::invalid(format!("groups nested deeper than {}", MAX_DEPTH)));
    }
    if block.num_children() < RESERVED_CHILDREN {
        return Err(Error::invalid(format!(
            "group at {} has {} children, expected at least {}",
            block.pos(),
            block.num_children(),
            RESERVED_CHILDREN
        )));
    }

    let attrs = Attrs::decode(&block.data(ATTRS_CHILD)?.read_all()?)?;
    let names = decode_names(&block.data(NAMES_CHILD)?.read_all()?)?;

    let num_entries = block.num_children() - RESERVED_CHILDREN;
    if names.len() as u64 != num_entries {
        return Err(Error::invalid(format!(
            "group at {} names {} entries but holds {}",
            block.pos(),
            names.len(),
            num_entries
        )));
    }

    let mut entries = Vec::with_capacity(names.len());
    for (i, name) in names.into_iter().enumerate() {
        let index = RESERVED_CHILDREN + i as u64;
        let offset = block.child_offset(index)?;
        let entry = if is_group_offset(offset) {
            // Entries are written before their parent, so a live entry sits below it.
            if is_empty_offset(offset) || extract_offset(offset) >= block.pos() {
                return Err(Error::invalid(format!(
                    "group at {} has entry {:?} at {}",
                    block.pos(),
                    name,
                    extract_offset(offset)
                )));
            }
            Entry::Group(read_group(&block.group(index)?, depth + 1)?)
        } else {
            Entry::Dataset(Dataset::decode(&block.data(index)?.read_all()?)?)
        };
        entries.push((name, entry));
    }

    Ok(GroupNode { attrs, entries })
}

/// Parse the entry-name blob: `u32 count`, then `u32 len` + bytes each.
pub(crate) fn decode_names(blob: &[u8]) -> Result<Vec<String>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    let mut cur = Cursor::new(blob);
    let count = read_len(&mut cur)?;
    let mut names = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let len = read_len(&mut cur)?;
        names.push(String::from_utf8(read_exact(&mut cur, len)?)?);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parsing() {
        let mut header = [0u8; 16];
        header[0..5].copy_from_slice(STORE_MAGIC);
        header[FROZEN_OFFSET] = FROZEN_FLAG;
        header[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&CURRENT_VERSION.to_be_bytes());

        let (version, frozen) = IStreams::parse_header(&header).unwrap();
        assert_eq!(version, CURRENT_VERSION);
        assert!(frozen);
    }

    #[test]
    fn test_invalid_magic() {
        let header = [0u8; 16];
        let result = IStreams::parse_header(&header);
        assert!(matches!(result, Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_future_version() {
        let mut header = [0u8; 16];
        header[0..5].copy_from_slice(STORE_MAGIC);
        header[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&9u16.to_be_bytes());
        assert!(matches!(
            IStreams::parse_header(&header),
            Err(Error::UnsupportedVersion(9))
        ));
    }

    /// Frozen header pointing at `root`, followed by `body`.
    fn forged(root: u64, body: &[u8]) -> Arc<IStreams> {
        use std::io::Write;

        let mut image = Vec::with_capacity(HEADER_SIZE + body.len());
        image.extend_from_slice(STORE_MAGIC);
        image.push(FROZEN_FLAG);
        image.extend_from_slice(&CURRENT_VERSION.to_be_bytes());
        image.extend_from_slice(&root.to_le_bytes());
        image.extend_from_slice(body);

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&image).unwrap();
        Arc::new(IStreams::from_file(&file, false).unwrap())
    }

    fn u64s(values: &[u64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_oversized_data_block() {
        // Data block at 16 claiming 2^62 bytes, root group at 24
        let mut body = u64s(&[1 << 62]);
        body.extend(u64s(&[2, make_data_offset(16), make_data_offset(0)]));
        let streams = forged(24, &body);

        let err = read_tree(streams.clone()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof(_)), "got {:?}", err);
        assert!(matches!(streams.read_bytes(16, usize::MAX / 2), Err(Error::UnexpectedEof(_))));
    }

    #[test]
    fn test_self_referencing_group() {
        // Names blob at 16 listing one entry, root group at 33 whose entry is itself
        let mut body = u64s(&[9]);
        body.extend_from_slice(&[1, 0, 0, 0, 1, 0, 0, 0, b'a']);
        body.extend(u64s(&[3, make_data_offset(0), make_data_offset(16), make_group_offset(33)]));
        let streams = forged(33, &body);

        let err = read_tree(streams).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)), "got {:?}", err);
    }

    #[test]
    fn test_empty_group_entry() {
        // Names blob at 16 listing "a", root group at 33 whose entry is the empty offset
        let mut body = u64s(&[9]);
        body.extend_from_slice(&[1, 0, 0, 0, 1, 0, 0, 0, b'a']);
        body.extend(u64s(&[3, make_data_offset(0), make_data_offset(16), make_group_offset(0)]));
        let streams = forged(33, &body);

        let err = read_tree(streams).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)), "got {:?}", err);
    }

    #[test]
    fn test_names_blob() {
        assert!(decode_names(&[]).unwrap().is_empty());
        let blob = [2, 0, 0, 0, 1, 0, 0, 0, b'a', 2, 0, 0, 0, b'b', b'c'];
        assert_eq!(decode_names(&blob).unwrap(), ["a", "bc"]);
        assert!(decode_names(&blob[..blob.len() - 1]).is_err());
    }
}
