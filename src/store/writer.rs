//! Store file writer.
//!
//! Serializes a [`GroupNode`] tree bottom-up: every data block and child
//! group is written before the group that points at it, then the root
//! position is patched into the header and the frozen flag set.

use std::io::{Cursor, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use super::tree::{Entry, GroupNode};
use super::value::write_len;
use crate::util::Result;

/// Output stream for writing store blocks.
pub struct OStream<W: Write + Seek> {
    writer: W,
    pos: u64,
}

impl<W: Write + Seek> OStream<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, pos: 0 }
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Seek to a position and return it.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        let new_pos = self.writer.seek(SeekFrom::Start(pos))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Block writer for one complete store image.
pub struct TreeWriter<W: Write + Seek> {
    stream: OStream<W>,
}

impl<W: Write + Seek> TreeWriter<W> {
    /// Start an image: header with a placeholder root position.
    pub fn create(writer: W) -> Result<Self> {
        let mut stream = OStream::new(writer);
        stream.write_bytes(STORE_MAGIC)?;
        stream.write_u8(NOT_FROZEN_FLAG)?;
        // Version is stored big-endian
        stream.write_bytes(&CURRENT_VERSION.to_be_bytes())?;
        stream.write_u64(0)?; // Root position placeholder
        Ok(Self { stream })
    }

    /// Write raw data block and return its child offset (MSB set).
    pub fn write_data(&mut self, data: &[u8]) -> Result<u64> {
        if data.is_empty() {
            return Ok(make_data_offset(0));
        }

        let pos = self.stream.pos();
        self.stream.write_u64(data.len() as u64)?;
        self.stream.write_bytes(data)?;
        Ok(make_data_offset(pos))
    }

    /// Write a group block and return its child offset (MSB clear).
    pub fn write_group(&mut self, children: &[u64]) -> Result<u64> {
        if children.is_empty() {
            return Ok(0); // Empty group marker
        }

        let pos = self.stream.pos();
        self.stream.write_u64(children.len() as u64)?;
        for &child in children {
            self.stream.write_u64(child)?;
        }
        Ok(make_group_offset(pos))
    }

    /// Write a store group and everything below it.
    pub fn write_node(&mut self, node: &GroupNode) -> Result<u64> {
        let mut children = Vec::with_capacity(RESERVED_CHILDREN as usize + node.entries.len());
        children.push(self.write_data(&node.attrs.encode()?)?);
        children.push(self.write_data(&encode_names(node.entries.iter().map(|(n, _)| n.as_str()))?)?);

        for (_, entry) in &node.entries {
            let offset = match entry {
                Entry::Group(group) => self.write_node(group)?,
                Entry::Dataset(dataset) => self.write_data(&dataset.encode()?)?,
            };
            children.push(offset);
        }

        self.write_group(&children)
    }

    /// Patch the root position, set the frozen flag and hand back the sink.
    pub fn freeze(mut self, root: u64) -> Result<W> {
        let end = self.stream.pos();
        self.stream.seek(ROOT_POS_OFFSET as u64)?;
        self.stream.write_u64(extract_offset(root))?;
        self.stream.seek(FROZEN_OFFSET as u64)?;
        self.stream.write_u8(FROZEN_FLAG)?;
        self.stream.seek(end)?;
        self.stream.flush()?;
        Ok(self.stream.into_inner())
    }
}

/// Serialize a complete tree into an in-memory file image.
pub fn encode_tree(root: &GroupNode) -> Result<Vec<u8>> {
    let mut writer = TreeWriter::create(Cursor::new(Vec::new()))?;
    let root_pos = writer.write_node(root)?;
    Ok(writer.freeze(root_pos)?.into_inner())
}

/// Encode the entry-name blob: `u32 count`, then `u32 len` + bytes each.
pub(crate) fn encode_names<'a>(names: impl ExactSizeIterator<Item = &'a str>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_len(&mut out, names.len())?;
    for name in names {
        write_len(&mut out, name.len())?;
        out.extend_from_slice(name.as_bytes());
    }
    Ok(out)
}
