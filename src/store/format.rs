//! Store file format constants and block-offset helpers.

/// Magic bytes at the start of a store file.
pub const STORE_MAGIC: &[u8; 5] = b"WTree";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current store format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value once every block and the root position are written.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while a write is in progress.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Bit mask for the type flag in child offsets.
/// MSB set = data block, MSB clear = group block.
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the actual offset from a child pointer.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Index of the attribute blob among a store group's block children.
pub const ATTRS_CHILD: u64 = 0;

/// Index of the entry-name blob among a store group's block children.
pub const NAMES_CHILD: u64 = 1;

/// Number of bookkeeping children preceding the entries of a store group.
pub const RESERVED_CHILDREN: u64 = 2;

/// Check if a child offset represents a group (MSB clear).
#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

/// Check if a child offset represents data (MSB set).
#[inline]
pub const fn is_data_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) != 0
}

/// Extract the actual position from a child offset.
#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

/// Create a group child offset (MSB clear).
#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

/// Create a data child offset (MSB set).
#[inline]
pub const fn make_data_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

/// Check if an offset is the "empty" marker for groups or data.
#[inline]
pub const fn is_empty_offset(offset: u64) -> bool {
    extract_offset(offset) == 0
}
