//! Backing store: a single binary file holding nested groups, typed
//! attributes and datasets.
//!
//! ## File Structure
//!
//! ```text
//! +---------------------+
//! | Magic: "WTree"      |  5 bytes
//! +---------------------+
//! | Frozen flag         |  1 byte (0x00 or 0xFF)
//! +---------------------+
//! | Version             |  2 bytes (u16 BE)
//! +---------------------+
//! | Root Group Pos      |  8 bytes (u64 LE)
//! +---------------------+
//! | ... Blocks ...      |
//! +---------------------+
//! ```
//!
//! Each store group is a group block whose first two children are the
//! attribute blob and the entry-name blob, followed by one child per entry.
//! The whole tree is loaded on open and rewritten on flush.

mod format;
mod handle;
mod reader;
mod tree;
mod value;
mod writer;

pub use format::*;
pub use handle::*;
pub use reader::{read_tree, IData, IGroup, IStreams};
pub use tree::*;
pub use value::*;
pub use writer::{encode_tree, OStream, TreeWriter};
