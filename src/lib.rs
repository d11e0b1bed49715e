//! # wt5
//!
//! Hierarchical, file-backed containers for experimental data.
//!
//! A [`Collection`](collection::Collection) is a named, ordered container
//! persisted inside a single binary store file. It holds [`Data`](data::Data)
//! leaves and nested collections; reopening the file rebuilds the same tree
//! with the same child order.
//!
//! ## Modules
//!
//! - [`util`] - Element types and errors
//! - [`store`] - Binary store file: groups, attributes, datasets
//! - [`core`] - Node trait and reserved attribute keys
//! - [`data`] - Leaf data node
//! - [`collection`] - Collection container and child dispatch
//!
//! ## Example
//!
//! ```ignore
//! use wt5::prelude::*;
//!
//! let mut root = Collection::open("root.wt5", None, Some("root"), Attrs::new())?;
//! root.create_data("d1", None, Attrs::new())?;
//! root.create_data("d0", Some(0), Attrs::new())?;
//! assert_eq!(root.item_names()?, ["d0", "d1"]);
//! root.save(Some("out".as_ref()))?;
//! root.close()?;
//! ```

pub mod util;
pub mod store;
pub mod core;
pub mod data;
pub mod collection;

// Re-export commonly used types
pub use util::{Error, PlainOldDataType, Result};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::collection::{Child, Collection, Key};
    pub use crate::core::Node;
    pub use crate::data::Data;
    pub use crate::store::{AttrValue, Attrs, Dataset, Group, Store, StoreOptions};
    pub use crate::util::{Error, Result};
}
