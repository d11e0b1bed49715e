//! Collection module - ordered, nestable containers.
//!
//! A collection groups data and further collections under one store group.
//! Child order is persisted in the group's `item_names` attribute, and each
//! child is re-materialized from its `class` tag when the file is reopened.
//!
//! ## Key Concepts
//!
//! - **Collection**: Named container bound to one group
//! - **Child**: A collection, a data leaf, or an untagged raw group
//! - **Key**: Positional or named child address
//!
//! ## Example
//!
//! ```ignore
//! use wt5::prelude::*;
//!
//! let mut root = Collection::open("scan.wt5", None, Some("root"), Attrs::new())?;
//! root.create_data("d1", None, Attrs::new())?;
//! root.create_collection("sub", None, Attrs::new())?;
//!
//! for child in &root {
//!     println!("{} ({})", child.natural_name(), child.kind());
//! }
//! root.close()?;
//! ```

mod child;
mod container;

pub use child::{Child, Key};
pub use container::Collection;
