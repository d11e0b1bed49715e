//! Core layer - the node abstraction and the attribute keys every node
//! kind agrees on.
//!
//! This module provides:
//! - [`Node`] - Capability set shared by collections, data and raw groups
//! - Type tags and reserved attribute keys

mod traits;

pub use traits::Node;
pub(crate) use traits::resolve_natural_name;

/// Attribute holding the type tag used for child dispatch.
pub const CLASS_KEY: &str = "class";

/// Attribute holding the schema version marker.
pub const VERSION_KEY: &str = "__version__";

/// Attribute holding the ordered child name list of a collection.
pub const ITEM_NAMES_KEY: &str = "item_names";

/// Optional caller-supplied logical name.
pub const NAME_KEY: &str = "name";

/// Type tag of container nodes.
pub const COLLECTION_CLASS: &str = "Collection";

/// Type tag of leaf data nodes.
pub const DATA_CLASS: &str = "Data";

/// Extension appended by `save` when the target has none.
pub const DEFAULT_EXTENSION: &str = "wt5";
