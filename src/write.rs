//! Write requests issued by the model layer.
//!
//! - Putting a whole item
//! - Updating individual, possibly nested, attributes
//! - Deleting an item by primary key

/// Arguments shared by write requests.
pub mod common;

/// Delete item request for removing an item from a table.
pub mod delete_item;

/// Put item request for creating or replacing an item.
pub mod put_item;

/// Update item request for setting individual attribute paths.
pub mod update_item;
