//! Catalog access: the row store holding slot metadata and the blob store
//! holding the media files.
//!
//! - `store`: collaborator traits plus the targeted single-cell writer.
//! - `snapshot`: turns rows and file listings into ordered `Slot`s.

pub mod snapshot;
pub mod store;

pub use snapshot::{find_slot, list_catalog, load_slots, CatalogEntry};
pub use store::{BlobEntry, BlobStore, RowStore, SlotWriter};
