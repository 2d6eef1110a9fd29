pub mod paged_store;
pub mod sequence_store;
pub mod spill_file;

pub use paged_store::{PagedSequenceStore, PagedStoreStats};
pub use sequence_store::{Cursor, Position, SequenceStore};
