//! Object storage collaborators.

pub mod fs;
pub mod memory;
pub mod traits;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use traits::{ObjectStore, PutObject, StoredObject, WriteAck};
