//! Repository layer for data access

pub mod memory;
pub mod messages;

// Re-export the store seam and its implementations
pub use memory::MemoryMessageStore;
pub use messages::DbMessageStore;
pub use messages::{EventOutcome, MessageStore};
