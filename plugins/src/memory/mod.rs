pub mod in_memory;
pub mod service;

pub use in_memory::InMemoryMemoryIndex;
pub use service::MemoryServiceIndex;
