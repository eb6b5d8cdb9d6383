pub mod helpers;
pub mod models;
pub mod render;
pub mod r#trait;

pub use models::{MemoryArchivePayload, MemoryMatch, MemorySearchPayload, TranscriptLine};
pub use r#trait::MemoryIndex;
pub use render::{build_archive_payload, render_recall_context, render_session_content};
