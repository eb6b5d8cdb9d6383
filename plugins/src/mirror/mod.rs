pub mod sqlite;

pub use sqlite::SqliteSessionMirror;
