pub mod sqlite;

pub use sqlite::SqliteMemory;
