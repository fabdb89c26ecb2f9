pub mod database;
pub mod directory_db;
pub mod message_db;

pub use database::Database;
pub use directory_db::DirectoryDatabase;
pub use message_db::{MessageDatabase, MessageFilter};

use std::fs;
use std::path::Path;

/// Ensure the directory holding `db_path` exists
pub fn ensure_data_dir<P: AsRef<Path>>(db_path: P) -> std::io::Result<()> {
    match db_path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
