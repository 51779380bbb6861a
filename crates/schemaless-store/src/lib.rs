mod connection;
mod error;
mod sqlite;

pub use connection::{Connection, Row};
pub use error::StoreError;
pub use sqlite::SqliteConnection;
