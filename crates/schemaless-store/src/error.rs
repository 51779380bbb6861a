use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQL engine rejected the statement or connection setup failed.
    Backend(String),
    /// A row existed but didn't carry a column the caller asked for.
    MissingColumn(String),
    /// A stored value couldn't be converted to the requested shape.
    TypeMismatch(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "backend error: {msg}"),
            StoreError::MissingColumn(name) => write!(f, "missing column: {name}"),
            StoreError::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
