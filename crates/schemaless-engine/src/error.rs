use std::fmt;

use schemaless_query::QueryError;
use schemaless_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Missing required argument, contradictory flags, entity without id at delete.
    BadArgument(String),
    /// Identifier is neither 16 raw bytes nor 32 hex chars.
    InvalidId,
    /// Index field name contains a forbidden character.
    InvalidIndexField(String),
    /// `IN` predicate built with no values.
    EmptyInClause,
    /// No index covers any predicate field and no ordering is given.
    Unplannable,
    /// Multi-shard routing, or anything else the stub never grew.
    NotImplemented(String),
    /// Stored body is not valid JSON.
    CorruptBody(String),
    /// Stored body claims to be compressed but isn't, or vice versa.
    CorruptCompression(String),
    /// Any underlying SQL error not explicitly recovered.
    Backend(String),
    /// Impossible state: unknown operator, multi-row `get`.
    InternalError(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::BadArgument(msg) => write!(f, "bad argument: {msg}"),
            EngineError::InvalidId => write!(f, "id is neither 16 raw bytes nor 32 hex chars"),
            EngineError::InvalidIndexField(name) => {
                write!(f, "invalid index field name: {name}")
            }
            EngineError::EmptyInClause => write!(f, "IN predicate built with no values"),
            EngineError::Unplannable => {
                write!(f, "no index covers any predicate field and no ordering was given")
            }
            EngineError::NotImplemented(msg) => write!(f, "not implemented: {msg}"),
            EngineError::CorruptBody(msg) => write!(f, "corrupt body: {msg}"),
            EngineError::CorruptCompression(msg) => write!(f, "corrupt compression: {msg}"),
            EngineError::Backend(msg) => write!(f, "backend error: {msg}"),
            EngineError::InternalError(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Backend(e.to_string())
    }
}

impl From<QueryError> for EngineError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::EmptyInClause => EngineError::EmptyInClause,
            QueryError::InternalError(msg) => EngineError::InternalError(msg),
        }
    }
}
