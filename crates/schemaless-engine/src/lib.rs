mod codec;
mod engine;
mod entity;
mod error;
mod executor;
mod guid;
mod index;
mod planner;
mod sweep;

pub use codec::{json_to_value, value_to_json};
pub use engine::{Engine, EngineOptions};
pub use entity::{Entity, ID_FIELD, TAG_FIELD, UPDATED_FIELD};
pub use error::EngineError;
pub use executor::Query;
pub use guid::{Guid, GUID_SIZE};
pub use index::IndexDescriptor;
pub use planner::IndexCollection;
pub use sweep::{sweep, SweepSummary};

pub use schemaless_query::{Column, ColumnExpression, Direction, Op, OrderBy, Value, C};
pub use schemaless_store::{Connection, Row, SqliteConnection, StoreError};
