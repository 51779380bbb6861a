use schemaless_query::Value;

use crate::error::StoreError;

/// One row of a result set, columns in SELECT order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }

    pub fn require(&self, name: &str) -> Result<&Value, StoreError> {
        self.get(name)
            .ok_or_else(|| StoreError::MissingColumn(name.to_string()))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// A black-box relational connection: parameterised `execute`/`query`, one
/// statement at a time. The datastore engine and query executor never see
/// anything below this trait — whatever actually runs the SQL (sqlite here,
/// MySQL/Postgres in a real deployment) is an implementation detail.
///
/// Single-connection and synchronous: every method blocks until the
/// statement completes, there is no suspension point inside a call.
pub trait Connection {
    /// Run a statement with no result set (INSERT/UPDATE/DELETE/DDL).
    /// Returns the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;

    /// Run a SELECT and collect every row.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Run a SELECT expected to return at most one row.
    fn query_row(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError>;

    /// Whether a table with this name already exists.
    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;
}
