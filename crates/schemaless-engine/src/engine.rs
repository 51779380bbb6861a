use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use schemaless_query::Value;
use schemaless_store::{Connection, Row};
use tracing::{debug, instrument};

use crate::codec;
use crate::entity::{Entity, ID_FIELD};
use crate::error::EngineError;
use crate::guid::Guid;
use crate::index::IndexDescriptor;
use crate::planner::IndexCollection;

const ENTITIES_TABLE: &str = "entities";

/// Constructor options recognised by [`Engine::new`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub hosts: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub use_zlib: bool,
    pub create_entities: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            hosts: Vec::new(),
            user: None,
            password: None,
            database: None,
            use_zlib: true,
            create_entities: true,
        }
    }
}

fn now_unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn is_unique_violation(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("unique") || lower.contains("primary key")
}

/// The datastore engine: `put`/`delete`/`by_id`/`by_added_id`, fan-out to
/// index tables, compression, tag index maintenance.
pub struct Engine<C: Connection> {
    conn: C,
    use_zlib: bool,
    indexes: IndexCollection,
}

impl<C: Connection> Engine<C> {
    pub fn new(conn: C, options: EngineOptions) -> Result<Self, EngineError> {
        if options.hosts.len() > 1 {
            return Err(EngineError::NotImplemented(
                "multi-shard routing is not implemented".to_string(),
            ));
        }
        if options.create_entities && !conn.table_exists(ENTITIES_TABLE)? {
            conn.execute(
                "CREATE TABLE entities (\
                    added_id INTEGER PRIMARY KEY AUTOINCREMENT, \
                    id BLOB NOT NULL UNIQUE, \
                    updated REAL NOT NULL, \
                    tag INTEGER, \
                    body BLOB NOT NULL\
                )",
                &[],
            )?;
            conn.execute(
                "CREATE INDEX entities_updated_idx ON entities (updated)",
                &[],
            )?;
        }

        let tag_index = Arc::new(IndexDescriptor::new(
            ENTITIES_TABLE,
            vec!["tag".to_string()],
            Default::default(),
            None,
        )?);

        Ok(Engine {
            conn,
            use_zlib: options.use_zlib,
            indexes: IndexCollection::new(vec![tag_index]),
        })
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn indexes(&self) -> &IndexCollection {
        &self.indexes
    }

    /// The built-in pseudo-index over `entities.tag`. Always `indexes()[0]`.
    pub fn tag_index(&self) -> Arc<IndexDescriptor> {
        self.indexes.indexes()[0].clone()
    }

    /// Declare a new secondary index, lazily creating its table.
    pub fn define_index(&mut self, descriptor: IndexDescriptor) -> Result<Arc<IndexDescriptor>, EngineError> {
        descriptor.declare_against(&self.conn)?;
        let arc = Arc::new(descriptor);
        self.indexes.push(arc.clone());
        Ok(arc)
    }

    fn find_indexes(&self, entity: &Entity, include_entities: bool) -> Vec<Arc<IndexDescriptor>> {
        self.indexes
            .indexes()
            .iter()
            .filter(|idx| idx.matches(entity))
            .filter(|idx| include_entities || !idx.is_tag_pseudo_index())
            .cloned()
            .collect()
    }

    /// Insert (no `id` present) or update (`id` present) an entity, fanning
    /// the write out to every matching index.
    #[instrument(skip(self, entity))]
    pub fn put(&self, mut entity: Entity, tag: Option<i64>) -> Result<Entity, EngineError> {
        let is_update = entity.get(ID_FIELD).is_some();
        let id = if is_update {
            match entity.get(ID_FIELD).cloned() {
                Some(Value::Str(s)) => Guid::from_hex(&s)?,
                Some(Value::Bytes(b)) => Guid::normalize(&b)?,
                _ => return Err(EngineError::InvalidId),
            }
        } else {
            Guid::new()
        };

        entity.set_updated(now_unix_seconds());
        if let Some(t) = tag {
            entity.set_tag(t);
        }
        entity.set_id(id);

        let body = codec::encode(&entity.body_fields(), self.use_zlib)?;

        if is_update {
            self.put_update(id, &entity, tag, &body)?;
            Ok(entity)
        } else {
            self.put_new(id, &entity, tag, &body)
        }
    }

    fn put_new(
        &self,
        id: Guid,
        entity: &Entity,
        tag: Option<i64>,
        body: &[u8],
    ) -> Result<Entity, EngineError> {
        let updated = entity.updated().unwrap_or_else(now_unix_seconds);
        self.conn.execute(
            "INSERT INTO entities (id, updated, tag, body) VALUES (?, ?, ?, ?)",
            &[
                Value::Bytes(id.as_raw().to_vec()),
                Value::Float(updated),
                tag.map(Value::Int).unwrap_or(Value::Null),
                Value::Bytes(body.to_vec()),
            ],
        )?;

        for idx in self.find_indexes(entity, false) {
            self.insert_index(&idx, id, entity)?;
        }

        self.by_id(id.as_raw())?
            .ok_or_else(|| EngineError::InternalError("row vanished after insert".to_string()))
    }

    fn put_update(
        &self,
        id: Guid,
        entity: &Entity,
        _tag: Option<i64>,
        body: &[u8],
    ) -> Result<(), EngineError> {
        let updated = entity.updated().unwrap_or_else(now_unix_seconds);
        self.conn.execute(
            "UPDATE entities SET updated = ?, body = ? WHERE id = ?",
            &[
                Value::Float(updated),
                Value::Bytes(body.to_vec()),
                Value::Bytes(id.as_raw().to_vec()),
            ],
        )?;

        // NB: indexes that no longer match the updated entity are not pruned
        // here — see the Open Question in DESIGN.md.
        for idx in self.find_indexes(entity, false) {
            self.upsert_index(&idx, id, entity)?;
        }
        Ok(())
    }

    fn insert_index(&self, idx: &IndexDescriptor, id: Guid, entity: &Entity) -> Result<(), EngineError> {
        let mut cols = vec!["entity_id".to_string()];
        let mut vals = vec![Value::Bytes(id.as_raw().to_vec())];
        for f in idx.fields() {
            cols.push(f.clone());
            vals.push(entity.get(f).cloned().unwrap_or(Value::Null));
        }
        let placeholders = vals.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            idx.table(),
            cols.join(", ")
        );
        self.conn.execute(&sql, &vals)?;
        Ok(())
    }

    fn update_index_row(&self, idx: &IndexDescriptor, id: Guid, entity: &Entity) -> Result<(), EngineError> {
        let mut sets = Vec::new();
        let mut vals = Vec::new();
        for f in idx.fields() {
            sets.push(format!("{f} = ?"));
            vals.push(entity.get(f).cloned().unwrap_or(Value::Null));
        }
        vals.push(Value::Bytes(id.as_raw().to_vec()));
        let sql = format!("UPDATE {} SET {} WHERE entity_id = ?", idx.table(), sets.join(", "));
        self.conn.execute(&sql, &vals)?;
        Ok(())
    }

    /// Insert-or-update an index row by `entity_id`. Tries INSERT first;
    /// a unique-key violation (the row already existed) is recovered locally
    /// by switching to UPDATE. Any other error propagates.
    fn upsert_index(&self, idx: &IndexDescriptor, id: Guid, entity: &Entity) -> Result<(), EngineError> {
        match self.insert_index(idx, id, entity) {
            Ok(()) => Ok(()),
            Err(EngineError::Backend(msg)) if is_unique_violation(&msg) => {
                debug!(table = idx.table(), "index conflict, recovering via update");
                self.update_index_row(idx, id, entity)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete an entity (by value or by id), removing every matching index
    /// row along the way. Returns the number of rows affected across all
    /// tables.
    pub fn delete(&self, entity: Option<Entity>, id: Option<&[u8]>) -> Result<u64, EngineError> {
        if entity.is_none() && id.is_none() {
            return Err(EngineError::BadArgument(
                "must provide delete with an entity or an id".to_string(),
            ));
        }
        if let Some(e) = &entity {
            if e.id().is_none() {
                return Err(EngineError::BadArgument(
                    "cannot provide an entity without an id".to_string(),
                ));
            }
        }

        let resolved = match entity {
            Some(e) => e,
            None => match self.by_id(id.unwrap())? {
                Some(e) => e,
                None => return Ok(0),
            },
        };
        let guid = resolved
            .id()
            .ok_or_else(|| EngineError::BadArgument("entity has no id".to_string()))?;

        let mut deleted = 0u64;
        let mut seen_entities_table = false;
        for idx in self.find_indexes(&resolved, true) {
            if idx.is_tag_pseudo_index() {
                seen_entities_table = true;
                deleted += self.delete_from(ENTITIES_TABLE, "id", guid)?;
            } else {
                deleted += self.delete_from(idx.table(), "entity_id", guid)?;
            }
        }
        if !seen_entities_table {
            deleted += self.delete_from(ENTITIES_TABLE, "id", guid)?;
        }
        Ok(deleted)
    }

    fn delete_from(&self, table: &str, column: &str, guid: Guid) -> Result<u64, EngineError> {
        let affected = self.conn.execute(
            &format!("DELETE FROM {table} WHERE {column} = ?"),
            &[Value::Bytes(guid.as_raw().to_vec())],
        )?;
        Ok(if affected > 0 { 1 } else { 0 })
    }

    /// Look up a single entity by id (raw 16 bytes or 32-char hex).
    pub fn by_id(&self, id: &[u8]) -> Result<Option<Entity>, EngineError> {
        let guid = Guid::normalize(id)?;
        let row = self.conn.query_row(
            "SELECT * FROM entities WHERE id = ?",
            &[Value::Bytes(guid.as_raw().to_vec())],
        )?;
        row.map(|r| self.entity_from_row(&r)).transpose()
    }

    /// Look up a freshly-inserted row by its engine-assigned `added_id`.
    /// Callers must not pass an `added_id` that was never assigned.
    pub fn by_added_id(&self, added_id: i64) -> Result<Entity, EngineError> {
        let row = self
            .conn
            .query_row("SELECT * FROM entities WHERE added_id = ?", &[Value::Int(added_id)])?;
        match row {
            Some(r) => self.entity_from_row(&r),
            None => Err(EngineError::BadArgument(format!(
                "no entity with added_id {added_id}"
            ))),
        }
    }

    pub(crate) fn entity_from_row(&self, row: &Row) -> Result<Entity, EngineError> {
        let id_bytes = match row.require("id")? {
            Value::Bytes(b) => b.clone(),
            other => {
                return Err(EngineError::InternalError(format!(
                    "entities.id was not a blob: {other:?}"
                )));
            }
        };
        let guid = Guid::normalize(&id_bytes)?;

        let updated = match row.require("updated")? {
            Value::Float(f) => *f,
            Value::Int(i) => *i as f64,
            other => {
                return Err(EngineError::InternalError(format!(
                    "entities.updated had an unexpected type: {other:?}"
                )));
            }
        };

        let tag = match row.get("tag") {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        };

        let body = match row.require("body")? {
            Value::Bytes(b) => b.clone(),
            other => {
                return Err(EngineError::InternalError(format!(
                    "entities.body was not a blob: {other:?}"
                )));
            }
        };

        let fields = codec::decode(&body, self.use_zlib)?;
        let mut entity = Entity::from_fields(fields);
        entity.set_id(guid);
        entity.set_updated(updated);
        if let Some(t) = tag {
            entity.set_tag(t);
        }
        Ok(entity)
    }

    pub(crate) fn added_id_of(&self, row: &Row) -> Result<i64, EngineError> {
        match row.require("added_id")? {
            Value::Int(i) => Ok(*i),
            other => Err(EngineError::InternalError(format!(
                "entities.added_id had an unexpected type: {other:?}"
            ))),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use schemaless_store::SqliteConnection;

    fn engine() -> Engine<SqliteConnection> {
        let conn = SqliteConnection::open_in_memory().unwrap();
        Engine::new(conn, EngineOptions::default()).unwrap()
    }

    fn entity(pairs: &[(&str, Value)]) -> Entity {
        let mut e = Entity::new();
        for (k, v) in pairs {
            e.set(*k, v.clone());
        }
        e
    }

    #[test]
    fn put_without_id_inserts_and_assigns_fields() {
        let engine = engine();
        let e = entity(&[("user_id", Value::Str("a".repeat(32)))]);
        let saved = engine.put(e, None).unwrap();
        assert!(saved.id().is_some());
        assert!(saved.updated().is_some());
    }

    #[test]
    fn put_with_id_updates_in_place_and_preserves_id() {
        let engine = engine();
        let e = entity(&[("user_id", Value::Str("u".to_string())), ("first_name", Value::Str("foo".to_string()))]);
        let created = engine.put(e, None).unwrap();
        let id = created.id().unwrap();

        let mut updated_entity = created.clone();
        updated_entity.set("first_name", "baz");
        engine.put(updated_entity, None).unwrap();

        let reloaded = engine.by_id(id.as_raw()).unwrap().unwrap();
        assert_eq!(reloaded.get("first_name"), Some(&Value::Str("baz".to_string())));
        assert_eq!(reloaded.id(), Some(id));
    }

    #[test]
    fn delete_twice_only_affects_rows_once() {
        let engine = engine();
        let e = entity(&[("x", Value::Int(1))]);
        let created = engine.put(e, None).unwrap();
        let id_hex = created.id().unwrap().to_hex();

        let first = engine.delete(None, Some(id_hex.as_bytes())).unwrap();
        assert!(first >= 1);
        let second = engine.delete(None, Some(id_hex.as_bytes())).unwrap();
        assert_eq!(second, 0);
        assert!(engine.by_id(id_hex.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn delete_requires_an_argument() {
        let engine = engine();
        assert!(matches!(
            engine.delete(None, None),
            Err(EngineError::BadArgument(_))
        ));
    }

    #[test]
    fn index_fan_out_and_upsert_on_update() {
        let mut engine = engine();
        engine
            .define_index(
                IndexDescriptor::new("index_user_id", vec!["user_id".to_string()], Default::default(), None)
                    .unwrap(),
            )
            .unwrap();

        let a = engine
            .put(entity(&[("user_id", Value::Str("u1".to_string()))]), None)
            .unwrap();
        let _b = engine
            .put(entity(&[("user_id", Value::Str("u1".to_string()))]), None)
            .unwrap();

        let rows = engine
            .connection()
            .query("SELECT entity_id FROM index_user_id", &[])
            .unwrap();
        assert_eq!(rows.len(), 2);

        let mut a_updated = a.clone();
        a_updated.set("completion_time", Value::Int(5));
        engine.put(a_updated, None).unwrap();

        let rows_after = engine
            .connection()
            .query("SELECT entity_id FROM index_user_id", &[])
            .unwrap();
        assert_eq!(rows_after.len(), 2);
    }
}
