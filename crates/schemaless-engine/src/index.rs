use std::collections::BTreeMap;

use schemaless_query::Value;
use schemaless_store::Connection;

use crate::codec::value_to_json;
use crate::entity::Entity;
use crate::error::EngineError;

/// Declaration of a secondary-index table: its name, the document fields it
/// projects, an optional `match_on` filter, and an optional tag binding.
/// Immutable once constructed — registering a new index happens only during
/// datastore setup.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    table: String,
    fields: Vec<String>,
    match_on: BTreeMap<String, Value>,
    tag: Option<i64>,
}

impl IndexDescriptor {
    /// Build a descriptor with an explicit table name.
    pub fn new(
        table: impl Into<String>,
        fields: Vec<String>,
        mut match_on: BTreeMap<String, Value>,
        tag: Option<i64>,
    ) -> Result<Self, EngineError> {
        for f in &fields {
            if f.contains(',') {
                return Err(EngineError::InvalidIndexField(f.clone()));
            }
        }
        if let Some(t) = tag {
            match_on.insert("tag".to_string(), Value::Int(t));
        }
        Ok(IndexDescriptor {
            table: table.into(),
            fields,
            match_on,
            tag,
        })
    }

    /// Build a descriptor with the auto-generated table name
    /// `index_<tag5>_<md5hex>`, derived from the field list and match-on
    /// mapping so two descriptors with the same shape collide onto the same
    /// table name.
    pub fn auto_named(
        fields: Vec<String>,
        match_on: BTreeMap<String, Value>,
        tag: Option<i64>,
    ) -> Result<Self, EngineError> {
        let mut sorted_fields = fields.clone();
        sorted_fields.sort();
        let mut shape = sorted_fields.join(",");
        for (k, v) in &match_on {
            shape.push(';');
            shape.push_str(k);
            shape.push('=');
            shape.push_str(&value_to_json(v).to_string());
        }
        let digest = format!("{:x}", md5::compute(shape.as_bytes()));
        let table = format!("index_{}_{}", &digest[..5], digest);
        Self::new(table, fields, match_on, tag)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn match_on(&self) -> &BTreeMap<String, Value> {
        &self.match_on
    }

    pub fn tag(&self) -> Option<i64> {
        self.tag
    }

    pub fn is_tag_pseudo_index(&self) -> bool {
        self.table == "entities"
    }

    /// Does this index apply to `entity`? Every declared field must be
    /// present as a key, and every match_on pair must be present and equal
    /// — a missing match_on key is a mismatch, not a pass.
    pub fn matches(&self, entity: &Entity) -> bool {
        for f in &self.fields {
            if entity.get(f).is_none() {
                return false;
            }
        }
        for (k, v) in &self.match_on {
            match entity.get(k) {
                Some(actual) if actual == v => {}
                _ => return false,
            }
        }
        true
    }

    /// Lazily ensure the index table exists, creating it with the indexed
    /// fields as flexibly-typed columns plus `entity_id`, a primary key over
    /// all of them, and a secondary key on `entity_id` alone.
    pub fn declare_against(&self, conn: &dyn Connection) -> Result<(), EngineError> {
        if self.is_tag_pseudo_index() {
            return Ok(());
        }
        if conn.table_exists(&self.table)? {
            return Ok(());
        }
        let mut cols = String::new();
        for f in &self.fields {
            cols.push_str(&format!("{f} ANY NOT NULL, "));
        }
        let pk_cols = self
            .fields
            .iter()
            .cloned()
            .chain(std::iter::once("entity_id".to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        let ddl = format!(
            "CREATE TABLE {table} ({cols}entity_id BLOB NOT NULL, PRIMARY KEY ({pk_cols}))",
            table = self.table,
            cols = cols,
            pk_cols = pk_cols,
        );
        conn.execute(&ddl, &[])?;
        conn.execute(
            &format!(
                "CREATE INDEX {table}_entity_id_idx ON {table} (entity_id)",
                table = self.table
            ),
            &[],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(fields: &[(&str, Value)]) -> Entity {
        let mut e = Entity::new();
        for (k, v) in fields {
            e.set(*k, v.clone());
        }
        e
    }

    #[test]
    fn rejects_comma_in_field_name() {
        let err = IndexDescriptor::new("t", vec!["a,b".to_string()], BTreeMap::new(), None);
        assert!(matches!(err, Err(EngineError::InvalidIndexField(_))));
    }

    #[test]
    fn tag_binding_folds_into_match_on() {
        let idx = IndexDescriptor::new("t", vec![], BTreeMap::new(), Some(3)).unwrap();
        assert_eq!(idx.match_on().get("tag"), Some(&Value::Int(3)));
    }

    #[test]
    fn matches_requires_all_fields_present() {
        let idx = IndexDescriptor::new(
            "t",
            vec!["bar".to_string()],
            BTreeMap::new(),
            None,
        )
        .unwrap();
        let e = entity(&[("foo", Value::Int(1))]);
        assert!(!idx.matches(&e));
        let e2 = entity(&[("bar", Value::Int(1))]);
        assert!(idx.matches(&e2));
    }

    #[test]
    fn missing_match_on_key_is_a_mismatch() {
        let mut match_on = BTreeMap::new();
        match_on.insert("m".to_string(), Value::Str("right".to_string()));
        let idx = IndexDescriptor::new("t", vec!["bar".to_string()], match_on, None).unwrap();
        let e = entity(&[("bar", Value::Int(1))]);
        assert!(!idx.matches(&e));
        let e2 = entity(&[("bar", Value::Int(1)), ("m", Value::Str("left".to_string()))]);
        assert!(!idx.matches(&e2));
        let e3 = entity(&[("bar", Value::Int(1)), ("m", Value::Str("right".to_string()))]);
        assert!(idx.matches(&e3));
    }
}
