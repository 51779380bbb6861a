use std::collections::BTreeMap;

use schemaless_query::Value;

use crate::guid::Guid;

/// Reserved field names. `id` and `updated` never live in the encoded body;
/// `tag` does not either, but unlike the other two it's an ordinary document
/// field rather than an engine-assigned one.
pub const ID_FIELD: &str = "id";
pub const UPDATED_FIELD: &str = "updated";
pub const TAG_FIELD: &str = "tag";

/// A document: an opaque map of string field names to JSON-expressible
/// values, with `id`/`updated`/`tag` living in the same map as ordinary
/// entries (mirroring the original's `Entity(dict)` design) but treated
/// specially by the codec and by index matching.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    fields: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new() -> Self {
        Entity {
            fields: BTreeMap::new(),
        }
    }

    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Entity { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn id(&self) -> Option<Guid> {
        match self.fields.get(ID_FIELD) {
            Some(Value::Str(s)) => Guid::from_hex(s).ok(),
            Some(Value::Bytes(b)) => Guid::normalize(b).ok(),
            _ => None,
        }
    }

    pub fn set_id(&mut self, id: Guid) -> &mut Self {
        self.set(ID_FIELD, id.to_hex())
    }

    pub fn updated(&self) -> Option<f64> {
        match self.fields.get(UPDATED_FIELD) {
            Some(Value::Float(f)) => Some(*f),
            Some(Value::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn set_updated(&mut self, updated: f64) -> &mut Self {
        self.set(UPDATED_FIELD, updated)
    }

    pub fn tag(&self) -> Option<i64> {
        match self.fields.get(TAG_FIELD) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn set_tag(&mut self, tag: i64) -> &mut Self {
        self.set(TAG_FIELD, tag)
    }

    /// The body the codec is allowed to persist: every field except the
    /// reserved `id`/`updated`, which are assigned and tracked by the engine
    /// itself. `tag` stays — it's an ordinary (if special-cased) field.
    pub fn body_fields(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != ID_FIELD && k.as_str() != UPDATED_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
