use std::collections::{BTreeSet, HashMap};

use schemaless_query::{Column, ColumnExpression, OrderBy, Value};
use schemaless_store::Connection;

use crate::engine::Engine;
use crate::entity::Entity;
use crate::error::EngineError;
use crate::index::IndexDescriptor;

const ENTITIES_TABLE: &str = "entities";

/// A planned query against the datastore: predicates routed through the
/// planner, an optional sort, an optional row cap.
pub struct Query {
    pub predicates: Vec<ColumnExpression>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Query {
            predicates: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: ColumnExpression) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

fn order_clause(order_by: &Option<OrderBy>) -> String {
    match order_by {
        Some(ob) => format!(" ORDER BY {} {}", ob.field, ob.direction.as_sql()),
        None => String::new(),
    }
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {n}"),
        None => String::new(),
    }
}

fn where_clause(predicates: &[&ColumnExpression]) -> Result<(String, Vec<Value>), EngineError> {
    if predicates.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut fragments = Vec::with_capacity(predicates.len());
    let mut params = Vec::new();
    for p in predicates {
        let (frag, vals) = p.build()?;
        fragments.push(frag);
        params.extend(vals);
    }
    Ok((format!(" WHERE {}", fragments.join(" AND ")), params))
}

impl<C: Connection> Engine<C> {
    /// Run a [`Query`], returning matching entities in the order produced by
    /// the chosen index's probe when `order_by` was given, else `updated`
    /// ascending.
    pub fn query(&self, q: Query) -> Result<Vec<Entity>, EngineError> {
        let fields: BTreeSet<String> = q.predicates.iter().map(|p| p.name.clone()).collect();
        let chosen = self
            .indexes()
            .best_index(&fields)
            .ok_or(EngineError::Unplannable)?;

        let covered = fields
            .iter()
            .filter(|f| chosen.fields().contains(f))
            .count();
        if covered == 0 && q.order_by.is_none() {
            return Err(EngineError::Unplannable);
        }

        let (probe, residual): (Vec<&ColumnExpression>, Vec<&ColumnExpression>) = q
            .predicates
            .iter()
            .partition(|p| chosen.fields().iter().any(|f| f == &p.name));

        let mut entities = if chosen.is_tag_pseudo_index() {
            self.scan_entities(&probe, &q.order_by, q.limit)?
        } else {
            self.scan_index(&chosen, &probe, &q.order_by, q.limit)?
        };

        entities.retain(|e| residual.iter().all(|p| p.check(e.fields())));

        if q.order_by.is_none() {
            entities.sort_by(|a, b| {
                a.updated()
                    .unwrap_or(0.0)
                    .partial_cmp(&b.updated().unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        Ok(entities)
    }

    fn scan_entities(
        &self,
        probe: &[&ColumnExpression],
        order_by: &Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>, EngineError> {
        let (where_sql, params) = where_clause(probe)?;
        let sql = format!(
            "SELECT * FROM {ENTITIES_TABLE}{where_sql}{}{}",
            order_clause(order_by),
            limit_clause(limit)
        );
        let rows = self.connection().query(&sql, &params)?;
        rows.iter().map(|r| self.entity_from_row(r)).collect()
    }

    fn scan_index(
        &self,
        idx: &IndexDescriptor,
        probe: &[&ColumnExpression],
        order_by: &Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>, EngineError> {
        let (where_sql, params) = where_clause(probe)?;
        let sql = format!(
            "SELECT entity_id FROM {}{where_sql}{}{}",
            idx.table(),
            order_clause(order_by),
            limit_clause(limit)
        );
        let id_rows = self.connection().query(&sql, &params)?;
        if id_rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut ordered_ids = Vec::with_capacity(id_rows.len());
        for row in &id_rows {
            match row.require("entity_id")? {
                Value::Bytes(b) => ordered_ids.push(b.clone()),
                other => {
                    return Err(EngineError::InternalError(format!(
                        "entity_id column held an unexpected type: {other:?}"
                    )));
                }
            }
        }

        let placeholders = ordered_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let fetch_sql = format!("SELECT * FROM {ENTITIES_TABLE} WHERE id IN ({placeholders})");
        let fetch_params: Vec<Value> = ordered_ids.iter().cloned().map(Value::Bytes).collect();
        let rows = self.connection().query(&fetch_sql, &fetch_params)?;

        let mut by_id: HashMap<Vec<u8>, Entity> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let entity = self.entity_from_row(row)?;
            if let Some(guid) = entity.id() {
                by_id.insert(guid.as_raw().to_vec(), entity);
            }
        }

        Ok(ordered_ids
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect())
    }

    /// A query capped to one row; more than one is an internal error (the
    /// chosen index's probe should never admit duplicates for a `get`).
    pub fn get(&self, predicates: Vec<ColumnExpression>) -> Result<Option<Entity>, EngineError> {
        let mut q = Query::new().limit(2);
        q.predicates = predicates;
        let mut rows = self.query(q)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.remove(0))),
            _ => Err(EngineError::InternalError(
                "get() matched more than one entity".to_string(),
            )),
        }
    }

    /// Every entity reachable through a specific index: an empty probe, or
    /// (for a tag-bound index) the tag equality predicate that index implies.
    /// Bypasses the planner entirely — the caller names the index.
    pub fn all_in_index(
        &self,
        idx: &IndexDescriptor,
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Entity>, EngineError> {
        let probe_owned: Vec<ColumnExpression> = match idx.tag() {
            Some(t) => vec![Column::new("tag").eq(t)],
            None => Vec::new(),
        };
        let probe: Vec<&ColumnExpression> = probe_owned.iter().collect();

        let mut entities = if idx.is_tag_pseudo_index() {
            self.scan_entities(&probe, &order_by, limit)?
        } else {
            self.scan_index(idx, &probe, &order_by, limit)?
        };

        if order_by.is_none() {
            entities.sort_by(|a, b| {
                a.updated()
                    .unwrap_or(0.0)
                    .partial_cmp(&b.updated().unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        Ok(entities)
    }
}
