use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::index::IndexDescriptor;

/// Picks the best index for a set of predicate fields out of a fixed
/// collection, memoising the answer per field set. Registering a new index
/// (via [`IndexCollection::push`]) purges the cache — this is only safe
/// during setup, before any query runs against the collection.
pub struct IndexCollection {
    indexes: Vec<Arc<IndexDescriptor>>,
    cache: Mutex<HashMap<BTreeSet<String>, usize>>,
}

impl IndexCollection {
    pub fn new(indexes: Vec<Arc<IndexDescriptor>>) -> Self {
        IndexCollection {
            indexes,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&mut self, index: Arc<IndexDescriptor>) {
        self.indexes.push(index);
        self.cache.lock().unwrap().clear();
    }

    pub fn indexes(&self) -> &[Arc<IndexDescriptor>] {
        &self.indexes
    }

    /// Given the predicate field names, choose the index that maximises
    /// `(fields_covered, -descriptor_width)`, breaking ties by stable
    /// insertion order (the first index to reach a score keeps it — a later
    /// index has to do strictly better to take over).
    pub fn best_index(&self, fields: &BTreeSet<String>) -> Option<Arc<IndexDescriptor>> {
        if let Some(&idx) = self.cache.lock().unwrap().get(fields) {
            return Some(self.indexes[idx].clone());
        }

        let mut best: Option<(usize, isize, usize)> = None;
        for (i, idx) in self.indexes.iter().enumerate() {
            let field_set: BTreeSet<&String> = idx.fields().iter().collect();
            let covered = fields.iter().filter(|f| field_set.contains(f)).count();
            let width = -(idx.fields().len() as isize);
            let candidate = (covered, width, i);
            let better = match best {
                None => true,
                Some((bc, bw, _)) => (covered, width) > (bc, bw),
            };
            if better {
                best = Some(candidate);
            }
        }

        let (_, _, best_i) = best?;
        self.cache.lock().unwrap().insert(fields.clone(), best_i);
        Some(self.indexes[best_i].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn idx(table: &str, fields: &[&str]) -> Arc<IndexDescriptor> {
        Arc::new(
            IndexDescriptor::new(
                table,
                fields.iter().map(|s| s.to_string()).collect(),
                BTreeMap::new(),
                None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn prefers_most_coverage_then_narrowest() {
        let wide = idx("wide", &["user_id", "first_name", "last_name"]);
        let narrow = idx("narrow", &["user_id"]);
        let collection = IndexCollection::new(vec![wide.clone(), narrow.clone()]);

        let fields: BTreeSet<String> = ["user_id".to_string()].into_iter().collect();
        let chosen = collection.best_index(&fields).unwrap();
        assert_eq!(chosen.table(), "narrow");
    }

    #[test]
    fn ties_favor_earlier_index() {
        let a = idx("a", &["x"]);
        let b = idx("b", &["x"]);
        let collection = IndexCollection::new(vec![a, b]);
        let fields: BTreeSet<String> = ["x".to_string()].into_iter().collect();
        assert_eq!(collection.best_index(&fields).unwrap().table(), "a");
    }

    #[test]
    fn memoizes_per_field_set() {
        let a = idx("a", &["x"]);
        let collection = IndexCollection::new(vec![a]);
        let fields: BTreeSet<String> = ["x".to_string()].into_iter().collect();
        assert_eq!(collection.best_index(&fields).unwrap().table(), "a");
        assert_eq!(collection.best_index(&fields).unwrap().table(), "a");
    }

    #[test]
    fn empty_collection_has_no_best_index() {
        let collection = IndexCollection::new(vec![]);
        let fields: BTreeSet<String> = ["x".to_string()].into_iter().collect();
        assert!(collection.best_index(&fields).is_none());
    }
}
