// SPDX-License-Identifier: Apache-2.0

//! In-process cache of described tables
//!
//! Without a TTL entries live until invalidated. With one, stale entries are
//! treated as misses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::engine::schema::TableSchema;

struct CachedSchema {
    schema: Arc<TableSchema>,
    loaded_at: Instant,
}

pub struct SchemaCache {
    entries: RwLock<HashMap<String, CachedSchema>>,
    ttl: Option<Duration>,
}

impl SchemaCache {
    /// Entries stay until [`invalidate`](Self::invalidate) is called.
    pub fn manual() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        let entries = self.entries.read();
        let entry = entries.get(table)?;
        match self.ttl {
            Some(ttl) if entry.loaded_at.elapsed() >= ttl => None,
            _ => Some(entry.schema.clone()),
        }
    }

    pub fn insert(&self, table: &str, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        self.entries.write().insert(
            table.to_string(),
            CachedSchema {
                schema: schema.clone(),
                loaded_at: Instant::now(),
            },
        );
        schema
    }

    pub fn invalidate(&self, table: &str) {
        self.entries.write().remove(table);
    }

    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(table: &str) -> TableSchema {
        TableSchema {
            table: table.into(),
            columns: vec![],
            primary_key: vec!["id".into()],
            foreign_keys: vec![],
            unique_constraints: vec![],
            row_count_estimate: None,
        }
    }

    #[test]
    fn manual_cache_keeps_entries_until_invalidated() {
        let cache = SchemaCache::manual();
        cache.insert("books", schema("books"));
        cache.insert("authors", schema("authors"));
        assert!(cache.get("books").is_some());

        cache.invalidate("books");
        assert!(cache.get("books").is_none());
        assert_eq!(cache.len(), 1);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = SchemaCache::with_ttl(Some(Duration::ZERO));
        cache.insert("books", schema("books"));
        assert!(cache.get("books").is_none());
    }
}
