use super::{DataStore, Filter};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory store backed by a map of collections. Used by the test
/// suites and for local development without a database. Preserves
/// insertion order within a collection, matching the Postgres store's
/// enumeration order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(record: &Value, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|filter| record.get(&filter.field) == Some(&filter.value))
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn insert(&self, collection: &str, record: Value) -> Result<Value> {
        let mut collections = self.collections.lock().expect("store lock");
        collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn select(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        let collections = self.collections.lock().expect("store lock");
        Ok(collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches(record, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, collection: &str, filters: &[Filter], patch: Value) -> Result<u64> {
        let patch_object = match patch {
            Value::Object(map) => map,
            other => {
                return Err(crate::error::AppError::InvalidInput(format!(
                    "patch must be a JSON object, got {other}"
                )))
            }
        };
        let mut collections = self.collections.lock().expect("store lock");
        let mut touched = 0;
        if let Some(records) = collections.get_mut(collection) {
            for record in records.iter_mut() {
                if matches(record, filters) {
                    if let Value::Object(fields) = record {
                        for (key, value) in &patch_object {
                            fields.insert(key.clone(), value.clone());
                        }
                        touched += 1;
                    }
                }
            }
        }
        Ok(touched)
    }

    async fn delete(&self, collection: &str, filters: &[Filter]) -> Result<u64> {
        let mut collections = self.collections.lock().expect("store lock");
        let mut removed = 0;
        if let Some(records) = collections.get_mut(collection) {
            let before = records.len();
            records.retain(|record| !matches(record, filters));
            removed = (before - records.len()) as u64;
        }
        Ok(removed)
    }
}
