//! # Memory Storage
//!
//! An in-process [`RecordStore`] for tests and short-lived tools. Nothing is persisted.

use crate::record::{Record, Relation};
use crate::storage::{RecordStore, RelationFilter};
use std::collections::HashMap;
use std::convert::Infallible;
use tokio::sync::RwLock;

/// Records keyed by id, relations in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Record>>,
    relations: RwLock<Vec<Relation>>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn relations(&self) -> Vec<Relation> {
        self.relations.read().await.clone()
    }
}

impl RecordStore for InMemoryStore {
    type Error = Infallible;

    async fn get_record(&self, id: &str) -> Result<Option<Record>, Infallible> {
        Ok(self.records.read().await.get(id).cloned())
    }

    /// Inserts or replaces the record with the same id.
    async fn save_record(&self, record: &Record) -> Result<(), Infallible> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>, Infallible> {
        Ok(self
            .relations
            .read()
            .await
            .iter()
            .filter(|relation| filter.matches(relation))
            .cloned()
            .collect())
    }

    async fn save_relation(&self, relation: &Relation) -> Result<(), Infallible> {
        self.relations.write().await.push(relation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Fields, RecordKind};

    #[tokio::test]
    async fn test_save_and_get_record() {
        let store = InMemoryStore::new();
        let record = Record::new(RecordKind::PromptTemplate, "t", Fields::new()).with_id("r1");

        store.save_record(&record).await.unwrap();

        assert_eq!(Some(record), store.get_record("r1").await.unwrap());
        assert_eq!(None, store.get_record("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_record_overwrites() {
        let store = InMemoryStore::new();
        let first = Record::new(RecordKind::PromptTemplate, "first", Fields::new()).with_id("r1");
        let second = Record::new(RecordKind::PromptTemplate, "second", Fields::new()).with_id("r1");

        store.save_record(&first).await.unwrap();
        store.save_record(&second).await.unwrap();

        assert_eq!("second", store.get_record("r1").await.unwrap().unwrap().title);
        assert_eq!(1, store.records().await.len());
    }

    #[tokio::test]
    async fn test_relations_filtered_in_insertion_order() {
        let store = InMemoryStore::new();
        store.save_relation(&Relation::follows("v2", "v1")).await.unwrap();
        store.save_relation(&Relation::follows("v3", "v1")).await.unwrap();
        store.save_relation(&Relation::references("r", "v1")).await.unwrap();

        let successors = store
            .get_relations(&RelationFilter::followed_by("v1"))
            .await
            .unwrap();
        let sources: Vec<&str> = successors.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(vec!["v2", "v3"], sources);

        let all = store.get_relations(&RelationFilter::default()).await.unwrap();
        assert_eq!(3, all.len());
    }
}
