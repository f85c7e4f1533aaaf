//! # Record Storage
//!
//! This module defines the interface the rest of the crate uses to read and write
//! records and relations.
//!
//! The main components are:
//! - [`RecordStore`] trait - Defines the interface for storing and retrieving records
//!   and relations
//! - [`RelationFilter`] struct - Selects relations by source, target and type
//!
//! Implementations live in [`crate::memory_storage`] and [`crate::file_storage`].

use crate::record::{FOLLOWS, Record, Relation};

/// Conjunctive relation query. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationFilter {
    pub source_id: Option<String>,
    pub target_id: Option<String>,
    pub relation_type: Option<String>,
}

impl RelationFilter {
    /// `follows` relations leaving `id`, i.e. what `id` is a new version of.
    pub fn follows_from(id: impl Into<String>) -> RelationFilter {
        RelationFilter {
            source_id: Some(id.into()),
            relation_type: Some(FOLLOWS.to_string()),
            ..RelationFilter::default()
        }
    }

    /// `follows` relations pointing at `id`, i.e. the versions that succeed `id`.
    pub fn followed_by(id: impl Into<String>) -> RelationFilter {
        RelationFilter {
            target_id: Some(id.into()),
            relation_type: Some(FOLLOWS.to_string()),
            ..RelationFilter::default()
        }
    }

    pub fn matches(&self, relation: &Relation) -> bool {
        self.source_id.as_ref().is_none_or(|id| *id == relation.source_id)
            && self.target_id.as_ref().is_none_or(|id| *id == relation.target_id)
            && self
                .relation_type
                .as_ref()
                .is_none_or(|kind| *kind == relation.relation_type)
    }
}

/// Storage collaborator for records and relations.
///
/// Reads of unknown ids are not errors: `get_record` returns `Ok(None)`.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get_record(&self, id: &str) -> Result<Option<Record>, Self::Error>;
    async fn save_record(&self, record: &Record) -> Result<(), Self::Error>;
    async fn get_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>, Self::Error>;
    async fn save_relation(&self, relation: &Relation) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let relation = Relation::follows("v2", "v1");

        assert!(RelationFilter::default().matches(&relation));
        assert!(RelationFilter::follows_from("v2").matches(&relation));
        assert!(RelationFilter::followed_by("v1").matches(&relation));
        assert!(!RelationFilter::follows_from("v1").matches(&relation));
        assert!(!RelationFilter::followed_by("v2").matches(&relation));
    }

    #[test]
    fn test_filter_type() {
        let relation = Relation::references("result", "test");
        assert!(!RelationFilter::follows_from("result").matches(&relation));

        let filter = RelationFilter {
            relation_type: Some("references".to_string()),
            ..RelationFilter::default()
        };
        assert!(filter.matches(&relation));
    }
}
