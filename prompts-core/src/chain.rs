//! # Version Chains
//!
//! Reconstructs the history of a prompt from `follows` relations.
//!
//! A relation `source --follows--> target` says that `source` is the version
//! immediately after `target`. Starting from any version, [`ChainResolver`] walks
//! predecessors back to the root, then collects every version reachable forward from
//! the root. The result is recomputed from the store on every call.
//!
//! A version with more than one distinct predecessor is rejected with
//! [`ChainError::AmbiguousPredecessor`] wherever the walk meets it: merged histories
//! have no single root.
//! Several versions following the same predecessor (a fork) are fine.

use crate::record::Record;
use crate::storage::{RecordStore, RelationFilter};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Cycle detected in follows chain at {0}")]
    Cycle(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Record {id} follows more than one version: {}", .candidates.join(", "))]
    AmbiguousPredecessor { id: String, candidates: Vec<String> },
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ChainError {
    fn storage<E: std::error::Error + Send + Sync + 'static>(err: E) -> ChainError {
        ChainError::Storage(Box::new(err))
    }
}

pub struct ChainResolver<'a, S> {
    store: &'a S,
}

impl<'a, S: RecordStore> ChainResolver<'a, S> {
    pub fn new(store: &'a S) -> ChainResolver<'a, S> {
        ChainResolver { store }
    }

    /// Returns every version connected to `id`, oldest first.
    ///
    /// The result is the same whichever version of the chain `id` names.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Record>)` - The chain sorted by `created_at`.
    /// * `ChainError::NotFound` - If `id` or the root it leads to does not exist.
    /// * `ChainError::Cycle` - If walking back from `id` revisits a version.
    /// * `ChainError::AmbiguousPredecessor` - If any version reached from `id` follows
    ///   more than one version.
    pub async fn version_chain(&self, id: &str) -> Result<Vec<Record>, ChainError> {
        self.load(id).await?;
        let root = self.find_root(id).await?;

        let mut visited = HashSet::from([root.id.clone()]);
        let mut queue = VecDeque::from([root.id.clone()]);
        let mut chain = vec![root];

        while let Some(current) = queue.pop_front() {
            let successors = self
                .store
                .get_relations(&RelationFilter::followed_by(&current))
                .await
                .map_err(ChainError::storage)?;

            for relation in successors {
                if !visited.insert(relation.source_id.clone()) {
                    continue;
                }
                match self
                    .store
                    .get_record(&relation.source_id)
                    .await
                    .map_err(ChainError::storage)?
                {
                    Some(record) => {
                        let predecessors = self.predecessors(&relation.source_id).await?;
                        if predecessors.len() > 1 {
                            return Err(ChainError::AmbiguousPredecessor {
                                id: relation.source_id,
                                candidates: predecessors,
                            });
                        }
                        queue.push_back(relation.source_id);
                        chain.push(record);
                    }
                    // a successor edge written before its record; not part of the history yet
                    None => warn!(
                        source = %relation.source_id,
                        target = %current,
                        "ignoring follows relation from missing record"
                    ),
                }
            }
        }

        chain.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        debug!(id, versions = chain.len(), "resolved version chain");
        Ok(chain)
    }

    /// Returns the newest leaf of the chain containing `id`.
    ///
    /// A leaf is a version that no other version of the chain follows. When a history
    /// forks, the leaf created last wins.
    pub async fn latest_version(&self, id: &str) -> Result<Record, ChainError> {
        let chain = self.version_chain(id).await?;
        let members: HashSet<&str> = chain.iter().map(|record| record.id.as_str()).collect();

        let mut latest: Option<&Record> = None;
        for record in &chain {
            let successors = self
                .store
                .get_relations(&RelationFilter::followed_by(&record.id))
                .await
                .map_err(ChainError::storage)?;
            if successors
                .iter()
                .any(|relation| members.contains(relation.source_id.as_str()))
            {
                continue;
            }
            if latest.is_none_or(|best| record.created_at > best.created_at) {
                latest = Some(record);
            }
        }

        latest
            .cloned()
            .ok_or_else(|| ChainError::NotFound(id.to_string()))
    }

    /// Returns the version that was current at `date`: the newest version created at
    /// or before it, or `None` when `date` precedes the whole chain.
    pub async fn version_at(
        &self,
        id: &str,
        date: DateTime<Utc>,
    ) -> Result<Option<Record>, ChainError> {
        let chain = self.version_chain(id).await?;

        Ok(chain
            .into_iter()
            .filter(|record| record.created_at <= date)
            .rev()
            .max_by_key(|record| record.created_at))
    }

    async fn load(&self, id: &str) -> Result<Record, ChainError> {
        self.store
            .get_record(id)
            .await
            .map_err(ChainError::storage)?
            .ok_or_else(|| ChainError::NotFound(id.to_string()))
    }

    /// Distinct targets of the `follows` relations leaving `id`, in relation order.
    async fn predecessors(&self, id: &str) -> Result<Vec<String>, ChainError> {
        let relations = self
            .store
            .get_relations(&RelationFilter::follows_from(id))
            .await
            .map_err(ChainError::storage)?;

        let mut targets: Vec<String> = Vec::new();
        for relation in relations {
            if !targets.contains(&relation.target_id) {
                targets.push(relation.target_id);
            }
        }
        Ok(targets)
    }

    /// Walks `follows` relations backwards until a version with no predecessor.
    async fn find_root(&self, id: &str) -> Result<Record, ChainError> {
        let mut visited = HashSet::new();
        let mut current = id.to_string();

        loop {
            if !visited.insert(current.clone()) {
                return Err(ChainError::Cycle(current));
            }

            let mut targets = self.predecessors(&current).await?;
            match targets.len() {
                0 => return self.load(&current).await,
                1 => {
                    debug!(from = %current, to = %targets[0], "following predecessor");
                    current = targets.remove(0);
                }
                _ => {
                    return Err(ChainError::AmbiguousPredecessor {
                        id: current,
                        candidates: targets,
                    });
                }
            }
        }
    }
}
