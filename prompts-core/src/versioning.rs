//! # Versioning
//!
//! Creates new prompt versions and links them into their history with a `follows`
//! relation. See [`crate::chain`] for reading histories back.

use crate::record::{CONTENT_FIELD, Fields, Record, RecordKind, Relation, ValidationError};
use crate::storage::{RecordStore, RelationFilter};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// Fields carried over from the record being versioned.
const INHERITED_FIELDS: [&str; 3] = ["description", "variables", "tags"];

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl VersionError {
    fn storage<E: std::error::Error + Send + Sync + 'static>(err: E) -> VersionError {
        VersionError::Storage(Box::new(err))
    }
}

/// Saves a new version of the record `id` with the given content.
///
/// The version number is the count of versions already following `id`, plus two: the
/// first bump of an original yields version 2. Description, variables and tags are
/// copied from `id`. The new record is saved before the `follows` relation linking it
/// to `id`.
pub async fn bump_version<S: RecordStore>(
    store: &S,
    id: &str,
    content: &str,
    changelog: Option<&str>,
) -> Result<Record, VersionError> {
    let original = store
        .get_record(id)
        .await
        .map_err(VersionError::storage)?
        .ok_or_else(|| VersionError::NotFound(id.to_string()))?;

    let successors = store
        .get_relations(&RelationFilter::followed_by(id))
        .await
        .map_err(VersionError::storage)?;
    let version_number = successors.len() + 2;

    let mut fields = Fields::new();
    fields.insert(CONTENT_FIELD.to_string(), Value::from(content));
    fields.insert("versionNumber".to_string(), Value::from(version_number));
    if let Some(changelog) = changelog {
        fields.insert("changelog".to_string(), Value::from(changelog));
    }
    for name in INHERITED_FIELDS {
        if let Some(value) = original.field(name).filter(|value| !value.is_null()) {
            fields.insert(name.to_string(), value.clone());
        }
    }

    let version = Record::new(
        RecordKind::PromptVersion,
        format!("{} v{}", original.title, version_number),
        fields,
    );
    version.validate()?;

    store.save_record(&version).await.map_err(VersionError::storage)?;
    store
        .save_relation(&Relation::follows(&version.id, id))
        .await
        .map_err(VersionError::storage)?;

    info!(from = id, to = %version.id, version_number, "bumped prompt version");
    Ok(version)
}
