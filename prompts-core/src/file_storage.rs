//! # File Storage
//!
//! This module provides functionality for storing and retrieving records and relations
//! on the local filesystem.
//!
//! Layout under the base directory:
//!
//! - `records/<id>.md` - one markdown file per record. The YAML frontmatter holds the
//!   record metadata and its fields; the `content` field, when it is a string, is the
//!   markdown body.
//! - `relations/<id>.json` - one JSON file per relation.
//!
//! # Examples
//!
//! ```rust
//! use prompts_core::file_storage::FileStore;
//! use prompts_core::record::{Fields, Record, RecordKind};
//! use prompts_core::storage::RecordStore;
//! use serde_json::json;
//! use tempfile::TempDir;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! // Create a temporary directory for our tests
//! let temp_dir = TempDir::new().unwrap();
//! let storage = FileStore {
//!     base_path: temp_dir.path().to_path_buf(),
//! };
//!
//! let mut fields = Fields::new();
//! fields.insert("content".to_string(), json!("Hello, world!"));
//! let record = Record::new(RecordKind::PromptTemplate, "greeting", fields);
//!
//! storage.save_record(&record).await.expect("Failed to save record");
//! # });
//! ```

use crate::record::{CONTENT_FIELD, Fields, Record, RecordKind, Relation};
use crate::storage::{RecordStore, RelationFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const RECORDS_DIR: &str = "records";
const RELATIONS_DIR: &str = "relations";
const FRONTMATTER_FENCE: &str = "---";

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Frontmatter error in {path}: {message}")]
    Frontmatter { path: String, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid base path: {0}")]
    InvalidBasePath(String),
    #[error("Invalid id, must be non-empty and contain no path separators: {0:?}")]
    InvalidId(String),
}

/// Metadata written to the frontmatter of a record file.
#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    id: String,
    kind: RecordKind,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    content_in_body: bool,
    #[serde(default)]
    fields: Fields,
}

/// A local file storage for records and relations.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// The base directory where record and relation files are stored.
    pub base_path: PathBuf,
}

impl RecordStore for FileStore {
    type Error = FileStoreError;

    /// Gets a record given its id.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Record))` - If the record file exists and parses.
    /// * `Ok(None)` - If there is no file for `id`.
    /// * `FileStoreError` - If the file cannot be read or parsed.
    async fn get_record(&self, id: &str) -> Result<Option<Record>, FileStoreError> {
        let file_path = self.record_path(id)?;
        if !file_path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&file_path)?;
        read_record(&raw).map(Some).map_err(|message| FileStoreError::Frontmatter {
            path: file_path.display().to_string(),
            message,
        })
    }

    /// Saves a record in the local file system.
    ///
    /// If `base_path` doesn't exist, it is created first.
    /// If the file already exists, it is overwritten.
    async fn save_record(&self, record: &Record) -> Result<(), FileStoreError> {
        let file_path = self.record_path(&record.id)?;
        self.ensure_directory_exists(RECORDS_DIR)?;

        let serialized = write_record(record).map_err(|message| FileStoreError::Frontmatter {
            path: file_path.display().to_string(),
            message,
        })?;
        fs::write(&file_path, serialized)?;
        debug!(id = %record.id, path = %file_path.display(), "saved record");
        Ok(())
    }

    /// Gets the relations matching `filter`, ordered by creation time and then id.
    async fn get_relations(&self, filter: &RelationFilter) -> Result<Vec<Relation>, FileStoreError> {
        let mut relations = Vec::new();

        for entry in self.files_with_extension(RELATIONS_DIR, "json") {
            let content = fs::read_to_string(entry.path())?;
            let relation: Relation = serde_json::from_str(&content)?;
            if filter.matches(&relation) {
                relations.push(relation);
            }
        }

        relations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(relations)
    }

    async fn save_relation(&self, relation: &Relation) -> Result<(), FileStoreError> {
        let file_path = self.relation_path(&relation.id)?;
        self.ensure_directory_exists(RELATIONS_DIR)?;

        fs::write(&file_path, serde_json::to_string_pretty(relation)?)?;
        debug!(id = %relation.id, source = %relation.source_id, target = %relation.target_id, "saved relation");
        Ok(())
    }
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> FileStore {
        FileStore {
            base_path: base_path.into(),
        }
    }

    pub fn ensure_base_directory_exists(&self) -> Result<(), FileStoreError> {
        if !self.base_path.exists() {
            create_dir_all(&self.base_path)?;
        } else if !self.base_path.is_dir() {
            return Err(FileStoreError::InvalidBasePath(
                self.base_path.display().to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, name: &str) -> Result<(), FileStoreError> {
        self.ensure_base_directory_exists()?;
        let dir = self.base_path.join(name);
        if !dir.exists() {
            create_dir_all(dir)?;
        }
        Ok(())
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, FileStoreError> {
        Ok(self.base_path.join(RECORDS_DIR).join(format!("{}.md", checked_id(id)?)))
    }

    fn relation_path(&self, id: &str) -> Result<PathBuf, FileStoreError> {
        Ok(self.base_path.join(RELATIONS_DIR).join(format!("{}.json", checked_id(id)?)))
    }

    fn files_with_extension(&self, dir: &str, extension: &str) -> Vec<walkdir::DirEntry> {
        WalkDir::new(self.base_path.join(dir))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == extension)
            })
            .collect()
    }
}

fn checked_id(id: &str) -> Result<&str, FileStoreError> {
    let has_separator = id.contains(['/', '\\']) || Path::new(id).components().count() != 1;
    if id.is_empty() || id == "." || id == ".." || has_separator {
        return Err(FileStoreError::InvalidId(id.to_string()));
    }
    Ok(id)
}

fn write_record(record: &Record) -> Result<String, String> {
    let mut fields = record.fields.clone();
    let body = match fields.remove(CONTENT_FIELD) {
        Some(Value::String(content)) => Some(content),
        Some(other) => {
            fields.insert(CONTENT_FIELD.to_string(), other);
            None
        }
        None => None,
    };

    let header = RecordHeader {
        id: record.id.clone(),
        kind: record.kind,
        title: record.title.clone(),
        created_at: record.created_at,
        updated_at: record.updated_at,
        content_in_body: body.is_some(),
        fields,
    };

    let frontmatter = serde_yaml::to_string(&header).map_err(|e| e.to_string())?;
    Ok(format!(
        "{FRONTMATTER_FENCE}\n{frontmatter}{FRONTMATTER_FENCE}\n{}",
        body.unwrap_or_default()
    ))
}

/// Splits `---\n<yaml>---\n<body>` into its frontmatter and body.
fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix(FRONTMATTER_FENCE)?.strip_prefix('\n')?;
    if let Some(body) = rest.strip_prefix(FRONTMATTER_FENCE).and_then(|r| r.strip_prefix('\n')) {
        return Some(("", body));
    }
    let end = rest.find(&format!("\n{FRONTMATTER_FENCE}\n"))?;
    Some((&rest[..=end], &rest[end + FRONTMATTER_FENCE.len() + 2..]))
}

fn read_record(raw: &str) -> Result<Record, String> {
    let (frontmatter, body) =
        split_frontmatter(raw).ok_or_else(|| "missing frontmatter fences".to_string())?;
    let header: RecordHeader = serde_yaml::from_str(frontmatter).map_err(|e| e.to_string())?;

    let mut fields = header.fields;
    if header.content_in_body {
        fields.insert(
            CONTENT_FIELD.to_string(),
            Value::String(body.to_string()),
        );
    }

    Ok(Record {
        id: header.id,
        kind: header.kind,
        title: header.title,
        created_at: header.created_at,
        updated_at: header.updated_at,
        fields,
    })
}
