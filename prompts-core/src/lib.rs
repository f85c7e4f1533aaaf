//! # prompts Core
//!
//! This crate provides the core functionality for versioning, rendering and comparing
//! prompt templates.
//!
//! Prompts are stored as records. Each edit is saved as a new version record linked to
//! the one it replaces by a `follows` relation, so the history of a prompt can be
//! rebuilt from any of its versions.
//!
//! # Modules
//!
//! - [`record`] - Record and relation data structures, per-kind field schemas
//! - [`parser`] - Template syntax parsing
//! - [`renderer`] - Template rendering and variable extraction
//! - [`diff`] - Field-level and line-level comparison of two versions
//! - [`storage`] - Record storage trait and relation queries
//! - [`memory_storage`] - In-memory storage implementation
//! - [`file_storage`] - File-based storage implementation
//! - [`chain`] - Version history reconstruction
//! - [`versioning`] - Creating new versions
//! - [`scorer`] - Running test cases and comparing versions by score
//!
//! # Examples
//!
//! ```rust
//! use prompts_core::chain::ChainResolver;
//! use prompts_core::memory_storage::InMemoryStore;
//! use prompts_core::record::{Fields, Record, RecordKind};
//! use prompts_core::renderer::{RenderOptions, Renderer, Variables};
//! use prompts_core::storage::RecordStore;
//! use prompts_core::versioning::bump_version;
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = InMemoryStore::new();
//!
//! let mut fields = Fields::new();
//! fields.insert("content".to_string(), json!("Hello, {{name}}!"));
//! let original = Record::new(RecordKind::PromptTemplate, "Greeting", fields);
//! store.save_record(&original).await.unwrap();
//!
//! let version = bump_version(&store, &original.id, "Hi, {{name}}!", Some("friendlier"))
//!     .await
//!     .unwrap();
//!
//! let latest = ChainResolver::new(&store).latest_version(&original.id).await.unwrap();
//! assert_eq!(version.id, latest.id);
//!
//! let mut variables = Variables::new();
//! variables.insert("name".to_string(), json!("Ada"));
//! let text = Renderer::new()
//!     .render(latest.content().unwrap(), &variables, &RenderOptions::default())
//!     .unwrap();
//! assert_eq!("Hi, Ada!", text);
//! # });
//! ```

pub mod chain;
pub mod diff;
pub mod file_storage;
pub mod memory_storage;
pub mod parser;
pub mod record;
pub mod renderer;
pub mod scorer;
pub mod storage;
pub mod versioning;
