use confy::ConfyError;
use prompts_core::file_storage::FileStore;
use serde::{Deserialize, Serialize};
use std::env::home_dir;
use std::path::PathBuf;
use tracing::error;

pub const PROMPTS_CLI: &str = "prompts";

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptsConfig {
    pub base_path: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        let base_path = home_dir()
            .map(|p| p.join("prompts").join("data"))
            .unwrap_or_else(|| PathBuf::from("prompts/data"));

        Self {
            base_path: base_path.display().to_string(),
        }
    }
}

/// Opens the store at `storage_path`, or at the configured path when none is given.
pub fn get_storage(storage_path: Option<String>) -> FileStore {
    if let Some(path) = storage_path {
        return FileStore::new(path);
    }

    let config: Result<PromptsConfig, ConfyError> = confy::load(PROMPTS_CLI, None);
    match config {
        Ok(config) => FileStore::new(config.base_path),
        Err(err) => {
            error!(%err, "failed to load configuration");
            eprintln!("Error: Problem loading config. Exiting...");
            std::process::exit(exitcode::CONFIG);
        }
    }
}
