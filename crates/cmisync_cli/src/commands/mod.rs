//! CLI command implementations.

pub mod attempts;
pub mod delete;
pub mod snapshot;
pub mod tracks;

use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use cmisync_model::{AttemptNumber, ScormId, UserId};
use cmisync_offline::OfflineStore;
use cmisync_storage::SqliteBackend;
use serde::Serialize;
use thiserror::Error;

/// Output format of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text.
    Text,
    /// Pretty printed JSON.
    Json,
}

/// Errors reported by commands.
#[derive(Error, Debug)]
pub enum CommandError {
    /// No store file at the given path.
    #[error("no offline store found at {0}")]
    StoreNotFound(String),

    /// The requested attempt does not exist.
    #[error("attempt {attempt} of activity {scorm_id} not found")]
    AttemptNotFound {
        /// Activity id.
        scorm_id: ScormId,
        /// Attempt number.
        attempt: AttemptNumber,
    },
}

/// Opens an existing SQLite store for `user_id`.
pub fn open_store(path: &Path, user_id: UserId) -> Result<OfflineStore, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(CommandError::StoreNotFound(path.display().to_string()).into());
    }
    let backend = SqliteBackend::open(path)?;
    Ok(OfflineStore::new(Arc::new(backend), user_id))
}

/// Prints `value` as JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_attempt(
    store: &OfflineStore,
    scorm_id: ScormId,
    attempt: AttemptNumber,
) -> Result<(), Box<dyn std::error::Error>> {
    if store.attempt(scorm_id, attempt)?.is_none() {
        return Err(CommandError::AttemptNotFound { scorm_id, attempt }.into());
    }
    Ok(())
}
