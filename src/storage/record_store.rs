// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON document store on the local filesystem.
//!
//! Records hold vault envelopes, never plaintext; this layer does no crypto
//! of its own. Writes go to a per-call temp file first and are renamed into
//! place so a crash never leaves a half-written record, and concurrent writers
//! to the same record never share a temp file.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::StoragePaths;

/// Error type for record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Entity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    /// Storage not initialized
    #[error("Storage not initialized")]
    NotInitialized,
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Filesystem-backed JSON record store.
#[derive(Debug, Clone)]
pub struct RecordStore {
    paths: StoragePaths,
    initialized: bool,
}

impl RecordStore {
    /// Create a new RecordStore instance.
    ///
    /// Does NOT initialize the directory structure. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    /// Get the storage paths.
    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Create the directory layout and drop temp files orphaned by a crashed
    /// write. Safe to call multiple times.
    pub fn initialize(&mut self) -> StorageResult<()> {
        let vault_dir = self.paths.vault_dir();
        fs::create_dir_all(&vault_dir)?;
        self.initialized = true;

        let orphans = self.list_files(&vault_dir, "tmp")?;
        for stem in &orphans {
            fs::remove_file(vault_dir.join(format!("{stem}.tmp")))?;
        }
        if !orphans.is_empty() {
            tracing::warn!(removed = orphans.len(), "Removed orphaned temp records");
        }
        Ok(())
    }

    /// Write-read-delete probe of the data directory.
    pub fn health_check(&self) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let test_file = self
            .paths
            .vault_dir()
            .join(format!(".health_check-{}", Uuid::new_v4().simple()));
        let test_data = b"health_check_data";

        fs::write(&test_file, test_data)?;
        let read_data = fs::read(&test_file);
        let removed = fs::remove_file(&test_file);
        let read_data = read_data?;
        removed?;

        if read_data != test_data {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "Health check data mismatch",
            )));
        }

        Ok(())
    }

    // ========== Generic JSON Operations ==========

    /// Read a JSON file and deserialize it.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StorageResult<T> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let value = serde_json::from_reader(reader)?;
        Ok(value)
    }

    /// Write a JSON file (atomic write via rename).
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StorageResult<()> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let written = Self::write_temp(&temp_path, value).and_then(|()| {
            fs::rename(&temp_path, path)?;
            Ok(())
        });
        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written
    }

    fn write_temp<T: Serialize>(temp_path: &Path, value: &T) -> StorageResult<()> {
        let file = File::create(temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        Ok(())
    }

    /// Check if a file exists.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        File::open(path.as_ref()).is_ok()
    }

    /// List the stems of all files in `dir` with the given extension.
    pub fn list_files(&self, dir: impl AsRef<Path>, extension: &str) -> StorageResult<Vec<String>> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }

        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != extension) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}
