// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path layout for the on-disk record store.

use std::path::{Path, PathBuf};

/// Default data root when `DATA_DIR` is unset.
pub const DATA_ROOT: &str = "./data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Vault Paths ==========

    /// Directory containing all vault secret records.
    pub fn vault_dir(&self) -> PathBuf {
        self.root.join("vault")
    }

    /// Path to a specific vault secret record.
    pub fn vault_secret(&self, secret_id: &str) -> PathBuf {
        self.vault_dir().join(format!("{secret_id}.json"))
    }
}
