// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable two-file entry queue.
//!
//! Writers always append to the live file. A flush renames the live file to the staging
//! file, so the batch being delivered and the entries still arriving never share a file.
//! The staging file exists exactly as long as its batch is unacknowledged.

use crate::constants::{ENTRIES_FILE_NAME, STAGING_FILE_NAME};
use crate::entry::Entry;
use crate::errors::{RotationError, StorageError};
use crate::jsonl::LineFile;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AppendLog {
    live: LineFile,
    staging: LineFile,
}

impl AppendLog {
    /// Opens the queue rooted at `dir`. Nothing is created until the first append.
    pub fn new(dir: &Path) -> Self {
        Self {
            live: LineFile::new(dir.join(ENTRIES_FILE_NAME)),
            staging: LineFile::new(dir.join(STAGING_FILE_NAME)),
        }
    }

    pub fn append(&self, entry: &Entry) -> Result<(), StorageError> {
        self.live.append(entry)
    }

    /// Moves the live file aside as the staging file.
    ///
    /// Refuses to replace an existing staging file: that batch has not been delivered yet
    /// and must be retried instead.
    pub fn rotate_to_staging(&self) -> Result<(), RotationError> {
        if self.staging.exists() {
            return Err(RotationError::StagingPresent);
        }
        if !self.live.exists() {
            return Err(RotationError::NothingToRotate);
        }
        fs::rename(self.live.path(), self.staging.path())?;
        debug!("Rotated {} to staging", self.live.path().display());
        Ok(())
    }

    pub fn read_live(&self) -> Result<Vec<Entry>, StorageError> {
        self.live.read_all()
    }

    pub fn read_staging(&self) -> Result<Vec<Entry>, StorageError> {
        self.staging.read_all()
    }

    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }

    pub fn staging_exists(&self) -> bool {
        self.staging.exists()
    }

    pub fn clear_staging(&self) -> Result<(), StorageError> {
        self.staging.remove()
    }
}
