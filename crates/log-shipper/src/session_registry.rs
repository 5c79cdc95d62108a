// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::SESSIONS_FILE_NAME;
use crate::errors::StorageError;
use crate::jsonl::LineFile;
use crate::session::Session;
use std::path::Path;

/// Append-only record of the sessions whose entries may still be on disk.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    file: LineFile,
}

impl SessionRegistry {
    pub fn new(dir: &Path) -> Self {
        Self {
            file: LineFile::new(dir.join(SESSIONS_FILE_NAME)),
        }
    }

    pub fn record_session(&self, session: &Session) -> Result<(), StorageError> {
        self.file.append(session)
    }

    pub fn all(&self) -> Result<Vec<Session>, StorageError> {
        self.file.read_all()
    }

    /// Drops every historical session, keeping only `latest`.
    ///
    /// Does nothing when the registry holds no sessions at all.
    pub fn retain_only(&self, latest: &Session) -> Result<(), StorageError> {
        if self.all()?.is_empty() {
            return Ok(());
        }
        self.file.overwrite(latest)
    }
}
