// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::path::PathBuf;

/// Failure reading or writing one of the line-delimited store files.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why the live file could not be moved aside for delivery.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("no live entries to rotate")]
    NothingToRotate,

    #[error("a staging file from an earlier attempt is still present")]
    StagingPresent,

    #[error("failed to rename live file to staging: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a failed transfer to the collector.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to encode request body: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector answered with status {0}")]
    UnexpectedStatus(StatusCode),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("threshold must be at least 1".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: threshold must be at least 1"
        );
        assert_eq!(
            DeliveryError::UnexpectedStatus(StatusCode::ACCEPTED).to_string(),
            "collector answered with status 202 Accepted"
        );
    }

    #[test]
    fn test_storage_error_keeps_path() {
        let error = StorageError::Read {
            path: PathBuf::from("/tmp/entries.jsonl"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(error.to_string().starts_with("failed to read /tmp/entries.jsonl"));
    }
}
