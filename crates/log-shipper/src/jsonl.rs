// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-delimited JSON files: one object per line, newline terminated.
//!
//! Reading is deliberately lenient. Only lines that start with `{` and end with `}` are
//! considered records; anything else (blank lines, a torn last line after a crash) is
//! ignored silently. A record-shaped line that does not decode, or decodes to `{}`, is
//! skipped with a warning so that a corrupt line never blocks the lines after it.

use crate::errors::StorageError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LineFile {
    path: PathBuf,
}

impl LineFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Appends one record as a single line, creating the file if needed.
    ///
    /// The line is written with one `write_all` and flushed to stable storage before
    /// returning, so after a crash it is either complete or at worst a torn tail that the
    /// reader ignores. A torn tail is terminated before the next line is written so the
    /// two never merge.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), StorageError> {
        let mut line = encode_line(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.write_error(source))?;
        if has_torn_tail(&mut file).map_err(|source| self.write_error(source))? {
            warn!("Terminating partial last line of {}", self.path.display());
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|source| self.write_error(source))
    }

    /// Replaces the whole file with a single record.
    pub fn overwrite<T: Serialize>(&self, record: &T) -> Result<(), StorageError> {
        let line = encode_line(record)?;
        let tmp_path = self.path.with_extension("tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(line.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };
        write_tmp().map_err(|source| self.write_error(source))
    }

    /// Decodes every record in file order. A missing file has no records.
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        Ok(decode_lines(&content, &self.path))
    }

    /// Deletes the file. Deleting a file that is already gone succeeds.
    pub fn remove(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.write_error(source)),
        }
    }

    fn write_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// Whether the file is non-empty and does not end with a newline.
fn has_torn_tail(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn encode_line<T: Serialize>(record: &T) -> Result<String, StorageError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

fn decode_lines<T: DeserializeOwned>(content: &str, path: &Path) -> Vec<T> {
    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if !(line.starts_with('{') && line.ends_with('}')) {
            continue;
        }
        let line_number = index + 1;
        let object = match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(object) if object.is_empty() => {
                warn!("Skipping empty record on line {line_number} of {}", path.display());
                continue;
            }
            Ok(object) => object,
            Err(e) => {
                warn!("Could not parse line {line_number} of {}: {e}", path.display());
                continue;
            }
        };
        match serde_json::from_value::<T>(Value::Object(object)) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Could not decode line {line_number} of {}: {e}", path.display()),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tracing_test::traced_test;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: u32,
        name: String,
    }

    fn record(id: u32) -> Record {
        Record {
            id,
            name: format!("record-{id}"),
        }
    }

    #[test]
    fn test_append_creates_file_and_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = LineFile::new(dir.path().join("records.jsonl"));
        assert!(!file.exists());

        file.append(&record(1)).unwrap();
        file.append(&record(2)).unwrap();

        assert!(file.exists());
        let records: Vec<Record> = file.read_all().unwrap();
        assert_eq!(records, vec![record(1), record(2)]);

        let raw = fs::read_to_string(file.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = LineFile::new(dir.path().join("absent.jsonl"));
        let records: Vec<Record> = file.read_all().unwrap();
        assert!(records.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        fs::write(
            &path,
            concat!(
                "not json at all\n",
                "{\"id\": 1, \"name\": \"record-1\"}\n",
                "\n",
                "{\"id\": oops}\n",
                "{}\n",
                "{\"unexpected\": true}\n",
                "{\"id\": 2, \"name\": \"record-2\"}\n",
                "{\"id\": 3, \"na",
            ),
        )
        .unwrap();

        let records: Vec<Record> = LineFile::new(&path).read_all().unwrap();
        assert_eq!(records, vec![record(1), record(2)]);
        assert!(logs_contain("Could not parse line 4"));
        assert!(logs_contain("Skipping empty record on line 5"));
        assert!(logs_contain("Could not decode line 6"));
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = LineFile::new(dir.path().join("records.jsonl"));
        file.append(&record(1)).unwrap();
        file.append(&record(2)).unwrap();

        file.overwrite(&record(3)).unwrap();

        let records: Vec<Record> = file.read_all().unwrap();
        assert_eq!(records, vec![record(3)]);
        assert!(!dir.path().join("records.tmp").exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = LineFile::new(dir.path().join("records.jsonl"));
        file.append(&record(1)).unwrap();
        file.remove().unwrap();
        assert!(!file.exists());
        file.remove().unwrap();
    }
}
