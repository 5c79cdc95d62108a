// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Live append target for new entries.
pub const ENTRIES_FILE_NAME: &str = "log_shipper_entries.jsonl";
/// Live file renamed aside while its batch is being delivered.
pub const STAGING_FILE_NAME: &str = "log_shipper_entries_sending.jsonl";
/// One session record per process run.
pub const SESSIONS_FILE_NAME: &str = "log_shipper_sessions.jsonl";

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MIN_ALLOWED_THRESHOLD: usize = 10;
pub const DEFAULT_STORAGE_DIR: &str = "./log-shipper";
