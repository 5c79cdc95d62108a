// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Session metadata: one record per process run, used to enrich delivered entries.

use crate::entry::epoch_seconds;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;
use uuid::Uuid;

/// Application identity reported with every session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppInfo {
    pub version: String,
    pub build: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub os: String,
    pub os_version: String,
    pub host_name: String,
    pub device_name: String,
    pub device_model: String,
    pub app_version: String,
    pub app_build: i64,
    /// Session start, epoch seconds.
    pub timestamp: f64,
}

impl SessionMetadata {
    /// Describes the current host and process.
    pub fn collect(app: &AppInfo) -> Self {
        let platform = Platform::detect();
        Self {
            os: platform.os,
            os_version: platform.os_version,
            host_name: get_hostname(),
            device_name: platform.device_name,
            device_model: platform.device_model,
            app_version: app.version.clone(),
            app_build: app.build,
            timestamp: epoch_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "sessionID")]
    pub id: String,
    #[serde(flatten)]
    pub metadata: SessionMetadata,
}

impl Session {
    /// Starts a new session with a fresh identifier.
    pub fn start(app: &AppInfo) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metadata: SessionMetadata::collect(app),
        }
    }
}

struct Platform {
    os: String,
    os_version: String,
    device_name: String,
    device_model: String,
}

impl Platform {
    #[cfg(unix)]
    fn detect() -> Self {
        match nix::sys::utsname::uname() {
            Ok(uts) => Self {
                os: uts.sysname().to_string_lossy().into_owned(),
                os_version: uts.release().to_string_lossy().into_owned(),
                device_name: uts.nodename().to_string_lossy().into_owned(),
                device_model: uts.machine().to_string_lossy().into_owned(),
            },
            Err(e) => {
                warn!("Failed to read platform information: {e}");
                Self::from_target()
            }
        }
    }

    #[cfg(not(unix))]
    fn detect() -> Self {
        Self::from_target()
    }

    fn from_target() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            os_version: String::new(),
            device_name: String::new(),
            device_model: env::consts::ARCH.to_string(),
        }
    }
}

/// Resolves the host name.
///
/// Order: `LOG_SHIPPER_HOSTNAME`, `HOSTNAME`, the system host name, then `"unknown"`.
/// Empty values are treated as unset.
#[must_use]
pub fn get_hostname() -> String {
    for var in ["LOG_SHIPPER_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    #[cfg(unix)]
    match nix::unistd::gethostname() {
        Ok(hostname) => {
            if let Some(hostname) = hostname.to_str() {
                if !hostname.is_empty() {
                    return hostname.to_string();
                }
            }
        }
        Err(e) => warn!("Failed to get system hostname: {e}"),
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}
