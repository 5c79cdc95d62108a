// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups staged entries by session to build the delivered payload.

use crate::entry::{Entry, EntryRecord};
use crate::session::{Session, SessionMetadata};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// All staged entries of one session, preceded by the session's metadata.
///
/// When the registry no longer knows the session (it may have been trimmed before some
/// lagging entries were flushed) only the identifier is emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionGroup {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(flatten)]
    pub metadata: Option<SessionMetadata>,
    pub entries: Vec<EntryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub sessions: Vec<SessionGroup>,
}

impl Payload {
    pub fn entry_count(&self) -> usize {
        self.sessions.iter().map(|g| g.entries.len()).sum()
    }

    /// The JSON document carried as a string inside the request body.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Builds the payload from entries in file order.
///
/// Groups appear in first-seen order and keep their entries in file order, so a given
/// input always yields the same output.
pub fn assemble(entries: Vec<Entry>, sessions: &[Session]) -> Payload {
    let mut groups: Vec<SessionGroup> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for Entry { session_id, record } in entries {
        let slot = *slots.entry(session_id.clone()).or_insert_with(|| {
            let metadata = sessions
                .iter()
                .find(|s| s.id == session_id)
                .map(|s| s.metadata.clone());
            if metadata.is_none() {
                debug!("No session metadata recorded for {session_id}");
            }
            groups.push(SessionGroup {
                session_id: session_id.clone(),
                metadata,
                entries: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].entries.push(record);
    }

    Payload { sessions: groups }
}
