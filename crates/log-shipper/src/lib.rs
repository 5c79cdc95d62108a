// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client-side log shipping.
//!
//! Entries submitted through a [`flush_service::FlushHandle`] are appended to a durable
//! line-delimited JSON file, rotated aside into a staging file once enough of them have
//! accumulated, grouped by session and POSTed to a remote collector. A staging file that
//! could not be delivered stays on disk and is retried by the next flush attempt, including
//! one made by a later process run.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod append_log;
pub mod batch;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod delivery;
pub mod entry;
pub mod errors;
pub mod facade;
pub mod flush_service;
pub mod jsonl;
pub mod session;
pub mod session_registry;
