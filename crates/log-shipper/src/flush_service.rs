// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The flush controller.
//!
//! A single [`FlushService`] task owns the on-disk stores, the points counter and the
//! in-flight delivery. Callers talk to it through a cloneable [`FlushHandle`]; commands are
//! processed one at a time in arrival order, which is what keeps appends, rotation and
//! delivery cleanup from ever interleaving. A delivery runs as its own task so the service
//! keeps accepting entries while the transfer is outstanding; only new flush attempts are
//! suppressed until it completes.

use crate::append_log::AppendLog;
use crate::batch;
use crate::config::{ShipperConfig, StagedRetryPolicy};
use crate::delivery::Delivery;
use crate::entry::{Entry, EntryRecord};
use crate::errors::StorageError;
use crate::session::Session;
use crate::session_registry::SessionRegistry;
use std::fs;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Rotating,
    Sending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlushStatus {
    pub state: FlushState,
    /// Entries appended since the counter was last reset.
    pub points: usize,
    pub session_id: String,
    /// Whether an undelivered staging file is on disk.
    pub staging_pending: bool,
}

#[derive(Debug)]
pub enum FlushCommand {
    Submit(EntryRecord),
    Flush,
    /// Answered once no delivery is outstanding.
    Drain(oneshot::Sender<FlushStatus>),
    Status(oneshot::Sender<FlushStatus>),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct FlushHandle {
    tx: mpsc::UnboundedSender<FlushCommand>,
}

impl FlushHandle {
    /// Queues an entry for persistence. Never waits on disk or network.
    pub fn submit(&self, record: EntryRecord) -> Result<(), mpsc::error::SendError<FlushCommand>> {
        self.tx.send(FlushCommand::Submit(record))
    }

    /// Requests a flush attempt regardless of the points counter.
    pub fn flush(&self) -> Result<(), mpsc::error::SendError<FlushCommand>> {
        self.tx.send(FlushCommand::Flush)
    }

    /// Waits until every command sent so far has been processed and no delivery is in
    /// flight.
    pub async fn drain(&self) -> Result<FlushStatus, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(FlushCommand::Drain(response_tx))
            .map_err(|e| format!("Failed to send drain command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive drain response: {}", e))
    }

    pub async fn status(&self) -> Result<FlushStatus, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(FlushCommand::Status(response_tx))
            .map_err(|e| format!("Failed to send status command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive status response: {}", e))
    }

    /// Stops the service once any outstanding delivery has completed.
    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<FlushCommand>> {
        self.tx.send(FlushCommand::Shutdown)
    }

    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<FlushCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

enum Event {
    Command(Option<FlushCommand>),
    Delivered(bool),
}

pub struct FlushService {
    append_log: AppendLog,
    registry: SessionRegistry,
    session: Session,
    delivery: Arc<dyn Delivery>,
    min_allowed_threshold: usize,
    staged_retry_policy: StagedRetryPolicy,
    rx: mpsc::UnboundedReceiver<FlushCommand>,
    state: FlushState,
    points: usize,
    initial_sending: bool,
    /// Set once an undecodable staging file has been reported; cleared by a delivery.
    stalled_staging_reported: bool,
    in_flight: Option<JoinHandle<bool>>,
    drain_waiters: Vec<oneshot::Sender<FlushStatus>>,
}

impl FlushService {
    /// Opens the stores under the configured directory and records a new session.
    pub fn new(
        config: &ShipperConfig,
        delivery: Arc<dyn Delivery>,
    ) -> Result<(Self, FlushHandle), StorageError> {
        fs::create_dir_all(&config.storage_dir).map_err(|source| StorageError::Write {
            path: config.storage_dir.clone(),
            source,
        })?;

        let append_log = AppendLog::new(&config.storage_dir);
        let registry = SessionRegistry::new(&config.storage_dir);
        let session = Session::start(&config.app);
        registry.record_session(&session)?;
        debug!("Started session {}", session.id);

        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            append_log,
            registry,
            session,
            delivery,
            min_allowed_threshold: config.min_allowed_threshold,
            staged_retry_policy: config.staged_retry_policy,
            rx,
            state: FlushState::Idle,
            points: 0,
            initial_sending: true,
            stalled_staging_reported: false,
            in_flight: None,
            drain_waiters: Vec::new(),
        };

        Ok((service, FlushHandle { tx }))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn run(mut self) {
        debug!("Flush service started");

        loop {
            let event = tokio::select! {
                command = self.rx.recv() => Event::Command(command),
                delivered = wait_for_delivery(&mut self.in_flight) => Event::Delivered(delivered),
            };

            match event {
                Event::Delivered(success) => {
                    self.in_flight = None;
                    self.finish_attempt(success);
                }
                Event::Command(Some(FlushCommand::Submit(record))) => self.submit(record),
                Event::Command(Some(FlushCommand::Flush)) => self.flush_attempt(),
                Event::Command(Some(FlushCommand::Drain(response_tx))) => {
                    if self.in_flight.is_some() {
                        self.drain_waiters.push(response_tx);
                    } else if response_tx.send(self.status()).is_err() {
                        error!("Failed to send drain response - receiver dropped");
                    }
                }
                Event::Command(Some(FlushCommand::Status(response_tx))) => {
                    if response_tx.send(self.status()).is_err() {
                        error!("Failed to send status response - receiver dropped");
                    }
                }
                Event::Command(Some(FlushCommand::Shutdown)) | Event::Command(None) => {
                    debug!("Flush service shutting down");
                    if let Some(handle) = self.in_flight.take() {
                        let success = join_delivery(handle).await;
                        self.finish_attempt(success);
                    }
                    break;
                }
            }
        }

        debug!("Flush service stopped");
    }

    fn status(&self) -> FlushStatus {
        FlushStatus {
            state: self.state,
            points: self.points,
            session_id: self.session.id.clone(),
            staging_pending: self.append_log.staging_exists(),
        }
    }

    fn submit(&mut self, record: EntryRecord) {
        let entry = Entry::new(self.session.id.clone(), record);
        if let Err(e) = self.append_log.append(&entry) {
            error!("Failed to persist log entry: {e}");
            return;
        }
        self.points += 1;

        let initial_sending = std::mem::take(&mut self.initial_sending);
        if self.points >= self.min_allowed_threshold {
            self.flush_attempt();
        } else if initial_sending && self.has_backlog() {
            debug!("Flushing entries left over from a previous run");
            self.flush_attempt();
        }
    }

    /// Entries from an earlier run are waiting: either an undelivered staging file, or
    /// more than the one entry just appended in the live file.
    fn has_backlog(&self) -> bool {
        if self.append_log.staging_exists() {
            return true;
        }
        match self.append_log.read_live() {
            Ok(entries) => entries.len() > 1,
            Err(e) => {
                warn!("Could not inspect live entries: {e}");
                false
            }
        }
    }

    fn flush_attempt(&mut self) {
        if self.state == FlushState::Sending {
            debug!("Delivery already in progress, skipping flush attempt");
            return;
        }

        self.state = FlushState::Rotating;
        if self.append_log.staging_exists() {
            debug!("Retrying undelivered staging file");
            if self.staged_retry_policy == StagedRetryPolicy::ResetPoints {
                self.points = 0;
            }
        } else if let Err(e) = self.append_log.rotate_to_staging() {
            debug!("Nothing to flush: {e}");
            self.state = FlushState::Idle;
            return;
        }

        match self.prepare_payload() {
            Some((payload, entry_count)) => {
                self.state = FlushState::Sending;
                debug!("Flushing {entry_count} staged entries");
                let delivery = Arc::clone(&self.delivery);
                self.in_flight = Some(tokio::spawn(async move { delivery.deliver(payload).await }));
            }
            None => self.state = FlushState::Idle,
        }
    }

    /// Reads the staging file and serializes the grouped payload. `None` aborts the attempt
    /// and leaves the staging file where it is.
    fn prepare_payload(&mut self) -> Option<(String, usize)> {
        let entries = match self.append_log.read_staging() {
            Ok(entries) => entries,
            Err(e) => {
                error!("Could not read staged entries: {e}");
                return None;
            }
        };
        if entries.is_empty() {
            if self.stalled_staging_reported {
                debug!("Staging file holds no entries");
            } else {
                error!(
                    "Staging file {} holds no decodable entries, new entries stay in the live file until it is removed",
                    self.append_log.staging_path().display()
                );
                self.stalled_staging_reported = true;
            }
            return None;
        }

        let sessions = match self.registry.all() {
            Ok(sessions) => sessions,
            Err(e) => {
                error!("Could not read session registry: {e}");
                return None;
            }
        };

        let payload = batch::assemble(entries, &sessions);
        match payload.to_json() {
            Ok(json) => Some((json, payload.entry_count())),
            Err(e) => {
                error!("Could not create JSON for collector payload: {e}");
                None
            }
        }
    }

    fn finish_attempt(&mut self, success: bool) {
        if success {
            if let Err(e) = self.registry.retain_only(&self.session) {
                warn!("Could not trim session registry: {e}");
            }
            if let Err(e) = self.append_log.clear_staging() {
                error!("Could not delete delivered staging file: {e}");
            }
            self.stalled_staging_reported = false;
            debug!("Staged entries delivered");
        } else {
            warn!("Delivery failed, staged entries kept for the next attempt");
        }

        self.points = 0;
        self.state = FlushState::Idle;

        let status = self.status();
        for waiter in self.drain_waiters.drain(..) {
            if waiter.send(status.clone()).is_err() {
                error!("Failed to send drain response - receiver dropped");
            }
        }
    }
}

async fn wait_for_delivery(in_flight: &mut Option<JoinHandle<bool>>) -> bool {
    match in_flight.as_mut() {
        Some(handle) => join_delivery(handle).await,
        None => std::future::pending().await,
    }
}

async fn join_delivery<H>(handle: H) -> bool
where
    H: std::future::Future<Output = Result<bool, tokio::task::JoinError>>,
{
    match handle.await {
        Ok(success) => success,
        Err(e) => {
            error!("Delivery task failed: {e}");
            false
        }
    }
}
