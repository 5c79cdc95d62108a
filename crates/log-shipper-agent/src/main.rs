// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use log_shipper::{
    config::ShipperConfig,
    delivery::HttpDelivery,
    entry::Level,
    facade::Logger,
    flush_service::{FlushHandle, FlushService},
    ship,
};

const STDIN_TAG: &str = "stdin";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_SHIPPER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ShipperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}. Shutting down log shipper.");
            return;
        }
    };

    let delivery = match HttpDelivery::from_config(&config) {
        Ok(delivery) => Arc::new(delivery),
        Err(e) => {
            error!("Unable to build HTTP client: {e}");
            return;
        }
    };

    let (service, handle) = match FlushService::new(&config, delivery) {
        Ok(started) => started,
        Err(e) => {
            error!("Unable to open log storage in {:?}: {e}", config.storage_dir);
            return;
        }
    };
    info!(
        "Log shipper started, session {} shipping to {}",
        service.session().id,
        config.server_url
    );
    let service_task = tokio::spawn(service.run());

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Received interrupt, stopping");
        }
        signal_token.cancel();
    });

    let logger = Logger::new(handle.clone());
    forward_stdin(&logger, &cancel_token).await;
    logger.clear_sink();

    shutdown(&handle).await;
    if let Err(e) = service_task.await {
        error!("Flush service task failed: {e}");
    }
}

/// Ships every line read from stdin until EOF or cancellation.
async fn forward_stdin(logger: &Logger, cancel_token: &CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => ship!(logger, Level::Info, STDIN_TAG, "{}", line),
                Ok(None) => {
                    debug!("Reached end of stdin");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            },
        }
    }
}

/// Pushes whatever is pending before exit. A failed attempt stays staged for the next run.
async fn shutdown(handle: &FlushHandle) {
    if handle.flush().is_err() {
        warn!("Flush service stopped before final flush");
        return;
    }
    match handle.drain().await {
        Ok(status) if status.staging_pending => {
            warn!("Final delivery failed, entries kept for the next run")
        }
        Ok(_) => debug!("Final flush complete"),
        Err(e) => warn!("Unable to drain flush service: {e}"),
    }
    if handle.shutdown().is_err() {
        debug!("Flush service already stopped");
    }
}
