// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transfer of one assembled payload to the remote collector.

use crate::config::ShipperConfig;
use crate::credentials::Credentials;
use crate::errors::DeliveryError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Sends one serialized payload and reports whether the collector accepted it.
    ///
    /// Never fails: every error path resolves to `false`.
    async fn deliver(&self, payload: String) -> bool;
}

#[derive(Serialize)]
struct RequestBody<'a> {
    payload: &'a str,
}

/// Creates the HTTP client used for deliveries, with rustls TLS and the configured timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, DeliveryError> {
    Ok(reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .build()?)
}

#[derive(Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    server_url: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl HttpDelivery {
    pub fn new(
        server_url: impl Into<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            client: build_client(timeout)?,
            server_url: server_url.into(),
            credentials,
            timeout,
        })
    }

    pub fn from_config(config: &ShipperConfig) -> Result<Self, DeliveryError> {
        Self::new(
            config.server_url.clone(),
            config.credentials.clone(),
            config.send_timeout,
        )
    }

    fn create_request(&self, payload: &str) -> Result<RequestBuilder, DeliveryError> {
        let body = serde_json::to_vec(&RequestBody { payload })?;
        let mut request = self
            .client
            .post(&self.server_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .body(body);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(credentials.app_id(), Some(credentials.app_secret()));
        }
        Ok(request)
    }

    /// Performs the POST. Only a `200 OK` counts as accepted.
    pub async fn try_deliver(&self, payload: &str) -> Result<(), DeliveryError> {
        let request = self.create_request(payload)?;
        debug!("Sending {} payload bytes to {}", payload.len(), self.server_url);
        let time = Instant::now();
        let response = request.send().await?;
        let elapsed = time.elapsed();

        let status = response.status();
        if status == StatusCode::OK {
            debug!("Delivered payload in {} ms", elapsed.as_millis());
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        error!("{status}: collector rejected payload: {body:?}");
        Err(DeliveryError::UnexpectedStatus(status))
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn deliver(&self, payload: String) -> bool {
        match self.try_deliver(&payload).await {
            Ok(()) => true,
            Err(e) => {
                error!("Could not send entries to collector: {e}");
                false
            }
        }
    }
}
