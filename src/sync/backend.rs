//! Backend authority client
//!
//! The async boundary to the remote store, and its JSON-over-HTTP
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::models::{ClearRequest, RemoveRequest, SetRequest, SyncRequest, SyncResponse};

/// A single-item mutation pushed outside the periodic sync pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Set(SetRequest),
    Remove(RemoveRequest),
    Clear(ClearRequest),
}

impl Push {
    /// Key the push concerns, None for a clear.
    pub fn key(&self) -> Option<&str> {
        match self {
            Push::Set(req) => Some(&req.key),
            Push::Remove(req) => Some(&req.key),
            Push::Clear(_) => None,
        }
    }
}

/// The authoritative remote store.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// One reconciliation round trip.
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse>;

    /// Best-effort single-item propagation.
    async fn push(&self, push: Push) -> Result<()>;
}

// == HTTP Backend ==
/// Talks to an authority over `POST /sync`, `/set`, `/remove` and `/clear`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Builds a client whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CacheError::NetworkFailure(format!("http client: {}", err)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "backend request");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(status_error(status, message))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        Ok(self.post(path, body).await?.json::<R>().await?)
    }
}

fn status_error(status: StatusCode, message: String) -> CacheError {
    if status.is_server_error() {
        CacheError::ServerFailure {
            status: status.as_u16(),
            message,
        }
    } else {
        CacheError::InvalidRequest(format!("{}: {}", status, message))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn sync(&self, request: SyncRequest) -> Result<SyncResponse> {
        self.post_json("/sync", &request).await
    }

    async fn push(&self, push: Push) -> Result<()> {
        match &push {
            Push::Set(req) => self.post("/set", req).await?,
            Push::Remove(req) => self.post("/remove", req).await?,
            Push::Clear(req) => self.post("/clear", req).await?,
        };
        Ok(())
    }
}
