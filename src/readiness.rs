//! Startup gate on the search index.
//!
//! The gateway is not ready to route until the search index answers its
//! cluster-health endpoint. [`ReadinessGate::await_ready`] probes in a loop
//! until that happens: failures are logged and retried straight away, with
//! no backoff and no attempt cap, and are never returned to the caller.
//! That policy suits a one-shot startup gate only. Steady-state polling would
//! need backoff, jitter and a shutdown signal.
//!
//! ```text
//! NOT_READY ──(probe ok)──► READY
//! ```

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::Error;

/// Published readiness of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    /// Last status the search index reported (`green`, `yellow`, `red`).
    pub status: Option<String>,
}

/// The parts of `GET /_cluster/health` the gate cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterHealthResponse {
    pub status: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
}

/// Why a probe failed. Only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("search index unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("search index answered {0}")]
    Status(StatusCode),
}

/// One cluster-health probe.
#[async_trait]
pub trait ClusterHealth: Send + Sync {
    async fn cluster_health(&self) -> Result<ClusterHealthResponse, HealthError>;
}

/// Probes Elasticsearch over HTTP.
pub struct ElasticsearchHealth {
    url: String,
    http: reqwest::Client,
}

impl ElasticsearchHealth {
    pub fn new(search_url: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: format!("{}/_cluster/health", search_url.trim_end_matches('/')),
            http,
        })
    }
}

#[async_trait]
impl ClusterHealth for ElasticsearchHealth {
    async fn cluster_health(&self) -> Result<ClusterHealthResponse, HealthError> {
        let res = self.http.get(&self.url).send().await?;
        if !res.status().is_success() {
            return Err(HealthError::Status(res.status()));
        }
        Ok(res.json().await?)
    }
}

/// Blocks startup until the search index is reachable.
///
/// Does nothing until [`await_ready`](Self::await_ready) is called.
pub struct ReadinessGate {
    health: Box<dyn ClusterHealth>,
    state: watch::Sender<Readiness>,
}

impl ReadinessGate {
    pub fn new(health: Box<dyn ClusterHealth>) -> Self {
        let (state, _) = watch::channel(Readiness::default());
        Self { health, state }
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    pub fn state(&self) -> Readiness {
        self.state.borrow().clone()
    }

    /// Receiver for health-check handlers and other readers.
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.state.subscribe()
    }

    /// Probes until one probe succeeds, then records `READY`.
    ///
    /// Returns how many attempts it took. Never fails; a dependency that
    /// never comes up keeps this loop running.
    pub async fn await_ready(&self) -> u64 {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.health.cluster_health().await {
                Ok(health) => {
                    info!(
                        attempt,
                        cluster = health.cluster_name.as_deref().unwrap_or("-"),
                        "gateway health status - {}",
                        health.status
                    );
                    self.state.send_replace(Readiness { ready: true, status: Some(health.status) });
                    return attempt;
                }
                Err(e) => {
                    error!(attempt, error = %e, "connection to search index failed, retrying");
                    // Immediate retry; yield so other startup tasks still run.
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
