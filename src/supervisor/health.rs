//! Health probing
//!
//! A bounded-latency liveness check against each service's health endpoint.
//! The supervisor folds `Unreachable` into the unhealthy state but the two
//! are logged apart, since "refused connection" and "answered 500" point at
//! different failures.

use crate::config::ServiceSpec;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Liveness classification from one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Endpoint answered 2xx
    Healthy,
    /// Endpoint answered, but not 2xx
    Unhealthy,
    /// No answer at all (refused, timed out, DNS)
    Unreachable,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unreachable => "unreachable",
        })
    }
}

/// Probes one service's liveness endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, spec: &ServiceSpec) -> Health;
}

/// HTTP health checker with a bounded per-probe timeout
pub struct HttpHealthChecker {
    client: reqwest::Client,
}

impl HttpHealthChecker {
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .context("Failed to build health check client")?;
        Ok(Self { client })
    }
}

fn classify(status: reqwest::StatusCode) -> Health {
    if status.is_success() {
        Health::Healthy
    } else {
        Health::Unhealthy
    }
}

#[async_trait]
impl HealthProbe for HttpHealthChecker {
    async fn probe(&self, spec: &ServiceSpec) -> Health {
        match self.client.get(spec.health_url()).send().await {
            Ok(response) => classify(response.status()),
            Err(e) => {
                debug!(service = %spec.name, error = %e, "health probe unreachable");
                Health::Unreachable
            }
        }
    }
}
