//! HTTP health probing of a deployed proxy.
//!
//! The probe is optional and advisory: it runs after the in-container
//! configuration check has passed and its result is reported, never used to
//! fail a deployment.

use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{DeploymentTarget, ProbeConfig};
use crate::error::{HalldyllError, Result};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Outcome of probing an endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Probed URL.
    pub url: String,
    /// Whether the last attempt returned a 2xx status.
    pub healthy: bool,
    /// HTTP status code of the last attempt, if any.
    pub status_code: Option<u16>,
    /// Response time of the last attempt in milliseconds.
    pub response_time_ms: Option<u64>,
    /// Number of attempts made.
    pub attempts: u32,
    /// Error of the last attempt, if any.
    pub error: Option<String>,
}

/// Health checker for the proxy's host port.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    /// HTTP client for health checks.
    client: Client,
}

impl HealthChecker {
    /// Creates a new health checker.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| HalldyllError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Returns the probe URL for a target.
    #[must_use]
    pub fn url_for(target: &DeploymentTarget, probe: &ProbeConfig) -> String {
        let path = if probe.path.starts_with('/') {
            probe.path.clone()
        } else {
            format!("/{}", probe.path)
        };
        format!("http://127.0.0.1:{}{path}", target.host_port)
    }

    /// Issues a single GET request.
    pub async fn check_url(&self, url: &str) -> HealthStatus {
        let start = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let response_time = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let healthy = status.is_success();

                if !healthy {
                    debug!("Endpoint {url} returned status {status}");
                }

                HealthStatus {
                    url: url.to_string(),
                    healthy,
                    status_code: Some(status.as_u16()),
                    response_time_ms: Some(response_time),
                    attempts: 1,
                    error: if healthy {
                        None
                    } else {
                        Some(format!("HTTP {status}"))
                    },
                }
            }
            Err(e) => {
                debug!("Health check failed for {url}: {e}");

                HealthStatus {
                    url: url.to_string(),
                    healthy: false,
                    status_code: None,
                    response_time_ms: None,
                    attempts: 1,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Probes a URL until it answers with 2xx or the attempts run out.
    ///
    /// Returns the status of the last attempt.
    pub async fn wait_for_healthy(&self, url: &str, attempts: u32, interval: Duration) -> HealthStatus {
        let attempts = attempts.max(1);
        let mut status = self.check_url(url).await;

        for attempt in 2..=attempts {
            if status.healthy {
                break;
            }
            tokio::time::sleep(interval).await;
            status = self.check_url(url).await;
            status.attempts = attempt;
        }

        if !status.healthy {
            warn!("Probe of {url} still unhealthy after {} attempt(s)", status.attempts);
        }

        status
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.healthy { "healthy" } else { "unhealthy" };
        write!(f, "{}: {state}", self.url)?;

        if let Some(code) = self.status_code {
            write!(f, " (HTTP {code})")?;
        }

        if let Some(error) = &self.error {
            if self.status_code.is_none() {
                write!(f, " - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_healthy_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let checker = HealthChecker::new().expect("client should build");
        let status = checker.check_url(&format!("{}/healthz", server.uri())).await;

        assert!(status.healthy);
        assert_eq!(status.status_code, Some(200));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_check_unhealthy_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let checker = HealthChecker::new().expect("client should build");
        let status = checker
            .wait_for_healthy(&format!("{}/healthz", server.uri()), 2, Duration::from_millis(10))
            .await;

        assert!(!status.healthy);
        assert_eq!(status.status_code, Some(502));
        assert_eq!(status.attempts, 2);
    }

    #[tokio::test]
    async fn test_wait_stops_at_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let checker = HealthChecker::new().expect("client should build");
        let status = checker
            .wait_for_healthy(&format!("{}/", server.uri()), 5, Duration::from_millis(10))
            .await;

        assert!(status.healthy);
        assert_eq!(status.attempts, 1);
    }

    #[test]
    fn test_url_for_target() {
        let target = DeploymentTarget {
            name: String::from("proxy-a"),
            image: String::from("nginx"),
            upstream_host: String::from("10.0.0.5"),
            upstream_port: 9000,
            host_port: 8081,
            config_file: PathBuf::from("/srv/nginx/nginx.conf"),
            templates_dir: PathBuf::from("/srv/nginx/templates"),
        };
        let probe = ProbeConfig {
            path: String::from("healthz"),
            attempts: 1,
            interval_secs: 1,
        };

        assert_eq!(HealthChecker::url_for(&target, &probe), "http://127.0.0.1:8081/healthz");
    }
}
