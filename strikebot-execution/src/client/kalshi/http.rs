//! Kalshi REST HTTP client with RSA signature authentication, bounded retry and per-endpoint
//! latency recording.

use crate::{
    config::ExecutionConfig,
    error::VenueError,
    telemetry::{CallOutcome, Telemetry},
};
use reqwest::{Client, Method};
use serde::{Serialize, de::DeserializeOwned};
use std::time::{Duration, Instant};
use strikebot_data::{KalshiAuthHeaders, KalshiCredentials};
use tracing::{debug, error, warn};

pub const KALSHI_API_BASE: &str = "https://api.elections.kalshi.com/trade-api/v2";
pub const KALSHI_DEMO_API_BASE: &str = "https://demo-api.kalshi.co/trade-api/v2";
const SIGNED_PATH_PREFIX: &str = "/trade-api/v2";

/// Kalshi REST client. Requests are signed when credentials are present; public market data
/// endpoints also work unsigned.
#[derive(Clone)]
pub struct KalshiHttpClient {
    client: Client,
    credentials: Option<KalshiCredentials>,
    base_url: String,
    config: ExecutionConfig,
    telemetry: Telemetry,
}

impl std::fmt::Debug for KalshiHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiHttpClient")
            .field("api_key", &self.credentials.as_ref().map(|c| c.api_key.as_str()))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl KalshiHttpClient {
    pub fn new(
        credentials: Option<KalshiCredentials>,
        config: ExecutionConfig,
        telemetry: Telemetry,
    ) -> Self {
        let base_url = if config.demo {
            KALSHI_DEMO_API_BASE
        } else {
            KALSHI_API_BASE
        };

        Self {
            client: Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default(),
            credentials,
            base_url: base_url.to_string(),
            config,
            telemetry,
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
    ) -> Result<T, VenueError> {
        self.send::<T, ()>(Method::GET, endpoint, path, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        endpoint: &str,
        path: &str,
        body: &B,
    ) -> Result<T, VenueError> {
        self.send(Method::POST, endpoint, path, Some(body)).await
    }

    /// Send with retry on transient failures (timeout, connection, 5xx), backing off
    /// exponentially from `backoff_base_ms`.
    async fn send<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        endpoint: &str,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, VenueError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(method.clone(), endpoint, path, body).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = backoff_delay(self.config.backoff_base_ms, attempt);
                    warn!(%endpoint, attempt, delay_ms = delay.as_millis() as u64, %error, "transient Kalshi failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    error!(%endpoint, attempt, kind = %error.kind(), %error, "Kalshi request failed");
                    return Err(error);
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        endpoint: &str,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, VenueError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");

        if let Some(credentials) = &self.credentials {
            // Signature must include full path (e.g. /trade-api/v2/portfolio/balance)
            let full_path = format!("{SIGNED_PATH_PREFIX}{path}");
            let headers = credentials.sign(method.as_str(), &full_path);
            request = request
                .header(KalshiAuthHeaders::KEY_HEADER, headers.api_key)
                .header(KalshiAuthHeaders::SIGNATURE_HEADER, headers.signature)
                .header(KalshiAuthHeaders::TIMESTAMP_HEADER, headers.timestamp);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                let (outcome, venue_error) = if error.is_timeout() {
                    (
                        CallOutcome::Timeout,
                        VenueError::Timeout {
                            endpoint: endpoint.to_string(),
                        },
                    )
                } else {
                    (
                        CallOutcome::Connection,
                        VenueError::Connection {
                            endpoint: endpoint.to_string(),
                            message: error.to_string(),
                        },
                    )
                };
                self.telemetry.record_call(endpoint, latency_ms, outcome);
                return Err(venue_error);
            }
        };

        let status = response.status().as_u16();
        self.telemetry
            .record_call(endpoint, latency_ms, CallOutcome::Status(status));
        debug!(%endpoint, status, latency_ms, "Kalshi response");

        let text = response.text().await.map_err(|e| VenueError::Connection {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        classify_response(endpoint, status, &text)
    }
}

/// Map an HTTP status and body to a parsed value or the matching [`VenueError`].
pub fn classify_response<T: DeserializeOwned>(
    endpoint: &str,
    status: u16,
    body: &str,
) -> Result<T, VenueError> {
    let endpoint = endpoint.to_string();
    match status {
        200..=299 => serde_json::from_str(body).map_err(|e| VenueError::Parse {
            endpoint,
            message: e.to_string(),
        }),
        401 | 403 => Err(VenueError::Auth { endpoint, status }),
        429 => Err(VenueError::RateLimited { endpoint }),
        500..=599 => Err(VenueError::Server {
            endpoint,
            status,
            body: body.to_string(),
        }),
        _ => Err(VenueError::Api {
            endpoint,
            status,
            body: body.to_string(),
        }),
    }
}

/// `base * 2^(attempt - 1)` plus up to 10% jitter.
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    use rand::Rng;
    let exp = base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
    let jitter = rand::rng().random_range(0..=exp / 10);
    Duration::from_millis(exp + jitter)
}
