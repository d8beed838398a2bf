use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const STATUS_OK: &str = "OK";
const STATUS_OVER_QUERY_LIMIT: &str = "OVER_QUERY_LIMIT";
const STATUS_NO_RESULTS: &str = "NO_RESULTS";

/// Latitude/longitude pair. Stored on disk as a `[lat, lng]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<(f64, f64)> for Coordinates {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl From<Coordinates> for (f64, f64) {
    fn from(value: Coordinates) -> Self {
        (value.lat, value.lng)
    }
}

pub fn format_coordinate(value: f64) -> String {
    format!("{value:.5}")
}

/// Decoded body of a geocoding call.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResult {
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: Location,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl GeocodeResponse {
    pub fn ok(lat: f64, lng: f64) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            results: vec![GeocodeResult {
                geometry: Geometry {
                    location: Location { lat, lng },
                },
            }],
            error_message: None,
        }
    }

    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            results: Vec::new(),
            error_message: None,
        }
    }

    /// Classify the response for `address`.
    pub fn into_coordinates(self, address: &str) -> AppResult<Coordinates> {
        match self.status.as_str() {
            STATUS_OK => self
                .results
                .first()
                .map(|result| {
                    let location = result.geometry.location;
                    Coordinates::new(location.lat, location.lng)
                })
                .ok_or_else(|| AppError::ResolutionFailed {
                    address: address.to_string(),
                    status: STATUS_NO_RESULTS.to_string(),
                }),
            STATUS_OVER_QUERY_LIMIT => Err(AppError::QuotaExceeded),
            _ => Err(AppError::ResolutionFailed {
                address: address.to_string(),
                status: self.status,
            }),
        }
    }
}

/// Transport to the geocoding provider.
#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> AppResult<GeocodeResponse>;
}

pub struct HttpGeocodeClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpGeocodeClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("pos-geocoder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let api_key = config
            .geocode_api_key
            .clone()
            .ok_or_else(|| AppError::Config("missing geocoding API key".into()))?;
        Self::new(
            config.geocode_endpoint.clone(),
            api_key,
            config.http_timeout(),
        )
    }
}

#[async_trait]
impl GeocodeLookup for HttpGeocodeClient {
    async fn lookup(&self, address: &str) -> AppResult<GeocodeResponse> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("key", self.api_key.expose_secret()), ("address", address)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Minimum spacing between outgoing calls. The first call waits a full interval too.
pub struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        let remaining = match *guard {
            Some(prev) => self.min_interval.saturating_sub(prev.elapsed()),
            None => self.min_interval,
        };
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
        *guard = Some(Instant::now());
    }
}

pub struct GeocodeResolver {
    lookup: Arc<dyn GeocodeLookup>,
    rate_limiter: RateLimiter,
}

impl GeocodeResolver {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let client = HttpGeocodeClient::from_config(config)?;
        Ok(Self::with_lookup(
            Arc::new(client),
            RateLimiter::new(config.min_interval()),
        ))
    }

    pub fn with_lookup(lookup: Arc<dyn GeocodeLookup>, rate_limiter: RateLimiter) -> Self {
        Self {
            lookup,
            rate_limiter,
        }
    }

    /// Resolve one address. `QuotaExceeded` must reach the caller untouched.
    pub async fn resolve(&self, address: &str) -> AppResult<Coordinates> {
        self.rate_limiter.wait().await;
        info!(address, "google geocode");
        let response = self.lookup.lookup(address).await?;
        debug!(
            address,
            status = %response.status,
            error_message = ?response.error_message,
            "geocode response"
        );
        response.into_coordinates(address)
    }
}
