use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use tracing::debug;

pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_CACHE_FILE: &str = "geocode.cache";
// free tier allows 5 requests per second
const DEFAULT_MIN_INTERVAL_MS: u64 = 200;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub geocode_endpoint: String,
    pub geocode_api_key: Option<SecretString>,
    pub min_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub cache_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geocode_endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            geocode_api_key: None,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            geocode_endpoint: env::var("GEOCODE_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEOCODE_ENDPOINT.to_string()),
            geocode_api_key: env::var("GOOGLE_GEOCODING_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::new(v.into())),
            min_interval_ms: parse_u64("GEOCODE_MIN_INTERVAL_MS", DEFAULT_MIN_INTERVAL_MS),
            http_timeout_secs: parse_u64("GEOCODE_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)
                .max(1),
            cache_file: env::var("GEOCODE_CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_FILE)),
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
