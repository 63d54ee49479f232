//! Bridge configuration from environment.

use std::env;
use std::time::Duration;

use airmap_client::config::{
    DEFAULT_API_URL, DEFAULT_ROI_DEBOUNCE, DEFAULT_SSO_URL, DEFAULT_TELEMETRY_HOST,
    DEFAULT_TELEMETRY_PORT,
};
use airmap_client::{ClientConfig, Credentials};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub api_url: String,
    pub sso_url: String,
    pub telemetry_host: String,
    pub telemetry_port: u16,
    pub roi_debounce_ms: u64,
    pub device_name: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("AIRMAP_API_KEY").unwrap_or_default(),
            client_id: env::var("AIRMAP_CLIENT_ID").unwrap_or_default(),
            username: env::var("AIRMAP_USERNAME").unwrap_or_default(),
            password: env::var("AIRMAP_PASSWORD").unwrap_or_default(),
            api_url: env::var("AIRMAP_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            sso_url: env::var("AIRMAP_SSO_URL").unwrap_or_else(|_| DEFAULT_SSO_URL.to_string()),
            telemetry_host: env::var("AIRMAP_TELEMETRY_HOST")
                .unwrap_or_else(|_| DEFAULT_TELEMETRY_HOST.to_string()),
            telemetry_port: env::var("AIRMAP_TELEMETRY_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TELEMETRY_PORT),
            roi_debounce_ms: env::var("AIRMAP_ROI_DEBOUNCE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ROI_DEBOUNCE.as_millis() as u64),
            device_name: env::var("AIRMAP_DEVICE_NAME")
                .unwrap_or_else(|_| "ground-station".to_string()),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_key: self.api_key.clone(),
            credentials: Credentials::new(&self.client_id, &self.username, &self.password),
            sso_url: self.sso_url.clone(),
            api_url: self.api_url.clone(),
            telemetry_host: self.telemetry_host.clone(),
            telemetry_port: self.telemetry_port,
            roi_debounce: Duration::from_millis(self.roi_debounce_ms),
            device_name: self.device_name.clone(),
        }
    }
}
