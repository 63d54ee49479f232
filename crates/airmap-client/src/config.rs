//! Client configuration and service endpoints.

use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;
use crate::login::Credentials;

pub const DEFAULT_SSO_URL: &str = "https://sso.airmap.io/oauth/ro";
pub const DEFAULT_API_URL: &str = "https://api.airmap.com/";
pub const DEFAULT_TELEMETRY_HOST: &str = "api-udp-telemetry.airmap.com";
pub const DEFAULT_TELEMETRY_PORT: u16 = 16060;
pub const DEFAULT_ROI_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub credentials: Credentials,
    pub sso_url: String,
    pub api_url: String,
    pub telemetry_host: String,
    pub telemetry_port: u16,
    /// Quiet period before a region-of-interest change triggers a poll
    pub roi_debounce: Duration,
    /// Sent as the `device` field of the password grant
    pub device_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            credentials: Credentials::default(),
            sso_url: DEFAULT_SSO_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            telemetry_host: DEFAULT_TELEMETRY_HOST.to_string(),
            telemetry_port: DEFAULT_TELEMETRY_PORT,
            roi_debounce: DEFAULT_ROI_DEBOUNCE,
            device_name: "ground-station".to_string(),
        }
    }
}

/// Parsed service URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub sso_url: Url,
    api_url: Url,
}

impl Endpoints {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let sso_url = parse_http_url("sso", &config.sso_url)?;
        let api_url = parse_http_url("api", &config.api_url)?;
        Ok(Self { sso_url, api_url })
    }

    fn api(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Advisory list near a point.
    pub fn airspace_status(&self) -> Url {
        self.api(&["status", "alpha", "point"])
    }

    pub fn airspace_item(&self, advisory_id: &str) -> Url {
        self.api(&["airspace", "v2", advisory_id])
    }

    pub fn flight_path(&self) -> Url {
        self.api(&["flight", "v2", "path"])
    }

    pub fn start_comm(&self, flight_id: &str) -> Url {
        self.api(&["flight", "v2", flight_id, "start-comm"])
    }

    pub fn end_comm(&self, flight_id: &str) -> Url {
        self.api(&["flight", "v2", flight_id, "end-comm"])
    }
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value.trim()).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_from_defaults() {
        let endpoints = Endpoints::from_config(&ClientConfig::default()).unwrap();
        assert_eq!(
            endpoints.airspace_status().as_str(),
            "https://api.airmap.com/status/alpha/point"
        );
        assert_eq!(
            endpoints.airspace_item("abc-123").as_str(),
            "https://api.airmap.com/airspace/v2/abc-123"
        );
        assert_eq!(
            endpoints.start_comm("flight/xyz").as_str(),
            "https://api.airmap.com/flight/v2/flight%2Fxyz/start-comm"
        );
    }

    #[test]
    fn api_prefix_is_preserved() {
        let config = ClientConfig {
            api_url: "http://localhost:8080/mock".to_string(),
            ..Default::default()
        };
        let endpoints = Endpoints::from_config(&config).unwrap();
        assert_eq!(
            endpoints.flight_path().as_str(),
            "http://localhost:8080/mock/flight/v2/path"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        let config = ClientConfig {
            api_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(Endpoints::from_config(&config).is_err());
    }
}
