//! AirMap login (OAuth resource-owner password grant).

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

use crate::error::{NetworkError, NetworkErrorKind};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, TransportError};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct PasswordGrantRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    connection: &'a str,
    username: &'a str,
    password: &'a str,
    scope: &'a str,
    device: &'a str,
}

pub struct Login {
    sso_url: Url,
    device_name: String,
    api_key: String,
    credentials: Credentials,
    token: Option<String>,
    in_progress: bool,
}

impl Login {
    pub fn new(sso_url: Url, device_name: impl Into<String>) -> Self {
        Self {
            sso_url,
            device_name: device_name.into(),
            api_key: String::new(),
            credentials: Credentials::default(),
            token: None,
            in_progress: false,
        }
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = api_key.into().trim().to_string();
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Replace credentials; any held token is dropped.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.logout();
        self.credentials = credentials;
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_complete()
    }

    pub fn logout(&mut self) {
        self.token = None;
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_login_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Build the password-grant request, or `None` if already logged in or a
    /// login is in flight.
    pub fn login(&mut self) -> Option<HttpRequest> {
        if self.is_logged_in() || self.in_progress {
            return None;
        }

        let form = PasswordGrantRequest {
            grant_type: "password",
            client_id: &self.credentials.client_id,
            connection: "Username-Password-Authentication",
            username: &self.credentials.username,
            password: &self.credentials.password,
            scope: "openid offline_access",
            device: &self.device_name,
        };
        let body = match serde_urlencoded::to_string(&form) {
            Ok(body) => body.into_bytes(),
            Err(err) => {
                tracing::warn!("Failed to encode login form: {}", err);
                return None;
            }
        };

        self.in_progress = true;
        Some(HttpRequest {
            method: HttpMethod::Post,
            url: self.sso_url.clone(),
            headers: vec![
                ("Content-Type", FORM_CONTENT_TYPE.to_string()),
                (API_KEY_HEADER, self.api_key.clone()),
            ],
            body,
        })
    }

    /// Consume the login response. Exactly one result per issued login.
    pub fn on_response(
        &mut self,
        result: Result<HttpResponse, TransportError>,
    ) -> Result<(), NetworkError> {
        self.in_progress = false;

        let response = result.map_err(|err| NetworkError::new(err.kind, err.message, ""))?;

        let root: Value = serde_json::from_slice(&response.body).map_err(|err| {
            NetworkError::new(
                NetworkErrorKind::Unknown,
                format!("Malformed login response: {}", err),
                "",
            )
        })?;

        if let Some(kind) = NetworkErrorKind::from_status(response.status) {
            let server_message = root
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(NetworkError::new(
                kind,
                format!("Login failed with HTTP {}", response.status),
                server_message,
            ));
        }

        match root.get("id_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => {
                self.token = Some(token.to_string());
                Ok(())
            }
            _ => Err(NetworkError::new(
                NetworkErrorKind::AuthenticationRequired,
                "Login response carried no token",
                "",
            )),
        }
    }
}
