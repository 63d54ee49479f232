//! Authenticated GET/POST wrapper shared by the AirMap components.
//!
//! A request that needs a token while none is held is parked as the single
//! [`PendingRequest`] and a login is started. The parked request is replayed
//! once when the login succeeds and dropped (with an error) when it fails.

use reqwest::Url;
use serde_json::Value;

use crate::context::{Origin, SharedContext};
use crate::error::{NetworkError, NetworkErrorKind};
use crate::login::{API_KEY_HEADER, FORM_CONTENT_TYPE};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, TransportError};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub body: Vec<u8>,
    pub json_body: bool,
    pub requires_auth: bool,
}

/// A parsed response body. A parse failure is reported alongside a `Null`
/// value so the caller decides how to treat it.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDocument {
    pub value: Value,
    pub parse_error: Option<String>,
}

impl JsonDocument {
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(value) => Self {
                value,
                parse_error: None,
            },
            Err(err) => Self {
                value: Value::Null,
                parse_error: Some(err.to_string()),
            },
        }
    }

    /// String at a JSON pointer, if present.
    pub fn str_at(&self, pointer: &str) -> Option<&str> {
        self.value.pointer(pointer).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Finished(JsonDocument),
    Error(NetworkError),
}

pub struct Networking {
    origin: Origin,
    pending: Option<PendingRequest>,
}

impl Networking {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn get(&mut self, ctx: &mut SharedContext, url: Url, requires_auth: bool) {
        self.send(
            ctx,
            PendingRequest {
                method: HttpMethod::Get,
                url,
                body: Vec::new(),
                json_body: false,
                requires_auth,
            },
        );
    }

    pub fn post(
        &mut self,
        ctx: &mut SharedContext,
        url: Url,
        body: Vec<u8>,
        json_body: bool,
        requires_auth: bool,
    ) {
        self.send(
            ctx,
            PendingRequest {
                method: HttpMethod::Post,
                url,
                body,
                json_body,
                requires_auth,
            },
        );
    }

    fn send(&mut self, ctx: &mut SharedContext, request: PendingRequest) {
        let mut headers = Vec::with_capacity(3);
        if request.method == HttpMethod::Post {
            let content_type = if request.json_body {
                JSON_CONTENT_TYPE
            } else {
                FORM_CONTENT_TYPE
            };
            headers.push(("Content-Type", content_type.to_string()));
        }
        headers.push((API_KEY_HEADER, ctx.login.api_key().to_string()));

        if request.requires_auth {
            match ctx.login.token() {
                Some(token) => headers.push(("Authorization", format!("Bearer {}", token))),
                None => {
                    if let Some(previous) = self.pending.replace(request) {
                        tracing::warn!(
                            "{:?}: replacing queued request to {}",
                            self.origin,
                            previous.url
                        );
                    }
                    ctx.request_login();
                    return;
                }
            }
        }

        ctx.dispatch(
            self.origin,
            HttpRequest {
                method: request.method,
                url: request.url,
                headers,
                body: request.body,
            },
        );
    }

    /// Login finished. Returns the error to surface if a parked request was
    /// dropped; does nothing when no request is parked.
    pub fn on_login_result(
        &mut self,
        ctx: &mut SharedContext,
        result: &Result<(), NetworkError>,
    ) -> Option<NetworkError> {
        let pending = self.pending.take()?;
        match result {
            Ok(()) => {
                self.send(ctx, pending);
                None
            }
            Err(err) => Some(err.clone()),
        }
    }

    /// Classify a completed exchange. Redirects are re-issued here and yield
    /// `None`.
    pub fn on_response(
        &mut self,
        ctx: &mut SharedContext,
        result: Result<HttpResponse, TransportError>,
    ) -> Option<Reply> {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                return Some(Reply::Error(NetworkError::new(err.kind, err.message, "")));
            }
        };

        if let Some(kind) = NetworkErrorKind::from_status(response.status) {
            let error_string = format!(
                "Error transferring {} - server replied: HTTP {}",
                response.url, response.status
            );
            return Some(Reply::Error(NetworkError::new(
                kind,
                error_string,
                server_message(&response.body),
            )));
        }

        if (300..400).contains(&response.status) {
            if let Some(location) = response.location.as_deref() {
                return match response.url.join(location) {
                    Ok(target) => {
                        tracing::debug!("{:?}: following redirect to {}", self.origin, target);
                        self.get(ctx, target, false);
                        None
                    }
                    Err(err) => Some(Reply::Error(NetworkError::new(
                        NetworkErrorKind::Transport,
                        format!("Invalid redirect target '{}': {}", location, err),
                        "",
                    ))),
                };
            }
        }

        let document = JsonDocument::parse(&response.body);
        if let Some(err) = &document.parse_error {
            tracing::warn!("{:?}: JSON parse error: {}", self.origin, err);
        }
        Some(Reply::Finished(document))
    }
}

/// Best-effort server message from the known error shapes.
fn server_message(body: &[u8]) -> String {
    let root: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let Some(object) = root.as_object() else {
        return String::new();
    };

    let message = if let Some(data) = object.get("data") {
        // e.g. a conflict message
        data.get("message")
    } else if let Some(description) = object.get("error_description") {
        // e.g. login failure
        Some(description)
    } else {
        // e.g. API key failure
        object.get("message")
    };
    message
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
