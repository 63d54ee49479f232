//! Flight plan registration.

use serde::Serialize;

use airmap_core::{trajectory, MissionItem};

use crate::config::Endpoints;
use crate::context::{Notification, Origin, SharedContext};
use crate::error::{NetworkError, NetworkErrorKind};
use crate::networking::{JsonDocument, Networking, Reply};
use crate::transport::{HttpResponse, TransportError};

#[derive(Debug, Serialize)]
struct LineString {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
struct FlightPathRequest {
    latitude: f64,
    longitude: f64,
    geometry: LineString,
    public: bool,
    notify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Idle,
    FlightUpload,
}

pub struct FlightManager {
    net: Networking,
    endpoints: Endpoints,
    state: FlightState,
    flight_id: String,
}

impl FlightManager {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            net: Networking::new(Origin::Flight),
            endpoints,
            state: FlightState::Idle,
            flight_id: String::new(),
        }
    }

    pub fn state(&self) -> FlightState {
        self.state
    }

    /// Empty until a registration succeeds.
    pub fn flight_id(&self) -> &str {
        &self.flight_id
    }

    /// Register the mission's trajectory. Silently skipped without
    /// credentials, while an upload is outstanding, or when the mission has
    /// no waypoint, takeoff or landing items.
    pub fn create_flight(&mut self, ctx: &mut SharedContext, items: &[MissionItem]) {
        if !ctx.login.has_credentials() {
            tracing::debug!("No AirMap credentials, flight not registered");
            return;
        }
        if self.state != FlightState::Idle {
            tracing::debug!("Flight upload already in progress");
            return;
        }

        let points = trajectory(items);
        let Some(first) = points.first() else {
            tracing::debug!("Mission has no trajectory points, flight not registered");
            return;
        };

        let request = FlightPathRequest {
            latitude: first.lat,
            longitude: first.lon,
            geometry: LineString {
                kind: "LineString",
                coordinates: points.iter().map(|point| [point.lon, point.lat]).collect(),
            },
            public: true,
            notify: true,
        };
        let body = match serde_json::to_vec(&request) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!("Failed to encode flight plan: {}", err);
                return;
            }
        };

        tracing::info!("Registering flight with {} trajectory points", points.len());
        self.state = FlightState::FlightUpload;
        let url = self.endpoints.flight_path();
        self.net.post(ctx, url, body, true, true);
    }

    pub fn on_login_result(&mut self, ctx: &mut SharedContext, result: &Result<(), NetworkError>) {
        if let Some(err) = self.net.on_login_result(ctx, result) {
            self.on_error(ctx, err);
        }
    }

    pub fn on_response(
        &mut self,
        ctx: &mut SharedContext,
        result: Result<HttpResponse, TransportError>,
    ) {
        match self.net.on_response(ctx, result) {
            Some(Reply::Finished(document)) => self.on_document(ctx, document),
            Some(Reply::Error(err)) => self.on_error(ctx, err),
            None => {}
        }
    }

    fn on_document(&mut self, ctx: &mut SharedContext, document: JsonDocument) {
        if self.state != FlightState::FlightUpload {
            tracing::debug!("Flight response in idle state ignored");
            return;
        }

        match document.str_at("/data/id").filter(|id| !id.is_empty()) {
            Some(id) => {
                self.state = FlightState::Idle;
                self.flight_id = id.to_string();
                tracing::info!("Flight registered: {}", self.flight_id);
                ctx.notify(Notification::FlightIdChanged(self.flight_id.clone()));
            }
            None => self.on_error(
                ctx,
                NetworkError::new(
                    NetworkErrorKind::MalformedResponse,
                    "Flight registration response carried no flight id",
                    "",
                ),
            ),
        }
    }

    fn on_error(&mut self, ctx: &mut SharedContext, err: NetworkError) {
        tracing::warn!("Flight registration failed: {}", err);
        self.state = FlightState::Idle;
        ctx.notify(Notification::NetworkError(err));
    }
}
