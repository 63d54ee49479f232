//! Airspace restriction polling.
//!
//! A cycle lists the advisories around the region of interest, fetches each
//! advisory's geometry and then publishes the collected restrictions as a
//! whole. A cycle with any failed item publishes nothing.

use std::collections::HashSet;

use serde_json::Value;

use airmap_core::{AirspaceRestriction, Coordinate, PolygonRestriction, RestrictionSet};

use crate::config::Endpoints;
use crate::context::{Notification, Origin, SharedContext};
use crate::error::{NetworkError, NetworkErrorKind};
use crate::networking::{JsonDocument, Networking, Reply};
use crate::transport::{HttpResponse, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirspaceState {
    Idle,
    RetrieveList,
    RetrieveItems,
}

pub struct AirspaceRestrictionManager {
    net: Networking,
    endpoints: Endpoints,
    state: AirspaceState,
    committed: RestrictionSet,
    in_flight: RestrictionSet,
    awaiting: usize,
    cycle_failed: bool,
}

impl AirspaceRestrictionManager {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            net: Networking::new(Origin::Airspace),
            endpoints,
            state: AirspaceState::Idle,
            committed: RestrictionSet::default(),
            in_flight: RestrictionSet::default(),
            awaiting: 0,
            cycle_failed: false,
        }
    }

    pub fn state(&self) -> AirspaceState {
        self.state
    }

    /// Last successfully completed cycle.
    pub fn restrictions(&self) -> &RestrictionSet {
        &self.committed
    }

    /// Start a poll around `center`. Ignored while a cycle is running.
    pub fn update_roi(&mut self, ctx: &mut SharedContext, center: Coordinate, radius_m: f64) {
        if self.state != AirspaceState::Idle {
            tracing::debug!("Airspace poll already running, ROI update ignored");
            return;
        }

        let mut url = self.endpoints.airspace_status();
        url.query_pairs_mut()
            .append_pair("latitude", &format!("{:.10}", center.lat))
            .append_pair("longitude", &format!("{:.10}", center.lon))
            .append_pair("weather", "true")
            .append_pair("buffer", &format!("{:.0}", radius_m));

        self.state = AirspaceState::RetrieveList;
        self.net.get(ctx, url, false);
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
        if self.state == AirspaceState::Idle {
            tracing::debug!("Airspace response in idle state ignored");
            return;
        }
        if let Some(reason) = &document.parse_error {
            let err = malformed(format!("Airspace response is not JSON: {}", reason));
            self.on_error(ctx, err);
            return;
        }

        match self.state {
            AirspaceState::RetrieveList => self.on_advisory_list(ctx, &document.value),
            AirspaceState::RetrieveItems => match self.collect_items(&document.value) {
                Ok(()) => self.item_done(ctx),
                Err(err) => self.on_error(ctx, err),
            },
            AirspaceState::Idle => {}
        }
    }

    fn on_advisory_list(&mut self, ctx: &mut SharedContext, root: &Value) {
        let Some(advisories) = root.pointer("/data/advisories").and_then(Value::as_array) else {
            self.on_error(ctx, malformed("Airspace status carried no advisory list"));
            return;
        };
        let ids: HashSet<&str> = advisories
            .iter()
            .filter_map(|advisory| advisory.get("id").and_then(Value::as_str))
            .collect();

        self.in_flight = RestrictionSet::default();
        self.cycle_failed = false;
        self.awaiting = ids.len();
        tracing::debug!("Airspace poll found {} advisories", ids.len());

        if ids.is_empty() {
            self.finish_cycle(ctx);
            return;
        }

        self.state = AirspaceState::RetrieveItems;
        for id in ids {
            tracing::debug!("Fetching advisory {}", id);
            let url = self.endpoints.airspace_item(id);
            self.net.get(ctx, url, false);
        }
    }

    fn collect_items(&mut self, root: &Value) -> Result<(), NetworkError> {
        let items: Vec<&Value> = match root.get("data") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => return Err(malformed("Advisory response carried no data")),
        };

        for item in items {
            if let Some(restriction) = parse_restriction(item) {
                self.in_flight.push(restriction);
            }
        }
        Ok(())
    }

    fn item_done(&mut self, ctx: &mut SharedContext) {
        self.awaiting = self.awaiting.saturating_sub(1);
        if self.awaiting == 0 {
            self.finish_cycle(ctx);
        }
    }

    fn finish_cycle(&mut self, ctx: &mut SharedContext) {
        let collected = std::mem::take(&mut self.in_flight);
        self.state = AirspaceState::Idle;

        if self.cycle_failed {
            tracing::warn!("Airspace poll failed, keeping previous restrictions");
            return;
        }

        tracing::debug!("Airspace poll committed {} restrictions", collected.len());
        self.committed = collected;
        ctx.notify(Notification::RestrictionsChanged(self.committed.clone()));
    }

    fn on_error(&mut self, ctx: &mut SharedContext, err: NetworkError) {
        tracing::warn!("Airspace request failed: {}", err);
        ctx.notify(Notification::NetworkError(err));

        match self.state {
            AirspaceState::RetrieveItems => {
                self.cycle_failed = true;
                self.item_done(ctx);
            }
            AirspaceState::RetrieveList | AirspaceState::Idle => {
                self.state = AirspaceState::Idle;
            }
        }
    }
}

fn malformed(message: impl Into<String>) -> NetworkError {
    NetworkError::new(NetworkErrorKind::MalformedResponse, message, "")
}

/// Only polygon geometry is understood; anything else is skipped.
fn parse_restriction(item: &Value) -> Option<AirspaceRestriction> {
    let geometry = item.get("geometry")?;
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => {
            let ring = geometry.pointer("/coordinates/0")?;
            match PolygonRestriction::from_geojson_ring(ring) {
                Some(polygon) => Some(AirspaceRestriction::Polygon(polygon)),
                None => {
                    tracing::warn!("Malformed polygon in advisory {:?}", item.get("id"));
                    None
                }
            }
        }
        other => {
            tracing::debug!("Skipping unsupported airspace geometry {:?}", other);
            None
        }
    }
}
