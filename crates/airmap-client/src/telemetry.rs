//! Encrypted UDP position telemetry.
//!
//! A session is opened with `start-comm`, which hands back the AES key, and
//! closed with `end-comm`. While streaming, every global-position sample is
//! sealed into one datagram and sent fire-and-forget.

use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;

use airmap_core::{
    encode_payload, seal_datagram, GlobalPosition, GpsRaw, Position, SessionKey, Speed, IV_LEN,
};

use crate::config::Endpoints;
use crate::context::{Notification, Origin, SharedContext};
use crate::error::{NetworkError, NetworkErrorKind};
use crate::networking::{JsonDocument, Networking, Reply};
use crate::transport::{HttpResponse, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryState {
    Idle,
    StartCommunication,
    Streaming,
    EndCommunication,
}

pub struct Telemetry {
    net: Networking,
    endpoints: Endpoints,
    host: String,
    port: u16,
    state: TelemetryState,
    flight_id: String,
    key: Option<SessionKey>,
    sequence: u32,
    /// Bumped per started stream so late lookups can be told apart.
    session: u64,
    socket: Option<UdpSocket>,
    destination: Option<SocketAddr>,
    horizontal_accuracy: f32,
}

impl Telemetry {
    pub fn new(endpoints: Endpoints, host: impl Into<String>, port: u16) -> Self {
        Self {
            net: Networking::new(Origin::Telemetry),
            endpoints,
            host: host.into(),
            port,
            state: TelemetryState::Idle,
            flight_id: String::new(),
            key: None,
            sequence: 1,
            session: 0,
            socket: None,
            destination: None,
            horizontal_accuracy: GpsRaw::UNKNOWN_ACCURACY,
        }
    }

    pub fn state(&self) -> TelemetryState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == TelemetryState::Streaming
    }

    /// Sequence number the next datagram will carry.
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    pub fn start_telemetry_stream(&mut self, ctx: &mut SharedContext, flight_id: &str) {
        if self.state != TelemetryState::Idle {
            tracing::debug!("Telemetry already active ({:?}), start ignored", self.state);
            return;
        }

        tracing::info!("Starting telemetry for flight {}", flight_id);
        self.flight_id = flight_id.to_string();
        self.destination = None;
        self.state = TelemetryState::StartCommunication;
        self.session = self.session.wrapping_add(1);

        let url = self.endpoints.start_comm(flight_id);
        self.net.post(ctx, url, Vec::new(), false, true);
        ctx.resolve(self.host.clone(), self.session);
    }

    pub fn stop_telemetry_stream(&mut self, ctx: &mut SharedContext) {
        match self.state {
            TelemetryState::Idle => return,
            TelemetryState::EndCommunication => {
                tracing::debug!("Telemetry stop already requested");
                return;
            }
            TelemetryState::StartCommunication | TelemetryState::Streaming => {}
        }

        tracing::info!("Stopping telemetry for flight {}", self.flight_id);
        self.state = TelemetryState::EndCommunication;
        let url = self.endpoints.end_comm(&self.flight_id);
        self.net.post(ctx, url, Vec::new(), false, true);
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

    pub fn on_host_lookup(
        &mut self,
        ctx: &mut SharedContext,
        session: u64,
        result: io::Result<Vec<IpAddr>>,
    ) {
        let active = matches!(
            self.state,
            TelemetryState::StartCommunication | TelemetryState::Streaming
        );
        if !active || session != self.session {
            tracing::debug!("Discarding lookup of {} from an earlier stream", self.host);
            return;
        }

        let addrs = match result {
            Ok(addrs) => addrs,
            Err(err) => {
                tracing::warn!("Lookup of {} failed: {}", self.host, err);
                Vec::new()
            }
        };

        // the socket is bound to an IPv4 wildcard address
        let Some(ip) = addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
        else {
            self.on_error(
                ctx,
                NetworkError::new(NetworkErrorKind::HostNotFound, "DNS lookup failed", ""),
            );
            return;
        };

        tracing::debug!("Telemetry endpoint {} resolved to {}", self.host, ip);
        self.destination = Some(SocketAddr::new(ip, self.port));
    }

    /// Track the receiver's accuracy for subsequent position reports.
    pub fn on_gps_raw(&mut self, sample: &GpsRaw) {
        if self.is_streaming() {
            self.horizontal_accuracy = sample.horizontal_accuracy();
        }
    }

    /// Seal and send one position/speed datagram.
    pub fn on_global_position(&mut self, sample: &GlobalPosition) {
        if !self.is_streaming() {
            return;
        }
        let (Some(key), Some(socket), Some(destination)) =
            (&self.key, &self.socket, self.destination)
        else {
            return;
        };

        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let position = Position::from_sample(sample, self.horizontal_accuracy, timestamp);
        let speed = Speed::from_sample(sample, timestamp);

        let mut iv = [0u8; IV_LEN];
        rand::rng().fill(&mut iv);

        let datagram = match encode_payload(&position, &speed)
            .and_then(|payload| seal_datagram(self.sequence, &self.flight_id, key, &iv, payload))
        {
            Ok(datagram) => datagram,
            Err(err) => {
                tracing::warn!("Dropping telemetry sample: {}", err);
                return;
            }
        };
        self.sequence = self.sequence.wrapping_add(1);

        if let Err(err) = socket.send_to(&datagram, destination) {
            tracing::warn!("Telemetry send to {} failed: {}", destination, err);
        }
    }

    fn on_document(&mut self, ctx: &mut SharedContext, document: JsonDocument) {
        match self.state {
            TelemetryState::StartCommunication => self.on_start_comm(ctx, &document),
            TelemetryState::EndCommunication => {
                tracing::info!("Telemetry for flight {} ended", self.flight_id);
                self.release();
            }
            TelemetryState::Idle | TelemetryState::Streaming => {
                tracing::debug!("Telemetry response in {:?} state ignored", self.state);
            }
        }
    }

    fn on_start_comm(&mut self, ctx: &mut SharedContext, document: &JsonDocument) {
        let Some(encoded) = document.str_at("/data/key").filter(|key| !key.is_empty()) else {
            tracing::warn!("start-comm response without a key, not streaming");
            self.release();
            return;
        };

        let key = match STANDARD
            .decode(encoded)
            .map_err(|err| err.to_string())
            .and_then(|bytes| SessionKey::try_from(bytes.as_slice()).map_err(|err| err.to_string()))
        {
            Ok(key) => key,
            Err(reason) => {
                self.on_error(
                    ctx,
                    NetworkError::new(
                        NetworkErrorKind::MalformedResponse,
                        format!("Invalid telemetry key: {}", reason),
                        "",
                    ),
                );
                return;
            }
        };

        let socket = match bind_socket() {
            Ok(socket) => socket,
            Err(err) => {
                self.on_error(
                    ctx,
                    NetworkError::new(
                        NetworkErrorKind::Transport,
                        format!("Failed to open telemetry socket: {}", err),
                        "",
                    ),
                );
                return;
            }
        };

        self.key = Some(key);
        self.sequence = 1;
        self.socket = Some(socket);
        self.state = TelemetryState::Streaming;
        tracing::info!("Telemetry streaming for flight {}", self.flight_id);
    }

    fn on_error(&mut self, ctx: &mut SharedContext, err: NetworkError) {
        tracing::warn!("Telemetry error: {}", err);
        self.release();
        ctx.notify(Notification::NetworkError(err));
    }

    fn release(&mut self) {
        self.state = TelemetryState::Idle;
        self.key = None;
        self.socket = None;
    }
}

fn bind_socket() -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind((std::net::Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}
