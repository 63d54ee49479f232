//! Orchestrator tying the AirMap components to vehicle and mission events.
//!
//! The [`Manager`] owns every component and runs as a single task: commands
//! arrive through a [`ManagerHandle`], outbound HTTP and DNS work is spawned,
//! and completions come back over a channel tagged with their origin.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use airmap_core::{Coordinate, GlobalPosition, GpsRaw, MissionItem};

use crate::airspace::AirspaceRestrictionManager;
use crate::config::{ClientConfig, Endpoints};
use crate::context::{Notification, Origin, Outbound, SharedContext};
use crate::error::ConfigError;
use crate::flight::FlightManager;
use crate::login::{Credentials, Login};
use crate::telemetry::Telemetry;
use crate::transport::{HostResolver, HttpResponse, HttpTransport, TransportError};

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 64;

/// Receives every rendered error message.
pub trait ErrorSink: Send + Sync {
    fn show_message(&self, message: &str);
}

/// Lifecycle and sensor events of the active vehicle.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleEvent {
    /// A vehicle became active. Replaces any previously active vehicle.
    Connected { armed: bool },
    Disconnected,
    ArmedChanged(bool),
    GlobalPosition(GlobalPosition),
    GpsRaw(GpsRaw),
}

#[derive(Debug, Clone)]
pub enum Command {
    SetApiKey(String),
    SetCredentials(Credentials),
    SetRoi { center: Coordinate, radius_m: f64 },
    CreateFlight(Vec<MissionItem>),
    Vehicle(VehicleEvent),
    Shutdown,
}

enum Completion {
    Http {
        origin: Origin,
        result: Result<HttpResponse, TransportError>,
    },
    Lookup {
        session: u64,
        result: io::Result<Vec<IpAddr>>,
    },
}

/// Cloneable front end to a running [`Manager`].
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Notification>,
}

impl ManagerHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .ok()
            .context("AirMap manager has stopped")
    }

    pub async fn set_api_key(&self, api_key: impl Into<String>) -> Result<()> {
        self.send(Command::SetApiKey(api_key.into())).await
    }

    pub async fn set_credentials(&self, credentials: Credentials) -> Result<()> {
        self.send(Command::SetCredentials(credentials)).await
    }

    pub async fn set_roi(&self, center: Coordinate, radius_m: f64) -> Result<()> {
        self.send(Command::SetRoi { center, radius_m }).await
    }

    pub async fn create_flight(&self, items: Vec<MissionItem>) -> Result<()> {
        self.send(Command::CreateFlight(items)).await
    }

    pub async fn vehicle(&self, event: VehicleEvent) -> Result<()> {
        self.send(Command::Vehicle(event)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }
}

pub struct Manager {
    ctx: SharedContext,
    airspace: AirspaceRestrictionManager,
    flight: FlightManager,
    telemetry: Telemetry,
    transport: Arc<dyn HttpTransport>,
    resolver: Arc<dyn HostResolver>,
    error_sink: Arc<dyn ErrorSink>,
    events: broadcast::Sender<Notification>,
    roi: Option<(Coordinate, f64)>,
    roi_debounce: Duration,
    roi_deadline: Option<Instant>,
    vehicle_connected: bool,
}

impl Manager {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        resolver: Arc<dyn HostResolver>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Result<Self, ConfigError> {
        let endpoints = Endpoints::from_config(&config)?;

        let mut login = Login::new(endpoints.sso_url.clone(), config.device_name);
        login.set_api_key(config.api_key);
        login.set_credentials(config.credentials);

        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Ok(Self {
            ctx: SharedContext::new(login),
            airspace: AirspaceRestrictionManager::new(endpoints.clone()),
            flight: FlightManager::new(endpoints.clone()),
            telemetry: Telemetry::new(endpoints, config.telemetry_host, config.telemetry_port),
            transport,
            resolver,
            error_sink,
            events,
            roi: None,
            roi_debounce: config.roi_debounce,
            roi_deadline: None,
            vehicle_connected: false,
        })
    }

    /// Run the manager on its own task.
    pub fn spawn(self) -> (ManagerHandle, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = ManagerHandle {
            commands,
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(command_rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let (completion_tx, mut completions) = mpsc::unbounded_channel();
        tracing::info!("AirMap manager running");

        loop {
            let deadline = self.roi_deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.roi_deadline = None;
                    self.on_roi_timer();
                }
            }
            self.flush(&completion_tx);
        }

        tracing::info!("AirMap manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetApiKey(api_key) => self.ctx.login.set_api_key(api_key),
            Command::SetCredentials(credentials) => self.ctx.login.set_credentials(credentials),
            Command::SetRoi { center, radius_m } => {
                self.roi = Some((center, radius_m));
                self.roi_deadline = Some(Instant::now() + self.roi_debounce);
            }
            Command::CreateFlight(items) => {
                if !self.ctx.login.has_api_key() {
                    tracing::debug!("No AirMap API key, flight not registered");
                    return;
                }
                self.flight.create_flight(&mut self.ctx, &items);
            }
            Command::Vehicle(event) => self.handle_vehicle(event),
            Command::Shutdown => {}
        }
    }

    fn handle_vehicle(&mut self, event: VehicleEvent) {
        match event {
            VehicleEvent::Connected { armed } => {
                if self.vehicle_connected {
                    self.telemetry.stop_telemetry_stream(&mut self.ctx);
                }
                self.vehicle_connected = true;
                self.on_armed_changed(armed);
            }
            VehicleEvent::Disconnected => {
                self.vehicle_connected = false;
                self.telemetry.stop_telemetry_stream(&mut self.ctx);
            }
            VehicleEvent::ArmedChanged(armed) if self.vehicle_connected => {
                self.on_armed_changed(armed);
            }
            VehicleEvent::GlobalPosition(sample) if self.vehicle_connected => {
                self.telemetry.on_global_position(&sample);
            }
            VehicleEvent::GpsRaw(sample) if self.vehicle_connected => {
                self.telemetry.on_gps_raw(&sample);
            }
            _ => {}
        }
    }

    fn on_armed_changed(&mut self, armed: bool) {
        let flight_id = self.flight.flight_id();
        if flight_id.is_empty() {
            return;
        }

        if armed {
            let flight_id = flight_id.to_string();
            self.telemetry.start_telemetry_stream(&mut self.ctx, &flight_id);
        } else {
            self.telemetry.stop_telemetry_stream(&mut self.ctx);
        }
    }

    fn on_roi_timer(&mut self) {
        let Some((center, radius_m)) = self.roi else {
            return;
        };
        if !self.ctx.login.has_api_key() {
            tracing::debug!("No AirMap API key, airspace not polled");
            return;
        }
        self.airspace.update_roi(&mut self.ctx, center, radius_m);
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Http {
                origin: Origin::Login,
                result,
            } => {
                let result = self.ctx.login.on_response(result);
                match &result {
                    Ok(()) => tracing::info!("AirMap login succeeded"),
                    Err(err) => tracing::warn!("AirMap login failed: {}", err),
                }
                self.airspace.on_login_result(&mut self.ctx, &result);
                self.flight.on_login_result(&mut self.ctx, &result);
                self.telemetry.on_login_result(&mut self.ctx, &result);
            }
            Completion::Http {
                origin: Origin::Airspace,
                result,
            } => self.airspace.on_response(&mut self.ctx, result),
            Completion::Http {
                origin: Origin::Flight,
                result,
            } => self.flight.on_response(&mut self.ctx, result),
            Completion::Http {
                origin: Origin::Telemetry,
                result,
            } => self.telemetry.on_response(&mut self.ctx, result),
            Completion::Lookup { session, result } => {
                self.telemetry.on_host_lookup(&mut self.ctx, session, result)
            }
        }
    }

    /// Start queued network work and publish queued notifications.
    fn flush(&mut self, completion_tx: &mpsc::UnboundedSender<Completion>) {
        for outbound in self.ctx.take_outbound() {
            let completions = completion_tx.clone();
            match outbound {
                Outbound::Http { origin, request } => {
                    let exchange = self.transport.execute(request);
                    tokio::spawn(async move {
                        let result = exchange.await;
                        let _ = completions.send(Completion::Http { origin, result });
                    });
                }
                Outbound::Resolve { host, session } => {
                    let lookup = self.resolver.lookup(host);
                    tokio::spawn(async move {
                        let result = lookup.await;
                        let _ = completions.send(Completion::Lookup { session, result });
                    });
                }
            }
        }

        for notification in self.ctx.take_notifications() {
            let user_message = match &notification {
                Notification::NetworkError(err) => {
                    let message = err.user_message();
                    self.error_sink.show_message(&message);
                    Some(message)
                }
                _ => None,
            };

            // no subscribers is fine
            let _ = self.events.send(notification);
            if let Some(message) = user_message {
                let _ = self.events.send(Notification::UserMessage(message));
            }
        }
    }
}
