//! AirMap client: login, airspace restrictions, flight registration and
//! encrypted telemetry, driven by a single [`Manager`] task.

pub mod airspace;
pub mod config;
pub mod context;
pub mod error;
pub mod flight;
pub mod login;
pub mod manager;
pub mod networking;
pub mod telemetry;
pub mod transport;

pub use airspace::{AirspaceRestrictionManager, AirspaceState};
pub use config::{ClientConfig, Endpoints};
pub use context::{Notification, Origin, Outbound, SharedContext};
pub use error::{ConfigError, NetworkError, NetworkErrorKind};
pub use flight::{FlightManager, FlightState};
pub use login::{Credentials, Login};
pub use manager::{Command, ErrorSink, Manager, ManagerHandle, VehicleEvent};
pub use networking::{JsonDocument, Networking, PendingRequest, Reply};
pub use telemetry::{Telemetry, TelemetryState};
pub use transport::{
    HostResolver, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    TokioResolver, TransportError,
};
