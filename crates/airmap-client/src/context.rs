//! Shared state handed by reference to every component.
//!
//! Components never perform I/O themselves. They queue outbound work here and
//! the manager's event loop executes it, delivering each completion back to
//! the component named by its [`Origin`].

use std::collections::VecDeque;

use airmap_core::RestrictionSet;

use crate::error::NetworkError;
use crate::login::Login;
use crate::transport::HttpRequest;

/// Which component a completion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Login,
    Airspace,
    Flight,
    Telemetry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Http { origin: Origin, request: HttpRequest },
    /// DNS lookup for the telemetry endpoint, tagged with the stream session
    Resolve { host: String, session: u64 },
}

/// Events published to external collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NetworkError(NetworkError),
    FlightIdChanged(String),
    RestrictionsChanged(RestrictionSet),
    /// Rendered, user-facing error text
    UserMessage(String),
}

pub struct SharedContext {
    /// The only writer of the session token.
    pub login: Login,
    outbox: VecDeque<Outbound>,
    notifications: Vec<Notification>,
}

impl SharedContext {
    pub fn new(login: Login) -> Self {
        Self {
            login,
            outbox: VecDeque::new(),
            notifications: Vec::new(),
        }
    }

    pub fn dispatch(&mut self, origin: Origin, request: HttpRequest) {
        tracing::debug!("{:?} -> {:?} {}", origin, request.method, request.url);
        self.outbox.push_back(Outbound::Http { origin, request });
    }

    pub fn resolve(&mut self, host: impl Into<String>, session: u64) {
        self.outbox.push_back(Outbound::Resolve {
            host: host.into(),
            session,
        });
    }

    /// Start a login unless one is already running or a token is held.
    pub fn request_login(&mut self) {
        if let Some(request) = self.login.login() {
            self.dispatch(Origin::Login, request);
        }
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.outbox.drain(..).collect()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}
