//! JSON-lines vehicle and mission feed.
//!
//! Each line is one tagged message, e.g.
//! `{"type":"armed","armed":true}` or
//! `{"type":"global_position","lat":473977420,"lon":85455940,"alt":488000,"relative_alt":12000}`.

use serde::Deserialize;
use thiserror::Error;

use airmap_client::{Command, VehicleEvent};
use airmap_core::{Coordinate, GlobalPosition, GpsRaw, MissionItem};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedMissionItem {
    /// MAVLink command id
    pub command: u16,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    SetRoi {
        lat: f64,
        lon: f64,
        radius_m: f64,
    },
    CreateFlight {
        items: Vec<FeedMissionItem>,
    },
    VehicleConnected {
        #[serde(default)]
        armed: bool,
    },
    VehicleDisconnected,
    Armed {
        armed: bool,
    },
    GlobalPosition(GlobalPosition),
    GpsRaw(GpsRaw),
}

impl From<FeedMessage> for Command {
    fn from(message: FeedMessage) -> Self {
        match message {
            FeedMessage::SetRoi { lat, lon, radius_m } => Command::SetRoi {
                center: Coordinate::new(lat, lon),
                radius_m,
            },
            FeedMessage::CreateFlight { items } => Command::CreateFlight(
                items
                    .into_iter()
                    .map(|item| MissionItem::new(item.command, item.lat, item.lon, item.alt))
                    .collect(),
            ),
            FeedMessage::VehicleConnected { armed } => {
                Command::Vehicle(VehicleEvent::Connected { armed })
            }
            FeedMessage::VehicleDisconnected => Command::Vehicle(VehicleEvent::Disconnected),
            FeedMessage::Armed { armed } => Command::Vehicle(VehicleEvent::ArmedChanged(armed)),
            FeedMessage::GlobalPosition(sample) => {
                Command::Vehicle(VehicleEvent::GlobalPosition(sample))
            }
            FeedMessage::GpsRaw(sample) => Command::Vehicle(VehicleEvent::GpsRaw(sample)),
        }
    }
}

/// Parse one feed line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<FeedMessage>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}
