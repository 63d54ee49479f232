//! Protobuf telemetry records carried inside the encrypted datagram payload.
//!
//! Field numbers follow the AirMap telemetry schema.

use prost::Message;

use crate::models::GlobalPosition;

/// Position report (payload message type 1).
#[derive(Clone, PartialEq, Message)]
pub struct Position {
    /// UNIX time in milliseconds.
    #[prost(uint64, tag = "1")]
    pub timestamp: u64,

    #[prost(double, tag = "2")]
    pub latitude: f64,

    #[prost(double, tag = "3")]
    pub longitude: f64,

    /// Meters above mean sea level.
    #[prost(float, tag = "4")]
    pub altitude_msl: f32,

    /// Meters above ground level.
    #[prost(float, tag = "5")]
    pub altitude_agl: f32,

    #[prost(float, tag = "6")]
    pub horizontal_accuracy: f32,
}

/// Speed report (payload message type 3).
#[derive(Clone, PartialEq, Message)]
pub struct Speed {
    #[prost(uint64, tag = "1")]
    pub timestamp: u64,

    /// m/s
    #[prost(float, tag = "2")]
    pub velocity_x: f32,

    #[prost(float, tag = "3")]
    pub velocity_y: f32,

    #[prost(float, tag = "4")]
    pub velocity_z: f32,
}

impl Position {
    /// Convert a fixed-point vehicle sample. `horizontal_accuracy` comes from the
    /// most recent GPS raw sample (see [`crate::models::GpsRaw::horizontal_accuracy`]).
    pub fn from_sample(sample: &GlobalPosition, horizontal_accuracy: f32, timestamp: u64) -> Self {
        Self {
            timestamp,
            latitude: sample.latitude_deg(),
            longitude: sample.longitude_deg(),
            altitude_msl: sample.alt as f32 / 1000.0,
            altitude_agl: sample.relative_alt as f32 / 1000.0,
            horizontal_accuracy,
        }
    }
}

impl Speed {
    pub fn from_sample(sample: &GlobalPosition, timestamp: u64) -> Self {
        Self {
            timestamp,
            velocity_x: sample.vx as f32 / 100.0,
            velocity_y: sample.vy as f32 / 100.0,
            velocity_z: sample.vz as f32 / 100.0,
        }
    }
}
