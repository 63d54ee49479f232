//! Core data models for the AirMap link.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
    /// Altitude in meters, when the source carries one
    #[serde(default)]
    pub altitude_m: Option<f64>,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            altitude_m: None,
        }
    }

    pub fn with_altitude(lat: f64, lon: f64, altitude_m: f64) -> Self {
        Self {
            lat,
            lon,
            altitude_m: Some(altitude_m),
        }
    }

    /// Parse a GeoJSON position (`[lon, lat]` or `[lon, lat, alt]`).
    pub fn from_geojson(value: &Value) -> Option<Self> {
        let position = value.as_array()?;
        let lon = position.first()?.as_f64()?;
        let lat = position.get(1)?.as_f64()?;
        Some(match position.get(2).and_then(Value::as_f64) {
            Some(alt) => Self::with_altitude(lat, lon, alt),
            None => Self::new(lat, lon),
        })
    }
}

// ========== MISSION MODELS ==========

/// MAVLink navigation commands the link cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionCommand {
    /// MAV_CMD_NAV_WAYPOINT
    Waypoint,
    /// MAV_CMD_NAV_LAND
    Land,
    /// MAV_CMD_NAV_TAKEOFF
    Takeoff,
    Other(u16),
}

impl MissionCommand {
    pub const NAV_WAYPOINT: u16 = 16;
    pub const NAV_LAND: u16 = 21;
    pub const NAV_TAKEOFF: u16 = 22;

    /// Commands whose target position is part of the flown trajectory.
    pub fn is_trajectory_point(self) -> bool {
        matches!(self, Self::Waypoint | Self::Land | Self::Takeoff)
    }
}

impl From<u16> for MissionCommand {
    fn from(value: u16) -> Self {
        match value {
            Self::NAV_WAYPOINT => Self::Waypoint,
            Self::NAV_LAND => Self::Land,
            Self::NAV_TAKEOFF => Self::Takeoff,
            other => Self::Other(other),
        }
    }
}

/// A single mission item as produced by the mission planner.
///
/// `params` holds MAVLink param1..param7; for navigation commands
/// param5/param6/param7 are latitude, longitude and altitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionItem {
    pub command: u16,
    #[serde(default)]
    pub params: [f64; 7],
}

impl MissionItem {
    pub fn new(command: u16, lat: f64, lon: f64, altitude_m: f64) -> Self {
        Self {
            command,
            params: [0.0, 0.0, 0.0, 0.0, lat, lon, altitude_m],
        }
    }

    pub fn command(&self) -> MissionCommand {
        MissionCommand::from(self.command)
    }

    /// Target position encoded in param5..param7.
    pub fn target(&self) -> Coordinate {
        Coordinate::with_altitude(self.params[4], self.params[5], self.params[6])
    }
}

/// Extract the flown trajectory from a mission, in mission order.
pub fn trajectory(items: &[MissionItem]) -> Vec<Coordinate> {
    items
        .iter()
        .filter(|item| item.command().is_trajectory_point())
        .map(MissionItem::target)
        .collect()
}

// ========== VEHICLE SAMPLES ==========

/// Decoded MAVLink GLOBAL_POSITION_INT sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalPosition {
    #[serde(default)]
    pub time_boot_ms: u32,
    /// Latitude, degrees * 1e7
    pub lat: i32,
    /// Longitude, degrees * 1e7
    pub lon: i32,
    /// Altitude above MSL, millimeters
    pub alt: i32,
    /// Altitude above ground, millimeters
    pub relative_alt: i32,
    /// Ground X speed, cm/s
    #[serde(default)]
    pub vx: i16,
    /// Ground Y speed, cm/s
    #[serde(default)]
    pub vy: i16,
    /// Ground Z speed, cm/s
    #[serde(default)]
    pub vz: i16,
    #[serde(default)]
    pub hdg: u16,
}

impl GlobalPosition {
    pub fn latitude_deg(&self) -> f64 {
        self.lat as f64 / 1e7
    }

    pub fn longitude_deg(&self) -> f64 {
        self.lon as f64 / 1e7
    }
}

/// Decoded MAVLink GPS_RAW_INT sample (only the fields used here).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsRaw {
    /// GPS HDOP horizontal dilution of position * 100, `u16::MAX` if unknown
    pub eph: u16,
}

impl GpsRaw {
    /// Sentinel accuracy reported when the receiver does not know its HDOP.
    pub const UNKNOWN_ACCURACY: f32 = 1.0;

    pub fn horizontal_accuracy(&self) -> f32 {
        if self.eph == u16::MAX {
            Self::UNKNOWN_ACCURACY
        } else {
            self.eph as f32 / 100.0
        }
    }
}

// ========== AIRSPACE MODELS ==========

/// Closed polygon restriction. The closing vertex is kept as delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonRestriction {
    pub vertices: Vec<Coordinate>,
}

impl PolygonRestriction {
    /// Build from a GeoJSON linear ring. Returns `None` if any position is malformed.
    pub fn from_geojson_ring(ring: &Value) -> Option<Self> {
        let vertices = ring
            .as_array()?
            .iter()
            .map(Coordinate::from_geojson)
            .collect::<Option<Vec<_>>>()?;
        if vertices.is_empty() {
            return None;
        }
        Some(Self { vertices })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularRestriction {
    pub center: Coordinate,
    pub radius_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AirspaceRestriction {
    Polygon(PolygonRestriction),
    Circle(CircularRestriction),
}

/// The polygon and circle collections published together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestrictionSet {
    pub polygons: Vec<PolygonRestriction>,
    pub circles: Vec<CircularRestriction>,
}

impl RestrictionSet {
    pub fn push(&mut self, restriction: AirspaceRestriction) {
        match restriction {
            AirspaceRestriction::Polygon(polygon) => self.polygons.push(polygon),
            AirspaceRestriction::Circle(circle) => self.circles.push(circle),
        }
    }

    pub fn len(&self) -> usize {
        self.polygons.len() + self.circles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
