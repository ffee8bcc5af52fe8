// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Protocol layer for OpenSky state vector snapshots.
//!
//! The `/states/all` endpoint returns every tracked aircraft as a loosely typed
//! positional array. This module turns that wire format into [`StateVector`]
//! records, skipping anything it cannot make sense of instead of failing the
//! whole batch.

mod states;

pub use states::{decode_state, decode_states, StateVectorParser, STATE_VECTOR_FIELDS};

use serde::Serialize;
use thiserror::Error;

/// Feet per meter.
const FEET_PER_METER: f64 = 3.280_84;
/// Knots per meter/second.
const KNOTS_PER_MPS: f64 = 1.943_84;
/// Feet/minute per meter/second.
const FPM_PER_MPS: f64 = 196.850;

/// Errors that can occur while decoding a snapshot.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Origin of a reported position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PositionSource {
    #[default]
    AdsB,
    Asterix,
    Mlat,
    Flarm,
    Other(i64),
}

impl From<i64> for PositionSource {
    fn from(value: i64) -> Self {
        match value {
            0 => Self::AdsB,
            1 => Self::Asterix,
            2 => Self::Mlat,
            3 => Self::Flarm,
            other => Self::Other(other),
        }
    }
}

/// Transponder emergency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EmergencyCode {
    /// 7500 - unlawful interference.
    Hijack,
    /// 7600 - lost communications.
    RadioFailure,
    /// 7700 - general emergency.
    General,
}

impl EmergencyCode {
    /// All emergency codes, in squawk order.
    pub const ALL: [EmergencyCode; 3] = [Self::Hijack, Self::RadioFailure, Self::General];

    /// Classify a squawk code.
    #[must_use]
    pub fn from_squawk(squawk: &str) -> Option<Self> {
        match squawk.trim() {
            "7500" => Some(Self::Hijack),
            "7600" => Some(Self::RadioFailure),
            "7700" => Some(Self::General),
            _ => None,
        }
    }

    /// The squawk code for this emergency.
    #[must_use]
    pub fn squawk(self) -> &'static str {
        match self {
            Self::Hijack => "7500",
            Self::RadioFailure => "7600",
            Self::General => "7700",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Hijack => "Hijack",
            Self::RadioFailure => "Radio failure",
            Self::General => "Emergency",
        }
    }
}

/// One aircraft's reported position and kinematics at a point in time.
///
/// Units follow the OpenSky API: meters, meters/second, degrees, and Unix
/// seconds. Use the conversion helpers for aviation units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateVector {
    /// ICAO 24-bit transponder address (hex string). Stable join key.
    pub icao24: String,
    /// Callsign, trimmed. `None` when blank.
    pub callsign: Option<String>,
    /// Country inferred from the ICAO address block.
    pub origin_country: String,
    /// Unix time of the last position update.
    pub time_position: Option<i64>,
    /// Unix time of the last message of any kind.
    pub last_contact: i64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Barometric altitude in meters.
    pub baro_altitude: Option<f64>,
    pub on_ground: bool,
    /// Ground speed in meters/second.
    pub velocity: Option<f64>,
    /// Track angle in degrees clockwise from north.
    pub true_track: Option<f64>,
    /// Vertical rate in meters/second.
    pub vertical_rate: Option<f64>,
    /// Receiver ids that contributed to this vector.
    pub sensors: Option<Vec<i64>>,
    /// Geometric altitude in meters.
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    /// Special purpose indicator.
    pub spi: bool,
    pub position_source: PositionSource,
    /// Aircraft category, only sent for extended queries.
    pub category: Option<i64>,
}

impl StateVector {
    /// Both coordinates are present.
    #[must_use]
    pub fn has_valid_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// `(latitude, longitude)` when both are present.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "altitudes fit in i32")]
    pub fn altitude_feet(&self) -> Option<i32> {
        self.baro_altitude.map(|m| (m * FEET_PER_METER) as i32)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "speeds fit in i32")]
    pub fn velocity_knots(&self) -> Option<i32> {
        self.velocity.map(|v| (v * KNOTS_PER_MPS) as i32)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "vertical rates fit in i32")]
    pub fn vertical_rate_fpm(&self) -> Option<i32> {
        self.vertical_rate.map(|v| (v * FPM_PER_MPS) as i32)
    }

    /// Emergency declared through the squawk code, if any.
    #[must_use]
    pub fn emergency(&self) -> Option<EmergencyCode> {
        self.squawk.as_deref().and_then(EmergencyCode::from_squawk)
    }
}

/// A decoded `/states/all` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatesResponse {
    /// Server time the snapshot refers to.
    pub time: Option<i64>,
    pub states: Vec<StateVector>,
}

/// Trait for snapshot parsers.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector() -> StateVector {
        StateVector {
            icao24: "abc123".to_string(),
            callsign: Some("AF123".to_string()),
            origin_country: "France".to_string(),
            time_position: None,
            last_contact: 1000,
            longitude: Some(2.35),
            latitude: Some(48.85),
            baro_altitude: Some(10_000.0),
            on_ground: false,
            velocity: Some(250.0),
            true_track: Some(90.0),
            vertical_rate: Some(-5.0),
            sensors: None,
            geo_altitude: None,
            squawk: Some("7700".to_string()),
            spi: false,
            position_source: PositionSource::AdsB,
            category: None,
        }
    }

    #[test]
    fn test_unit_conversions() {
        let state = vector();
        assert_eq!(state.altitude_feet(), Some(32_808));
        assert_eq!(state.velocity_knots(), Some(485));
        assert_eq!(state.vertical_rate_fpm(), Some(-984));
    }

    #[test]
    fn test_position_requires_both_coordinates() {
        let mut state = vector();
        assert_eq!(state.position(), Some((48.85, 2.35)));
        state.longitude = None;
        assert!(!state.has_valid_position());
        assert_eq!(state.position(), None);
    }

    #[test]
    fn test_emergency_from_squawk() {
        assert_eq!(vector().emergency(), Some(EmergencyCode::General));
        assert_eq!(EmergencyCode::from_squawk("7500"), Some(EmergencyCode::Hijack));
        assert_eq!(EmergencyCode::from_squawk("7600"), Some(EmergencyCode::RadioFailure));
        assert_eq!(EmergencyCode::from_squawk("1200"), None);
    }

    #[test]
    fn test_position_source_codes() {
        assert_eq!(PositionSource::from(0), PositionSource::AdsB);
        assert_eq!(PositionSource::from(2), PositionSource::Mlat);
        assert_eq!(PositionSource::from(9), PositionSource::Other(9));
    }
}
