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

//! OpenSky `/states/all` decoder.
//!
//! Response format:
//! ```text
//! {"time": <unix>, "states": [[icao24, callsign, origin_country, time_position,
//!   last_contact, longitude, latitude, baro_altitude, on_ground, velocity,
//!   true_track, vertical_rate, sensors, geo_altitude, squawk, spi,
//!   position_source, (category)], ...]}
//! ```

use log::{debug, warn};
use serde_json::Value;

use super::{ParseError, PositionSource, Protocol, StateVector, StatesResponse};

/// Number of positional fields every state vector must carry.
pub const STATE_VECTOR_FIELDS: usize = 17;

/// Parser for `/states/all` response bodies.
#[derive(Debug, Default)]
pub struct StateVectorParser;

impl StateVectorParser {
    /// Create a new state vector parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for StateVectorParser {
    type Message = StatesResponse;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<StatesResponse>, ParseError> {
        if input.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let body: Value = serde_json::from_slice(input)
            .map_err(|e| ParseError::InvalidFormat(format!("invalid JSON: {e}")))?;

        let fields = match body {
            Value::Object(fields) => fields,
            other => {
                return Err(ParseError::InvalidFormat(format!(
                    "expected JSON object, got {}",
                    kind(&other)
                )));
            }
        };

        let time = fields.get("time").and_then(Value::as_i64);
        let states = fields.get("states").map(decode_states).unwrap_or_default();

        Ok(Some(StatesResponse { time, states }))
    }
}

/// Decode the `states` array, skipping every element that fails to decode.
///
/// `null` means "no aircraft" and yields an empty list, as does any other
/// top-level shape that is not an array.
#[must_use]
pub fn decode_states(value: &Value) -> Vec<StateVector> {
    let elements = match value {
        Value::Array(elements) => elements,
        Value::Null => return Vec::new(),
        other => {
            warn!("Expected states array but got {}", kind(other));
            return Vec::new();
        }
    };

    let mut skipped = 0usize;
    let states: Vec<StateVector> = elements
        .iter()
        .filter_map(|element| match decode_state(element) {
            Ok(state) => Some(state),
            Err(e) => {
                skipped += 1;
                debug!("Skipping state vector: {e}");
                None
            }
        })
        .collect();

    if skipped > 0 {
        debug!("Decoded {} state vectors, skipped {}", states.len(), skipped);
    }

    states
}

/// Decode a single positional state vector.
pub fn decode_state(element: &Value) -> Result<StateVector, ParseError> {
    let Value::Array(fields) = element else {
        return Err(ParseError::InvalidFormat(format!(
            "expected array element, got {}",
            kind(element)
        )));
    };

    if fields.len() < STATE_VECTOR_FIELDS {
        return Err(ParseError::InvalidFormat(format!(
            "array too short: {} elements",
            fields.len()
        )));
    }

    let icao24 = string_at(fields, 0).ok_or(ParseError::MissingField("icao24"))?;
    let origin_country = string_at(fields, 2).ok_or(ParseError::MissingField("origin_country"))?;
    let last_contact = int_at(fields, 4).ok_or(ParseError::MissingField("last_contact"))?;

    Ok(StateVector {
        icao24,
        callsign: string_at(fields, 1).map(|c| c.trim().to_string()),
        origin_country,
        time_position: int_at(fields, 3),
        last_contact,
        longitude: float_at(fields, 5),
        latitude: float_at(fields, 6),
        baro_altitude: float_at(fields, 7),
        on_ground: bool_at(fields, 8).unwrap_or(false),
        velocity: float_at(fields, 9),
        true_track: float_at(fields, 10),
        vertical_rate: float_at(fields, 11),
        sensors: sensors_at(fields, 12),
        geo_altitude: float_at(fields, 13),
        squawk: string_at(fields, 14),
        spi: bool_at(fields, 15).unwrap_or(false),
        position_source: int_at(fields, 16).map(PositionSource::from).unwrap_or_default(),
        category: int_at(fields, 17),
    })
}

/// Text content of a primitive. Blank strings and the literal `"null"` count as absent.
fn string_at(fields: &[Value], index: usize) -> Option<String> {
    let content = match fields.get(index)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    if content.trim().is_empty() || content == "null" {
        None
    } else {
        Some(content)
    }
}

fn int_at(fields: &[Value], index: usize) -> Option<i64> {
    match fields.get(index)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_at(fields: &[Value], index: usize) -> Option<f64> {
    match fields.get(index)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_at(fields: &[Value], index: usize) -> Option<bool> {
    match fields.get(index)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn sensors_at(fields: &[Value], index: usize) -> Option<Vec<i64>> {
    match fields.get(index)? {
        Value::Array(ids) => Some(ids.iter().filter_map(Value::as_i64).collect()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn example() -> Value {
        json!([
            "abc123", "AF123 ", "France", null, 1000, 2.35, 48.85, null, false, null,
            null, null, null, null, null, false, 0
        ])
    }

    #[test]
    fn test_decode_example_vector() {
        let state = decode_state(&example()).unwrap();
        assert_eq!(state.icao24, "abc123");
        assert_eq!(state.callsign.as_deref(), Some("AF123"));
        assert_eq!(state.origin_country, "France");
        assert_eq!(state.time_position, None);
        assert_eq!(state.last_contact, 1000);
        assert_eq!(state.longitude, Some(2.35));
        assert_eq!(state.latitude, Some(48.85));
        assert!(!state.on_ground);
        assert_eq!(state.position_source, PositionSource::AdsB);
        assert_eq!(state.category, None);
    }

    #[test]
    fn test_missing_required_fields_are_rejected() {
        let mut no_icao = example();
        no_icao[0] = Value::Null;
        assert!(matches!(decode_state(&no_icao), Err(ParseError::MissingField("icao24"))));

        let mut no_country = example();
        no_country[2] = json!("  ");
        assert!(matches!(
            decode_state(&no_country),
            Err(ParseError::MissingField("origin_country"))
        ));

        let mut no_contact = example();
        no_contact[4] = Value::Null;
        assert!(matches!(
            decode_state(&no_contact),
            Err(ParseError::MissingField("last_contact"))
        ));
    }

    #[test]
    fn test_batch_keeps_exactly_the_well_formed_subset() {
        let mut literal_null_icao = example();
        literal_null_icao[0] = json!("null");
        let mut second = example();
        second[0] = json!("def456");

        let batch = json!([
            example(),
            null,
            "not an array",
            [1, 2, 3],
            literal_null_icao,
            { "icao24": "xyz" },
            second,
        ]);

        let states = decode_states(&batch);
        let ids: Vec<&str> = states.iter().map(|s| s.icao24.as_str()).collect();
        assert_eq!(ids, vec!["abc123", "def456"]);
    }

    #[test]
    fn test_non_array_states_yield_empty() {
        assert!(decode_states(&json!({"states": []})).is_empty());
        assert!(decode_states(&json!("oops")).is_empty());
        assert!(decode_states(&Value::Null).is_empty());
    }

    #[test]
    fn test_variant_typed_fields() {
        let element = json!([
            "4b1816", "   ", "Switzerland", "1700000000", "1700000005", "8.55", 47.45,
            "1127.76", "true", 210.5, 270, -3.2, [1, 2, "x"], 1150.0, "1000", "false", 2, 3
        ]);

        let state = decode_state(&element).unwrap();
        assert_eq!(state.callsign, None);
        assert_eq!(state.time_position, Some(1_700_000_000));
        assert_eq!(state.last_contact, 1_700_000_005);
        assert_eq!(state.longitude, Some(8.55));
        assert_eq!(state.baro_altitude, Some(1127.76));
        assert!(state.on_ground);
        assert_eq!(state.true_track, Some(270.0));
        assert_eq!(state.sensors, Some(vec![1, 2]));
        assert_eq!(state.squawk.as_deref(), Some("1000"));
        assert!(!state.spi);
        assert_eq!(state.position_source, PositionSource::Mlat);
        assert_eq!(state.category, Some(3));
    }

    #[test]
    fn test_malformed_optional_fields_become_none() {
        let mut element = example();
        element[5] = json!("east");
        element[8] = json!("yes");
        element[12] = json!("sensor");

        let state = decode_state(&element).unwrap();
        assert_eq!(state.longitude, None);
        assert!(!state.on_ground);
        assert_eq!(state.sensors, None);
    }

    #[test]
    fn test_parser_reads_time_and_states() {
        let body = json!({ "time": 1_700_000_000, "states": [example()] }).to_string();
        let mut parser = StateVectorParser::new();
        let response = parser.parse(body.as_bytes()).unwrap().unwrap();
        assert_eq!(response.time, Some(1_700_000_000));
        assert_eq!(response.states.len(), 1);
    }

    #[test]
    fn test_parser_null_states() {
        let mut parser = StateVectorParser::new();
        let response = parser.parse(br#"{"time": 5, "states": null}"#).unwrap().unwrap();
        assert!(response.states.is_empty());
    }

    #[test]
    fn test_parser_empty_input() {
        let mut parser = StateVectorParser::new();
        assert!(parser.parse(b"  \n").unwrap().is_none());
    }

    #[test]
    fn test_parser_rejects_non_object() {
        let mut parser = StateVectorParser::new();
        assert!(parser.parse(b"[1, 2]").is_err());
        assert!(parser.parse(b"<html>").is_err());
    }
}
