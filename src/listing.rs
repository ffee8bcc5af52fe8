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

//! Flight list filtering and summary counts.

use std::collections::{HashMap, HashSet};

use clap::ValueEnum;
use opensky_client::{EmergencyCode, StateVector};

/// Filter on the `on_ground` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GroundFilter {
    #[default]
    Any,
    Airborne,
    Grounded,
}

impl GroundFilter {
    fn matches(self, on_ground: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Airborne => !on_ground,
            Self::Grounded => on_ground,
        }
    }
}

/// Conjunctive list filter. Empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive substring over callsign, ICAO address and origin country.
    pub search: String,
    pub ground: GroundFilter,
    /// Exact origin country names.
    pub countries: HashSet<String>,
    pub emergencies: HashSet<EmergencyCode>,
}

impl ListFilter {
    /// Only aircraft squawking any emergency code.
    #[must_use]
    pub fn emergencies_only(mut self) -> Self {
        self.emergencies = EmergencyCode::ALL.into_iter().collect();
        self
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || self.ground != GroundFilter::Any
            || !self.countries.is_empty()
            || !self.emergencies.is_empty()
    }

    #[must_use]
    pub fn matches(&self, state: &StateVector) -> bool {
        self.matches_search(state)
            && self.ground.matches(state.on_ground)
            && (self.countries.is_empty() || self.countries.contains(&state.origin_country))
            && (self.emergencies.is_empty()
                || state
                    .emergency()
                    .is_some_and(|code| self.emergencies.contains(&code)))
    }

    fn matches_search(&self, state: &StateVector) -> bool {
        let query = self.search.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        let contains = |field: &str| field.to_lowercase().contains(&query);
        state.callsign.as_deref().is_some_and(contains)
            || contains(&state.icao24)
            || contains(&state.origin_country)
    }

    /// States passing the filter, in snapshot order.
    #[must_use]
    pub fn apply<'a>(&self, states: &'a [StateVector]) -> Vec<&'a StateVector> {
        states.iter().filter(|state| self.matches(state)).collect()
    }
}

/// Aircraft per origin country, most common first (ties by name).
#[must_use]
pub fn country_counts(states: &[StateVector]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for state in states {
        *counts.entry(state.origin_country.as_str()).or_default() += 1;
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(country, count)| (country.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Aircraft squawking any emergency code.
#[must_use]
pub fn emergency_count(states: &[StateVector]) -> usize {
    states.iter().filter(|state| state.emergency().is_some()).count()
}

/// Aircraft squawking a specific emergency code.
#[must_use]
pub fn emergency_count_for(states: &[StateVector], code: EmergencyCode) -> usize {
    states
        .iter()
        .filter(|state| state.emergency() == Some(code))
        .count()
}
