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

//! FlightFinder: a live aircraft radar on top of [`opensky_client`].
//!
//! - **Radar**: markers rebuilt from every snapshot, with a persistent selection
//! - **Favorites**: locally stored aircraft, enriched with metadata and photos
//! - **Preferences**: user settings that drive rendering and auto-refresh
//! - **Session**: [`app::RadarSession`] wires all of the above to a live [`opensky_client::Client`]

pub mod app;
pub mod config;
pub mod country;
pub mod favorites;
pub mod listing;
pub mod metadata;
pub mod photo_cache;
pub mod radar;
