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

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{info, warn};
use mimalloc::MiMalloc;
use opensky_client::{
    BoundingBox, Client, ClientConfig, EmergencyCode, FetchError, OpenSkyClient, OpenSkyConfig,
    SnapshotSource,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use flightfinder::app::RadarSession;
use flightfinder::config::{ConfyStore, PreferencesError, PreferencesService, KEYS};
use flightfinder::country;
use flightfinder::favorites::{
    is_valid_icao, AddOutcome, FavoritesService, FavoritesStore, StoreError,
};
use flightfinder::listing::{
    country_counts, emergency_count, emergency_count_for, GroundFilter, ListFilter,
};
use flightfinder::metadata::{EnrichError, MetadataService};
use flightfinder::photo_cache::PhotoCache;
use flightfinder::radar::{RenderPlan, SelectionStatus};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    #[error("favorites store: {0}")]
    Store(#[from] StoreError),

    #[error("OpenSky: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),

    #[error("no favorite with id {0}")]
    NoSuchFavorite(i64),
}

#[derive(Debug, Parser)]
#[command(name = "flightfinder", version, about = "Live aircraft radar for the OpenSky Network")]
struct Cli {
    /// Favorites database file (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the radar and log every marker update
    Watch {
        /// ICAO address to select
        #[arg(long)]
        select: Option<String>,

        /// Bounding box as lamin,lomin,lamax,lomax
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,
    },

    /// Fetch one snapshot and print the matching flights
    List {
        /// Substring of callsign, ICAO address or origin country
        #[arg(long, default_value = "")]
        search: String,

        #[arg(long, value_enum, default_value_t = GroundFilter::Any)]
        ground: GroundFilter,

        /// Origin country, repeatable
        #[arg(long = "country")]
        countries: Vec<String>,

        /// Only aircraft squawking an emergency code
        #[arg(long)]
        emergency: bool,

        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,
    },

    /// Manage favorite aircraft
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Show or change preferences
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum FavoritesAction {
    List,
    Add { icao24: String },
    Remove { id: i64 },
    Clear,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Path,
    Reset,
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Watch { select, bbox } => watch(cli.db, select, bbox).await,
        Command::List {
            search,
            ground,
            countries,
            emergency,
            bbox,
        } => {
            let mut filter = ListFilter {
                search,
                ground,
                countries: countries.into_iter().collect(),
                ..Default::default()
            };
            if emergency {
                filter = filter.emergencies_only();
            }
            list(&filter, bbox).await
        }
        Command::Favorites { action } => manage_favorites(cli.db, action).await,
        Command::Config { action } => manage_config(action),
    }
}

async fn open_favorites(
    db: Option<PathBuf>,
) -> Result<FavoritesService<MetadataService>, CliError> {
    let path = match db {
        Some(path) => path,
        None => FavoritesStore::default_path()?,
    };
    let store = tokio::task::spawn_blocking(move || FavoritesStore::open(&path))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

    let photo_cache = PhotoCache::default_dir().and_then(|dir| match PhotoCache::new(dir) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Photo cache disabled: {}", e);
            None
        }
    });
    let enricher = MetadataService::new(photo_cache)?;

    Ok(FavoritesService::new(store, enricher).await?)
}

async fn session(
    db: Option<PathBuf>,
    bounding_box: Option<BoundingBox>,
) -> Result<RadarSession<MetadataService>, CliError> {
    let preferences = PreferencesService::new(ConfyStore);
    let favorites = open_favorites(db).await?;
    let client = Client::spawn(ClientConfig {
        http: OpenSkyConfig {
            bounding_box,
            ..Default::default()
        },
        refresh: preferences.current().refresh_config(),
    })?;

    Ok(RadarSession::new(preferences, favorites, client))
}

async fn watch(
    db: Option<PathBuf>,
    select: Option<String>,
    bounding_box: Option<BoundingBox>,
) -> Result<(), CliError> {
    let mut session = session(db, bounding_box).await?;
    if let Some(icao24) = &select {
        session.select(icao24);
    }

    // Fill the map right away instead of waiting one interval.
    drop(session.refresh_now());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
            }
            cancel.cancel();
        }
    });

    session.run(cancel, log_plan).await;
    Ok(())
}

fn log_plan(plan: &RenderPlan) {
    info!("Snapshot #{}: {} markers", plan.sequence, plan.markers.len());
    match plan.selection {
        SelectionStatus::None => {}
        SelectionStatus::Visible => {
            if let (Some(focus), Some(marker)) =
                (plan.focus, plan.markers.iter().find(|m| m.popup_open))
            {
                info!(
                    "Selected {} ({}) at {:.4},{:.4} zoom {:.0}, track {:.0}",
                    marker.title,
                    marker.icao24,
                    focus.latitude,
                    focus.longitude,
                    focus.zoom,
                    marker.rotation + 90.0
                );
            }
        }
        SelectionStatus::Stale => info!("Selected aircraft not in this snapshot"),
    }
}

async fn list(filter: &ListFilter, bounding_box: Option<BoundingBox>) -> Result<(), CliError> {
    let client = OpenSkyClient::new(OpenSkyConfig {
        bounding_box,
        ..Default::default()
    })?;
    let response = client.fetch_snapshot().await?;
    let states = response.states;

    for state in filter.apply(&states) {
        println!(
            "{} {:<8} {:<6} {:>7} ft {:>5} kt  {}",
            country::flag_for_country(&state.origin_country),
            state.callsign.as_deref().unwrap_or("-"),
            state.icao24,
            state
                .altitude_feet()
                .map_or_else(|| "-".to_string(), |ft| ft.to_string()),
            state
                .velocity_knots()
                .map_or_else(|| "-".to_string(), |kt| kt.to_string()),
            if state.on_ground { "ground" } else { "" }
        );
    }

    println!();
    println!("{} aircraft in snapshot", states.len());
    for (country, count) in country_counts(&states).iter().take(10) {
        println!("  {} {:<24} {}", country::flag_for_country(country), country, count);
    }
    println!("Emergencies: {}", emergency_count(&states));
    for code in EmergencyCode::ALL {
        let count = emergency_count_for(&states, code);
        if count > 0 {
            println!("  {} {}: {}", code.squawk(), code.description(), count);
        }
    }
    Ok(())
}

async fn manage_favorites(db: Option<PathBuf>, action: FavoritesAction) -> Result<(), CliError> {
    match action {
        FavoritesAction::List => {
            let session = session(db, None).await?;
            if !fetch_once(&session).await {
                warn!("Snapshot unavailable, live status unknown");
            }
            for view in session.favorite_views() {
                let record = &view.record;
                println!(
                    "{:>4}  {:<6} {:<10} {:<4} {}",
                    record.id,
                    record.icao24,
                    record.display_name(),
                    if view.is_live() { "LIVE" } else { "" },
                    record.origin_country.as_deref().unwrap_or("")
                );
            }
        }
        FavoritesAction::Add { icao24 } => {
            if !is_valid_icao(&icao24) {
                return Err(StoreError::InvalidIcao(icao24).into());
            }
            let session = session(db, None).await?;
            // One fetch so the favorite picks up its callsign when in view.
            if !fetch_once(&session).await {
                warn!("Snapshot unavailable, adding {} without live data", icao24);
            }
            match session.add_favorite(&icao24).await? {
                AddOutcome::Added(record) => {
                    println!("Added {} as #{}", record.display_name(), record.id);
                }
                AddOutcome::AlreadyPresent(record) => {
                    println!("{} is already favorite #{}", record.icao24, record.id);
                }
            }
        }
        FavoritesAction::Remove { id } => {
            let favorites = open_favorites(db).await?;
            if !favorites.remove(id).await? {
                return Err(CliError::NoSuchFavorite(id));
            }
            println!("Removed #{id}");
        }
        FavoritesAction::Clear => {
            let favorites = open_favorites(db).await?;
            let removed = favorites.clear().await?;
            println!("Removed {removed} favorites");
        }
    }
    Ok(())
}

/// Fetch one snapshot into the session. Returns `false` if the fetch failed.
async fn fetch_once(session: &RadarSession<MetadataService>) -> bool {
    session
        .refresh_now()
        .await
        .is_ok_and(|report| !report.failed)
}

fn manage_config(action: ConfigAction) -> Result<(), CliError> {
    let preferences = PreferencesService::new(ConfyStore);
    match action {
        ConfigAction::Show => {
            for (key, value) in preferences.current().entries() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Path => println!("{}", ConfyStore::path()?.display()),
        ConfigAction::Reset => {
            preferences.reset()?;
            println!("Preferences reset to defaults");
        }
        ConfigAction::Set { key, value } => {
            if !KEYS.contains(&key.as_str()) {
                return Err(PreferencesError::UnknownKey(key).into());
            }
            let updated = preferences.set(&key, &value)?;
            if let Some((_, stored)) = updated.entries().into_iter().find(|(k, _)| *k == key) {
                println!("{key} = {stored}");
            }
        }
    }
    Ok(())
}
