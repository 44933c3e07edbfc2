use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select};
use weathercache_core::{
    Config, OpenWeatherClient, Resolution, Resource, SqliteStore, Units, WeatherResolver,
    WeatherStore, round_coordinate,
};

use crate::{render, state::SearchState};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weathercache", version, about = "Cache-first weather CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the OpenWeather API key and units.
    Configure,

    /// Show weather for a city.
    City {
        /// City name, e.g. "London" or "Paris, FR".
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// Show weather for a coordinate pair (rounded to 4 decimal places).
    #[command(allow_negative_numbers = true)]
    Coords { lat: f64, lon: f64 },

    /// Repeat the last city search.
    Last,

    /// Delete every cached weather entry.
    ClearCache,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::City { name } => {
                let name = name.join(" ");

                let mut state = SearchState::load()?;
                state.remember(&name);
                state.save()?;

                let config = Config::load()?;
                show(resolver(&config)?.resolve_by_city(name), config.units).await
            }
            Command::Coords { lat, lon } => {
                let config = Config::load()?;
                let (lat, lon) = (round_coordinate(lat), round_coordinate(lon));
                let weather = resolver(&config)?;
                let resolution = weather.resolve_by_coordinates(Some(lat), Some(lon));
                show(resolution, config.units).await
            }
            Command::Last => {
                let last = SearchState::load()?.last_search.ok_or_else(|| {
                    anyhow!(
                        "No previous search.\n\
                         Hint: run `weathercache city <name>` first."
                    )
                })?;

                let config = Config::load()?;
                show(resolver(&config)?.resolve_by_city(last), config.units).await
            }
            Command::ClearCache => {
                let config = Config::load()?;
                open_store(&config)?.clear().await.context("Failed to clear weather cache")?;
                println!("Weather cache cleared.");
                Ok(())
            }
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let current = Units::all().iter().position(|u| *u == config.units).unwrap_or(0);
    let units = Select::new("Units:", Units::all().to_vec())
        .with_starting_cursor(current)
        .prompt()
        .context("Failed to read units")?;

    config.set_api_key(api_key);
    if !config.is_configured() {
        bail!("The API key must not be empty.");
    }
    config.units = units;
    config.save()?;

    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.cache_db_path()?;
    SqliteStore::open(&path)
        .with_context(|| format!("Failed to open weather cache: {}", path.display()))
}

fn resolver(config: &Config) -> Result<WeatherResolver> {
    let client = OpenWeatherClient::from_config(config)?;
    let store = open_store(config)?;
    Ok(WeatherResolver::new(Arc::new(client), Arc::new(store)))
}

async fn show(mut resolution: Resolution, units: Units) -> Result<()> {
    while let Some(resource) = resolution.next().await {
        match resource {
            Resource::Loading(_) => tracing::info!("Loading..."),
            Resource::Success(record) => println!("{}", render::summary(&record, units)),
            Resource::Error(message) => bail!("{message}"),
        }
    }

    Ok(())
}
