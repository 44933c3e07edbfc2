//! Core library for the `weathercache` CLI.
//!
//! This crate defines:
//! - The OpenWeather client and its failure classification
//! - A SQLite cache of fetched weather
//! - The cache-first resolver that reconciles the two
//! - Configuration handling and the shared domain models
//!
//! It is used by `weathercache-cli`, but can also be reused by other binaries or services.

pub mod client;
pub mod config;
pub mod model;
pub mod resolver;
pub mod store;

pub use client::{ClientError, OpenWeatherClient, WeatherClient};
pub use config::Config;
pub use model::{
    CachedEntry, Condition, Coordinates, Resource, Units, WeatherQuery, WeatherRecord,
    round_coordinate,
};
pub use resolver::{Resolution, WeatherResolver, WeatherResource};
pub use store::{SqliteStore, StoreError, WeatherStore};
