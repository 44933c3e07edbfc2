use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the caller asked for: a city search or a coordinate pair.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    ByCity(String),
    ByCoordinates { lat: Option<f64>, lon: Option<f64> },
}

impl std::fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ByCity(name) => write!(f, "city '{name}'"),
            Self::ByCoordinates { lat, lon } => write!(f, "coordinates ({lat:?}, {lon:?})"),
        }
    }
}

/// Unit system requested from the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Metric, Units::Imperial, Units::Standard]
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One entry of the condition list, e.g. `Clouds / overcast clouds / 04d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub code: i64,
    /// Main category label ("Rain", "Clouds", ...).
    pub label: String,
    pub description: String,
    pub icon: String,
}

/// Current weather for one location, as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub id: i64,
    pub city_name: String,
    pub coordinates: Coordinates,
    /// Degrees Celsius under metric units.
    pub temperature: f64,
    pub conditions: Vec<Condition>,
}

impl WeatherRecord {
    pub fn primary_condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }

    pub fn is_displayable(&self) -> bool {
        !self.conditions.is_empty()
    }
}

/// A cached row: the record plus the fields the store filters and displays on.
///
/// Derived fields are copied from `record` in [`CachedEntry::new`] and never
/// updated afterwards; a newer fetch produces a new entry that replaces the row.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub record: WeatherRecord,
    /// Raw city text the record was fetched with; `None` for coordinate fetches.
    pub query: Option<String>,
    pub city_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub icon: Option<String>,
    pub temperature: f64,
    pub condition: Option<String>,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(record: WeatherRecord, query: Option<String>) -> Self {
        Self::new_at(record, query, Utc::now())
    }

    pub fn new_at(record: WeatherRecord, query: Option<String>, cached_at: DateTime<Utc>) -> Self {
        let primary = record.primary_condition();
        let icon = primary.map(|c| c.icon.clone());
        let condition = primary.map(|c| c.label.clone());

        Self {
            city_name: record.city_name.clone(),
            latitude: record.coordinates.lat,
            longitude: record.coordinates.lon,
            temperature: record.temperature,
            icon,
            condition,
            query,
            record,
            cached_at,
        }
    }

    /// Logical row key: one row per city text, or per coordinate pair for
    /// entries fetched without a query.
    pub fn cache_key(&self) -> String {
        match &self.query {
            Some(query) => format!("city:{query}"),
            None => format!("coord:{}:{}", self.latitude, self.longitude),
        }
    }
}

/// Message emitted when the remote API has no such location.
pub const NOT_FOUND_MESSAGE: &str = "Not found";
/// Message emitted for transport and malformed-response failures.
pub const LOAD_FAILED_MESSAGE: &str = "Couldn't load data";
/// Message emitted when a fetched record could not be written to the cache.
pub const SAVE_FAILED_MESSAGE: &str = "Couldn't save data";

/// Outcome emitted to the caller of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
    Loading(bool),
    Success(T),
    Error(String),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading(true))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Resource::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Resource::Error(_))
    }

    /// `Success` and `Error` end a resolution.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Resource::Loading(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Resource::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Round a device coordinate to 4 decimal places (ties to even), so repeated
/// lookups from the same spot hit the same cache row.
pub fn round_coordinate(value: f64) -> f64 {
    (value * 10_000.0).round_ties_even() / 10_000.0
}
