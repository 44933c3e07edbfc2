use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    Config,
    model::{Condition, Coordinates, Units, WeatherRecord},
};

use super::{ClientError, WeatherClient};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const CURRENT_WEATHER_PATH: &str = "/data/2.5/weather";

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    units: Units,
    http: Client,
}

impl OpenWeatherClient {
    /// Point the client at another host, e.g. a proxy or a mock server.
    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            units: Units::default(),
            http: Client::new(),
        }
    }

    pub fn units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// Build a client from the on-disk configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.api_key()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            api_key: api_key.to_owned(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            units: config.units,
            http,
        })
    }

    async fn fetch_current(
        &self,
        mut query: Vec<(&'static str, String)>,
    ) -> Result<WeatherRecord, ClientError> {
        let url = format!("{}{}", self.base_url, CURRENT_WEATHER_PATH);

        query.push(("units", self.units.as_str().to_string()));
        query.push(("appid", self.api_key.clone()));

        let res = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(ClientError::transport)?;

        let status = res.status();
        let body = res.text().await.map_err(ClientError::transport)?;

        if !status.is_success() {
            return Err(ClientError::NotFound {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: OwCurrentResponse = serde_json::from_str(&body).map_err(|e| {
            ClientError::ProtocolFailure(format!("Failed to parse OpenWeather current JSON: {e}"))
        })?;

        parsed.into_record()
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: i64,
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    id: i64,
    name: String,
    coord: OwCoord,
    main: OwMain,
    weather: Vec<OwWeather>,
}

impl OwCurrentResponse {
    fn into_record(self) -> Result<WeatherRecord, ClientError> {
        let conditions = self
            .weather
            .into_iter()
            .map(|w| Condition {
                code: w.id,
                label: w.main,
                description: w.description,
                icon: w.icon,
            })
            .collect();

        let record = WeatherRecord {
            id: self.id,
            city_name: self.name,
            coordinates: Coordinates {
                lat: self.coord.lat,
                lon: self.coord.lon,
            },
            temperature: self.main.temp,
            conditions,
        };

        if !record.is_displayable() {
            return Err(ClientError::ProtocolFailure(format!(
                "OpenWeather response for '{}' contained no weather conditions",
                record.city_name
            )));
        }

        Ok(record)
    }
}

#[async_trait]
impl WeatherClient for OpenWeatherClient {
    async fn fetch_by_city(&self, name: &str) -> Result<WeatherRecord, ClientError> {
        tracing::debug!(city = name, "fetching current weather from OpenWeather");
        self.fetch_current(vec![("q", name.to_string())]).await
    }

    async fn fetch_by_coordinates(
        &self,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<WeatherRecord, ClientError> {
        tracing::debug!(?lat, ?lon, "fetching current weather from OpenWeather");

        // A missing coordinate is left out; the API rejects the request.
        let mut query = Vec::with_capacity(4);
        if let Some(lat) = lat {
            query.push(("lat", lat.to_string()));
        }
        if let Some(lon) = lon {
            query.push(("lon", lon.to_string()));
        }

        self.fetch_current(query).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
