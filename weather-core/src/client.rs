use crate::model::WeatherRecord;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

pub use openweather::OpenWeatherClient;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a remote fetch failed. Nothing is retried at this layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The API answered with a non-2xx status.
    #[error("location not found (HTTP {status}): {body}")]
    NotFound { status: u16, body: String },

    /// The request never produced a complete response.
    #[error("transport failure: {0}")]
    TransportFailure(#[source] BoxError),

    /// The response body was not the expected shape.
    #[error("protocol failure: {0}")]
    ProtocolFailure(String),
}

impl ClientError {
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ClientError::TransportFailure(Box::new(err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

#[async_trait]
pub trait WeatherClient: Send + Sync + Debug {
    async fn fetch_by_city(&self, name: &str) -> Result<WeatherRecord, ClientError>;

    async fn fetch_by_coordinates(
        &self,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<WeatherRecord, ClientError>;
}
