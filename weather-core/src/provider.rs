use crate::{
    Config,
    error::FetchError,
    model::{Coordinates, CurrentWeather, ForecastList, Units},
    provider::openweather::OpenWeatherClient,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Current weather and forecast lookups. Every call is a single attempt.
#[async_trait]
pub trait WeatherClient: Send + Sync + Debug {
    async fn fetch_by_name(&self, place: &str, units: Units)
    -> Result<CurrentWeather, FetchError>;

    async fn fetch_by_coordinates(
        &self,
        coordinates: Coordinates,
        units: Units,
    ) -> Result<CurrentWeather, FetchError>;

    async fn fetch_forecast_by_name(
        &self,
        place: &str,
        units: Units,
    ) -> Result<ForecastList, FetchError>;

    async fn fetch_forecast_by_coordinates(
        &self,
        coordinates: Coordinates,
        units: Units,
    ) -> Result<ForecastList, FetchError>;
}

/// Construct the OpenWeather client from config.
pub fn client_from_config(config: &Config) -> anyhow::Result<OpenWeatherClient> {
    let api_key = config.api_key()?;
    OpenWeatherClient::with_base_url(api_key, &config.base_url, config.request_timeout())
}
