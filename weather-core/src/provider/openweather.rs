use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;

use crate::{
    error::FetchError,
    geocode::{GeocodedPlace, Geocoder, place_name_from},
    model::{
        Coordinates, CurrentWeather, ForecastEntry, ForecastList, NO_DESCRIPTION, PlaceName, Units,
    },
};

use super::WeatherClient;

const WEATHER_PATH: &str = "/data/2.5/weather";
const FORECAST_PATH: &str = "/data/2.5/forecast";
const REVERSE_GEOCODE_PATH: &str = "/geo/1.0/reverse";

/// Client for the free OpenWeather endpoints: current weather, 5-day
/// forecast and reverse geocoding.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherClient {
    pub fn with_base_url(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for OpenWeather")?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, ?params, "OpenWeather request");

        let res = self
            .http
            .get(&url)
            .query(params)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            tracing::warn!(%url, %status, "OpenWeather request failed");
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn current(&self, params: &[(&str, String)]) -> Result<CurrentWeather, FetchError> {
        let parsed: OwCurrentResponse = self.get_json(WEATHER_PATH, params).await?;

        Ok(CurrentWeather {
            place_name: parsed.name,
            temperature: parsed.main.temp,
            humidity: parsed.main.humidity,
            description: first_description(&parsed.weather),
        })
    }

    async fn forecast(&self, params: &[(&str, String)]) -> Result<ForecastList, FetchError> {
        let parsed: OwForecastResponse = self.get_json(FORECAST_PATH, params).await?;

        let entries = parsed
            .list
            .into_iter()
            .map(|entry| ForecastEntry {
                timestamp: entry.dt,
                temperature: entry.main.temp,
                description: first_description(&entry.weather),
            })
            .collect();

        Ok(ForecastList::new(entries))
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct OwGeoPlace {
    name: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwErrorBody {
    message: String,
}

fn by_name(place: &str, units: Units) -> Vec<(&'static str, String)> {
    vec![("q", place.to_string()), ("units", units.as_str().to_string())]
}

fn by_coordinates(coordinates: Coordinates, units: Units) -> Vec<(&'static str, String)> {
    vec![
        ("lat", coordinates.latitude.to_string()),
        ("lon", coordinates.longitude.to_string()),
        ("units", units.as_str().to_string()),
    ]
}

#[async_trait]
impl WeatherClient for OpenWeatherClient {
    async fn fetch_by_name(
        &self,
        place: &str,
        units: Units,
    ) -> Result<CurrentWeather, FetchError> {
        self.current(&by_name(place, units)).await
    }

    async fn fetch_by_coordinates(
        &self,
        coordinates: Coordinates,
        units: Units,
    ) -> Result<CurrentWeather, FetchError> {
        self.current(&by_coordinates(coordinates, units)).await
    }

    async fn fetch_forecast_by_name(
        &self,
        place: &str,
        units: Units,
    ) -> Result<ForecastList, FetchError> {
        self.forecast(&by_name(place, units)).await
    }

    async fn fetch_forecast_by_coordinates(
        &self,
        coordinates: Coordinates,
        units: Units,
    ) -> Result<ForecastList, FetchError> {
        self.forecast(&by_coordinates(coordinates, units)).await
    }
}

#[async_trait]
impl Geocoder for OpenWeatherClient {
    async fn reverse_geocode(
        &self,
        coordinates: Coordinates,
    ) -> Result<Option<PlaceName>, FetchError> {
        let params = [
            ("lat", coordinates.latitude.to_string()),
            ("lon", coordinates.longitude.to_string()),
            ("limit", "1".to_string()),
        ];
        let places: Vec<OwGeoPlace> = self.get_json(REVERSE_GEOCODE_PATH, &params).await?;

        let candidates: Vec<GeocodedPlace> = places
            .into_iter()
            .map(|p| GeocodedPlace {
                locality: p.name,
                admin_area: p.state,
            })
            .collect();

        Ok(place_name_from(&candidates))
    }
}

fn first_description(weather: &[OwWeather]) -> String {
    weather
        .first()
        .map(|w| w.description.clone())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string())
}

/// OpenWeather reports errors as `{"cod": "...", "message": "..."}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<OwErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| truncate_body(body))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
