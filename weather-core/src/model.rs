use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FetchError;

/// Human-readable place name, either geocoded or typed by the user.
pub type PlaceName = String;

/// Description used when the API returns no weather conditions.
pub const NO_DESCRIPTION: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Unit system requested from the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
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

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
            Units::Standard => "K",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Metric, Units::Imperial, Units::Standard]
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "standard" => Ok(Units::Standard),
            _ => Err(anyhow::anyhow!(
                "Unknown units '{value}'. Supported units: metric, imperial, standard."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub place_name: String,
    pub temperature: f64,
    pub humidity: u8,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// Unix seconds.
    pub timestamp: i64,
    pub temperature: f64,
    pub description: String,
}

impl ForecastEntry {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Forecast intervals in the order the server returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastList(Vec<ForecastEntry>);

impl ForecastList {
    pub fn new(entries: Vec<ForecastEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[ForecastEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ForecastEntry> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ForecastList {
    type Item = &'a ForecastEntry;
    type IntoIter = std::slice::Iter<'a, ForecastEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// What starts a fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    /// Locate the device, reverse geocode, then fetch by place name.
    CurrentLocation,
    /// Free text typed by the user: a place name or "lat, lon".
    Manual(String),
}

/// What the weather calls of a cycle were issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeatherTarget {
    Place { name: PlaceName },
    Coordinates(Coordinates),
}

impl fmt::Display for WeatherTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeatherTarget::Place { name } => f.write_str(name),
            WeatherTarget::Coordinates(c) => c.fmt(f),
        }
    }
}

/// Joined outcome of one fetch cycle. Either half may have failed on its own.
#[derive(Debug)]
pub struct CycleReport {
    pub target: WeatherTarget,
    pub units: Units,
    pub current: Result<CurrentWeather, FetchError>,
    pub forecast: Result<ForecastList, FetchError>,
}

impl CycleReport {
    pub fn current(&self) -> Option<&CurrentWeather> {
        self.current.as_ref().ok()
    }

    pub fn forecast(&self) -> Option<&ForecastList> {
        self.forecast.as_ref().ok()
    }

    /// True when neither half produced data.
    pub fn is_empty(&self) -> bool {
        self.current.is_err() && self.forecast.is_err()
    }
}
