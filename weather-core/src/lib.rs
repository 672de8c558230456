//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Location providers and reverse geocoding
//! - The OpenWeather client for current weather and 5-day forecasts
//! - The fetch orchestrator joining all of the above into one fetch cycle
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod geocode;
pub mod input;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod provider;

pub use config::{Config, LocationConfig, LocationSource};
pub use error::{CycleError, FetchError, LocationError};
pub use geocode::Geocoder;
pub use location::LocationProvider;
pub use model::{
    Coordinates, CurrentWeather, CycleReport, FetchRequest, ForecastEntry, ForecastList,
    PlaceName, Units, WeatherTarget,
};
pub use orchestrator::{FetchOrchestrator, FetchState};
pub use provider::{WeatherClient, openweather::OpenWeatherClient};
