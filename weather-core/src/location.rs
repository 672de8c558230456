//! Sources of the device position for the automatic fetch flow.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{fmt::Debug, time::Duration};

use crate::{
    config::{Config, LocationSource},
    error::LocationError,
    model::Coordinates,
};

#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    /// Single attempt, no retry.
    async fn locate(&self) -> Result<Coordinates, LocationError>;
}

/// Used when the user has not allowed location lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeniedLocation;

#[async_trait]
impl LocationProvider for DeniedLocation {
    async fn locate(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::PermissionDenied)
    }
}

/// Stands in for a provider the config could not build; the reason is
/// reported only when a cycle actually needs a location.
#[derive(Debug, Clone)]
pub struct UnavailableLocation {
    reason: String,
}

impl UnavailableLocation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LocationProvider for UnavailableLocation {
    async fn locate(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable(self.reason.clone()))
    }
}

/// Last known location, kept in the config file.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    coordinates: Coordinates,
}

impl FixedLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn locate(&self) -> Result<Coordinates, LocationError> {
        Ok(self.coordinates)
    }
}

/// Approximate position of the host's public IP address, via ip-api.com.
#[derive(Debug, Clone)]
pub struct IpLocation {
    base_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpLocation {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for IP location")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl LocationProvider for IpLocation {
    async fn locate(&self) -> Result<Coordinates, LocationError> {
        let url = format!("{}/json/", self.base_url);
        tracing::debug!(%url, "Looking up IP location");

        let res = self
            .http
            .get(&url)
            .query(&[("fields", "status,message,lat,lon")])
            .send()
            .await
            .map_err(|e| LocationError::Unavailable(format!("IP location request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            return Err(LocationError::Unavailable(format!(
                "IP location service returned status {status}"
            )));
        }

        let body: IpApiResponse = res
            .json()
            .await
            .map_err(|e| LocationError::Unavailable(format!("Malformed IP location reply: {e}")))?;

        if body.status != "success" {
            return Err(LocationError::Unavailable(
                body.message.unwrap_or_else(|| "lookup failed".to_string()),
            ));
        }

        match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
            _ => Err(LocationError::Unavailable(
                "IP location reply had no coordinates".to_string(),
            )),
        }
    }
}

/// Pick the location provider the config asks for.
pub fn location_from_config(config: &Config) -> anyhow::Result<Box<dyn LocationProvider>> {
    let loc = &config.location;
    if !loc.enabled {
        return Ok(Box::new(DeniedLocation));
    }

    let boxed: Box<dyn LocationProvider> = match loc.provider {
        LocationSource::Fixed => {
            let coordinates = config.fixed_coordinates().ok_or_else(|| {
                anyhow!(
                    "Location provider 'fixed' needs latitude and longitude.\n\
                     Hint: run `weather configure` and enter your coordinates."
                )
            })?;
            Box::new(FixedLocation::new(coordinates))
        }
        LocationSource::Ip => Box::new(IpLocation::new(
            loc.ip_base_url.clone(),
            config.location_timeout(),
        )?),
    };

    Ok(boxed)
}
