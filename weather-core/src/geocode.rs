//! Reverse geocoding: coordinates to a human-readable place name.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::FetchError,
    model::{Coordinates, PlaceName},
};

/// One reverse-geocoding candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodedPlace {
    pub locality: Option<String>,
    pub admin_area: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    /// `Ok(None)` when the lookup produced nothing usable.
    async fn reverse_geocode(&self, coordinates: Coordinates)
    -> Result<Option<PlaceName>, FetchError>;
}

/// First candidate's locality, or its administrative area when the locality
/// is missing or blank.
pub fn place_name_from(candidates: &[GeocodedPlace]) -> Option<PlaceName> {
    let first = candidates.first()?;

    non_blank(first.locality.as_deref()).or_else(|| non_blank(first.admin_area.as_deref()))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
