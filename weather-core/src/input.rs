//! Classification of free-text location input.

use crate::{
    error::CycleError,
    model::{Coordinates, WeatherTarget},
};

/// Decide whether `input` names a place or gives `lat, lon` coordinates.
///
/// Input made only of digits, `.`, `-` and `,` (whitespace ignored) is read as
/// coordinates and must hold exactly two numeric tokens. Anything else is a
/// place name.
pub fn classify(input: &str) -> Result<WeatherTarget, CycleError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CycleError::InvalidManualInput(
            "enter a city name or \"latitude, longitude\"".to_string(),
        ));
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if !looks_like_coordinates(&compact) {
        return Ok(WeatherTarget::Place {
            name: trimmed.to_string(),
        });
    }

    parse_coordinates(&compact).map(WeatherTarget::Coordinates)
}

fn looks_like_coordinates(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ','))
}

fn parse_coordinates(s: &str) -> Result<Coordinates, CycleError> {
    let tokens: Vec<&str> = s.split(',').collect();
    let [lat, lon] = tokens.as_slice() else {
        return Err(CycleError::InvalidManualInput(format!(
            "expected \"latitude, longitude\", got {} value(s)",
            tokens.iter().filter(|t| !t.is_empty()).count()
        )));
    };

    let latitude = parse_number(lat)?;
    let longitude = parse_number(lon)?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(CycleError::InvalidManualInput(format!(
            "latitude {latitude} is outside -90..90"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(CycleError::InvalidManualInput(format!(
            "longitude {longitude} is outside -180..180"
        )));
    }

    Ok(Coordinates::new(latitude, longitude))
}

fn parse_number(token: &str) -> Result<f64, CycleError> {
    token
        .parse::<f64>()
        .map_err(|_| CycleError::InvalidManualInput(format!("'{token}' is not a number")))
}
