use anyhow::Result;
use inquire::{Confirm, CustomType, Password, PasswordDisplayMode, Select};
use weather_core::{Config, Coordinates, LocationSource, Units};

/// Prompt for every setting, using the current config as defaults.
pub fn interactive(mut config: Config) -> Result<Config> {
    let help = if config.api_key.is_some() {
        "Leave empty to keep the current key"
    } else {
        "Get one at https://home.openweathermap.org/api_keys"
    };
    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_help_message(help)
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key.trim().to_string());
    }

    let units = Units::all().to_vec();
    let cursor = units.iter().position(|u| *u == config.units).unwrap_or(0);
    config.units = Select::new("Units:", units)
        .with_starting_cursor(cursor)
        .prompt()?;

    config.location.enabled = Confirm::new("Allow looking up your location?")
        .with_default(config.location.enabled)
        .with_help_message("Without it, `weather show` needs a city or coordinates")
        .prompt()?;

    if config.location.enabled {
        configure_location(&mut config)?;
    }

    Ok(config)
}

fn configure_location(config: &mut Config) -> Result<()> {
    let sources = vec![LocationSource::Ip, LocationSource::Fixed];
    let cursor = sources
        .iter()
        .position(|s| *s == config.location.provider)
        .unwrap_or(0);
    let source = Select::new("Location source:", sources)
        .with_starting_cursor(cursor)
        .with_help_message("ip: approximate position of your network; fixed: coordinates you enter")
        .prompt()?;

    match source {
        LocationSource::Ip => config.location.provider = LocationSource::Ip,
        LocationSource::Fixed => {
            let current = config.fixed_coordinates();

            let mut lat = CustomType::<f64>::new("Latitude:")
                .with_error_message("Enter a number between -90 and 90");
            if let Some(c) = current {
                lat = lat.with_default(c.latitude);
            }
            let latitude = lat.prompt()?;

            let mut lon = CustomType::<f64>::new("Longitude:")
                .with_error_message("Enter a number between -180 and 180");
            if let Some(c) = current {
                lon = lon.with_default(c.longitude);
            }
            let longitude = lon.prompt()?;

            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                anyhow::bail!("Coordinates out of range: {latitude}, {longitude}");
            }

            config.set_fixed_location(Coordinates::new(latitude, longitude));
        }
    }

    Ok(())
}
