use chrono::TimeZone;
use serde::Serialize;
use std::fmt::{Display, Write};
use weather_core::{
    CurrentWeather, CycleReport, FetchError, ForecastEntry, ForecastList, Units, WeatherTarget,
};

const DATE_FORMAT: &str = "%b %d, %Y %H:%M";

/// Human-readable report. Forecast times are shown in `tz`.
pub fn text<Tz>(report: &CycleReport, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    let symbol = report.units.temperature_symbol();

    let heading = report
        .current()
        .map(|c| c.place_name.clone())
        .unwrap_or_else(|| report.target.to_string());
    let _ = writeln!(out, "Weather for {heading}");

    if let Some(current) = report.current() {
        let _ = writeln!(out, "  Temperature: {:.1}{symbol}", current.temperature);
        let _ = writeln!(out, "  Humidity:    {}%", current.humidity);
        let _ = writeln!(out, "  Conditions:  {}", current.description);
    }

    if let Some(forecast) = report.forecast().filter(|f| !f.is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Forecast");
        for entry in forecast {
            let _ = writeln!(
                out,
                "  {}  {:>7}  {}",
                when(entry, tz),
                format!("{:.1}{symbol}", entry.temperature),
                entry.description
            );
        }
    }

    out
}

fn when<Tz>(entry: &ForecastEntry, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    entry
        .time()
        .map(|t| t.with_timezone(tz).format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| entry.timestamp.to_string())
}

/// One line per half of the report that produced no data.
pub fn notices(report: &CycleReport) -> Vec<String> {
    let mut notices = Vec::new();
    if let Err(err) = &report.current {
        notices.push(format!("Weather data not available: {err}"));
    }
    if let Err(err) = &report.forecast {
        notices.push(format!("Forecast data not available: {err}"));
    }
    notices
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    target: &'a WeatherTarget,
    units: Units,
    current: Option<&'a CurrentWeather>,
    forecast: Option<&'a ForecastList>,
    errors: Vec<JsonError>,
}

#[derive(Debug, Serialize)]
struct JsonError {
    part: &'static str,
    status: Option<u16>,
    message: String,
}

impl JsonError {
    fn new(part: &'static str, err: &FetchError) -> Self {
        Self {
            part,
            status: err.status(),
            message: err.message().to_string(),
        }
    }
}

pub fn json(report: &CycleReport) -> serde_json::Result<String> {
    let mut errors = Vec::new();
    if let Err(err) = &report.current {
        errors.push(JsonError::new("current", err));
    }
    if let Err(err) = &report.forecast {
        errors.push(JsonError::new("forecast", err));
    }

    serde_json::to_string_pretty(&JsonReport {
        target: &report.target,
        units: report.units,
        current: report.current(),
        forecast: report.forecast(),
        errors,
    })
}
