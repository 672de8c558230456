use clap::{Parser, Subcommand};
use std::process::ExitCode;
use weather_core::{Config, CycleError, FetchOrchestrator, FetchRequest, Units, input};

use crate::{configure, render};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// More log output (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the API key, units and location preferences.
    Configure,

    /// Show current weather and the 5-day forecast.
    Show {
        /// City name or "latitude, longitude". Uses your location when absent.
        input: Option<String>,

        /// Unit system: metric, imperial or standard.
        #[arg(long, value_parser = parse_units)]
        units: Option<Units>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print the location of the config file.
    ConfigPath,
}

fn parse_units(value: &str) -> Result<Units, String> {
    Units::try_from(value).map_err(|e| e.to_string())
}

/// Typed input is checked before any config or network work.
fn request_from(typed: Option<String>) -> Result<FetchRequest, CycleError> {
    match typed {
        Some(text) => {
            input::classify(&text)?;
            Ok(FetchRequest::Manual(text))
        }
        None => Ok(FetchRequest::CurrentLocation),
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Configure => {
                let config = Config::load()?;
                let config = configure::interactive(config)?;
                config.save()?;
                println!("Saved configuration to {}", Config::config_file_path()?.display());
            }
            Command::Show { input, units, json } => {
                let request = match request_from(input) {
                    Ok(request) => request,
                    Err(err) => {
                        eprintln!("{err}");
                        return Ok(ExitCode::FAILURE);
                    }
                };

                let mut config = Config::load()?;
                if let Some(units) = units {
                    config.units = units;
                }

                tracing::debug!(units = %config.units, location = ?config.location, "Loaded config");
                let orchestrator = FetchOrchestrator::from_config(&config)?;

                let report = match orchestrator.run(request).await {
                    Ok(report) => report,
                    Err(err) => {
                        eprintln!("{err}");
                        return Ok(ExitCode::FAILURE);
                    }
                };

                if json {
                    println!("{}", render::json(&report)?);
                } else {
                    print!("{}", render::text(&report, &chrono::Local));
                }
                for notice in render::notices(&report) {
                    eprintln!("{notice}");
                }
                if report.is_empty() {
                    return Ok(ExitCode::FAILURE);
                }
            }
            Command::ConfigPath => {
                println!("{}", Config::config_file_path()?.display());
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}
