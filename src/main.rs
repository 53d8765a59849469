//! Warden - headless runner for the prison officer NPC engine
//!
//! Loads settings, engine config and facility data, runs one scripted intake
//! drill against the reference backends and prints the report as JSON.

mod settings;

use anyhow::{Context, Result};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use warden_game::{drill, EngineConfig};
use warden_world::{FacilityLayout, RouteRegistry};

use crate::settings::Settings;

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Warden dry run...");

    let settings = Settings::load();
    if !Settings::exists() {
        if let Err(e) = settings.save() {
            warn!("Could not write default settings: {}", e);
        }
    }

    let config = match &settings.data.engine_config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load engine config {:?}", path))?,
        None => EngineConfig::default(),
    };
    let layout = match &settings.data.layout {
        Some(path) => FacilityLayout::load(path)
            .with_context(|| format!("Failed to load facility layout {:?}", path))?,
        None => FacilityLayout::demo(),
    };
    let routes = match &settings.data.routes {
        Some(path) => RouteRegistry::load(path)
            .with_context(|| format!("Failed to load patrol routes {:?}", path))?,
        None => RouteRegistry::demo(),
    };

    let report =
        drill::run(config, layout, routes, &settings.drill).context("Intake drill failed")?;

    let json = if settings.data.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");

    if !report.completed {
        anyhow::bail!("Intake drill did not complete");
    }
    info!("Warden dry run complete");
    Ok(())
}
