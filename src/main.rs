mod app;
mod config;
mod error;
mod layout;
mod models;
mod remote;
mod sync;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use app::GalleryApp;
use config::{CliArgs, Settings};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cloudframe=info".parse().context("Invalid log directive")?),
        )
        .init();

    let args = CliArgs::from_env()?;
    let settings_path = args.settings_path()?;

    let mut settings = Settings::load(&settings_path)?;
    settings.apply_env();
    args.apply_to(&mut settings);

    GalleryApp::new(settings, settings_path, args.once).run()
}
