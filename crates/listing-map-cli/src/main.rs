//! `listing-map` - command-line front end of the listing map core

mod commands;
mod logging;
mod settings;

use clap::Parser;
use settings::{Command, Settings};

fn run(settings: &Settings) -> anyhow::Result<()> {
    let config = settings.load_config()?;
    match &settings.command {
        Command::Layout(args) => commands::layout(&config, args),
        Command::Classify(args) => commands::classify(&config, args),
        Command::Expand(args) => commands::expand(&config, args),
    }
}

fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    logging::setup_logging();
    run(&settings)
}
