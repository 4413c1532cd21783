//! CLI command handlers

pub mod demo;
pub mod last_message;
pub mod watch;

use crate::config::{config_file, Config};
use anyhow::{Context, Result};
use console::style;

/// Print the effective configuration, optionally writing the defaults first
pub fn show_config(init: bool) -> Result<()> {
    let path = config_file();

    if init {
        if path.exists() {
            println!(
                "{} {} already exists",
                style("!").yellow().bold(),
                path.display()
            );
        } else {
            Config::default().save()?;
            println!("{} Wrote {}", style("✓").green().bold(), path.display());
        }
    }

    let config = Config::load()?;
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;

    println!("{}", style(path.display()).dim());
    print!("{}", yaml);

    Ok(())
}
