//! Configuration view and validation commands (`board-sync config`).

use anyhow::{Context, Result};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use board_sync::sync_config::{CONFIG_DIR, CONFIG_FILE, SyncConfig, SyncToml};

    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Board Sync Configuration");
            println!("========================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                SyncToml::load(&config_path)?
            } else {
                println!("No sync.toml found at {}", config_path.display());
                println!("Using default configuration.");
                SyncToml::default()
            };
            println!();

            println!("[server]");
            println!("  url = \"{}\"", toml.server.url);
            println!("  path_template = \"{}\"", toml.server.path_template);
            println!();
            println!("[timing]");
            println!("  poll_interval_ms = {}", toml.timing.poll_interval_ms);
            println!("  connect_timeout_ms = {}", toml.timing.connect_timeout_ms);
            println!("  reconnect_base_ms = {}", toml.timing.reconnect_base_ms);
            println!("  reconnect_max_ms = {}", toml.timing.reconnect_max_ms);
            println!();
            println!("[polling]");
            println!("  start = \"{}\"", toml.polling.start);
            println!();

            // Effective values include env overrides and may fail validation.
            match SyncConfig::load(project_dir, None) {
                Ok(config) => {
                    println!("Effective values (with env overrides):");
                    println!("  url = \"{}\"", config.server_url);
                    println!(
                        "  poll_interval_ms = {}",
                        config.options.poll_interval.as_millis()
                    );
                }
                Err(e) => println!("Effective configuration is invalid: {}", e),
            }
            println!();

            if !config_path.exists() {
                println!("Run 'board-sync config init' to create a sync.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No sync.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = SyncToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration problems:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
                println!();
                anyhow::bail!("{} problem(s) in {}", warnings.len(), config_path.display());
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("sync.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create {}", config_dir.display()))?;

            SyncToml::default().save(&config_path)?;

            println!("Created sync.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] url, path_template");
            println!("  - [timing] poll_interval_ms, connect_timeout_ms, reconnect_base_ms, reconnect_max_ms");
            println!("  - [polling] start (immediate | on_failure)");
            println!();
        }
    }

    Ok(())
}
