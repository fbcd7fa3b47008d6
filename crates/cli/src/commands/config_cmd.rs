//! `cardwire config`: show configuration.

use cardwire_config::AppConfig;

/// Print the effective configuration as TOML, secrets redacted.
pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("# {}", config_path.display());
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

/// Print a default `config.toml`.
pub fn init() {
    println!("{}", AppConfig::default_toml());
}
