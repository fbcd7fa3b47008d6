//! The cardwire CLI entry point.
//!
//! Commands:
//! - `run`:    Serve one card scenario behind the HTTP gateway
//! - `config`: Show the effective configuration, or a default one
//! - `doctor`: Check credentials and token access

use clap::{Parser, Subcommand};

use cardwire_config::AppConfig;
use cardwire_scenarios::ScenarioKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "cardwire",
    about = "cardwire: interactive card scenarios for DingTalk robots",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a scenario: register its handlers and start the gateway
    Run {
        /// approval | form | dynamic-data | group-relay | ai-card
        #[arg(short, long)]
        scenario: ScenarioKind,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration (secrets redacted)
    Config {
        /// Print a default config.toml instead
        #[arg(long)]
        init: bool,
    },

    /// Diagnose credentials and connectivity
    Doctor,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    let json = config.as_ref().is_ok_and(|c| c.log.json);
    init_tracing(cli.verbose, json);

    match cli.command {
        Commands::Run { scenario, port } => commands::run::run(config?, scenario, port).await?,
        Commands::Config { init: true } => commands::config_cmd::init(),
        Commands::Config { init: false } => commands::config_cmd::show(&config?)?,
        Commands::Doctor => commands::doctor::run(config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_scenario() {
        let cli = Cli::try_parse_from(["cardwire", "run", "--scenario", "dynamic-data", "-p", "9000"]).unwrap();
        match cli.command {
            Commands::Run { scenario, port } => {
                assert_eq!(scenario, ScenarioKind::DynamicData);
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_unknown_scenario() {
        let err = Cli::try_parse_from(["cardwire", "run", "--scenario", "poll"]).err().unwrap();
        assert!(err.to_string().contains("unknown scenario"));
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["cardwire", "config", "--init", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config { init: true }));
    }
}
