//! `cardwire doctor`: diagnose credentials and token access.

use cardwire_client::{OAuthTokenProvider, TokenProvider};
use cardwire_config::{AppConfig, ConfigError};

pub async fn run(config: Result<AppConfig, ConfigError>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 cardwire doctor");
    println!("==================\n");

    let mut issues = 0;

    let config = match config {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the config file at {} first.", AppConfig::config_dir().join("config.toml").display());
            return Ok(());
        }
    };

    if config.has_credentials() {
        println!("  ✅ App credentials present");

        let http = reqwest::Client::builder()
            .timeout(config.api.timeout())
            .build()?;
        let tokens = OAuthTokenProvider::from_config(&config, http)?;
        match tokens.access_token().await {
            Ok(_) => println!("  ✅ Access token obtained from {}", config.api.base_url),
            Err(e) => {
                println!("  ❌ Cannot obtain access token: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ❌ No app credentials, set DINGTALK_APP_CLIENT_ID and DINGTALK_APP_CLIENT_SECRET");
        issues += 1;
    }

    if config.notice.user_id.is_some() {
        println!("  ✅ Notice user configured");
    } else {
        println!("  ⚠️  No notice user, POST /api/notice/card will answer 503");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
