//! `cardwire run`: serve a scenario behind the HTTP gateway.

use std::sync::Arc;

use cardwire_client::{CardSessionClient, OAuthTokenProvider};
use cardwire_config::AppConfig;
use cardwire_core::service::CardService;
use cardwire_forms::{FormMessages, Locale};
use cardwire_gateway::GatewayState;
use cardwire_scenarios::{ScenarioContext, ScenarioKind};
use cardwire_stream::EventDispatcher;
use tracing::info;

pub async fn run(
    mut config: AppConfig,
    scenario: ScenarioKind,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let http = reqwest::Client::builder()
        .timeout(config.api.timeout())
        .build()?;
    let tokens = Arc::new(OAuthTokenProvider::from_config(&config, http)?);
    let cards: Arc<dyn CardService> = Arc::new(CardSessionClient::from_config(&config, tokens)?);

    let ctx = ScenarioContext {
        cards: cards.clone(),
        messages: FormMessages::new(Locale::parse(&config.forms.locale).unwrap_or_default()),
        state_ttl: config.store.ttl(),
        sweep_interval: config.store.sweep_interval(),
    };
    let mut dispatcher = EventDispatcher::new();
    let sweepers = scenario.register(&mut dispatcher, &ctx);

    println!("🃏 cardwire");
    println!("   Scenario:  {scenario}");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Notices:   {}",
        config.notice.user_id.as_deref().unwrap_or("disabled")
    );

    let state = Arc::new(GatewayState {
        dispatcher: Arc::new(dispatcher),
        cards,
        notice_user_id: config.notice.user_id.clone(),
    });
    let result = cardwire_gateway::start(&config, state).await;

    for sweeper in &sweepers {
        sweeper.abort();
    }
    info!(scenario = %scenario, "Gateway stopped");
    result
}
