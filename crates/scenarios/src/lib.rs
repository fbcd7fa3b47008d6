//! # cardwire scenarios
//!
//! Ready-made card flows. Each scenario has a robot-message handler that
//! delivers a card, most also handle the card's callbacks, and
//! [`ScenarioKind::register`] wires both into an [`EventDispatcher`].

pub mod ai_card;
pub mod approval;
pub mod dynamic_data;
pub mod form;
pub mod group_relay;

#[cfg(test)]
mod testing;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cardwire_core::event::{TOPIC_CARD_CALLBACK, TOPIC_DYNAMIC_DATA, TOPIC_ROBOT};
use cardwire_core::service::CardService;
use cardwire_forms::{FormMessages, FormState, FormSync};
use cardwire_store::{InMemoryStore, spawn_sweeper};
use cardwire_stream::EventDispatcher;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything a scenario needs to build its handlers.
#[derive(Clone)]
pub struct ScenarioContext {
    pub cards: Arc<dyn CardService>,
    pub messages: FormMessages,
    /// Default lifetime of per-instance state.
    pub state_ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    Approval,
    Form,
    DynamicData,
    GroupRelay,
    AiCard,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 5] = [
        ScenarioKind::Approval,
        ScenarioKind::Form,
        ScenarioKind::DynamicData,
        ScenarioKind::GroupRelay,
        ScenarioKind::AiCard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approval => "approval",
            Self::Form => "form",
            Self::DynamicData => "dynamic-data",
            Self::GroupRelay => "group-relay",
            Self::AiCard => "ai-card",
        }
    }

    /// Register this scenario's handlers on `dispatcher`.
    ///
    /// Scenarios that keep per-instance state get their own store with a
    /// sweeper task; the sweeper handles are returned so the caller can
    /// abort them on shutdown.
    pub fn register(
        self,
        dispatcher: &mut EventDispatcher,
        ctx: &ScenarioContext,
    ) -> Vec<JoinHandle<()>> {
        let cards = ctx.cards.clone();
        let mut sweepers = Vec::new();

        match self {
            Self::Approval => {
                dispatcher.register(TOPIC_ROBOT, Arc::new(approval::ApprovalBot::new(cards)));
                dispatcher.register(
                    TOPIC_CARD_CALLBACK,
                    Arc::new(approval::ApprovalCallback::new(ctx.messages)),
                );
            }
            Self::Form => {
                let store = Arc::new(InMemoryStore::<FormState>::new(ctx.state_ttl));
                sweepers.push(spawn_sweeper::<FormState, _>(store.clone(), ctx.sweep_interval));
                let sync = Arc::new(FormSync::new(store, ctx.messages));
                dispatcher.register(TOPIC_ROBOT, Arc::new(form::FormBot::new(cards, sync.clone())));
                dispatcher.register(TOPIC_CARD_CALLBACK, Arc::new(form::FormCallback::new(sync)));
            }
            Self::DynamicData => {
                let store = Arc::new(InMemoryStore::<dynamic_data::Progress>::new(
                    dynamic_data::TOP_BOX_TTL,
                ));
                sweepers.push(spawn_sweeper::<dynamic_data::Progress, _>(
                    store.clone(),
                    ctx.sweep_interval,
                ));
                dispatcher.register(
                    TOPIC_ROBOT,
                    Arc::new(dynamic_data::DynamicDataBot::new(cards, store.clone())),
                );
                dispatcher.register(
                    TOPIC_DYNAMIC_DATA,
                    Arc::new(dynamic_data::DynamicDataCallback::new(store)),
                );
            }
            Self::GroupRelay => {
                let store = Arc::new(InMemoryStore::<group_relay::Roster>::new(ctx.state_ttl));
                sweepers.push(spawn_sweeper::<group_relay::Roster, _>(
                    store.clone(),
                    ctx.sweep_interval,
                ));
                dispatcher.register(
                    TOPIC_ROBOT,
                    Arc::new(group_relay::GroupRelayBot::new(cards.clone())),
                );
                dispatcher.register(
                    TOPIC_CARD_CALLBACK,
                    Arc::new(group_relay::GroupRelayCallback::new(cards, store)),
                );
            }
            Self::AiCard => {
                dispatcher.register(TOPIC_ROBOT, Arc::new(ai_card::AiCardBot::new(cards)));
            }
        }

        info!(scenario = self.as_str(), topics = ?dispatcher.topics(), "Scenario registered");
        sweepers
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScenario(pub String);

impl fmt::Display for UnknownScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<&str> = ScenarioKind::ALL.iter().map(ScenarioKind::as_str).collect();
        write!(f, "unknown scenario '{}' (expected one of: {})", self.0, known.join(", "))
    }
}

impl std::error::Error for UnknownScenario {}

impl FromStr for ScenarioKind {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownScenario(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCardService;

    fn ctx() -> ScenarioContext {
        ScenarioContext {
            cards: Arc::new(RecordingCardService::default()),
            messages: FormMessages::default(),
            state_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }

    #[test]
    fn parses_scenario_names() {
        assert_eq!("approval".parse::<ScenarioKind>(), Ok(ScenarioKind::Approval));
        assert_eq!("dynamic-data".parse::<ScenarioKind>(), Ok(ScenarioKind::DynamicData));
        assert_eq!("Group_Relay".parse::<ScenarioKind>(), Ok(ScenarioKind::GroupRelay));
        let err = "poll".parse::<ScenarioKind>().unwrap_err();
        assert_eq!("AI_CARD".parse::<ScenarioKind>(), Ok(ScenarioKind::AiCard));
        assert!(err.to_string().contains("approval, form, dynamic-data, group-relay, ai-card"));
    }

    #[test]
    fn display_round_trips() {
        for kind in ScenarioKind::ALL {
            assert_eq!(kind.to_string().parse::<ScenarioKind>(), Ok(kind));
        }
    }

    #[tokio::test]
    async fn registers_expected_topics() {
        let expectations = [
            (ScenarioKind::Approval, vec![TOPIC_CARD_CALLBACK, TOPIC_ROBOT], 0),
            (ScenarioKind::Form, vec![TOPIC_CARD_CALLBACK, TOPIC_ROBOT], 1),
            (ScenarioKind::DynamicData, vec![TOPIC_DYNAMIC_DATA, TOPIC_ROBOT], 1),
            (ScenarioKind::GroupRelay, vec![TOPIC_CARD_CALLBACK, TOPIC_ROBOT], 1),
            (ScenarioKind::AiCard, vec![TOPIC_ROBOT], 0),
        ];
        for (kind, mut topics, sweeper_count) in expectations {
            let mut dispatcher = EventDispatcher::new();
            let sweepers = kind.register(&mut dispatcher, &ctx());
            topics.sort();
            assert_eq!(dispatcher.topics(), topics, "{kind}");
            assert_eq!(sweepers.len(), sweeper_count, "{kind}");
            sweepers.iter().for_each(JoinHandle::abort);
        }
    }
}
