//! Progress card pinned to the top of a group, refreshed by the platform
//! pulling a dynamic data source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cardwire_core::card::{
    CardInstanceId, CreateOptions, DynamicDataConfig, DynamicDataSourceConfig, PullConfig,
    TimeUnit, TopBoxDelivery,
};
use cardwire_core::error::Result;
use cardwire_core::event::{AckPayload, DynamicDataQuery, EventEnvelope, EventHandler};
use cardwire_core::lock::InstanceLocks;
use cardwire_core::message::IncomingMessage;
use cardwire_core::params::to_param_map_from;
use cardwire_core::service::CardService;
use cardwire_core::store::InstanceStore;
use chrono::{DateTime, Local};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

pub const TEMPLATE_ID: &str = "c36a2fbe-ff53-44ac-a91d-dedbe3654306.schema";
pub const DATA_SOURCE_ID: &str = "demo_dynamic_data_source_id";
/// Lifetime of the top box, and of the counters behind it.
pub const TOP_BOX_TTL: Duration = Duration::from_secs(3 * 60);

/// Pull strategy requested by the message text.
pub fn pull_config_for(text: &str) -> PullConfig {
    match text.trim().to_uppercase().as_str() {
        "INTERVAL" => PullConfig::Interval {
            interval: 10,
            time_unit: TimeUnit::Seconds,
        },
        "RENDER" => PullConfig::Render,
        _ => PullConfig::Once,
    }
}

/// Iteration counters of one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total: u32,
    pub finished: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub finished: u32,
    pub unfinished: u32,
    pub progress: u32,
    pub update_at: String,
}

impl Progress {
    pub fn new(total: u32) -> Self {
        Self { total, finished: 0 }
    }

    /// Finish one more item. Returns `false` once everything is finished.
    pub fn advance(&mut self) -> bool {
        if self.finished < self.total {
            self.finished += 1;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self, at: DateTime<Local>) -> ProgressSnapshot {
        let progress = if self.total == 0 {
            100
        } else {
            (f64::from(self.finished) / f64::from(self.total) * 100.0).round() as u32
        };
        ProgressSnapshot {
            finished: self.finished,
            unfinished: self.total.saturating_sub(self.finished),
            progress,
            update_at: at.format("%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IterationCard {
    title: String,
    total: u32,
    finished: u32,
    unfinished: u32,
    progress: u32,
    update_at: String,
}

/// A random month and workload, so consecutive cards look different.
fn random_iteration() -> (u32, u32) {
    let mut rng = rand::rng();
    (rng.random_range(1..=12), rng.random_range(100..=200))
}

/// Pins an iteration progress card to the conversation.
pub struct DynamicDataBot {
    cards: Arc<dyn CardService>,
    store: Arc<dyn InstanceStore<Progress>>,
}

impl DynamicDataBot {
    pub fn new(cards: Arc<dyn CardService>, store: Arc<dyn InstanceStore<Progress>>) -> Self {
        Self { cards, store }
    }
}

#[async_trait]
impl EventHandler for DynamicDataBot {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let msg: IncomingMessage = event.decode()?;
        let pull_config = pull_config_for(msg.text());
        let (month, total) = random_iteration();

        let card = IterationCard {
            title: format!("{month}月迭代"),
            total,
            finished: 0,
            unfinished: total,
            progress: 0,
            update_at: String::new(),
        };
        let options = CreateOptions {
            top_box: Some(TopBoxDelivery::expiring_in(msg.conversation_id.clone(), TOP_BOX_TTL)),
            dynamic_data: Some(DynamicDataConfig {
                dynamic_data_source_configs: vec![DynamicDataSourceConfig {
                    dynamic_data_source_id: DATA_SOURCE_ID.into(),
                    pull_config: pull_config.clone(),
                }],
            }),
            ..CreateOptions::default()
        };

        let instance_id = self
            .cards
            .create_and_deliver(TEMPLATE_ID, to_param_map_from(&card)?, &msg, options)
            .await?;
        info!(instance_id = %instance_id, total, pull = ?pull_config, "Progress card pinned");

        self.store
            .put_with_ttl(instance_id, Progress::new(total), TOP_BOX_TTL)
            .await?;
        Ok(AckPayload::Success)
    }
}

/// Answers dynamic data pulls, one finished item per pull.
pub struct DynamicDataCallback {
    store: Arc<dyn InstanceStore<Progress>>,
    locks: InstanceLocks,
}

impl DynamicDataCallback {
    pub fn new(store: Arc<dyn InstanceStore<Progress>>) -> Self {
        Self {
            store,
            locks: InstanceLocks::new(),
        }
    }

    async fn advance(&self, id: &CardInstanceId) -> Result<Option<Progress>> {
        let _guard = self.locks.lock(id).await;
        let Some(mut progress) = self.store.get(id).await? else {
            debug!(instance_id = %id, "No counters for instance");
            return Ok(None);
        };
        if !progress.advance() {
            debug!(instance_id = %id, total = progress.total, "Iteration already complete");
            return Ok(None);
        }
        self.store.put_with_ttl(id.clone(), progress, TOP_BOX_TTL).await?;
        Ok(Some(progress))
    }
}

#[async_trait]
impl EventHandler for DynamicDataCallback {
    async fn handle(&self, event: &EventEnvelope) -> Result<AckPayload> {
        let query: DynamicDataQuery = event.decode()?;
        let Some(progress) = self.advance(&query.out_track_id).await? else {
            return Ok(AckPayload::Success);
        };

        let snapshot = progress.snapshot(Local::now());
        debug!(instance_id = %query.out_track_id, finished = snapshot.finished, progress = snapshot.progress, "Serving progress");
        Ok(AckPayload::Response(json!({
            "dataSourceQueryResponses": [{
                "data": serde_json::to_string(&snapshot)?,
                "dynamicDataSourceId": DATA_SOURCE_ID,
                "dynamicDataValueType": "OBJECT",
            }]
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingCardService, robot_event};
    use cardwire_core::event::TOPIC_DYNAMIC_DATA;
    use cardwire_store::InMemoryStore;
    use chrono::TimeZone;

    fn query(instance_id: &str) -> EventEnvelope {
        let query = DynamicDataQuery {
            out_track_id: instance_id.into(),
            user_id: "u1".into(),
            corp_id: None,
        };
        EventEnvelope::new(TOPIC_DYNAMIC_DATA, "pull-1", &query).unwrap()
    }

    fn store() -> Arc<InMemoryStore<Progress>> {
        Arc::new(InMemoryStore::default())
    }

    #[test]
    fn pull_strategy_from_text() {
        assert_eq!(
            pull_config_for("interval"),
            PullConfig::Interval {
                interval: 10,
                time_unit: TimeUnit::Seconds
            }
        );
        assert_eq!(pull_config_for(" Render "), PullConfig::Render);
        assert_eq!(pull_config_for("hello"), PullConfig::Once);
        assert_eq!(pull_config_for(""), PullConfig::Once);
    }

    #[test]
    fn snapshot_rounds_progress() {
        let at = Local.with_ymd_and_hms(2024, 6, 6, 9, 5, 7).unwrap();
        let progress = Progress { total: 150, finished: 1 };
        let snapshot = progress.snapshot(at);
        assert_eq!(snapshot.progress, 1);
        assert_eq!(snapshot.unfinished, 149);
        assert_eq!(snapshot.update_at, "06-06 09:05:07");

        let progress = Progress { total: 3, finished: 2 };
        assert_eq!(progress.snapshot(at).progress, 67);
    }

    #[test]
    fn advance_stops_at_total() {
        let mut progress = Progress::new(2);
        assert!(progress.advance());
        assert!(progress.advance());
        assert!(!progress.advance());
        assert_eq!(progress.finished, 2);
    }

    #[tokio::test]
    async fn bot_pins_card_with_pull_config() {
        let cards = Arc::new(RecordingCardService::default());
        let store = store();
        let bot = DynamicDataBot::new(cards.clone(), store.clone());

        bot.handle(&robot_event("RENDER")).await.unwrap();

        let created = &cards.created()[0];
        assert_eq!(created.template_id, TEMPLATE_ID);
        let top_box = created.options.top_box.as_ref().unwrap();
        assert_eq!(top_box.conversation_id, "cid-group");
        let sources = &created.options.dynamic_data.as_ref().unwrap().dynamic_data_source_configs;
        assert_eq!(sources[0].dynamic_data_source_id, DATA_SOURCE_ID);
        assert_eq!(sources[0].pull_config, PullConfig::Render);

        let total: u32 = created.public_data["total"].parse().unwrap();
        assert!((100..=200).contains(&total));
        assert_eq!(created.public_data["finished"], "0");
        assert_eq!(created.public_data["unfinished"], total.to_string());
        assert!(created.public_data["title"].ends_with("月迭代"));

        let stored = store.get(&created.instance_id).await.unwrap().unwrap();
        assert_eq!(stored, Progress::new(total));
    }

    #[tokio::test]
    async fn query_advances_counter() {
        let store = store();
        store.put("card-1".into(), Progress::new(4)).await.unwrap();
        let handler = DynamicDataCallback::new(store.clone());

        let AckPayload::Response(body) = handler.handle(&query("card-1")).await.unwrap() else {
            panic!("expected data");
        };
        let response = &body["dataSourceQueryResponses"][0];
        assert_eq!(response["dynamicDataSourceId"], DATA_SOURCE_ID);
        assert_eq!(response["dynamicDataValueType"], "OBJECT");
        let data: serde_json::Value = serde_json::from_str(response["data"].as_str().unwrap()).unwrap();
        assert_eq!(data["finished"], 1);
        assert_eq!(data["unfinished"], 3);
        assert_eq!(data["progress"], 25);

        let stored = store.get(&"card-1".into()).await.unwrap().unwrap();
        assert_eq!(stored.finished, 1);
    }

    #[tokio::test]
    async fn unknown_or_finished_instance_acks_without_data() {
        let store = store();
        store
            .put("done".into(), Progress { total: 5, finished: 5 })
            .await
            .unwrap();
        let handler = DynamicDataCallback::new(store);

        assert_eq!(handler.handle(&query("missing")).await.unwrap(), AckPayload::Success);
        assert_eq!(handler.handle(&query("done")).await.unwrap(), AckPayload::Success);
    }
}
