//! `CardSessionClient`: the reqwest-backed [`CardService`].
//!
//! Covers card creation and delivery, data updates, AI-card streaming, and
//! user profile lookup. Card calls authenticate with the
//! `x-acs-dingtalk-access-token` header; the legacy user endpoint takes the
//! token as a query parameter instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cardwire_core::card::{
    CardInstanceId, CreateCardRequest, CreateOptions, DeliveryTarget, PrivateDataPatch,
    StreamingUpdate, UpdateCardRequest, UpdateOptions, UserProfile,
};
use cardwire_core::error::CardError;
use cardwire_core::message::IncomingMessage;
use cardwire_core::params::CardParamMap;
use cardwire_core::service::CardService;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;
use crate::token::TokenProvider;

const ACCESS_TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

pub struct CardSessionClient {
    api_base: String,
    oapi_base: String,
    robot_code: String,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl CardSessionClient {
    /// Create a client against the public endpoints.
    ///
    /// `robot_code` identifies the robot that posts group cards; for an
    /// internal app it is the app's client id.
    pub fn new(
        robot_code: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self, CardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CardError::Transport {
                operation: "client",
                reason: e.to_string(),
            })?;
        Ok(Self::with_http_client(robot_code, tokens, client))
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_http_client(
        robot_code: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_base: "https://api.dingtalk.com".into(),
            oapi_base: "https://oapi.dingtalk.com".into(),
            robot_code: robot_code.into(),
            tokens,
            retry: RetryPolicy::default(),
            client,
        }
    }

    /// Build from configuration: endpoints, timeout, retry policy, and the
    /// client id as robot code.
    pub fn from_config(
        config: &cardwire_config::AppConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, CardError> {
        let robot_code = config.credentials.client_id.clone().unwrap_or_default();
        Ok(Self::new(robot_code, tokens, config.api.timeout())?
            .with_endpoints(&config.api.base_url, &config.api.oapi_url)
            .with_retry(RetryPolicy::from_config(&config.retry)))
    }

    pub fn with_endpoints(mut self, api_base: &str, oapi_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.oapi_base = oapi_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn token(&self, operation: &'static str) -> Result<String, CardError> {
        self.tokens
            .access_token()
            .await
            .map_err(|source| CardError::Auth { operation, source })
    }

    /// One authenticated JSON call under the retry policy.
    ///
    /// Non-2xx statuses become `CardError::Status`; a 2xx body with
    /// `success: false` becomes `CardError::Rejected`.
    async fn call<B: Serialize + Sync>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Value, CardError> {
        let token = self.token(operation).await?;
        let url = format!("{}{}", self.api_base, path);

        self.retry
            .run(operation, || {
                let request = self
                    .client
                    .request(method.clone(), &url)
                    .header(ACCESS_TOKEN_HEADER, &token)
                    .json(body);
                async move {
                    let response = request.send().await.map_err(|e| {
                        warn!(operation, error = %e, "Card request failed");
                        CardError::Transport {
                            operation,
                            reason: e.to_string(),
                        }
                    })?;
                    read_card_response(operation, response).await
                }
            })
            .await
    }
}

async fn read_card_response(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<Value, CardError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| CardError::Transport {
        operation,
        reason: e.to_string(),
    })?;

    if !status.is_success() {
        warn!(operation, status = status.as_u16(), body = %text, "Card API returned error");
        return Err(CardError::Status {
            operation,
            status: status.as_u16(),
            body: text,
        });
    }

    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| CardError::Transport {
            operation,
            reason: format!("invalid response body: {e}"),
        })?
    };

    if body.get("success").and_then(Value::as_bool) == Some(false) {
        warn!(operation, body = %text, "Card API rejected request");
        return Err(CardError::Rejected {
            operation,
            body: text,
        });
    }

    Ok(body)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamingRequest<'a> {
    out_track_id: &'a CardInstanceId,
    #[serde(flatten)]
    update: &'a StreamingUpdate,
}

#[derive(Serialize)]
struct UserGetRequest<'a> {
    userid: &'a str,
}

#[derive(Deserialize)]
struct UserGetResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    result: Option<UserProfile>,
}

#[async_trait]
impl CardService for CardSessionClient {
    async fn create_and_deliver(
        &self,
        template_id: &str,
        public_data: CardParamMap,
        target: &IncomingMessage,
        options: CreateOptions,
    ) -> Result<CardInstanceId, CardError> {
        let delivery = DeliveryTarget::resolve(target, &self.robot_code, &options)?;
        // Minted once, so every retry re-issues the same card.
        let instance_id = CardInstanceId::derive(target);
        let request = CreateCardRequest::build(
            template_id,
            instance_id.clone(),
            public_data,
            &delivery,
            &options,
        );

        debug!(
            instance_id = %instance_id,
            template_id,
            open_space_id = %request.open_space_id,
            "Creating card"
        );

        self.call(
            "create_and_deliver",
            Method::POST,
            "/v1.0/card/instances/createAndDeliver",
            &request,
        )
        .await?;
        Ok(instance_id)
    }

    async fn update(
        &self,
        instance_id: &CardInstanceId,
        public_patch: Option<CardParamMap>,
        private_patch: Option<PrivateDataPatch>,
        options: UpdateOptions,
    ) -> Result<(), CardError> {
        let request =
            UpdateCardRequest::build(instance_id.clone(), public_patch, private_patch, options);
        debug!(instance_id = %instance_id, "Updating card");
        self.call("update", Method::PUT, "/v1.0/card/instances", &request)
            .await?;
        Ok(())
    }

    async fn stream_update(
        &self,
        instance_id: &CardInstanceId,
        update: StreamingUpdate,
    ) -> Result<(), CardError> {
        let request = StreamingRequest {
            out_track_id: instance_id,
            update: &update,
        };
        debug!(instance_id = %instance_id, key = %update.key, "Streaming card content");
        self.call("stream_update", Method::PUT, "/v1.0/card/streaming", &request)
            .await?;
        Ok(())
    }

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile, CardError> {
        const OPERATION: &str = "user_profile";
        let token = self.token(OPERATION).await?;
        let url = format!("{}/topapi/v2/user/get", self.oapi_base);

        let response = self
            .retry
            .run(OPERATION, || {
                let request = self
                    .client
                    .post(&url)
                    .query(&[("access_token", token.as_str())])
                    .json(&UserGetRequest { userid: user_id });
                async move {
                    let response = request.send().await.map_err(|e| CardError::Transport {
                        operation: OPERATION,
                        reason: e.to_string(),
                    })?;
                    read_card_response(OPERATION, response).await
                }
            })
            .await?;

        let parsed: UserGetResponse =
            serde_json::from_value(response).map_err(|e| CardError::Transport {
                operation: OPERATION,
                reason: format!("invalid response body: {e}"),
            })?;
        if parsed.errcode != 0 {
            warn!(user_id, errcode = parsed.errcode, errmsg = %parsed.errmsg, "User lookup rejected");
            return Err(CardError::Rejected {
                operation: OPERATION,
                body: format!("errcode {}: {}", parsed.errcode, parsed.errmsg),
            });
        }
        Ok(parsed.result.unwrap_or_default())
    }
}
