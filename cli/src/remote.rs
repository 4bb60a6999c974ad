use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use coach_core::gateway::{GatewayError, RemoteGateway};
use coach_core::models::{DailyAggregate, ExerciseEntry, MealEntry, WeightEntry};
use coach_core::wire::{
    IdResponse, LOG_EXERCISE_PATH, LOG_MEAL_PATH, LOG_WEIGHT_PATH, TODAY_PATH, TodayResponse,
    exercise_request, meal_request, remote_id, today_to_aggregate, weight_request,
};

/// [`RemoteGateway`] over the coach HTTP API.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "coach-cli/{} (health tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, GatewayError> {
        let resp = req.send().await.map_err(classify)?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Unauthorized);
        }
        if status.is_client_error()
            && status != StatusCode::REQUEST_TIMEOUT
            && status != StatusCode::TOO_MANY_REQUESTS
        {
            return Err(GatewayError::Rejected(status.as_u16()));
        }
        if !status.is_success() {
            return Err(GatewayError::ServerError(status.as_u16()));
        }
        let body = resp.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<String, GatewayError> {
        let resp: IdResponse = self.send(self.request(Method::POST, path).json(body)).await?;
        remote_id(resp)
    }
}

fn classify(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::MalformedResponse(err.to_string())
    } else {
        GatewayError::TransportFailure(err.to_string())
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn submit_meal(&self, entry: &MealEntry) -> Result<String, GatewayError> {
        self.post(LOG_MEAL_PATH, &meal_request(entry)).await
    }

    async fn submit_exercise(&self, entry: &ExerciseEntry) -> Result<String, GatewayError> {
        self.post(LOG_EXERCISE_PATH, &exercise_request(entry)).await
    }

    async fn submit_weight(&self, entry: &WeightEntry) -> Result<String, GatewayError> {
        self.post(LOG_WEIGHT_PATH, &weight_request(entry)).await
    }

    async fn fetch_daily_aggregate(&self) -> Result<DailyAggregate, GatewayError> {
        let resp: TodayResponse = self.send(self.request(Method::GET, TODAY_PATH)).await?;
        today_to_aggregate(resp)
    }
}
