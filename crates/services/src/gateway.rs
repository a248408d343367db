//! The confirming call behind an optimistic set update.
//!
//! A gateway carries a [`SetCompletionRequest`] to whatever owns the
//! authoritative record and reports back whether it was accepted.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use training_core::model::{ExerciseId, PlanId, ProgressKey, UserId};
use url::Url;

use crate::error::GatewayError;
use crate::progress_service::ProgressService;

/// Absolute completed-set count for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCompletionRequest {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub exercise_id: ExerciseId,
    pub week_number: u32,
    pub sets_completed: u32,
    pub total_sets: u32,
}

impl SetCompletionRequest {
    #[must_use]
    pub fn new(key: ProgressKey, sets_completed: u32, total_sets: u32) -> Self {
        Self {
            user_id: key.user_id,
            plan_id: key.plan_id,
            exercise_id: key.exercise_id,
            week_number: key.week_number,
            sets_completed,
            total_sets,
        }
    }
}

/// Outcome reported by the confirming side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GatewayResponse {
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait ProgressGateway: Send + Sync {
    /// Ask the authoritative side to store the count.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` when the call itself fails. A call that went
    /// through but was refused is `Ok` with `success == false`.
    async fn confirm_sets(
        &self,
        request: &SetCompletionRequest,
    ) -> Result<GatewayResponse, GatewayError>;
}

//
// ─── IN-PROCESS ────────────────────────────────────────────────────────────────
//

/// Confirms against a `ProgressService` in the same process.
#[derive(Clone)]
pub struct LocalGateway {
    service: Arc<ProgressService>,
}

impl LocalGateway {
    #[must_use]
    pub fn new(service: Arc<ProgressService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ProgressGateway for LocalGateway {
    async fn confirm_sets(
        &self,
        request: &SetCompletionRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let key = match ProgressKey::new(
            request.user_id,
            request.plan_id,
            request.exercise_id,
            request.week_number,
        ) {
            Ok(key) => key,
            Err(e) => return Ok(GatewayResponse::rejected(e.to_string())),
        };

        match self
            .service
            .record_sets(key, request.sets_completed, request.total_sets)
            .await
        {
            Ok(_) => Ok(GatewayResponse::accepted()),
            Err(e) => Ok(GatewayResponse::rejected(e.to_string())),
        }
    }
}

//
// ─── HTTP ──────────────────────────────────────────────────────────────────────
//

/// Response body shape: `{ "data": T }` or `{ "data": { "error": "..." } }`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: EnvelopeData<T>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeData<T> {
    Error { error: String },
    Data(T),
}

impl<T> Envelope<T> {
    /// # Errors
    ///
    /// Returns `GatewayError::Rejected` for an error payload.
    pub fn into_result(self) -> Result<T, GatewayError> {
        match self.data {
            EnvelopeData::Data(value) => Ok(value),
            EnvelopeData::Error { error } => Err(GatewayError::Rejected(error)),
        }
    }
}

/// Posts requests as JSON to `{base_url}/progress/sets`.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    endpoint: Url,
}

impl HttpGateway {
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidUrl` unless `base_url` parses as an
    /// http(s) URL with a host.
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let invalid = || GatewayError::InvalidUrl(base_url.to_owned());
        let mut base = Url::parse(base_url.trim()).map_err(|_| invalid())?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(invalid());
        }
        // `join` replaces the last segment unless the path ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("progress/sets").map_err(|_| invalid())?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait]
impl ProgressGateway for HttpGateway {
    async fn confirm_sets(
        &self,
        request: &SetCompletionRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::HttpStatus(response.status()));
        }

        let body: Envelope<GatewayResponse> = response.json().await?;
        body.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use storage::repository::InMemoryRepository;
    use training_core::time::fixed_now;

    use crate::Clock;

    #[test]
    fn request_uses_camel_case_on_the_wire() {
        let key =
            ProgressKey::new(UserId::new(1), PlanId::new(2), ExerciseId::new(3), 4).unwrap();
        let json = serde_json::to_value(SetCompletionRequest::new(key, 2, 5)).unwrap();
        assert_eq!(json["planId"], 2);
        assert_eq!(json["weekNumber"], 4);
        assert_eq!(json["setsCompleted"], 2);
        assert_eq!(json["totalSets"], 5);
    }

    #[test]
    fn envelope_with_data_yields_response() {
        let body = r#"{"data":{"success":false,"message":"locked"}}"#;
        let env: Envelope<GatewayResponse> = serde_json::from_str(body).unwrap();
        let resp = env.into_result().unwrap();
        assert!(!resp.success);
        assert_eq!(resp.message.as_deref(), Some("locked"));
    }

    #[test]
    fn envelope_with_error_yields_rejection() {
        let body = r#"{"data":{"error":"invalid week"}}"#;
        let env: Envelope<GatewayResponse> = serde_json::from_str(body).unwrap();
        let err = env.into_result().unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(msg) if msg == "invalid week"));
    }

    #[test]
    fn http_gateway_joins_endpoint_onto_base_path() {
        let with_slash = HttpGateway::new("https://example.test/api/").unwrap();
        assert_eq!(with_slash.endpoint(), "https://example.test/api/progress/sets");
        let bare = HttpGateway::new("http://example.test/api").unwrap();
        assert_eq!(bare.endpoint(), "http://example.test/api/progress/sets");
        let root = HttpGateway::new("http://localhost:8080").unwrap();
        assert_eq!(root.endpoint(), "http://localhost:8080/progress/sets");
    }

    #[test]
    fn http_gateway_rejects_bad_urls() {
        for bad in [
            "ftp://nope",
            "http://exa mple.test",
            "not a url",
            "https://",
            "mailto:coach@example.test",
        ] {
            assert!(
                matches!(HttpGateway::new(bad), Err(GatewayError::InvalidUrl(_))),
                "{bad} accepted"
            );
        }
    }

    #[tokio::test]
    async fn local_gateway_rejects_week_zero_without_error() {
        let service = Arc::new(ProgressService::new(
            Clock::fixed(fixed_now()),
            Arc::new(InMemoryRepository::new()),
        ));
        let gw = LocalGateway::new(service);
        let request = SetCompletionRequest {
            user_id: UserId::new(1),
            plan_id: PlanId::new(1),
            exercise_id: ExerciseId::new(1),
            week_number: 0,
            sets_completed: 1,
            total_sets: 3,
        };
        let resp = gw.confirm_sets(&request).await.unwrap();
        assert!(!resp.success);
        assert!(resp.message.is_some());
    }
}
