//! REST wrapper for the builder API.
//!
//! All endpoints answer with the `{ success, data?, error? }` envelope.
//! Request-level failures are surfaced through a shared error slot rather
//! than as `Err`: a failed call stores one human-readable message, returns
//! `None`/`false`, and leaves any earlier results with the caller untouched.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

use super::types::{
    ExecutionResult, GraphDefinition, GraphList, NodeTypeInfo, ValidationResult,
};
use crate::{lock, ApiResponse};

/// Why a builder call failed. Callers observe these as the stored
/// [`BuilderApi::last_error`] message rather than as `Err`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("builder endpoint returned {status}")]
    Http { status: u16 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Rejected(String),
    #[error("response missing data")]
    MissingData,
}

#[derive(Debug, serde::Deserialize)]
struct DeleteOutcome {
    deleted: bool,
}

/// Client for `/api/builder`, with a shared loading/error state cell.
pub struct BuilderApi {
    client: reqwest::Client,
    base_url: String,
    loading: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl BuilderApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            loading: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// Whether a call is currently in flight.
    pub fn loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Message from the most recent failed call, cleared when a new call
    /// starts.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// All stored graph definitions.
    pub async fn list_graphs(&self) -> Option<GraphList> {
        self.call(self.request(Method::GET, "/graphs", None::<&()>))
            .await
    }

    /// Persist a new graph definition; backend-assigned fields (id, version,
    /// timestamps) may be sent empty.
    pub async fn create_graph(&self, definition: &GraphDefinition) -> Option<GraphDefinition> {
        self.call(self.request(Method::POST, "/graphs", Some(definition)))
            .await
    }

    pub async fn get_graph(&self, id: &str) -> Option<GraphDefinition> {
        self.call(self.request(Method::GET, &format!("/graphs/{id}"), None::<&()>))
            .await
    }

    pub async fn update_graph(
        &self,
        id: &str,
        definition: &GraphDefinition,
    ) -> Option<GraphDefinition> {
        self.call(self.request(Method::PUT, &format!("/graphs/{id}"), Some(definition)))
            .await
    }

    pub async fn delete_graph(&self, id: &str) -> bool {
        self.call(self.request::<_, DeleteOutcome>(
            Method::DELETE,
            &format!("/graphs/{id}"),
            None::<&()>,
        ))
        .await
        .map(|outcome| outcome.deleted)
        .unwrap_or(false)
    }

    pub async fn validate_graph(&self, id: &str) -> Option<ValidationResult> {
        self.call(self.request(Method::POST, &format!("/graphs/{id}/validate"), None::<&()>))
            .await
    }

    /// Run a stored graph. `initial_state` seeds the execution state; the
    /// backend reports progress on the `graph.*` event channels.
    pub async fn execute_graph(
        &self,
        id: &str,
        initial_state: Option<Map<String, Value>>,
    ) -> Option<ExecutionResult> {
        // No initial state means no key at all; the backend treats an
        // explicit null differently from an absent field.
        let body = match initial_state {
            Some(state) => json!({ "initial_state": state }),
            None => json!({}),
        };
        self.call(self.request(Method::POST, &format!("/graphs/{id}/execute"), Some(&body)))
            .await
    }

    /// Node palette supported by the backend.
    pub async fn node_types(&self) -> Option<Vec<NodeTypeInfo>> {
        self.call(self.request(Method::GET, "/node-types", None::<&()>))
            .await
    }

    /// Run one request under the shared state cell: `loading` held for the
    /// duration and reset regardless of outcome, `last_error` cleared first
    /// and set on failure.
    async fn call<T>(&self, request: impl Future<Output = Result<T, ApiError>>) -> Option<T> {
        self.loading.store(true, Ordering::SeqCst);
        *lock(&self.last_error) = None;

        let result = request.await;
        self.loading.store(false, Ordering::SeqCst);

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("builder api: {e}");
                *lock(&self.last_error) = Some(e.to_string());
                None
            }
        }
    }

    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = format!("{}/api/builder{path}", self.base_url);

        let mut request = self
            .client
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
            });
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        if !envelope.success {
            return Err(ApiError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "request rejected".to_string()),
            ));
        }
        envelope.data.ok_or(ApiError::MissingData)
    }
}
