use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::model::{AskRequest, ChatRequest, ChatResponse, FitnessContext, McpTool, ModelOption};

/// The backend routes the console consumes.
///
/// `ApiClient` is the HTTP implementation; tests drive the console through
/// an in-memory fake instead.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn models(&self) -> ApiResult<Vec<ModelOption>>;
    async fn context(&self) -> ApiResult<FitnessContext>;
    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse>;
    async fn tools(&self) -> ApiResult<Vec<McpTool>>;
    async fn fitness_summary(&self) -> ApiResult<Value>;
    async fn ask_gemini(&self, request: &AskRequest) -> ApiResult<Value>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "backend request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%url, error = %e, "backend unreachable");
            ApiError::from(e)
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%method, %url, status = status.as_u16(), "backend returned error status");
            return Err(ApiError::from_status(status, &text));
        }

        tracing::debug!(%method, %url, status = status.as_u16(), bytes = text.len(), "backend response");
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn models(&self) -> ApiResult<Vec<ModelOption>> {
        self.json::<(), _>(Method::GET, "/ai/models", None).await
    }

    async fn context(&self) -> ApiResult<FitnessContext> {
        self.json::<(), _>(Method::GET, "/ai/context", None).await
    }

    async fn chat(&self, request: &ChatRequest) -> ApiResult<ChatResponse> {
        self.json(Method::POST, "/ai/chat", Some(request)).await
    }

    async fn tools(&self) -> ApiResult<Vec<McpTool>> {
        self.json::<(), _>(Method::GET, "/mcp/tools", None).await
    }

    async fn fitness_summary(&self) -> ApiResult<Value> {
        self.json::<(), _>(Method::POST, "/mcp/tools/fitness_summary", None)
            .await
    }

    async fn ask_gemini(&self, request: &AskRequest) -> ApiResult<Value> {
        self.json(Method::POST, "/mcp/tools/ask_gemini", Some(request))
            .await
    }
}
