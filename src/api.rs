use crate::credentials::Credentials;
use crate::error::{extract_detail, ApiError};
use crate::models::{
    AccessToken, ChatEvent, ChatReply, ChatRequest, HealthStatus, HistoryEntry, LoginForm,
    MigratedConversation, MigrationRequest, MigrationSummary, RemoteConversation, Report,
    ReportEnvelope, ReportRequest, UserProfile,
};
use crate::sse::SseClient;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

// Alias for the stream of chat events we return
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent, ApiError>> + Send>>;

/// Account operations used by the auth store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<AccessToken, ApiError>;
    async fn login(&self, email: &str, password: &str) -> Result<AccessToken, ApiError>;
    async fn get_current_user(&self) -> Result<UserProfile, ApiError>;
    async fn migrate_data(&self, entries: &[HistoryEntry]) -> Result<MigrationSummary, ApiError>;
}

/// Server-side conversation history used by the history store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn list_conversations(&self, limit: u32) -> Result<Vec<RemoteConversation>, ApiError>;
    async fn get_conversation(&self, id: &str) -> Result<RemoteConversation, ApiError>;
    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError>;
}

/// Thin typed client for the conversation service.
pub struct ApiClient {
    http: Client,
    base_url: String,
    credentials: Arc<Credentials>,
    chat_stream: SseClient,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<Credentials>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Request {
                message: "Failed to create HTTP client".to_string(),
                source,
            })?;
        // Streamed replies can outlive the request timeout
        let stream_http = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|source| ApiError::Request {
                message: "Failed to create HTTP client".to_string(),
                source,
            })?;
        let chat_stream = SseClient::new(stream_http, format!("{}/api/chat/stream", base_url));

        Ok(Self {
            http,
            base_url,
            credentials,
            chat_stream,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a chat message and get the full reply in one round-trip.
    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        log::info!("Sending chat message for session {}", request.session_id);
        let builder = self.http.post(self.url("/api/chat")).json(request);
        self.execute(builder, "Failed to send message").await
    }

    /// Send a chat message and receive the reply as a stream of events.
    ///
    /// Events that are valid JSON but not a known [`ChatEvent`] are logged and skipped.
    pub async fn send_message_streamed(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatEventStream, ApiError> {
        log::info!("Sending STREAM chat message for session {}", request.session_id);
        let bearer = self.credentials.current();
        let events = match self.chat_stream.stream(request, bearer.as_deref()).await {
            Ok(events) => events,
            Err(e) => {
                if e.is_unauthorized() {
                    self.forget_credentials().await;
                }
                return Err(e);
            }
        };

        let chat_events = events.filter_map(|item| async move {
            match item {
                Ok(value) => match serde_json::from_value::<ChatEvent>(value) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => {
                        log::warn!("Skipping unrecognised chat event: {}", e);
                        None
                    }
                },
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(chat_events))
    }

    /// Abort the in-flight streamed reply, if any.
    pub fn cancel_stream(&self) {
        self.chat_stream.cancel();
    }

    pub async fn generate_report(&self, request: &ReportRequest) -> Result<Report, ApiError> {
        log::info!("Requesting report for session {}", request.session_id);
        let builder = self
            .http
            .post(self.url("/api/report/generate"))
            .json(request);
        let envelope: ReportEnvelope = self.execute(builder, "Failed to generate report").await?;
        Ok(envelope.report)
    }

    pub async fn check_health(&self) -> Result<HealthStatus, ApiError> {
        let builder = self.http.get(self.url("/health"));
        self.execute(builder, "API health check failed")
            .await
            .map_err(|e| {
                log::debug!("Health check failed: {}", e);
                ApiError::HealthCheck
            })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        fallback: &str,
    ) -> Result<T, ApiError> {
        let response = self.dispatch(builder, fallback).await?;
        let body = response
            .text()
            .await
            .map_err(|source| self.transport_error(source, fallback))?;
        serde_json::from_str(&body).map_err(|source| {
            log::error!("Unexpected response body ({}): {}", source, body);
            ApiError::Decode {
                message: fallback.to_string(),
                source,
            }
        })
    }

    /// Sends the request with the bearer credential attached and maps failures.
    async fn dispatch(&self, builder: RequestBuilder, fallback: &str) -> Result<Response, ApiError> {
        let builder = match self.credentials.current() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|source| self.transport_error(source, fallback))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.forget_credentials().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("API Error: {} {}", status, body);
            return Err(ApiError::Server {
                status: status.as_u16(),
                detail: extract_detail(&body),
                message: fallback.to_string(),
            });
        }
        Ok(response)
    }

    fn transport_error(&self, source: reqwest::Error, fallback: &str) -> ApiError {
        let message = fallback.to_string();
        if source.is_builder() {
            log::error!("Error: {}", source);
            ApiError::Request { message, source }
        } else {
            log::error!("Network Error: {}", source);
            ApiError::Transport { message, source }
        }
    }

    async fn forget_credentials(&self) {
        if self.credentials.is_present() {
            log::warn!("Server rejected the bearer token; clearing stored credential");
        }
        self.credentials.clear().await;
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn register(&self, email: &str, password: &str) -> Result<AccessToken, ApiError> {
        let builder = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&LoginForm { email, password });
        self.execute(builder, "Registration failed").await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AccessToken, ApiError> {
        let builder = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginForm { email, password });
        self.execute(builder, "Login failed").await
    }

    async fn get_current_user(&self) -> Result<UserProfile, ApiError> {
        let builder = self.http.get(self.url("/api/auth/me"));
        self.execute(builder, "Failed to fetch user").await
    }

    async fn migrate_data(&self, entries: &[HistoryEntry]) -> Result<MigrationSummary, ApiError> {
        let request = MigrationRequest {
            conversations: entries.iter().map(MigratedConversation::from).collect(),
        };
        let builder = self.http.post(self.url("/api/migrate")).json(&request);
        self.execute(builder, "Migration failed").await
    }
}

#[async_trait]
impl ConversationApi for ApiClient {
    async fn list_conversations(&self, limit: u32) -> Result<Vec<RemoteConversation>, ApiError> {
        let builder = self
            .http
            .get(self.url("/api/conversations"))
            .query(&[("limit", limit)]);
        self.execute(builder, "Failed to load conversations").await
    }

    async fn get_conversation(&self, id: &str) -> Result<RemoteConversation, ApiError> {
        let builder = self.http.get(self.url(&format!("/api/conversations/{}", id)));
        self.execute(builder, "Failed to load conversation").await
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        log::warn!("Deleting remote conversation {}", id);
        let builder = self
            .http
            .delete(self.url(&format!("/api/conversations/{}", id)));
        self.dispatch(builder, "Failed to delete conversation")
            .await
            .map(|_| ())
    }
}
