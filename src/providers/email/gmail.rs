//! Gmail API client implementation.
//!
//! This module provides a [`MailApi`] implementation using the Gmail REST API.
//! The client is stateless apart from its HTTP connection pool: the bearer
//! token is supplied per call and never cached.
//!
//! # API Usage
//!
//! This client uses the Gmail API v1:
//! - `users.messages.list` for paging through message IDs
//! - `users.messages.get` (`format=metadata`) for header subsets
//! - `users.messages.trash` for moving a message to the trash
//! - `users.messages.batchModify` for label changes on many messages
//! - `users.settings.filters.create` / `list` for sender filters

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{LabelModification, ListRequest, MailApi, MessagePage, ProviderError, Result};
use crate::config::ApiSettings;
use crate::domain::{Credential, Header, MessageId, MessageMetadata, SenderFilter};

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<GmailMessageRef>>,
    next_page_token: Option<String>,
    #[allow(dead_code)]
    result_size_estimate: Option<u32>,
}

/// Message reference as returned by `messages.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageRef {
    id: String,
    #[allow(dead_code)]
    thread_id: Option<String>,
}

/// Gmail API message in `metadata` format.
#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    payload: Option<GmailMessagePayload>,
}

/// Gmail message payload; only headers are requested.
#[derive(Debug, Deserialize)]
struct GmailMessagePayload {
    headers: Option<Vec<GmailHeader>>,
}

/// Gmail message header.
#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail filters list response.
#[derive(Debug, Deserialize)]
struct FilterListResponse {
    filter: Option<Vec<SenderFilter>>,
}

/// Gmail batch modify request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchModifyRequest<'a> {
    ids: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: &'a Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: &'a Vec<String>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl From<GmailMessage> for MessageMetadata {
    fn from(msg: GmailMessage) -> Self {
        let headers = msg
            .payload
            .and_then(|p| p.headers)
            .unwrap_or_default()
            .into_iter()
            .map(|h| Header::new(h.name, h.value))
            .collect();

        MessageMetadata::new(msg.id, headers)
    }
}

impl From<MessageListResponse> for MessagePage {
    fn from(response: MessageListResponse) -> Self {
        Self {
            message_ids: response
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|m| MessageId::from(m.id))
                .collect(),
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        }
    }
}

/// Gmail API client.
///
/// Implements [`MailApi`] using the Gmail REST API with bearer-token
/// authentication. No call is retried here.
///
/// # Example
///
/// ```ignore
/// use mailsweep::domain::Credential;
/// use mailsweep::providers::email::{GmailClient, ListRequest, MailApi};
///
/// let client = GmailClient::new();
/// let credential = Credential::new(token);
/// let page = client.list_messages(&credential, &ListRequest::new(100)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct GmailClient {
    /// HTTP client for API requests.
    client: reqwest::Client,
    /// Base URL, `.../gmail/v1/users/me`.
    base_url: Url,
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailClient {
    /// Creates a client against the public Gmail endpoint with transport defaults.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: ApiSettings::default_base_url(),
        }
    }

    /// Creates a client from API settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Connection`] if the base URL is invalid or the
    /// HTTP client cannot be built.
    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        let base_url = settings
            .base_url()
            .map_err(|e| ProviderError::Connection(format!("invalid base URL: {}", e)))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Connection(format!("http client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Returns the base URL requests are issued against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL for an endpoint below the base, percent-encoding segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Builds authorization headers for API requests.
    fn auth_headers(credential: &Credential) -> Result<HeaderMap> {
        if credential.is_empty() {
            return Err(ProviderError::Unauthenticated);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credential.token().trim()))
                .map_err(|_| ProviderError::Unauthenticated)?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Makes an authenticated GET request and decodes the JSON body.
    async fn get<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        let headers = Self::auth_headers(credential)?;

        let response = self
            .client
            .get(url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        Self::handle_response(response).await
    }

    /// Makes an authenticated POST request whose response body is ignored.
    async fn post_no_response<B: Serialize + ?Sized>(
        &self,
        credential: &Credential,
        url: Url,
        body: Option<&B>,
    ) -> Result<()> {
        let headers = Self::auth_headers(credential)?;

        let mut request = self.client.post(url).headers(headers);
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_LENGTH, 0),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        // 204 No Content is a success with nothing to decode.
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }
        Ok(())
    }

    /// Handles API response, checking for errors.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("parse response: {}", e)))
    }

    /// Handles API error responses.
    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::error_from_body(status, &body)
    }

    /// Maps a non-2xx status and its body to a [`ProviderError::Api`].
    fn error_from_body(status: StatusCode, body: &str) -> ProviderError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|e| e.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown API error")
                    .to_string()
            });

        tracing::debug!(status = status.as_u16(), %message, "Gmail API error");
        ProviderError::Api {
            status: status.as_u16(),
            message,
        }
    }

    fn list_query(request: &ListRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![("maxResults", request.page_size.to_string())];
        if let Some(token) = &request.page_token {
            query.push(("pageToken", token.clone()));
        }
        if let Some(q) = &request.query {
            query.push(("q", q.clone()));
        }
        query
    }

    fn metadata_query(header_names: &[String]) -> Vec<(&'static str, String)> {
        let mut query = vec![("format", "metadata".to_string())];
        query.extend(
            header_names
                .iter()
                .map(|name| ("metadataHeaders", name.clone())),
        );
        query
    }
}

#[async_trait]
impl MailApi for GmailClient {
    async fn list_messages(
        &self,
        credential: &Credential,
        request: &ListRequest,
    ) -> Result<MessagePage> {
        let url = self.endpoint(&["messages"]);
        let response: MessageListResponse = self
            .get(credential, url, &Self::list_query(request))
            .await?;
        Ok(response.into())
    }

    async fn get_message_metadata(
        &self,
        credential: &Credential,
        id: &MessageId,
        header_names: &[String],
    ) -> Result<MessageMetadata> {
        let url = self.endpoint(&["messages", &id.0]);
        let message: GmailMessage = self
            .get(credential, url, &Self::metadata_query(header_names))
            .await?;
        Ok(message.into())
    }

    async fn trash_message(&self, credential: &Credential, id: &MessageId) -> Result<()> {
        let url = self.endpoint(&["messages", &id.0, "trash"]);
        self.post_no_response::<()>(credential, url, None).await
    }

    async fn batch_modify(
        &self,
        credential: &Credential,
        ids: &[MessageId],
        modification: &LabelModification,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = self.endpoint(&["messages", "batchModify"]);
        let body = BatchModifyRequest {
            ids: ids.iter().map(|id| id.0.as_str()).collect(),
            add_label_ids: &modification.add_label_ids,
            remove_label_ids: &modification.remove_label_ids,
        };
        self.post_no_response(credential, url, Some(&body)).await
    }

    async fn create_filter(&self, credential: &Credential, filter: &SenderFilter) -> Result<()> {
        let url = self.endpoint(&["settings", "filters"]);
        self.post_no_response(credential, url, Some(filter)).await?;

        tracing::info!(from = ?filter.criteria.from, "Filter created via Gmail API");
        Ok(())
    }

    async fn list_filters(&self, credential: &Credential) -> Result<Vec<SenderFilter>> {
        let url = self.endpoint(&["settings", "filters"]);
        let response: FilterListResponse = self.get(credential, url, &[]).await?;
        Ok(response.filter.unwrap_or_default())
    }
}
