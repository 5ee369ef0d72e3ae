//! reqwest implementation of the backend calls.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{Artifact, LocalFile};
use crate::status::{StatusPoller, StatusUpdate};

use super::{Answer, Backend, SessionRequest, UploadAccepted};

/// Endpoint paths of the deployed backend.
mod endpoint {
    use crate::models::ArtifactKind;

    pub const UPLOAD: &str = "/api/upload/content";
    pub const SESSION: &str = "/api/chat/session";
    pub const SESSIONS: &str = "/api/chat/sessions";
    pub const COMPARE: &str = "/api/documents/compare";

    pub fn reprocess(doc_id: &str) -> String {
        format!("/api/process/{}", doc_id)
    }

    pub fn status(doc_id: &str) -> String {
        format!("/api/documents/{}/status", doc_id)
    }

    pub fn query(doc_id: &str) -> String {
        format!("/api/documents/{}/query", doc_id)
    }

    pub fn summarize(doc_id: &str) -> String {
        format!("/api/documents/{}/summarize", doc_id)
    }

    pub fn summary(doc_id: &str) -> String {
        format!("/api/documents/{}/summary", doc_id)
    }

    pub fn export_pdf(kind: ArtifactKind) -> String {
        format!("/api/documents/{}/export-pdf", kind)
    }

    pub fn session(session_id: &str) -> String {
        format!("{}/{}", SESSION, session_id)
    }

    pub fn session_message(session_id: &str) -> String {
        format!("{}/{}/message", SESSION, session_id)
    }
}

/// Chat session as listed by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSummary {
    #[serde(alias = "id")]
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "documentId")]
    pub document_id: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
}

/// One turn of a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    /// `user` or `ai`
    pub role: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A chat session with its history.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Messages appended by `send_message`: the question and the answer.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageReply {
    pub messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Deserialize)]
struct SessionList {
    #[serde(default)]
    sessions: Vec<SessionSummary>,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: serde_json::Value,
}

/// FastAPI error body
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Backend client over HTTP, authenticated with the shared [`AuthContext`].
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    auth: AuthContext,
}

impl HttpBackend {
    pub fn new(settings: &Settings, auth: AuthContext) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: settings.backend_base(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.auth.bearer().await?;
        Ok(builder.bearer_auth(token))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authorized(builder).await?.send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        Ok(self.send(builder).await?.json().await?)
    }

    /// Chat sessions of the signed-in user.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let list: SessionList = self
            .send_json(self.client.get(self.url(endpoint::SESSIONS)))
            .await?;
        Ok(list.sessions)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionDetail> {
        self.send_json(self.client.get(self.url(&endpoint::session(session_id))))
            .await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.send(self.client.delete(self.url(&endpoint::session(session_id))))
            .await?;
        tracing::info!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    /// Post a chat message; returns the question and the answer.
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<MessageReply> {
        let builder = self
            .client
            .post(self.url(&endpoint::session_message(session_id)))
            .json(&serde_json::json!({ "text": text }));
        self.send_json(builder).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn upload(&self, file: &LocalFile) -> Result<UploadAccepted> {
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.mime)?;
        let form = Form::new().part("file", part);

        let accepted: UploadAccepted = self
            .send_json(self.client.post(self.url(endpoint::UPLOAD)).multipart(form))
            .await?;
        tracing::info!(file = %file.name, doc_id = %accepted.id, "Upload accepted");
        Ok(accepted)
    }

    async fn reprocess(&self, doc_id: &str) -> Result<()> {
        self.send(self.client.post(self.url(&endpoint::reprocess(doc_id))))
            .await?;
        Ok(())
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<String> {
        let builder = self
            .client
            .post(self.url(endpoint::SESSION))
            .json(&request.body());
        let created: SessionCreated = self.send_json(builder).await?;
        tracing::info!(session_id = %created.session_id, "Session created");
        Ok(created.session_id)
    }

    async fn ask(&self, doc_id: &str, question: &str) -> Result<Answer> {
        let builder = self
            .client
            .post(self.url(&endpoint::query(doc_id)))
            .json(&serde_json::json!({ "question": question }));
        self.send_json(builder).await
    }

    async fn summarize(&self, doc_id: &str) -> Result<String> {
        let response: SummaryResponse = self
            .send_json(self.client.post(self.url(&endpoint::summarize(doc_id))))
            .await?;
        Ok(summary_text(response.summary))
    }

    async fn analyze(&self, doc_id: &str) -> Result<serde_json::Value> {
        self.send_json(self.client.get(self.url(&endpoint::summary(doc_id))))
            .await
    }

    async fn compare(&self, doc_ids: &[String]) -> Result<serde_json::Value> {
        let builder = self
            .client
            .post(self.url(endpoint::COMPARE))
            .json(&serde_json::json!({ "document_ids": doc_ids }));
        self.send_json(builder).await
    }

    async fn export_pdf(&self, artifact: &Artifact) -> Result<Bytes> {
        let builder = self
            .client
            .post(self.url(&endpoint::export_pdf(artifact.kind)))
            .json(&artifact.body);
        Ok(self.send(builder).await?.bytes().await?)
    }
}

#[async_trait]
impl StatusPoller for HttpBackend {
    async fn fetch_status(&self, doc_id: &str) -> Result<StatusUpdate> {
        self.send_json(self.client.get(self.url(&endpoint::status(doc_id))))
            .await
    }
}

/// Map non-2xx responses to [`Error::Backend`], keeping FastAPI's `detail`.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Backend {
        status: status.as_u16(),
        message: error_message(&body, status.canonical_reason().unwrap_or("error")),
    })
}

fn error_message(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => fallback.to_string(),
    }
}

/// The summarize endpoint returns either a string or a list of bullet lines.
fn summary_text(summary: serde_json::Value) -> String {
    match summary {
        serde_json::Value::String(text) => text,
        serde_json::Value::Array(lines) => lines
            .iter()
            .filter_map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
