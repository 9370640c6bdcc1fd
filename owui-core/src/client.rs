use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum OpenWebUiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("upload response did not contain a file id")]
    MissingFileId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct OpenWebUiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl OpenWebUiClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, OpenWebUiError> {
        Self::with_http(Client::new(), base_url, token)
    }

    /// Builds a client on top of a preconfigured `reqwest::Client`, e.g. one
    /// carrying a per-request timeout.
    pub fn with_http(
        http: Client,
        base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self, OpenWebUiError> {
        let mut base_url = Url::parse(base_url)?;
        // Keep a trailing slash so relative joins stay under a sub-path
        // deployment ("https://host/webui/").
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn upload_file(
        &self,
        filename: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<UploadedFile, OpenWebUiError> {
        let url = self.endpoint("api/v1/files/")?;
        let part = Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await?;
        let payload: UploadResponse = Self::handle_response(response).await?;
        payload.into_uploaded().ok_or(OpenWebUiError::MissingFileId)
    }

    pub async fn update_file_content(
        &self,
        file_id: &str,
        content: &str,
    ) -> Result<(), OpenWebUiError> {
        let url = self.endpoint(&format!("api/v1/files/{file_id}/data/content/update"))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&ContentUpdateRequest { content })
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), OpenWebUiError> {
        let url = self.endpoint(&format!("api/v1/files/{file_id}"))?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    pub async fn add_file_to_knowledge(
        &self,
        knowledge_id: &str,
        file_id: &str,
    ) -> Result<(), OpenWebUiError> {
        let url = self.endpoint(&format!("api/v1/knowledge/{knowledge_id}/file/add"))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&KnowledgeFileRequest { file_id })
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    pub async fn remove_file_from_knowledge(
        &self,
        knowledge_id: &str,
        file_id: &str,
    ) -> Result<(), OpenWebUiError> {
        let url = self.endpoint(&format!("api/v1/knowledge/{knowledge_id}/file/remove"))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&KnowledgeFileRequest { file_id })
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    pub async fn get_knowledge(&self, knowledge_id: &str) -> Result<KnowledgeDetail, OpenWebUiError> {
        let url = self.endpoint(&format!("api/v1/knowledge/{knowledge_id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .header("Accept", "application/json")
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, OpenWebUiError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, OpenWebUiError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<(), OpenWebUiError> {
        if response.status().is_success() {
            tracing::debug!(status = %response.status(), url = %response.url(), "request succeeded");
            Ok(())
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> OpenWebUiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        OpenWebUiError::Api { status, body }
    }
}

impl OpenWebUiError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            OpenWebUiError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            OpenWebUiError::Request(err) => err.is_timeout() || err.is_connect(),
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            OpenWebUiError::Api { status, .. } => Some(*status),
            OpenWebUiError::Request(err) => err.status(),
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub filename: Option<String>,
}

// Depending on the server version the id is either top-level or nested
// under "data".
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    #[serde(default)]
    id: Option<String>,
}

impl UploadResponse {
    fn into_uploaded(self) -> Option<UploadedFile> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .or_else(|| self.data.and_then(|data| data.id))
            .filter(|id| !id.is_empty())?;
        Some(UploadedFile {
            id,
            filename: self.filename,
        })
    }
}

#[derive(Debug, Serialize)]
struct ContentUpdateRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct KnowledgeFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct KnowledgeDetail {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<KnowledgeFile>>,
}

impl KnowledgeDetail {
    pub fn into_files(self) -> Vec<KnowledgeFile> {
        self.files.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub meta: Option<FileMeta>,
}

impl KnowledgeFile {
    /// Name the file is exposed under: the stored filename, then the
    /// metadata name, then the id itself.
    pub fn display_name(&self) -> &str {
        self.filename
            .as_deref()
            .or_else(|| self.meta.as_ref().and_then(|meta| meta.name.as_deref()))
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}
