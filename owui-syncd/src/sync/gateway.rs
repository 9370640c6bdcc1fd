use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use owui_core::{OpenWebUiClient, OpenWebUiError};
use thiserror::Error;

use super::scanner::extension_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateFile,
    UpdateContent,
    Link,
    Unlink,
    DeleteFile,
    ListCollection,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateFile => "create_file",
            Operation::UpdateContent => "update_file_content",
            Operation::Link => "link_to_collection",
            Operation::Unlink => "unlink_from_collection",
            Operation::DeleteFile => "delete_file",
            Operation::ListCollection => "list_collection_files",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} is not supported: {reason}")]
    Unsupported {
        operation: Operation,
        reason: String,
    },
    #[error("{operation} rejected (status {status:?}): {body}")]
    RemoteRejected {
        operation: Operation,
        status: Option<u16>,
        body: String,
        retryable: bool,
    },
}

impl GatewayError {
    pub fn rejected(operation: Operation, err: OpenWebUiError) -> Self {
        let status = err.status().map(|status| status.as_u16());
        let retryable = err.is_retryable();
        let body = match err {
            OpenWebUiError::Api { body, .. } => body,
            other => other.to_string(),
        };
        GatewayError::RemoteRejected {
            operation,
            status,
            body,
            retryable,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            GatewayError::Unsupported { operation, .. }
            | GatewayError::RemoteRejected { operation, .. } => *operation,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::RemoteRejected { status, .. } => *status,
            GatewayError::Unsupported { .. } => None,
        }
    }

    /// The target no longer exists remotely.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub display_name: String,
    pub file_id: String,
}

/// Remote side of the sync: a file store plus one knowledge collection the
/// stored files are attached to.
#[async_trait]
pub trait RemoteContentGateway: Send + Sync {
    /// Whether `update_file_content` can replace content in place.
    fn supports_content_update(&self) -> bool;

    async fn create_file(
        &self,
        display_name: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, GatewayError>;

    async fn update_file_content(&self, file_id: &str, content: Vec<u8>)
    -> Result<(), GatewayError>;

    async fn link_to_collection(&self, file_id: &str) -> Result<(), GatewayError>;

    async fn unlink_from_collection(&self, file_id: &str) -> Result<(), GatewayError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), GatewayError>;

    async fn list_collection_files(&self) -> Result<Vec<RemoteFile>, GatewayError>;
}

/// Gateway backed by one Open WebUI knowledge collection.
#[derive(Clone)]
pub struct OpenWebUiGateway {
    client: OpenWebUiClient,
    knowledge_id: String,
}

impl OpenWebUiGateway {
    pub fn new(client: OpenWebUiClient, knowledge_id: impl Into<String>) -> Self {
        Self {
            client,
            knowledge_id: knowledge_id.into(),
        }
    }

    pub fn knowledge_id(&self) -> &str {
        &self.knowledge_id
    }
}

#[async_trait]
impl RemoteContentGateway for OpenWebUiGateway {
    fn supports_content_update(&self) -> bool {
        true
    }

    async fn create_file(
        &self,
        display_name: &str,
        content: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, GatewayError> {
        let uploaded = self
            .client
            .upload_file(display_name, content, mime_type)
            .await
            .map_err(|err| GatewayError::rejected(Operation::CreateFile, err))?;
        tracing::debug!(display_name, file_id = %uploaded.id, "remote file created");
        Ok(uploaded.id)
    }

    async fn update_file_content(
        &self,
        file_id: &str,
        content: Vec<u8>,
    ) -> Result<(), GatewayError> {
        // The content endpoint takes extracted text; binary files cannot be
        // replaced through it.
        let text = String::from_utf8(content).map_err(|_| GatewayError::Unsupported {
            operation: Operation::UpdateContent,
            reason: "content is not valid UTF-8 text".to_string(),
        })?;
        self.client
            .update_file_content(file_id, &text)
            .await
            .map_err(|err| GatewayError::rejected(Operation::UpdateContent, err))
    }

    async fn link_to_collection(&self, file_id: &str) -> Result<(), GatewayError> {
        self.client
            .add_file_to_knowledge(&self.knowledge_id, file_id)
            .await
            .map_err(|err| GatewayError::rejected(Operation::Link, err))
    }

    async fn unlink_from_collection(&self, file_id: &str) -> Result<(), GatewayError> {
        self.client
            .remove_file_from_knowledge(&self.knowledge_id, file_id)
            .await
            .map_err(|err| GatewayError::rejected(Operation::Unlink, err))
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), GatewayError> {
        self.client
            .delete_file(file_id)
            .await
            .map_err(|err| GatewayError::rejected(Operation::DeleteFile, err))
    }

    async fn list_collection_files(&self) -> Result<Vec<RemoteFile>, GatewayError> {
        let knowledge = self
            .client
            .get_knowledge(&self.knowledge_id)
            .await
            .map_err(|err| GatewayError::rejected(Operation::ListCollection, err))?;
        Ok(knowledge
            .into_files()
            .into_iter()
            .map(|file| RemoteFile {
                display_name: file.display_name().to_string(),
                file_id: file.id,
            })
            .collect())
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_str() {
        "txt" | "log" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "rtf" => "application/rtf",
        "epub" => "application/epub+zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
