mod client;

pub use client::{
    ApiErrorClass, FileMeta, KnowledgeDetail, KnowledgeFile, OpenWebUiClient, OpenWebUiError,
    UploadedFile,
};
