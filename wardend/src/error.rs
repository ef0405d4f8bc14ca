// ABOUTME: the daemon-side error taxonomy; every variant maps onto one wire-level kind.

use warden_common::{ApiError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("path escapes the workspace: {0}")]
    PathTraversal(String),
    #[error("{0}")]
    Critical(String),
    #[error("{0}")]
    SystemDirectory(String),
    #[error("{0} is a credential file and cannot be accessed")]
    Credential(String),
    #[error("command blocked: {0}")]
    CommandBlocked(String),
    #[error("command does not match any allowed pattern: {0}")]
    CommandNotAllowed(String),
    #[error("{0} already exists; pass overwrite to replace it")]
    Exists(String),
    #[error("{0} does not exist")]
    Missing(String),
    #[error("{0} is protected; pass force to delete it")]
    Protected(String),
    #[error("{0} is not a directory")]
    NotDirectory(String),
    #[error("{path} is {size} bytes, above the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("invalid bulk payload: {0}")]
    InvalidBulkPayload(String),
    #[error("backup failed for {path}: {reason}")]
    Backup { path: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unknown template: {0}")]
    UnknownTemplate(String),
    #[error("project {0} already exists")]
    ProjectExists(String),
    #[error("browser: {0}")]
    Browser(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl OpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpError::PathTraversal(_) => ErrorKind::PathTraversal,
            OpError::Critical(_) => ErrorKind::Critical,
            OpError::SystemDirectory(_) => ErrorKind::SystemDirectory,
            OpError::Credential(_) => ErrorKind::Credential,
            OpError::CommandBlocked(_) => ErrorKind::CommandBlocked,
            OpError::CommandNotAllowed(_) => ErrorKind::CommandNotAllowed,
            OpError::Exists(_) => ErrorKind::Exists,
            OpError::Missing(_) => ErrorKind::Missing,
            OpError::Protected(_) => ErrorKind::Protected,
            OpError::NotDirectory(_) => ErrorKind::NotDirectory,
            OpError::TooLarge { .. } => ErrorKind::TooLarge,
            OpError::InvalidBulkPayload(_) => ErrorKind::InvalidBulkPayload,
            OpError::Backup { .. } => ErrorKind::BackupFailed,
            OpError::Io(_) => ErrorKind::Io,
            OpError::UnknownTemplate(_) => ErrorKind::UnknownTemplate,
            OpError::ProjectExists(_) => ErrorKind::ProjectExists,
            OpError::Browser(_) => ErrorKind::Browser,
            OpError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            OpError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn to_api(&self) -> ApiError {
        ApiError::new(self.kind(), self.to_string())
    }
}
