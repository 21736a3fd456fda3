use thiserror::Error;

/// 单个文件传输失败的原因
#[derive(Error, Debug)]
pub enum TransferError {
    /// 用户暂停（可恢复，不计入失败）
    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload timed out")]
    Timeout,

    #[error("Upload failed: {status_code} {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

impl TransferError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// 收集文件时遇到的错误，条目会被跳过
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed entry: {0}")]
    Malformed(String),
}

impl CollectionError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 断点记录或元数据写入失败，只记录日志
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store rejected write: {status_code} {message}")]
    Rejected {
        status_code: u16,
        message: String,
    },
}

/// 调度器句柄的调用错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Manager shut down")]
    ManagerShutdown,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session has no items to upload")]
    EmptySession,
}

impl EngineError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

/// Error alias
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
