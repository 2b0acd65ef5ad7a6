use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug)]
pub enum FileMetaError {
    #[error("internal error: {0}")]
    Internal(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("invalid param: {0}")]
    InvalidParam(String),
    #[error("db error: {0}")]
    DbError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("remote error: {0}")]
    RemoteError(String),
}

impl FileMetaError {
    pub fn from_http_status(code: StatusCode, info: String) -> Self {
        match code {
            StatusCode::NOT_FOUND => FileMetaError::NotFound(info),
            StatusCode::BAD_REQUEST => FileMetaError::InvalidParam(info),
            StatusCode::INTERNAL_SERVER_ERROR => FileMetaError::Internal(info),
            _ => FileMetaError::RemoteError(format!("HTTP error: {} for {}", code, info)),
        }
    }

    /// Status code the API layer answers with. Only `NotFound` and
    /// `InvalidParam` are client errors; everything else is infrastructure.
    pub fn http_status(&self) -> StatusCode {
        match self {
            FileMetaError::NotFound(_) => StatusCode::NOT_FOUND,
            FileMetaError::InvalidParam(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FileMetaError::Internal(_) => "internal",
            FileMetaError::NotFound(_) => "not_found",
            FileMetaError::InvalidParam(_) => "invalid_param",
            FileMetaError::DbError(_) => "db_error",
            FileMetaError::IoError(_) => "io_error",
            FileMetaError::InvalidData(_) => "invalid_data",
            FileMetaError::RemoteError(_) => "remote_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FileMetaError::NotFound(_))
    }
}

pub type FileMetaResult<T> = std::result::Result<T, FileMetaError>;

impl From<std::io::Error> for FileMetaError {
    fn from(err: std::io::Error) -> Self {
        FileMetaError::IoError(err.to_string())
    }
}
