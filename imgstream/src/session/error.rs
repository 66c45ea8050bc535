//! Session errors.

use thiserror::Error;

use super::SessionId;
use crate::coalesce::CoalesceError;
use crate::handler::HandlerError;
use crate::request::FileId;

/// Errors returned by session and registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The request names a file the session has not opened.
    #[error("file {0} is not open")]
    UnknownFile(FileId),

    /// The file id is already in use in this session.
    #[error("file {0} is already open")]
    FileAlreadyOpen(FileId),

    /// No connected session has this id.
    #[error("session {0} is not connected")]
    UnknownSession(SessionId),

    /// The handler rejected an inline request.
    #[error("{0}")]
    Handler(#[from] HandlerError),
}

impl From<CoalesceError> for SessionError {
    fn from(err: CoalesceError) -> Self {
        match err {
            CoalesceError::UnknownFile(file_id) => SessionError::UnknownFile(file_id),
        }
    }
}
