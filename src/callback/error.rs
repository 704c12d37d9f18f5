use thiserror::Error;

use super::traits::Stage;
use crate::database::StoreError;
use crate::error::Error;

/// Failure returned by a callback or action handler.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Message meant for the client, rendered at the status of the stage
    #[error("{0}")]
    Safe(String),

    /// Error with an explicit status, rendered as is
    #[error(transparent)]
    Status(#[from] Error),

    /// Anything else. The message is logged and never shown to the client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CallbackError {
    pub fn safe(message: impl Into<String>) -> Self {
        CallbackError::Safe(message.into())
    }

    /// The error callbacks use to deny access
    pub fn access_denied() -> Self {
        CallbackError::Status(Error::unauthorized("access denied"))
    }

    /// Classify the error for the stage it was raised at
    pub fn into_error(self, stage: Stage) -> Error {
        match self {
            CallbackError::Safe(message) => match stage.status() {
                400 => Error::bad_request(message),
                401 => Error::unauthorized(message),
                status => Error::status(status, message),
            },
            CallbackError::Status(err) => err,
            CallbackError::Internal(err) => Error::internal(format!("{:#}", err)),
        }
    }
}

impl From<StoreError> for CallbackError {
    fn from(err: StoreError) -> Self {
        CallbackError::Status(err.into())
    }
}

impl From<crate::database::RecordError> for CallbackError {
    fn from(err: crate::database::RecordError) -> Self {
        CallbackError::Internal(err.into())
    }
}
