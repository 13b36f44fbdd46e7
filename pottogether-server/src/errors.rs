use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use pottogether_collab::{AuthError, CollabError, DatabaseError, ErrorKind};
use thiserror::Error;

use crate::{serialized::Envelope, storage::StorageError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Collab(#[from] CollabError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("Upload is larger than {} MiB", .limit / (1024 * 1024))]
    UploadTooLarge { limit: usize },
    #[error("Upload failed: {0}")]
    Storage(#[from] StorageError),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Collab(e) => e.kind(),
            Self::Auth(e) => e.kind(),
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::BadRequest(_) | Self::UploadTooLarge { .. } => ErrorKind::InvalidInput,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    fn as_status_code(&self) -> StatusCode {
        if let Self::UploadTooLarge { .. } = self {
            return StatusCode::PAYLOAD_TOO_LARGE;
        }

        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        // Internal details stay in the log
        let message = if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(Envelope::<()>::failure(message))).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        Self::Collab(value.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn maps_kinds_to_status_codes() {
        let cases = [
            (
                ServerError::BadRequest("nope".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::Unauthorized("Missing authorization"),
                StatusCode::UNAUTHORIZED,
            ),
            (
                DatabaseError::NotMember {
                    room_id: 1,
                    user_id: 2,
                }
                .into(),
                StatusCode::NOT_FOUND,
            ),
            (
                DatabaseError::RoomFull { room_id: 1 }.into(),
                StatusCode::CONFLICT,
            ),
            (
                DatabaseError::AlreadyCompleted { record_id: 1 }.into(),
                StatusCode::CONFLICT,
            ),
            (
                DatabaseError::Invariant("member count below zero".to_string()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServerError::Auth(AuthError::InvalidCredentials),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServerError::UploadTooLarge { limit: 10 * 1024 * 1024 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.as_status_code(), status, "{error}");
        }
    }

    #[tokio::test]
    async fn hides_internal_details() {
        let error: ServerError =
            DatabaseError::Invariant("member count of room 3 would drop below zero".to_string())
                .into();

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["isSuccess"], false);

        let response = ServerError::UploadTooLarge { limit: 10 * 1024 * 1024 }.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Upload is larger than 10 MiB");
    }
}
