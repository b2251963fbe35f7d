//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mediasync_core::SyncError;

use crate::error::ControlError;
use crate::protocol::ErrorBody;

impl ControlError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::Sync(SyncError::InvalidArgument(_)) | ControlError::InvalidMessage(_) => {
                StatusCode::BAD_REQUEST
            }
            ControlError::Sync(SyncError::NoMediaLoaded)
            | ControlError::Sync(SyncError::StaleRevision { .. }) => StatusCode::CONFLICT,
            ControlError::Sync(SyncError::TransportUnavailable(_))
            | ControlError::TransportUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ControlError::from(SyncError::InvalidArgument("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ControlError::from(SyncError::NoMediaLoaded).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ControlError::from(SyncError::StaleRevision {
                based_on: 1,
                current: 2
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ControlError::HttpError("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body() {
        let body = ErrorBody::from(&ControlError::from(SyncError::NoMediaLoaded));
        assert_eq!(body.error, "no-media-loaded");
        assert_eq!(body.message, "No media loaded");
    }
}
