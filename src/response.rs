use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

/// Body sent when a payload cannot be serialized.
pub const MARSHAL_FAILURE_BODY: &str =
    r#"{"error":"Internal Server Error","message":"Failed to marshal response"}"#;

/// A status code and a body encoded as JSON.
///
/// Unlike `axum::Json`, a serialization failure still produces a JSON body.
pub struct ApiJson<T>(pub StatusCode, pub T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        let ApiJson(status, body) = self;
        let (status, bytes) = match serde_json::to_vec(&body) {
            Ok(bytes) => (status, bytes),
            Err(e) => {
                error!(error = %e, "failed to serialize response body");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    MARSHAL_FAILURE_BODY.as_bytes().to_vec(),
                )
            }
        };
        (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            bytes,
        )
            .into_response()
    }
}
