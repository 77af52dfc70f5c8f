//! Renders the request outcome for the caller.
//!
//! Only coarse success/failure and a generic message ever leave the service;
//! details stay in the log. Every outcome is a `200 OK`, the `success` flag is
//! the signal.

use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const SENT: &str = "Email sent successfully!";
pub const DENIED: &str = "Error: Invalid or missing secret word.";
pub const SEND_FAILED: &str = "Error: Failed to send email.";

/// Structured response body: `{"success": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsePayload {
    pub success: bool,
    pub message: String,
}

/// JSON when `as_json`, otherwise the bare message as plain text.
pub fn respond(message: &str, success: bool, as_json: bool) -> Response {
    if as_json {
        Json(ResponsePayload {
            success,
            message: message.to_string(),
        })
        .into_response()
    } else {
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    async fn body(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn json_has_exactly_two_fields() {
        let resp = respond(SENT, true, true);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");

        let v: serde_json::Value = serde_json::from_str(&body(resp).await).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["success"], true);
        assert_eq!(obj["message"], SENT);
    }

    #[tokio::test]
    async fn plain_text_is_the_message() {
        let resp = respond(DENIED, false, false);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(body(resp).await, DENIED);
    }
}
