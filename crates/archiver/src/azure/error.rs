//! Errors raised by the REST clients.

use reqwest::Response;
use serde::Deserialize;
use shared::crypto::SigningError;

#[derive(Debug, thiserror::Error)]
pub enum AzureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status} {code}: {message} (client request id {request_id})")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Failed to sign request: {0}")]
    Signing(#[from] SigningError),

    #[error("Invalid URL: {0}")]
    Url(String),
}

impl AzureError {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            AzureError::Api { status, .. } => Some(*status),
            AzureError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Service error code of an API error.
    pub fn code(&self) -> Option<&str> {
        match self {
            AzureError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Builds an API error from a non-success response.
    ///
    /// The code comes from `x-ms-error-code` when present, else from the
    /// body, which may be management JSON, token endpoint JSON or storage XML.
    pub(crate) async fn from_response(response: Response, request_id: &str) -> Self {
        let status = response.status();
        let header_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let (body_code, body_message) = parse_error_body(&body);

        AzureError::Api {
            status: status.as_u16(),
            code: header_code
                .or(body_code)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string()),
            message: body_message.unwrap_or_else(|| body.trim().to_string()),
            request_id: request_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StorageErrorBody {
    code: Option<String>,
    message: Option<String>,
}

fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let body = body.trim_start_matches('\u{feff}').trim();

    if body.starts_with('<') {
        return match quick_xml::de::from_str::<StorageErrorBody>(body) {
            Ok(err) => (err.code, err.message.map(|m| first_line(&m))),
            Err(_) => (None, None),
        };
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return (None, None);
    };
    let text = |v: Option<&serde_json::Value>| v.and_then(|v| v.as_str()).map(str::to_string);

    match value.get("error") {
        // {"error": {"code": .., "message": ..}}
        Some(serde_json::Value::Object(inner)) => (text(inner.get("code")), text(inner.get("message"))),
        // {"error": "invalid_request", "error_description": ..}
        Some(serde_json::Value::String(code)) => {
            (Some(code.clone()), text(value.get("error_description")))
        }
        _ => (text(value.get("code")), text(value.get("message"))),
    }
}

/// Storage messages append request id and timestamp on further lines.
fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}
