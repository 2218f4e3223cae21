use serde::{Deserialize, Serialize};

/// API error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }
}

/// Plain `{"message": ...}` body used by `/ping` and friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Auth Types
// ============================================================================

/// Returned by the OAuth callback to API-style callers instead of a redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Identity of the caller, as carried by its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureResponse {
    pub message: String,
    pub email: String,
}

// ============================================================================
// Artifact Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    /// File name the previous artifact was preserved under, if there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_omits_empty_details() {
        let json = serde_json::to_value(ErrorResponse::new("Invalid token")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Invalid token" }));
    }

    #[test]
    fn upload_response_without_backup_matches_legacy_body() {
        let body = UploadResponse {
            message: "File uploaded successfully".to_string(),
            backup: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"message":"File uploaded successfully"}"#);

        let parsed: UploadResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, body);
    }
}
