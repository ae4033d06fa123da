use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Internal,
    Unknown,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCode::Validation,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            500..=599 => ErrorCode::Internal,
            _ => ErrorCode::Unknown,
        }
    }

    /// Message shown to the user when the server did not send one.
    pub fn default_message(self) -> Option<&'static str> {
        match self {
            ErrorCode::Unauthorized => Some("انتهت جلستك. يرجى تسجيل الدخول مرة أخرى."),
            ErrorCode::Forbidden => Some("ليس لديك صلاحية لهذا الإجراء"),
            ErrorCode::NotFound => Some("العنصر المطلوب غير موجود"),
            ErrorCode::Validation => Some("البيانات المرسلة غير صالحة"),
            ErrorCode::Internal => Some("حدث خطأ في الخادم. يرجى المحاولة لاحقاً"),
            ErrorCode::Unknown => None,
        }
    }
}

/// Error body the service sends alongside non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code:?} ({status}): {}", .message.as_deref().unwrap_or("no message"))]
pub struct ApiError {
    pub status: u16,
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(status: u16, message: Option<String>) -> Self {
        Self {
            status,
            code: ErrorCode::from_status(status),
            message: message.filter(|m| !m.trim().is_empty()),
        }
    }

    /// Parses the service's JSON error body, ignoring bodies that are not JSON.
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.message);
        Self::new(status, message)
    }

    /// Message for a dialog: the server's own text first, then a
    /// status-specific text, then `fallback`. An expired session always
    /// gets the sign-in prompt.
    pub fn user_message(&self, fallback: &str) -> String {
        let server_text = self.message.clone().filter(|_| self.code != ErrorCode::Unauthorized);
        server_text
            .or_else(|| self.code.default_message().map(str::to_string))
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
