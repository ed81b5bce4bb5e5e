use axum::{
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use serde_json::Value;

/// Buffered response with chainable assertions
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Self {
            status,
            headers,
            body,
        }
    }

    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "unexpected status, body: {}",
            self.body
        );
        self
    }

    pub fn assert_success(&self) -> &Self {
        assert_eq!(self.body["success"], true, "body: {}", self.body);
        self
    }

    /// Checks the failure envelope: kind name and client message
    pub fn assert_error(&self, kind: &str, message: &str) -> &Self {
        assert_eq!(self.body["success"], false, "body: {}", self.body);
        assert_eq!(self.body["error"], kind, "body: {}", self.body);
        assert_eq!(self.body["message"], message, "body: {}", self.body);
        self
    }

    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn id(&self) -> i64 {
        self.data()["id"]
            .as_i64()
            .unwrap_or_else(|| panic!("response has no id: {}", self.body))
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}
