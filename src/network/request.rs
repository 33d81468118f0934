//! Outgoing request and response types

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// An outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// JSON body, POST only
    pub json: Option<serde_json::Value>,
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HashMap::new(),
            json: None,
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Send `Authorization: Bearer <token>`
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub text: String,
    /// Final URL after redirects
    pub url: String,
}

impl HttpResponse {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.text)
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Common CAPTCHA and bot-wall markers in the body
    pub fn is_captcha(&self) -> bool {
        let lower = self.text.to_lowercase();
        lower.contains("captcha")
            || lower.contains("unusual traffic")
            || lower.contains("automated requests")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, text: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            text: text.to_string(),
            url: "http://localhost/".to_string(),
        }
    }

    #[test]
    fn test_status_helpers() {
        assert!(response(204, "").is_success());
        assert!(!response(302, "").is_success());
        assert!(response(429, "").is_rate_limited());
    }

    #[test]
    fn test_captcha_detection_is_case_insensitive() {
        assert!(response(200, "<title>Please solve this CAPTCHA</title>").is_captcha());
        assert!(response(200, "Our systems detected Unusual Traffic").is_captcha());
        assert!(!response(200, r#"{"flights":[]}"#).is_captcha());
    }

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::post("http://localhost/flights")
            .bearer("abc")
            .json(serde_json::json!({"a": 1}))
            .timeout(Duration::from_secs(2));
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.headers["Authorization"], "Bearer abc");
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
    }
}
