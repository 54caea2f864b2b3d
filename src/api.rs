// HTTP client for the chatbot backend: form-encoded /signup and /login,
// JSON /chat. The backend implementation is external; only the wire
// contracts live here.

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-2xx status. The message comes from
    /// the response body when it has one.
    #[error("{message}")]
    Backend { status: StatusCode, message: String },
    /// Transport or body-parsing failure; no distinction beyond that.
    #[error("request failed: {0}")]
    Network(String),
}

#[derive(Debug, Deserialize)]
struct MessageReply {
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginReply {
    pub message: String,
    #[serde(default)]
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: String,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn signup(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.endpoint("/signup"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        read_message(response).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginReply, ApiError> {
        let response = self
            .http
            .post(self.endpoint("/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            response
                .json::<LoginReply>()
                .await
                .map_err(|e| ApiError::Network(format!("invalid login response: {e}")))
        } else {
            Err(backend_error(status, response).await)
        }
    }

    /// POST /chat with `{message}`. The status line is deliberately ignored;
    /// any body that parses as `{response}` counts as a reply. Only the auth
    /// endpoints report status-level failures.
    pub async fn chat(&self, message: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.endpoint("/chat"))
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ApiError::Network(format!("invalid chat response: {e}")))?;
        Ok(reply.response)
    }
}

async fn read_message(response: Response) -> Result<String, ApiError> {
    let status = response.status();
    if status.is_success() {
        let reply: MessageReply = response
            .json()
            .await
            .map_err(|e| ApiError::Network(format!("invalid response body: {e}")))?;
        Ok(reply.message)
    } else {
        Err(backend_error(status, response).await)
    }
}

async fn backend_error(status: StatusCode, response: Response) -> ApiError {
    let message = response
        .json::<MessageReply>()
        .await
        .map(|r| r.message)
        .unwrap_or_else(|_| format!("Server error ({})", status.as_u16()));
    ApiError::Backend { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slashes() {
        let client = BackendClient::new("http://127.0.0.1:5000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(client.endpoint("/chat"), "http://127.0.0.1:5000/chat");
    }

    #[test]
    fn backend_error_displays_its_message() {
        let err = ApiError::Backend {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid credentials".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid credentials");
    }
}
