use super::ApiError;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

/// Source of bearer credentials for outbound requests. Implemented by the
/// host application over its identity provider; the client calls
/// `refresh_token` at most once per rejected request before giving up.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, ApiError>;

    /// Obtain a fresh credential after a 401. The default refuses, which
    /// turns every rejection into `AuthenticationFailed`.
    async fn refresh_token(&self) -> Result<String, ApiError> {
        Err(ApiError::AuthenticationFailed)
    }
}

/// Fixed-token provider for tools and tests; refresh hands back the same
/// credential.
pub struct StaticTokenProvider {
    token: Mutex<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(token.into()),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = token.into();
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, ApiError> {
        self.token
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| ApiError::AuthenticationFailed)
    }

    async fn refresh_token(&self) -> Result<String, ApiError> {
        debug!("Static token provider: refresh re-issues the same token");
        self.bearer_token().await
    }
}
