//! Provider boundary: chat messages in, raw text out.
//!
//! [`CompletionProvider`] is the only place the pipeline touches the network.
//! [`RetryPolicy`] wraps every call in a timeout and retries transient
//! failures with exponential backoff.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openai", derive(serde::Serialize))]
#[cfg_attr(feature = "openai", serde(rename_all = "lowercase"))]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "openai", derive(serde::Serialize))]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One provider call: a model and exactly two messages, system first.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "openai", derive(serde::Serialize))]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, system: String, user: String) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: system,
                },
                ChatMessage {
                    role: Role::User,
                    content: user,
                },
            ],
        }
    }

    /// Content of the first message with `role`.
    pub fn content(&self, role: Role) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Transport failures, timeouts, rate limiting and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::MalformedResponse(_) => false,
        }
    }
}

/// A generative text provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send the request and return the provider's raw text output.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// Timeout and bounded-retry policy for provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with the default timeout.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Call `provider` under this policy.
    ///
    /// Returns the first success, the first non-retryable error, or the last
    /// error once attempts are exhausted.
    pub async fn call(
        &self,
        provider: &dyn CompletionProvider,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, provider.complete(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        model = %request.model,
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails with the queued errors first, then succeeds.
    struct Flaky {
        errors: Mutex<Vec<ProviderError>>,
        calls: Mutex<u32>,
    }

    impl Flaky {
        fn new(mut errors: Vec<ProviderError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionProvider for Flaky {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok("Result: ok".into()),
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl CompletionProvider for Hangs {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            timeout: Duration::from_secs(5),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("gpt-3.5-turbo", "sys".into(), "usr".into())
    }

    #[test]
    fn request_has_system_then_user() {
        let req = request();
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.content(Role::User), Some("usr"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(10), Duration::from_secs(8));
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        let status = |status| ProviderError::Status {
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!ProviderError::MalformedResponse("no choices".into()).is_retryable());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let provider = Flaky::new(vec![
            ProviderError::Transport("reset".into()),
            ProviderError::Status {
                status: 502,
                body: "bad gateway".into(),
            },
        ]);
        let out = fast_policy(3).call(&provider, &request()).await.unwrap();
        assert_eq!(out, "Result: ok");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let provider = Flaky::new(vec![ProviderError::Transport("down".into()); 5]);
        let err = fast_policy(2).call(&provider, &request()).await.unwrap_err();
        assert_eq!(err, ProviderError::Transport("down".into()));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let provider = Flaky::new(vec![ProviderError::Status {
            status: 401,
            body: "bad key".into(),
        }]);
        let err = fast_policy(3).call(&provider, &request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 401, .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(20),
            ..fast_policy(1)
        };
        let err = policy.call(&Hangs, &request()).await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout(Duration::from_millis(20)));
    }
}
