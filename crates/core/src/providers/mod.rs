pub mod openai;

pub use openai::{OpenAiChat, OpenAiConfig, OpenAiEmbedder};

use crate::ProviderError;
use std::time::Duration;
use tracing::warn;

/// Bounded retry with exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first request.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << capped)
            .min(self.max_delay)
    }
}

/// Sends the request built by `build`, retrying transient failures. Returns
/// only successful responses; non-2xx statuses become `ProviderError::Status`.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    policy: &RetryPolicy,
    mut build: F,
) -> Result<reqwest::Response, ProviderError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        let failure = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                ProviderError::Status {
                    provider: provider.to_string(),
                    status: status.as_u16(),
                    body,
                }
            }
            Err(error) => ProviderError::Http(error),
        };

        if failure.is_transient() && attempt < policy.max_retries {
            attempt += 1;
            let delay = policy.backoff(attempt);
            warn!(
                provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "retrying provider request"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        return Err(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::{send_with_retry, RetryPolicy};
    use crate::ProviderError;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Answers the n-th request with the n-th status, repeating the last one.
    struct ScriptedStatuses {
        hits: AtomicUsize,
        statuses: Vec<u16>,
    }

    impl ScriptedStatuses {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn respond(State(script): State<Arc<ScriptedStatuses>>) -> (StatusCode, &'static str) {
        let hit = script.hits.fetch_add(1, Ordering::SeqCst);
        let status = script.statuses[hit.min(script.statuses.len() - 1)];
        (StatusCode::from_u16(status).unwrap(), "scripted")
    }

    async fn scripted_server(statuses: &[u16]) -> (String, Arc<ScriptedStatuses>) {
        let script = Arc::new(ScriptedStatuses {
            hits: AtomicUsize::new(0),
            statuses: statuses.to_vec(),
        });
        let app = Router::new()
            .route("/", post(respond))
            .with_state(script.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), script)
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn rate_limits_and_server_errors_are_retried_until_success() {
        let (url, script) = scripted_server(&[429, 503, 200]).await;
        let client = reqwest::Client::new();

        let response = send_with_retry("test", &fast_policy(3), || client.post(&url))
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(script.hits(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, script) = scripted_server(&[401, 200]).await;
        let client = reqwest::Client::new();

        let error = send_with_retry("test", &fast_policy(3), || client.post(&url))
            .await
            .unwrap_err();

        match error {
            ProviderError::Status { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "scripted");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(script.hits(), 1);
    }

    #[tokio::test]
    async fn persistent_failures_stop_after_max_retries() {
        let (url, script) = scripted_server(&[500]).await;
        let client = reqwest::Client::new();

        let error = send_with_retry("test", &fast_policy(3), || client.post(&url))
            .await
            .unwrap_err();

        assert!(matches!(error, ProviderError::Status { status: 500, .. }));
        assert_eq!(script.hits(), 4);
    }

    #[tokio::test]
    async fn connection_failures_are_retried_then_surfaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);
        let client = reqwest::Client::new();
        let mut attempts = 0;

        let error = send_with_retry("test", &fast_policy(2), || {
            attempts += 1;
            client.post(&url)
        })
        .await
        .unwrap_err();

        assert!(matches!(error, ProviderError::Http(_)));
        assert_eq!(attempts, 3);
    }
}
