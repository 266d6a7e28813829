use std::time::Duration;

use nodepilot_core::config::ActionsConfig;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::Outcome;

/// Bounded, fixed-delay retry policy for control calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Treated as at least 1.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_millis(500))
    }
}

/// Invokes machine start/stop endpoints.
///
/// Response classes map to outcomes as follows:
///
/// | Response                    | Outcome                  | Retried |
/// |-----------------------------|--------------------------|---------|
/// | 2xx                         | `Success`                | no      |
/// | any 4xx                     | `SuccessAlreadyInState`  | no      |
/// | 5xx, timeout, network error | `RetriesExhausted` after the last attempt | yes |
/// | unbuildable request, other status | `PermanentFailure` | no      |
///
/// Control endpoints answer 4xx when the machine is already running or
/// already stopped, so a 4xx is an idempotency signal rather than an error.
pub struct ActionExecutor {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl ActionExecutor {
    pub fn new(policy: RetryPolicy, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, policy })
    }

    pub fn from_config(config: &ActionsConfig) -> Result<Self> {
        Self::new(
            RetryPolicy::fixed(
                config.max_attempts,
                Duration::from_millis(config.retry_delay_ms),
            ),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `url` until it succeeds, signals already-in-state, fails
    /// permanently, or the attempt budget runs out. Never returns an error:
    /// every failure mode is an [`Outcome`].
    pub async fn execute(&self, url: &str) -> Outcome {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            debug!(%url, attempt, "calling control endpoint");

            let failure = match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        if attempt > 1 {
                            info!(%url, attempt, "control call succeeded after retry");
                        }
                        return Outcome::Success;
                    }
                    if status.is_client_error() {
                        info!(
                            %url,
                            status = status.as_u16(),
                            "endpoint reports machine already in requested state"
                        );
                        return Outcome::SuccessAlreadyInState;
                    }
                    if !status.is_server_error() {
                        warn!(%url, status = status.as_u16(), "unexpected control response");
                        return Outcome::PermanentFailure(format!("unexpected status {status}"));
                    }
                    format!("server error {status}")
                }
                Err(e) if e.is_builder() => {
                    warn!(%url, err = %e, "control request could not be built");
                    return Outcome::PermanentFailure(e.to_string());
                }
                Err(e) => e.to_string(),
            };

            warn!(%url, attempt, max_attempts, err = %failure, "control call failed");

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        warn!(%url, max_attempts, "control call retries exhausted");
        Outcome::RetriesExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_from_config() {
        let exec = ActionExecutor::from_config(&ActionsConfig {
            max_attempts: 3,
            retry_delay_ms: 250,
            request_timeout_secs: 2,
        })
        .unwrap();
        assert_eq!(
            exec.policy(),
            &RetryPolicy::fixed(3, Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn malformed_url_is_permanent_and_not_retried() {
        let exec = ActionExecutor::new(
            RetryPolicy::fixed(5, Duration::from_secs(30)),
            Duration::from_secs(1),
        )
        .unwrap();
        // would take minutes if the 30s delay were applied between attempts
        let outcome = tokio::time::timeout(Duration::from_secs(5), exec.execute("not a url"))
            .await
            .expect("permanent failures must not wait for retries");
        assert!(matches!(outcome, Outcome::PermanentFailure(_)));
    }
}
