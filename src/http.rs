use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(5),
            attempts: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("HTTP status {status}{}", detail_suffix(.body))]
    Status { status: u16, body: String },
    #[error("request failed after {attempts} attempt(s): {detail}")]
    Exhausted { attempts: usize, detail: String },
    #[error("response decode failed: {0}")]
    Decode(String),
}

fn detail_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

/// GETs `url` with a bearer token and decodes the JSON body. Transient
/// failures (408, 429, 5xx, transport) are retried; other statuses return
/// immediately as [`HttpError::Status`].
pub(crate) fn get_json_with_bearer(
    url: &str,
    token: &str,
    policy: RetryPolicy,
) -> Result<Value, HttpError> {
    let attempts = policy.attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build();
    let authorization = format!("Bearer {token}");

    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match agent.get(url).set("Authorization", &authorization).call() {
            Ok(response) => {
                let body = response
                    .into_string()
                    .map_err(|err| HttpError::Decode(err.to_string()))?;
                return serde_json::from_str(&body).map_err(|err| HttpError::Decode(err.to_string()));
            }
            Err(ureq::Error::Status(status, response)) => {
                let response_body = response.into_string().ok().unwrap_or_default();
                let body = response_body.trim().chars().take(240).collect::<String>();

                if !should_retry_http_status(status) {
                    return Err(HttpError::Status { status, body });
                }
                last_error = HttpError::Status { status, body }.to_string();
            }
            Err(ureq::Error::Transport(err)) => {
                last_error = format!("transport error: {err}");
            }
        }

        if attempt < attempts {
            thread::sleep(policy.retry_delay);
        }
    }

    Err(HttpError::Exhausted {
        attempts,
        detail: last_error,
    })
}
