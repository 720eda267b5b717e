//! Bounded retries with linear, jittered backoff around outbound calls.
//!
//! The operation reports its own outcome ([`AttemptOutcome`]); the loop never infers retry
//! intent from errors. Every attempt is timed and logged through the request context.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::RequestContext;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Backoff before retry n is `base_delay * n` plus jitter.
    pub base_delay: Duration,
    /// Upper bound of the uniform random jitter.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Sleep before the next attempt, given how many attempts have been made.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let linear = self.base_delay.saturating_mul(attempts);
        let jitter_us = self.jitter.as_micros().min(u64::MAX as u128) as u64;
        if jitter_us == 0 {
            return linear;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_us);
        linear.saturating_add(Duration::from_micros(extra))
    }
}

/// What one attempt produced.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Done(T),
    Retryable(String),
    Fatal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    RetryableError,
    FatalError,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::RetryableError => "retryable_error",
            Outcome::FatalError => "fatal_error",
        }
    }
}

/// Record of a single attempt.
#[derive(Debug, Clone)]
pub struct OutboundAttempt {
    pub label: String,
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub outcome: Outcome,
    pub latency: Duration,
}

/// Successful result with its attempt history.
#[derive(Debug)]
pub struct Delivered<T> {
    pub value: T,
    pub attempts: Vec<OutboundAttempt>,
    pub latency: Duration,
}

impl<T> Delivered<T> {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Retries exhausted, or a fatal failure.
#[derive(Debug, thiserror::Error)]
#[error("{label} failed after {} attempt(s): {reason}", .attempts.len())]
pub struct DeliveryError {
    pub label: String,
    pub reason: String,
    pub attempts: Vec<OutboundAttempt>,
    pub latency: Duration,
}

impl DeliveryError {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Run `op` until it is done, fails fatally, or runs out of retries.
/// `op` receives the 1-based attempt number.
pub async fn execute<T, F, Fut>(
    ctx: &RequestContext,
    label: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<Delivered<T>, DeliveryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts();
    let mut history: Vec<OutboundAttempt> = Vec::new();
    let mut attempt: u32 = 1;

    loop {
        let started_at = chrono::Utc::now();
        let t0 = Instant::now();
        let result = op(attempt).await;
        let latency = t0.elapsed();

        let (outcome, failure) = match result {
            AttemptOutcome::Done(value) => {
                history.push(OutboundAttempt {
                    label: label.to_string(),
                    attempt_number: attempt,
                    max_attempts,
                    started_at,
                    outcome: Outcome::Success,
                    latency,
                });
                let total = started.elapsed();
                ctx.log_event(
                    label,
                    Some(Outcome::Success.as_str()),
                    Some(&format!(
                        "attempt={}/{} latency_ms={} total_ms={}",
                        attempt,
                        max_attempts,
                        latency.as_millis(),
                        total.as_millis()
                    )),
                );
                return Ok(Delivered {
                    value,
                    attempts: history,
                    latency: total,
                });
            }
            AttemptOutcome::Retryable(reason) => (Outcome::RetryableError, reason),
            AttemptOutcome::Fatal(reason) => (Outcome::FatalError, reason),
        };

        history.push(OutboundAttempt {
            label: label.to_string(),
            attempt_number: attempt,
            max_attempts,
            started_at,
            outcome,
            latency,
        });
        ctx.warn_event(
            label,
            Some(outcome.as_str()),
            Some(&format!(
                "attempt={}/{} latency_ms={} reason={}",
                attempt,
                max_attempts,
                latency.as_millis(),
                failure
            )),
        );

        if outcome == Outcome::RetryableError && attempt <= policy.max_retries {
            let delay = policy.delay_after(attempt);
            log::debug!(
                "request_id={} {} backing off {}ms before attempt {}",
                ctx.id(),
                label,
                delay.as_millis(),
                attempt + 1
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        let total = started.elapsed();
        ctx.error_event(
            label,
            Some("gave_up"),
            Some(&format!("attempts={} total_ms={}", history.len(), total.as_millis())),
        );
        return Err(DeliveryError {
            label: label.to_string(),
            reason: failure,
            attempts: history,
            latency: total,
        });
    }
}

/// 5xx and transport failures are retryable; everything else (including 4xx) is returned as-is.
pub fn classify(
    result: Result<HttpResponse, crate::transport::TransportError>,
) -> AttemptOutcome<HttpResponse> {
    match result {
        Ok(res) if res.is_server_error() => {
            AttemptOutcome::Retryable(format!("server error {}", res.status))
        }
        Ok(res) => AttemptOutcome::Done(res),
        Err(e) => AttemptOutcome::Retryable(e.to_string()),
    }
}

/// Sends requests through a transport under one retry policy.
#[derive(Clone)]
pub struct RetryingClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn send(
        &self,
        ctx: &RequestContext,
        label: &str,
        request: &HttpRequest,
    ) -> Result<Delivered<HttpResponse>, DeliveryError> {
        let transport = self.transport.clone();
        execute(ctx, label, &self.policy, |_| {
            let transport = transport.clone();
            async move { classify(transport.send(request).await) }
        })
        .await
    }
}
