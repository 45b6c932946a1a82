//! RPC-style status vocabulary, per-call context and retry execution for
//! the gateway's downstream calls.
//!
//! Downstream clients return [`Status`] values instead of transport errors
//! so the gateway can map them to HTTP uniformly, whether the callee runs
//! in process or across the network.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    NotFound,
    InvalidArgument,
    Unauthenticated,
    AlreadyExists,
    Aborted,
    DeadlineExceeded,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::invalid_argument(msg),
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::Conflict(msg) => Self::already_exists(msg),
            ServiceError::Unauthenticated(msg) => Self::unauthenticated(msg),
            ServiceError::Unavailable(msg) => Self::unavailable(msg),
            ServiceError::Internal(err) => Self::internal(err.to_string()),
        }
    }
}

/// Explicit per-call context handed from the gateway into every downstream
/// call: the caller identity and the absolute deadline for the whole
/// request. Nothing request-scoped lives in ambient state.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub user_id: Option<i64>,
    pub deadline: Instant,
}

impl CallContext {
    pub fn new(budget: Duration) -> Self {
        Self {
            user_id: None,
            deadline: Instant::now() + budget,
        }
    }

    pub fn with_user(user_id: i64, budget: Duration) -> Self {
        Self {
            user_id: Some(user_id),
            deadline: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn require_user(&self) -> Result<i64, Status> {
        self.user_id
            .ok_or_else(|| Status::unauthenticated("missing user identity in call context"))
    }
}

/// Codes worth retrying for side-effect-free or idempotent calls.
pub const IDEMPOTENT_RETRY_CODES: &[Code] =
    &[Code::Aborted, Code::DeadlineExceeded, Code::Unavailable];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub per_attempt_timeout: Duration,
    pub max_retries: u32,
    pub retry_on: &'static [Code],
}

impl RetryPolicy {
    pub fn idempotent() -> Self {
        Self {
            per_attempt_timeout: Duration::from_secs(2),
            max_retries: 3,
            retry_on: IDEMPOTENT_RETRY_CODES,
        }
    }
}

/// Runs `call` under the policy: each attempt is bounded by the per-attempt
/// timeout, failed attempts are retried only for the configured codes, and
/// a retry is skipped when the remaining request budget no longer fits a
/// full attempt.
pub async fn call_with_retry<T, F, Fut>(
    ctx: &CallContext,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, Status>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Status>>,
{
    let mut attempt: u32 = 0;
    loop {
        if ctx.remaining().is_zero() {
            return Err(Status::deadline_exceeded("request deadline exceeded"));
        }

        let status = match tokio::time::timeout(policy.per_attempt_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(status)) => status,
            Err(_) => Status::deadline_exceeded("per-attempt timeout elapsed"),
        };

        attempt += 1;
        if attempt > policy.max_retries || !policy.retry_on.contains(&status.code) {
            return Err(status);
        }
        if ctx.remaining() < policy.per_attempt_timeout {
            return Err(status);
        }
        tracing::debug!(attempt, code = ?status.code, "retrying downstream call");
    }
}
