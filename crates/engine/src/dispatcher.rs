// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation dispatcher: one HTTP POST per operation invocation.
//!
//! The wire format is a flat JSON object of opaque string values in both
//! directions. The dispatcher never interprets values and never retries;
//! failing over to the next path is the engine's decision.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use ward_core::{ContextMap, FailureReason};

/// How much of a rejection body is carried into the failure record.
pub const REJECTION_BODY_LIMIT: usize = 4096;

/// Why an invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("worker rejected the request with status {status}")]
    Rejected {
        status: u16,
        /// First [`REJECTION_BODY_LIMIT`] bytes of the response body.
        body: String,
    },

    #[error("malformed worker result: {0}")]
    Malformed(String),
}

impl DispatchError {
    /// Machine-readable reason recorded on the diagnosis.
    pub fn reason(&self) -> FailureReason {
        match self {
            DispatchError::Transport(_) => FailureReason::Transport,
            DispatchError::Timeout => FailureReason::Timeout,
            DispatchError::Rejected { .. } => FailureReason::OperationRejected,
            DispatchError::Malformed(_) => FailureReason::MalformedResult,
        }
    }
}

/// Successful invocation: the parsed context delta plus the raw body it came
/// from. The raw form is what gets persisted as the operation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delta: ContextMap,
    pub raw: String,
}

impl DispatchOutcome {
    pub fn empty() -> Self {
        Self { delta: ContextMap::new(), raw: String::new() }
    }
}

/// Seam between the engine and worker transport. Production uses
/// [`HttpDispatcher`]; tests script outcomes per endpoint.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn invoke(
        &self,
        url: &str,
        timeout: Duration,
        ctx: &ContextMap,
    ) -> Result<DispatchOutcome, DispatchError>;
}

#[async_trait]
impl<D: Dispatcher> Dispatcher for std::sync::Arc<D> {
    async fn invoke(
        &self,
        url: &str,
        timeout: Duration,
        ctx: &ContextMap,
    ) -> Result<DispatchOutcome, DispatchError> {
        (**self).invoke(url, timeout, ctx).await
    }
}

/// HTTP dispatcher for real worker endpoints.
#[derive(Clone, Default)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn invoke(
        &self,
        url: &str,
        timeout: Duration,
        ctx: &ContextMap,
    ) -> Result<DispatchOutcome, DispatchError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(ctx)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest)?;

        if status != 200 {
            return Err(DispatchError::Rejected {
                status,
                body: truncate_utf8(body, REJECTION_BODY_LIMIT),
            });
        }

        if body.trim().is_empty() {
            return Ok(DispatchOutcome::empty());
        }

        match serde_json::from_str::<ContextMap>(&body) {
            Ok(delta) => Ok(DispatchOutcome { delta, raw: body }),
            Err(e) => Err(DispatchError::Malformed(e.to_string())),
        }
    }
}

fn classify_reqwest(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Transport(e.to_string())
    }
}

/// Truncate an untrusted body to at most `max` bytes without splitting a
/// multi-byte character. `String::truncate` panics off a char boundary.
fn truncate_utf8(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
