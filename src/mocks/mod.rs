//! Mock implementations for testing.
//!
//! Provides a scripted transport whose outcomes are queued up front, so a
//! test can drive the resilience layer through failures and recoveries.

use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::RetryableResponse;

/// Transport failure raised by [`MockTransport`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MockTransportError {
    /// Connection could not be established
    #[error("connection refused")]
    ConnectionRefused,

    /// No response in time
    #[error("request timed out")]
    Timeout,
}

/// Mock response configuration
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Delay before response
    pub delay_ms: Option<u64>,
    /// Error to return instead
    pub error: Option<MockTransportError>,
}

impl MockResponse {
    /// Create a response with the given status
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            delay_ms: None,
            error: None,
        }
    }

    /// Create a 200 response
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Create a transport failure
    pub fn error(error: MockTransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(0)
        }
    }

    /// Create a 429 response carrying `Retry-After`
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(429).with_header("retry-after", &retry_after_secs.to_string())
    }

    /// Add a header; invalid names or values are ignored
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add delay to response
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = Some(ms);
        self
    }
}

impl RetryableResponse for MockResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> Option<&HeaderMap> {
        Some(&self.headers)
    }
}

/// Mock transport returning queued outcomes in order
#[derive(Clone)]
pub struct MockTransport {
    /// Queue of responses to return
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Number of sends performed
    calls: Arc<AtomicU32>,
    /// Default response if queue is empty
    default_response: MockResponse,
}

impl MockTransport {
    /// Create a mock transport answering 200 once the queue is empty
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicU32::new(0)),
            default_response: MockResponse::ok(),
        }
    }

    /// Add a response to the queue
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.lock().push_back(response);
        self
    }

    /// Add multiple responses
    pub fn add_responses(self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.responses.lock().extend(responses);
        self
    }

    /// Set default response when queue is empty
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Send a request, consuming the next queued outcome
    pub async fn send(&self) -> Result<MockResponse, MockTransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());

        if let Some(ms) = response.delay_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        match response.error.clone() {
            Some(error) => Err(error),
            None => Ok(response),
        }
    }

    /// Number of sends performed
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Responses still queued
    pub fn pending(&self) -> usize {
        self.responses.lock().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.calls())
            .field("pending", &self.pending())
            .finish()
    }
}
