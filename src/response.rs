//! Predefined responses and the FIFO response queue
//!
//! Responses are served in a FIFO fashion until only one is left; the last
//! response is then served indefinitely. An empty queue yields a synthetic
//! empty 404 response that is never stored in the queue itself.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::collections::VecDeque;

/// A canned HTTP response queued for future requests.
///
/// Status, headers and body are served verbatim: no validation is applied, so
/// any status integer and any header set can be staged.
///
/// # Examples
///
/// ```
/// use mocksrv::PredefinedResponse;
///
/// let response = PredefinedResponse::new(200)
///     .with_header("content-type", "application/json")
///     .with_body(r#"{"ok":true}"#);
/// assert_eq!(response.status, 200);
/// ```
#[derive(Debug, Clone)]
pub struct PredefinedResponse {
    /// HTTP status code to return
    pub status: u16,
    /// Headers to return, multi-valued and order-preserving
    pub headers: HeaderMap,
    /// Body to return, possibly empty
    pub body: Bytes,
}

impl PredefinedResponse {
    /// Creates a response with the given status, no headers and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The synthetic response served when the queue is empty: 404, no headers,
    /// empty body.
    pub fn not_found() -> Self {
        Self::new(404)
    }

    /// Appends a header, keeping any existing values for the same name.
    ///
    /// Invalid header names or values are silently dropped; staging a
    /// response must not fail.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            value.parse::<HeaderValue>(),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the response body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Ordered queue of predefined responses.
///
/// `next()` implements the consumption policy: pop from the front while more
/// than one response remains, peek the last one forever (sticky response),
/// and fall back to [`PredefinedResponse::not_found`] when empty.
///
/// The queue does no locking of its own; the server wraps it together with
/// the record store behind a single mutex.
#[derive(Debug, Default)]
pub struct ResponseQueue {
    responses: VecDeque<PredefinedResponse>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a response to the tail of the queue.
    pub fn push(&mut self, response: PredefinedResponse) {
        self.responses.push_back(response);
    }

    /// Returns the response to serve for the current request.
    pub fn next(&mut self) -> PredefinedResponse {
        if self.responses.len() > 1 {
            // More responses are waiting, consume the head
            self.responses
                .pop_front()
                .unwrap_or_else(PredefinedResponse::not_found)
        } else {
            // Sticky: the last response is replayed without being removed
            self.responses
                .front()
                .cloned()
                .unwrap_or_else(PredefinedResponse::not_found)
        }
    }

    /// Removes every staged response.
    pub fn clear(&mut self) {
        self.responses.clear();
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_yields_synthetic_not_found() {
        let mut queue = ResponseQueue::new();

        for _ in 0..3 {
            let response = queue.next();
            assert_eq!(response.status, 404);
            assert!(response.headers.is_empty());
            assert!(response.body.is_empty());
        }

        // The synthetic default is never enqueued
        assert!(queue.is_empty());
    }

    #[test]
    fn single_response_is_sticky() {
        let mut queue = ResponseQueue::new();
        queue.push(PredefinedResponse::new(201).with_body("created"));

        for _ in 0..5 {
            let response = queue.next();
            assert_eq!(response.status, 201);
            assert_eq!(&response.body[..], b"created");
        }

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn responses_are_served_fifo_until_last() {
        let mut queue = ResponseQueue::new();
        queue.push(PredefinedResponse::new(200));
        queue.push(PredefinedResponse::new(204));
        queue.push(PredefinedResponse::new(503));

        assert_eq!(queue.next().status, 200);
        assert_eq!(queue.next().status, 204);
        assert_eq!(queue.next().status, 503);
        assert_eq!(queue.next().status, 503);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_resets_to_not_found_behavior() {
        let mut queue = ResponseQueue::new();
        queue.push(PredefinedResponse::new(200));
        assert_eq!(queue.next().status, 200);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.next().status, 404);
    }

    #[test]
    fn push_after_sticky_resumes_consumption() {
        let mut queue = ResponseQueue::new();
        queue.push(PredefinedResponse::new(200));
        assert_eq!(queue.next().status, 200);

        queue.push(PredefinedResponse::new(204));
        // Two entries again, the old sticky head is consumed first
        assert_eq!(queue.next().status, 200);
        assert_eq!(queue.next().status, 204);
        assert_eq!(queue.next().status, 204);
    }

    #[test]
    fn status_is_accepted_verbatim() {
        let mut queue = ResponseQueue::new();
        queue.push(PredefinedResponse::new(999));
        assert_eq!(queue.next().status, 999);
    }

    #[test]
    fn multi_value_headers_preserve_order() {
        let response = PredefinedResponse::new(200)
            .with_header("set-cookie", "a=1")
            .with_header("set-cookie", "b=2");

        let values: Vec<_> = response
            .headers
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }
}
