//! Exchange records and the FIFO record store
//!
//! Every handled request produces exactly one [`ExchangeRecord`], success or
//! failure. Records capture the incoming request, a buffered copy of its raw
//! body, a snapshot of the response that was sent and, when the handler
//! failed, the wrapped failure.

use crate::form::Values;
use crate::handler::HandlerError;
use crate::sink::ResponseSink;
use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, Method, Uri, Version};
use std::collections::VecDeque;
use std::io;

/// In-memory response sink capturing status, headers and body.
///
/// Mirrors the commit policy of a real HTTP response writer: the first status
/// written wins, and a body write before any status implies status 200.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<u16>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded status code, defaulting to 200 when nothing was written.
    pub fn status(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    /// Whether a status was explicitly or implicitly committed.
    pub fn wrote_status(&self) -> bool {
        self.status.is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl ResponseSink for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: u16) {
        // First status wins; later writes are delivered but ignored
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(200);
        }
        self.body.put_slice(data);
        Ok(data.len())
    }
}

/// The request side of an exchange record.
#[derive(Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Merged form values: urlencoded body values first, query values after
    pub form: Values,
}

/// One captured request/response exchange.
#[derive(Debug)]
pub struct ExchangeRecord {
    /// The HTTP request received by the server
    pub request: RecordedRequest,
    /// Snapshot of the response that was sent
    pub response: ResponseRecorder,
    /// A copy of the raw request body; empty when the request had none
    pub request_body: Bytes,
    /// Set only when handling the request failed; wraps the originating
    /// failure
    pub error: Option<HandlerError>,
}

/// Ordered store of exchange records, drained FIFO.
///
/// Like [`crate::ResponseQueue`], the store does no locking of its own; the
/// server guards both behind a single mutex.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: VecDeque<ExchangeRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the tail. Never fails.
    pub fn append(&mut self, record: ExchangeRecord) {
        self.records.push_back(record);
    }

    /// Removes and returns the oldest record, or `None` when the store is
    /// empty. No record is ever fabricated.
    pub fn pop(&mut self) -> Option<ExchangeRecord> {
        self.records.pop_front()
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::Values;

    fn record_with_status(status: u16) -> ExchangeRecord {
        let mut response = ResponseRecorder::new();
        response.write_status(status);
        ExchangeRecord {
            request: RecordedRequest {
                method: Method::GET,
                uri: "/".parse().unwrap(),
                version: Version::HTTP_11,
                headers: HeaderMap::new(),
                form: Values::new(),
            },
            response,
            request_body: Bytes::new(),
            error: None,
        }
    }

    #[test]
    fn pop_on_empty_store_returns_none() {
        let mut store = RecordStore::new();
        assert!(store.pop().is_none());
    }

    #[test]
    fn records_drain_fifo_and_size_tracks() {
        let mut store = RecordStore::new();
        store.append(record_with_status(200));
        store.append(record_with_status(204));
        store.append(record_with_status(404));
        assert_eq!(store.len(), 3);

        assert_eq!(store.pop().unwrap().response.status(), 200);
        assert_eq!(store.len(), 2);
        assert_eq!(store.pop().unwrap().response.status(), 204);
        assert_eq!(store.pop().unwrap().response.status(), 404);
        assert!(store.pop().is_none());
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = RecordStore::new();
        store.append(record_with_status(200));
        store.clear();
        assert!(store.is_empty());
        assert!(store.pop().is_none());
    }

    #[test]
    fn recorder_first_status_wins() {
        let mut recorder = ResponseRecorder::new();
        recorder.write_status(200);
        recorder.write_status(500);
        assert_eq!(recorder.status(), 200);
    }

    #[test]
    fn recorder_body_write_implies_status_200() {
        let mut recorder = ResponseRecorder::new();
        assert!(!recorder.wrote_status());
        recorder.write(b"hello").unwrap();
        assert!(recorder.wrote_status());
        assert_eq!(recorder.status(), 200);
        assert_eq!(recorder.body(), b"hello");
    }

    #[test]
    fn recorder_accumulates_body_writes() {
        let mut recorder = ResponseRecorder::new();
        recorder.write_status(200);
        recorder.write(b"hello ").unwrap();
        recorder.write(b"world").unwrap();
        assert_eq!(recorder.body(), b"hello world");
    }
}
