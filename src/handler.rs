//! Per-request orchestration
//!
//! [`handle_request`] is the state machine behind every exchange: it tees the
//! request body into a capture buffer, parses query string and form data,
//! selects the next predefined response, emits it through a multi-target
//! writer and commits exactly one [`ExchangeRecord`], success or failure.

use crate::form::{self, FormError, Values};
use crate::record::{ExchangeRecord, RecordStore, RecordedRequest, ResponseRecorder};
use crate::response::ResponseQueue;
use crate::sink::{MultiSink, ResponseSink};
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method, Uri, Version};
use std::io::{self, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::warn;

/// Request metadata handed to the handler by the transport.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    /// Appends a request header, keeping existing values for the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<header::HeaderName>(),
            value.parse::<HeaderValue>(),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// The original compares the content type verbatim, without media-type
    /// parameters; a charset suffix makes this false.
    fn is_form_urlencoded(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            == Some("application/x-www-form-urlencoded")
    }
}

/// Reader wrapper mirroring every byte read into a capture buffer.
///
/// Composes transparently with whatever consumes the body afterwards; the
/// capture holds exactly the bytes the downstream reader saw.
pub struct TeeReader<'a> {
    inner: &'a mut dyn Read,
    captured: &'a mut Vec<u8>,
}

impl<'a> TeeReader<'a> {
    pub fn new(inner: &'a mut dyn Read, captured: &'a mut Vec<u8>) -> Self {
        Self { inner, captured }
    }
}

impl Read for TeeReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.captured.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// A per-request failure, wrapped with the stage it occurred in.
///
/// The originating failure stays reachable through `Error::source()`.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("failed to read the request body: {0}")]
    BodyRead(#[source] io::Error),

    #[error("failed to parse query string and form data: {0}")]
    FormParse(#[source] FormError),

    #[error("failed to write the predefined response: {0}")]
    ResponseWrite(#[source] io::Error),
}

/// Shared mutable state of the mock server: the staged responses and the
/// captured records.
///
/// Fields are voluntarily public so test authors can navigate their data
/// directly. The server guards the whole state behind one mutex; each queue
/// operation (push/next/pop/clear) is its own critical section.
#[derive(Debug, Default)]
pub struct MockState {
    pub responses: ResponseQueue,
    pub records: RecordStore,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears both the response queue and the record store.
    pub fn clear(&mut self) {
        self.responses.clear();
        self.records.clear();
    }
}

/// Locks the shared state, recovering from poisoning. A panicking test
/// thread must not wedge the server for the remaining tests.
pub fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handles one request end to end and commits exactly one record.
///
/// Failures never escalate: they are written into the record, answered with
/// a best-effort plain-text 500 and the server stays usable for subsequent
/// requests.
pub fn handle_request(
    state: &Mutex<MockState>,
    head: RequestHead,
    body: &mut dyn Read,
    client: &mut dyn ResponseSink,
) {
    let mut recorder = ResponseRecorder::new();
    let mut captured = Vec::new();
    let mut form = Values::new();

    let error = {
        let mut tee = TeeReader::new(body, &mut captured);
        // Recorder first, so the record captures the intended response even
        // when writing to the client fails
        let mut writer = MultiSink::new();
        writer.add(&mut recorder);
        writer.add(client);

        match process(state, &head, &mut tee, &mut form, &mut writer) {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, method = %head.method, uri = %head.uri, "request handling failed");
                write_internal_error(&mut writer, &err);
                Some(err)
            }
        }
    };

    let record = ExchangeRecord {
        request: RecordedRequest {
            method: head.method,
            uri: head.uri,
            version: head.version,
            headers: head.headers,
            form,
        },
        response: recorder,
        request_body: captured.into(),
        error,
    };
    lock(state).records.append(record);
}

/// Steps 2-5 of the per-request pipeline: drain, parse, select, emit.
fn process(
    state: &Mutex<MockState>,
    head: &RequestHead,
    body: &mut TeeReader<'_>,
    form: &mut Values,
    writer: &mut MultiSink<'_>,
) -> Result<(), HandlerError> {
    let is_form = head.is_form_urlencoded();

    // Drain the body so the tee captures it; form bodies are drained below,
    // during form parsing
    if !is_form {
        io::copy(body, &mut io::sink()).map_err(HandlerError::BodyRead)?;
    }

    // Body values land in the form map before query values
    if is_form {
        let mut raw = Vec::new();
        body.read_to_end(&mut raw)
            .map_err(|e| HandlerError::FormParse(FormError::Io(e)))?;
        let text = String::from_utf8(raw)
            .map_err(|e| HandlerError::FormParse(FormError::Utf8(e)))?;
        form::merge(form, form::parse(&text).map_err(HandlerError::FormParse)?);
    }
    if let Some(query) = head.uri.query() {
        form::merge(form, form::parse(query).map_err(HandlerError::FormParse)?);
    }

    let response = lock(state).responses.next();

    // Headers are additive and preserve multi-value order
    for (name, value) in response.headers.iter() {
        writer.append_header(name, value);
    }
    writer.write_status(response.status);
    if !response.body.is_empty() {
        writer
            .write(&response.body)
            .map_err(HandlerError::ResponseWrite)?;
    }

    Ok(())
}

/// Answers a failed request with a plain-text 500 carrying the failure text.
///
/// The content type is set on every sink so the client connection carries
/// `text/plain` alongside the record. When headers already reached the
/// client this is a best-effort overwrite attempt; the wire cannot take the
/// committed status back.
fn write_internal_error(writer: &mut MultiSink<'_>, err: &HandlerError) {
    writer.set_header(
        &header::CONTENT_TYPE,
        &HeaderValue::from_static("text/plain"),
    );
    writer.write_status(500);
    let _ = writer.write(err.to_string().as_bytes());
}
