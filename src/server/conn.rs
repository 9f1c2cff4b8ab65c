//! HTTP/1.1 connection handling
//!
//! Frames incoming requests with `httparse` (headers plus Content-Length
//! body), dispatches each one into the request handler with an in-memory
//! body cursor, and serializes the handler's response back onto the wire.
//! Connections are kept alive until the client closes or asks to.

use super::ServerConfig;
use crate::handler::{self, MockState, RequestHead};
use crate::record::ResponseRecorder;
use crate::{MockError, Result};
use bytes::{Buf, BytesMut};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n";

struct ParsedRequest {
    head: RequestHead,
    body: Vec<u8>,
}

enum ParseOutcome {
    Complete(RequestHead, usize, usize),
    Partial,
}

/// Serves requests on one accepted connection until it closes.
///
/// A shutdown signal arriving while the connection is idle or still reading
/// a request drops the connection; an exchange already past its read phase
/// completes and gets recorded.
pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<Mutex<MockState>>,
    config: ServerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(config.buffer_size);

    loop {
        let request = tokio::select! {
            result = read_request(&mut stream, &mut buf, &config) => match result {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()), // clean close between requests
                Err(err) => {
                    if matches!(err, MockError::HttpParse(_)) {
                        // Best-effort answer before dropping the connection
                        let _ = stream.write_all(BAD_REQUEST).await;
                    }
                    return Err(err);
                }
            },
            _ = shutdown.recv() => return Ok(()),
        };

        let close_after = wants_close(&request.head);

        // The live sink is buffered too: the handler writes into it and the
        // finished response is flushed to the socket in one piece
        let mut client = ResponseRecorder::new();
        let mut body = Cursor::new(request.body);
        handler::handle_request(&state, request.head, &mut body, &mut client);

        let wire = encode_response(&client);
        timeout(config.write_timeout, stream.write_all(&wire))
            .await
            .map_err(|_| MockError::Timeout("write timeout".to_string()))??;
        stream.flush().await?;

        if close_after {
            return Ok(());
        }
    }
}

/// Reads one request off the connection. `Ok(None)` means the client closed
/// cleanly before sending another request.
async fn read_request(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    config: &ServerConfig,
) -> Result<Option<ParsedRequest>> {
    loop {
        let outcome = parse_head(&buf[..])?;

        match outcome {
            ParseOutcome::Complete(head, header_len, body_len) => {
                // The declared length drives buffering; an unbounded one
                // would let a single request exhaust memory
                if body_len > config.max_body_size {
                    return Err(MockError::HttpParse(format!(
                        "declared content-length {body_len} exceeds the limit of {}",
                        config.max_body_size
                    )));
                }
                while buf.len() < header_len + body_len {
                    let n = read_more(stream, buf, config).await?;
                    if n == 0 {
                        return Err(MockError::HttpParse(
                            "connection closed mid-request".to_string(),
                        ));
                    }
                }
                let body = buf[header_len..header_len + body_len].to_vec();
                buf.advance(header_len + body_len);
                return Ok(Some(ParsedRequest { head, body }));
            }
            ParseOutcome::Partial => {
                let n = read_more(stream, buf, config).await?;
                if n == 0 {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    return Err(MockError::HttpParse(
                        "connection closed mid-request".to_string(),
                    ));
                }
            }
        }
    }
}

/// Tries to parse the request line and headers out of the buffered bytes.
fn parse_head(buf: &[u8]) -> Result<ParseOutcome> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers);

    let header_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(ParseOutcome::Partial),
        Err(e) => {
            return Err(MockError::HttpParse(format!(
                "failed to parse request: {e}"
            )));
        }
    };

    let method = Method::from_bytes(req.method.unwrap_or("GET").as_bytes())
        .map_err(|e| MockError::HttpParse(format!("invalid method: {e}")))?;
    let uri: Uri = req
        .path
        .unwrap_or("/")
        .parse()
        .map_err(|e| MockError::HttpParse(format!("invalid request target: {e}")))?;
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut header_map = HeaderMap::new();
    for h in req.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|e| MockError::HttpParse(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|e| MockError::HttpParse(format!("invalid header value: {e}")))?;
        header_map.append(name, value);
    }

    let body_len = header_map
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let head = RequestHead {
        method,
        uri,
        version,
        headers: header_map,
    };
    Ok(ParseOutcome::Complete(head, header_len, body_len))
}

async fn read_more(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    config: &ServerConfig,
) -> Result<usize> {
    let n = timeout(config.read_timeout, stream.read_buf(buf))
        .await
        .map_err(|_| MockError::Timeout("read timeout".to_string()))??;
    Ok(n)
}

fn wants_close(head: &RequestHead) -> bool {
    let explicit = head
        .headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("close"));
    match explicit {
        Some(close) => close,
        // HTTP/1.0 closes by default
        None => head.version == Version::HTTP_10,
    }
}

/// Serializes a buffered response onto the wire. Headers are emitted
/// verbatim; Content-Length is added only when the response did not carry
/// one.
fn encode_response(response: &ResponseRecorder) -> Vec<u8> {
    let status = response.status();
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");

    let mut out = Vec::with_capacity(128 + response.body().len());
    out.extend_from_slice(format!("HTTP/1.1 {status} {reason}\r\n").as_bytes());
    for (name, value) in response.headers().iter() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    if !response.headers().contains_key(header::CONTENT_LENGTH) {
        out.extend_from_slice(format!("content-length: {}\r\n", response.body().len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(response.body());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ResponseSink;

    #[test]
    fn parse_head_extracts_request_metadata() {
        let raw = b"POST /login?next=%2Fhome HTTP/1.1\r\nhost: localhost\r\ncontent-length: 7\r\n\r\nb=2&a=1";
        let outcome = parse_head(raw).unwrap();

        let ParseOutcome::Complete(head, header_len, body_len) = outcome else {
            panic!("expected a complete parse");
        };
        assert_eq!(head.method, Method::POST);
        assert_eq!(head.uri.path(), "/login");
        assert_eq!(head.uri.query(), Some("next=%2Fhome"));
        assert_eq!(head.version, Version::HTTP_11);
        assert_eq!(body_len, 7);
        assert_eq!(&raw[header_len..header_len + body_len], b"b=2&a=1");
    }

    #[test]
    fn parse_head_reports_partial_input() {
        let raw = b"GET / HTTP/1.1\r\nhost: local";
        assert!(matches!(parse_head(raw).unwrap(), ParseOutcome::Partial));
    }

    #[test]
    fn parse_head_rejects_garbage() {
        let raw = b"\x00\x01\x02 not http\r\n\r\n";
        assert!(matches!(
            parse_head(raw),
            Err(MockError::HttpParse(_))
        ));
    }

    #[test]
    fn missing_content_length_means_empty_body() {
        let raw = b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n";
        let ParseOutcome::Complete(_, _, body_len) = parse_head(raw).unwrap() else {
            panic!("expected a complete parse");
        };
        assert_eq!(body_len, 0);
    }

    #[test]
    fn encode_adds_content_length_when_absent() {
        let mut response = ResponseRecorder::new();
        response.write_status(200);
        response.write(b"hello").unwrap();

        let wire = String::from_utf8(encode_response(&response)).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn encode_keeps_existing_content_length_verbatim() {
        let mut response = ResponseRecorder::new();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, "5".parse().unwrap());
        response.write_status(200);
        response.write(b"hello").unwrap();

        let wire = String::from_utf8(encode_response(&response)).unwrap();
        assert_eq!(wire.matches("content-length").count(), 1);
    }

    #[test]
    fn encode_handles_nonstandard_status() {
        let mut response = ResponseRecorder::new();
        response.write_status(999);
        let wire = String::from_utf8(encode_response(&response)).unwrap();
        assert!(wire.starts_with("HTTP/1.1 999 \r\n"));
    }

    #[test]
    fn connection_close_header_is_honored() {
        let head = RequestHead::new(Method::GET, "/".parse().unwrap())
            .with_header("connection", "close");
        assert!(wants_close(&head));

        let head = RequestHead::new(Method::GET, "/".parse().unwrap());
        assert!(!wants_close(&head));
    }

    #[test]
    fn http_10_closes_by_default() {
        let mut head = RequestHead::new(Method::GET, "/".parse().unwrap());
        head.version = Version::HTTP_10;
        assert!(wants_close(&head));

        let mut head = RequestHead::new(Method::GET, "/".parse().unwrap())
            .with_header("connection", "keep-alive");
        head.version = Version::HTTP_10;
        assert!(!wants_close(&head));
    }
}
