//! Response sinks and the multi-target response writer
//!
//! A [`ResponseSink`] is the minimal capability a response can be written
//! through: a mutable header map, a status write and a body write. The
//! [`MultiSink`] fans every write out to an ordered list of sinks so a
//! response can simultaneously reach the client connection and an in-memory
//! recorder.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::io;

/// Minimal write/header/status capability shared by recording and live sinks.
pub trait ResponseSink {
    /// The header map that will be sent alongside the status.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Writes the response status. Sinks decide their own commit policy;
    /// callers may invoke this more than once.
    fn write_status(&mut self, status: u16);

    /// Writes a chunk of the response body, returning the number of bytes
    /// accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// Response writer that replicates every write to an ordered list of sinks.
///
/// Mounting the recorder before the live connection guarantees the captured
/// record reflects what was intended to be sent even when the network write
/// subsequently fails.
pub struct MultiSink<'a> {
    targets: Vec<&'a mut dyn ResponseSink>,
    // Backing storage for the map headers_mut hands out when there are no
    // targets; reset on every call so each caller gets a fresh empty map.
    fallback: HeaderMap,
}

impl<'a> MultiSink<'a> {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            fallback: HeaderMap::new(),
        }
    }

    /// Appends a sink; writes reach sinks in the order they were added.
    pub fn add(&mut self, sink: &'a mut dyn ResponseSink) {
        self.targets.push(sink);
    }

    /// Adds a header value to every target's header map, keeping existing
    /// values for the same name.
    pub fn append_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        for target in &mut self.targets {
            target.headers_mut().append(name.clone(), value.clone());
        }
    }

    /// Sets a header to a single value on every target's header map,
    /// replacing any existing values for the same name.
    pub fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        for target in &mut self.targets {
            target.headers_mut().insert(name.clone(), value.clone());
        }
    }
}

impl Default for MultiSink<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for MultiSink<'_> {
    /// Returns the header map of the first target, or a fresh detached map
    /// when there are no targets; the maps of later targets are only
    /// reachable through [`MultiSink::append_header`] and
    /// [`MultiSink::set_header`].
    fn headers_mut(&mut self) -> &mut HeaderMap {
        if self.targets.is_empty() {
            self.fallback = HeaderMap::new();
            return &mut self.fallback;
        }
        self.targets[0].headers_mut()
    }

    /// Invoked on every target unconditionally, in order, even if an earlier
    /// target already committed a status.
    fn write_status(&mut self, status: u16) {
        for target in &mut self.targets {
            target.write_status(status);
        }
    }

    /// Writes to every target in order. The first failure wins and the
    /// remaining targets are not attempted. With zero targets, returns
    /// `Ok(0)`; otherwise the last successful write's count.
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        for target in &mut self.targets {
            written = target.write(data)?;
        }
        Ok(written)
    }
}
