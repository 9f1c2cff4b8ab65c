use thiserror::Error;

/// Error types for the mocksrv library
#[derive(Error, Debug)]
pub enum MockError {
    /// Socket-related errors (bind, accept, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors while parsing an incoming HTTP/1.1 request
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),
}

/// Result type for the mocksrv library
pub type Result<T> = std::result::Result<T, MockError>;

pub mod form;
pub mod handler;
pub mod record;
pub mod response;
pub mod server;
pub mod sink;

// Re-export main types for convenience
pub use form::{FormError, Values};
pub use handler::{HandlerError, MockState, RequestHead, handle_request};
pub use record::{ExchangeRecord, RecordStore, RecordedRequest, ResponseRecorder};
pub use response::{PredefinedResponse, ResponseQueue};
pub use server::{MockServer, ServerConfig};
pub use sink::{MultiSink, ResponseSink};
