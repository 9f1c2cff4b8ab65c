use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the mock HTTP server
///
/// # Examples
///
/// ```
/// use mocksrv::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig {
///     bind_addr: "127.0.0.1:8080".parse().unwrap(),
///     max_connections: 100,
///     buffer_size: 8192,
///     max_body_size: 1024 * 1024,
///     read_timeout: Duration::from_secs(30),
///     write_timeout: Duration::from_secs(30),
/// };
/// ```
///
/// The default binds to an ephemeral port, which is what test suites want:
///
/// ```
/// use mocksrv::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.bind_addr.port(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Buffer size for reading requests
    pub buffer_size: usize,
    /// Largest declared request body that will be buffered; larger requests
    /// are rejected with a 400
    pub max_body_size: usize,
    /// Read timeout for connections
    pub read_timeout: Duration,
    /// Write timeout for connections
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(), // Ephemeral port for testing
            max_connections: 100,
            buffer_size: 8192,
            max_body_size: 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}
