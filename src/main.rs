use color_eyre::eyre::{Result, WrapErr};
use mocksrv::{MockServer, PredefinedResponse, ServerConfig};
use tracing::info;

/// Standalone mock server for manual testing: serves one sticky canned
/// response on every request and logs each recorded exchange.
///
/// Usage: mocksrv [port] [status] [body]
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("mocksrv=info")
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let port = args
        .get(1)
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
    let status = args
        .get(2)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(200);
    let body = args.get(3).cloned().unwrap_or_else(|| "OK".to_string());

    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
        ..ServerConfig::default()
    };

    let mut server = MockServer::new(config);
    server.start().await.wrap_err("Failed to start mock server")?;

    server.push_response(
        PredefinedResponse::new(status)
            .with_header("content-type", "text/plain")
            .with_body(body),
    );

    info!(
        url = %server.base_url().unwrap_or_default(),
        status,
        "Mock server running, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for shutdown signal")?;

    // Drain and log what was exchanged before shutting down
    let mut count = 0;
    while let Some(record) = server.pop_record() {
        count += 1;
        info!(
            method = %record.request.method,
            uri = %record.request.uri,
            status = record.response.status(),
            error = ?record.error,
            "Recorded exchange"
        );
    }
    info!(count, "Shutting down");

    server.close().await;
    Ok(())
}
