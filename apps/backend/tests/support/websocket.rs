// WebSocket test utilities

use std::net::TcpListener;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use oracle_backend::routes;
use oracle_backend::ws::hub::SessionRegistry;
use oracle_backend::AppState;

/// Start a real HTTP server on a random local port with every route
/// mounted, so tests can connect with a real websocket client.
///
/// Returns the server handle (for a graceful stop), the bound address and
/// the join handle of the server task.
pub async fn start_test_server(
    state: AppState,
) -> Result<
    (
        actix_web::dev::ServerHandle,
        std::net::SocketAddr,
        tokio::task::JoinHandle<Result<(), std::io::Error>>,
    ),
    Box<dyn std::error::Error>,
> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let state_data = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state_data.clone())
            .configure(routes::configure)
    })
    .workers(1)
    .listen(listener)?
    .run();

    let server_handle = server.handle();
    let join = tokio::spawn(server);

    Ok((server_handle, addr, join))
}

pub async fn wait_for_sessions(
    registry: &SessionRegistry,
    expected: usize,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = tokio::time::Instant::now();
    loop {
        if registry.len() == expected {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(format!(
                "timeout waiting for {expected} attached sessions (got {})",
                registry.len()
            )
            .into());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
