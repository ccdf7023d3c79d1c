use actix_web::{web, App, HttpServer};
use oracle_backend::config::{GameConfig, ServerConfig};
use oracle_backend::infra::state::build_state;
use oracle_backend::routes;
use tracing::{error, info};

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment:
    // - Docker: Set via docker-compose env_file or docker run --env-file
    // - Local dev: Source env files manually (e.g., set -a; . ./.env; set +a)
    let (server, game) = match (ServerConfig::from_env(), GameConfig::from_env()) {
        (Ok(server), Ok(game)) => (server, game),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let mut builder = build_state()
        .with_config(game)
        .with_instance_id(server.instance_id.clone());
    if let Some(url) = &server.redis_url {
        builder = builder.with_redis(url.clone());
    }
    if let Some(url) = &server.judge_url {
        builder = builder.with_judge_url(url.clone());
    }

    let app_state = match builder.build().await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "failed to build application state");
            std::process::exit(1);
        }
    };

    info!(
        host = %server.host,
        port = server.port,
        instance_id = %server.instance_id,
        clustered = server.redis_url.is_some(),
        "starting game server"
    );

    let data = web::Data::new(app_state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind((server.host.as_str(), server.port))?
    .run()
    .await
}
