use actix_web::web;

pub mod health;
pub mod realtime;

/// Register every HTTP entry point. Shared by `main.rs` and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Health check routes: /health
    cfg.configure(health::configure_routes);

    // Realtime routes: /ws
    cfg.configure(realtime::configure_routes);
}
