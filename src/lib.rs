pub mod config;
pub mod error;
pub mod relay;
pub mod websocket;

use std::net::TcpListener;
use std::sync::Arc;
use actix::{Actor, Addr};
use actix_cors::Cors;
use actix_web::{dev::Server, web, App, HttpResponse, HttpServer};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use relay::{RelayService, RelayStats};
pub use websocket::{GetStats, RelayHub};

/// Health check endpoint handler
/// Reports liveness plus the number of registered users and non-empty groups
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let stats = state.hub.send(GetStats).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "users": stats.users,
        "groups": stats.groups,
    })))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub hub: Addr<RelayHub>,
}

impl AppState {
    /// Starts the relay hub on the current arbiter, so this must run inside
    /// an actix system.
    pub fn new(config: Settings) -> Self {
        let relay = RelayService::new(config.relay.clone());
        let hub = RelayHub::new(relay).start();

        Self {
            config: Arc::new(config),
            hub,
        }
    }
}

/// Registers the HTTP and WebSocket routes
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/ws", web::get().to(websocket::relay_route));
}

pub fn build_cors(config: &config::CorsConfig) -> Cors {
    if !config.enabled {
        // CORS disabled - use most restrictive settings
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST"])
    };

    cors.max_age(config.max_age as usize)
}

/// Builds the server on an already bound listener
pub fn run(listener: TcpListener, state: AppState) -> std::io::Result<Server> {
    let workers = state.config.server.workers as usize;
    let cors_config = state.config.cors.clone();
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_config))
            .app_data(state.clone())
            .configure(routes)
    })
    .listen(listener)?
    .workers(workers.max(1))
    .run();

    Ok(server)
}
