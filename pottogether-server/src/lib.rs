mod auth;
mod config;
mod context;
mod docs;
mod errors;
mod ingredients;
mod records;
mod rooms;
mod schemas;
mod serialized;
mod storage;
mod users;

use std::{
    net::{Ipv6Addr, SocketAddr},
    path::Path,
};

use axum::{routing::get, Json};
use log::info;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

pub use config::*;
pub use context::*;
pub use errors::*;
pub use serialized::Envelope;
pub use storage::*;

pub type Router = axum::Router<ServerContext>;

/// Builds the full pottogether API
pub fn app(context: ServerContext, upload_dir: impl AsRef<Path>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/users", auth::router().merge(users::router()))
        .nest("/rooms", rooms::router())
        .nest("/records", records::router())
        .nest("/ingredients", ingredients::router());

    Router::new()
        .nest("/v1", version_one_router)
        .route("/healthcheck", get(healthcheck))
        .route("/api.json", get(docs::docs))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(cors)
        .with_state(context)
}

/// Starts the pottogether server
pub async fn run_server(config: &ServerConfig, context: ServerContext) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, config.port).into();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app(context, &config.upload_dir)).await
}

async fn healthcheck() -> Json<Envelope<()>> {
    Json(Envelope::done("OK"))
}
