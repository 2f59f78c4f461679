//! Core server: owns the relay and exposes it over HTTP.
//!
//! The sweeper is started when the server starts serving and stopped after
//! graceful shutdown completes.

use crate::api::{self, AppState};
use crate::config::ServerConfig;
use axum::routing::{get, post};
use axum::Router;
use kasflows_core::{ExpirySweeper, Relay, RelayResult};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The kasflows relay server.
pub struct RelayServer {
    config: ServerConfig,
    relay: Arc<Relay>,
}

impl RelayServer {
    /// Create a server with an empty relay. Register handlers via [`RelayServer::relay`].
    pub fn new(config: ServerConfig) -> RelayResult<Self> {
        let relay = Arc::new(Relay::new(config.relay.clone())?);
        Ok(Self { config, relay })
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
        };

        Router::new()
            .route("/", get(api::describe))
            .route("/statusws", post(api::announce))
            .route("/disconnect", post(api::disconnect))
            .route("/getmessage", post(api::get_message))
            .route("/sendmessage", post(api::send_message))
            .route("/sendmessagetoclient", post(api::send_message_to_client))
            .route("/getclients", get(api::get_clients))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let router = self.router();
        let sweeper = ExpirySweeper::new(self.relay.clone()).start();

        info!(
            address = %addr,
            idle_timeout_secs = self.config.relay.idle_timeout.as_secs(),
            require_token = self.config.relay.require_token,
            "server running"
        );

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.stop().await;
        result?;
        Ok(())
    }
}
