//! HTTP front end: health route, metrics scrape and WebSocket upgrades.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::handler::{ConnectionId, EchoHandler, SessionConfig};
use crate::metrics::{Metrics, TEXT_CONTENT_TYPE};
use crate::protocol::{HandshakeRequest, is_upgrade_request};

/// Body of `GET /` for plain HTTP requests.
pub const HELLO_BODY: &str = "Hello from WebSocket server!";

/// Startup and serving failures. All of them are fatal.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Everything needed to run the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
    /// Frame and message limits for upgraded connections.
    pub websocket: Config,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            session: SessionConfig::default(),
            websocket: Config::server(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub handler: EchoHandler,
    pub websocket: Config,
}

impl AppState {
    pub fn new(metrics: Arc<Metrics>, session: SessionConfig, websocket: Config) -> Self {
        Self {
            handler: EchoHandler::new(metrics.clone(), session),
            metrics,
            websocket,
        }
    }
}

/// `GET /`, `GET /ws` and `GET /metrics`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn root_handler(State(state): State<AppState>, req: Request) -> Response {
    if is_upgrade_request(req.headers()) {
        return upgrade(state, req);
    }
    HELLO_BODY.into_response()
}

async fn ws_handler(State(state): State<AppState>, req: Request) -> Response {
    upgrade(state, req)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Validate the upgrade, answer 101, and run the session on the upgraded stream.
fn upgrade(state: AppState, mut req: Request) -> Response {
    let handshake = match HandshakeRequest::from_headers(req.uri().path(), req.headers()) {
        Ok(handshake) => handshake,
        Err(e) => {
            state.metrics.connection_error();
            warn!(path = %req.uri().path(), error = %e, "rejected upgrade");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let accept = handshake.accept_key();
    debug!(path = %handshake.path, "upgrading");

    tokio::spawn(async move {
        match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => {
                let conn = Connection::new(TokioIo::new(upgraded), Role::Server, state.websocket);
                state.handler.run(ConnectionId::random(), conn).await;
            }
            Err(e) => {
                state.metrics.connection_error();
                warn!(error = %e, "HTTP upgrade failed");
            }
        }
    });

    (
        StatusCode::SWITCHING_PROTOCOLS,
        [
            (header::UPGRADE, "websocket".to_string()),
            (header::CONNECTION, "Upgrade".to_string()),
            (header::SEC_WEBSOCKET_ACCEPT, accept),
        ],
    )
        .into_response()
}

/// A bound, not yet serving, server.
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// `ServerError::Bind` if the address is unavailable.
    pub async fn bind(config: ServerConfig, metrics: Arc<Metrics>) -> Result<Self, ServerError> {
        let addr = config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self {
            listener,
            state: AppState::new(metrics, config.session, config.websocket),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.state.metrics
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await
    }

    /// Serve until `signal` resolves. Open WebSocket sessions are not drained.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "listening");
        }
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await?;
        Ok(())
    }
}
