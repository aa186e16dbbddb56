//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Bind server to a plain or TLS listener
//! - Forward requests to the pinned origin
//! - Harden HTML responses, pass everything else through
//! - Swap in reloaded configuration

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigError, EdgeConfig};
use crate::http::forward::{build_forward_request, ForwardError};
use crate::http::profile::EdgeProfile;
use crate::http::response::{harden, is_html};
use crate::observability::metrics::{self, Outcome};
use crate::rewrite::Nonce;

/// Grace period for in-flight TLS connections on shutdown.
const TLS_DRAIN_SECS: u64 = 10;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub profile: Arc<ArcSwap<EdgeProfile>>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server for the edge rewriter.
pub struct HttpServer {
    router: Router,
    config: EdgeConfig,
    profile: Arc<ArcSwap<EdgeProfile>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: EdgeConfig) -> Result<Self, ConfigError> {
        let profile = Arc::new(ArcSwap::from_pointee(EdgeProfile::from_config(&config)?));

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.timeouts.idle_secs))
            .build(connector);

        let state = AppState {
            profile: profile.clone(),
            client,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            profile,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Request bodies are unlimited unless `security.max_body_size` is set.
    /// An origin slower than `timeouts.request_secs` yields 504.
    fn build_router(config: &EdgeConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        let router = match config.security.max_body_size {
            Some(limit) => router.layer(RequestBodyLimitLayer::new(limit)),
            None => router,
        };

        router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<EdgeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            origin = %self.profile.load().origin,
            "HTTP server starting"
        );

        tokio::spawn(apply_config_updates(self.profile.clone(), config_updates));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Like [`HttpServer::run`], terminating TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<EdgeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            origin = %self.profile.load().origin,
            "HTTPS server starting"
        );

        tokio::spawn(apply_config_updates(self.profile.clone(), config_updates));

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Get a reference to the startup config.
    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }
}

/// Swap each reloaded config into the live profile until the sender is gone.
async fn apply_config_updates(
    profile: Arc<ArcSwap<EdgeProfile>>,
    mut updates: mpsc::UnboundedReceiver<EdgeConfig>,
) {
    while let Some(config) = updates.recv().await {
        match EdgeProfile::from_config(&config) {
            Ok(next) => {
                tracing::info!(origin = %next.origin, "Configuration reloaded");
                profile.store(Arc::new(next));
                metrics::record_reload();
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected configuration update");
            }
        }
    }
}

/// Main proxy handler.
/// Forwards to the pinned origin and hardens HTML responses.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let profile = state.profile.load_full();

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().clone();
    let method_str = method.to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        origin = %profile.origin,
        "Forwarding request"
    );

    let response = match forward(&state.client, request, &profile).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(&method_str, 502, Outcome::UpstreamError, start_time);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    let status = response.status().as_u16();
    if !is_html(response.headers()) {
        metrics::record_request(&method_str, status, Outcome::Passthrough, start_time);
        return response;
    }

    match harden(response, &method, &profile, Nonce::generate()).await {
        Ok(response) => {
            tracing::debug!(request_id = %request_id, status, "HTML response hardened");
            metrics::record_request(&method_str, status, Outcome::Rewritten, start_time);
            response
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build security headers");
            metrics::record_request(&method_str, 500, Outcome::Internal, start_time);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn forward(
    client: &Client<HttpConnector, Body>,
    request: Request<Body>,
    profile: &EdgeProfile,
) -> Result<Response<Body>, ForwardError> {
    let request = build_forward_request(request, profile.origin, profile.force_identity_encoding)?;
    let response = client.request(request).await?;
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
