//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID)
//! - Translate ingress requests and hand them to the request handler
//! - Translate CoAP responses back to HTTP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::forward::GatewayError;
use crate::http::request::{request_id_header, request_id_of, MakeRequestUuid};
use crate::http::response::{error_response, info_response};
use crate::mapping::MappingTable;
use crate::observability::metrics;
use crate::resolver::RequestHandler;
use crate::translate::{coap_to_http_response, http_to_coap_request};

pub const PROXY_PREFIX: &str = "/proxy/";
pub const LOCAL_PREFIX: &str = "/local/";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn RequestHandler>,
    pub table: Arc<MappingTable>,
    pub max_body: usize,
}

/// HTTP ingress of the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(
        config: &GatewayConfig,
        table: Arc<MappingTable>,
        handler: Arc<dyn RequestHandler>,
    ) -> Self {
        let state = AppState {
            handler,
            table,
            max_body: config.http.max_body_bytes,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/proxy", any(proxy_handler))
            .route("/proxy/", any(proxy_handler))
            .route("/proxy/{*target}", any(proxy_handler))
            .route("/local", any(local_handler))
            .route("/local/", any(local_handler))
            .route("/local/{*path}", any(local_handler))
            .fallback(|| async { info_response() })
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id_header()))
                    .layer(RequestBodyLimitLayer::new(config.http.max_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_millis(
                        config.http.request_timeout_ms,
                    ))),
            )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    forward(state, peer, request, PROXY_PREFIX, true, "proxy").await
}

async fn local_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    forward(state, peer, request, LOCAL_PREFIX, false, "local").await
}

/// Translate, hand off, await and translate back.
async fn forward(
    state: AppState,
    peer: SocketAddr,
    request: Request<Body>,
    prefix: &str,
    proxying: bool,
    route: &'static str,
) -> Response<Body> {
    let started = Instant::now();
    let request_id = request_id_of(request.headers());
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            metrics::record_http_request(route, StatusCode::PAYLOAD_TOO_LARGE.as_u16());
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
    };

    let coap_request = match http_to_coap_request(&state.table, &parts, body, prefix, proxying) {
        Ok(r) => r,
        Err(e) => {
            let err = GatewayError::from(e);
            let status = err.http_status();
            tracing::warn!(
                request_id = %request_id,
                peer = %peer,
                method = %parts.method,
                uri = %parts.uri,
                error = %err,
                "Rejecting ingress request"
            );
            metrics::record_http_request(route, status.as_u16());
            return error_response(status, err);
        }
    };

    tracing::debug!(request_id = %request_id, peer = %peer, request = %coap_request, "Dispatching ingress request");

    let coap_response = state.handler.handle_request(coap_request).await;
    let response = coap_to_http_response(&state.table, &coap_response);

    tracing::info!(
        request_id = %request_id,
        method = %parts.method,
        uri = %parts.uri,
        coap_code = %coap_response.code,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Ingress request completed"
    );
    metrics::record_http_request(route, response.status().as_u16());
    response
}
