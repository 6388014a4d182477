//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router that sends every path to the dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Bind server to listener
//! - Convert between HTTP and relay request/response values

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::HeaderName,
    response::IntoResponse,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{HttpConfig, TimeoutConfig};
use crate::http::request::{BodyError, Request, X_REQUEST_ID};
use crate::http::response::Response;
use crate::observability::metrics;
use crate::resilience::dispatch_with_deadline;
use crate::routing::Dispatcher;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
}

/// HTTP front end for the dispatcher.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(
        config: &HttpConfig,
        timeouts: &TimeoutConfig,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let state = AppState {
            dispatcher,
            max_body_bytes: config.max_body_bytes,
            request_timeout: Duration::from_secs(timeouts.request_secs),
        };

        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The body limit is enforced while buffering in the handler, so every
    /// oversized request gets the same JSON 413.
    fn build_router(state: AppState) -> Router {
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .fallback(dispatch_handler)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(x_request_id)),
            )
            .with_state(state)
    }

    /// The configured Axum router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server shutting down");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: every method and path goes to the dispatcher.
async fn dispatch_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> impl IntoResponse {
    let start = Instant::now();

    let request = match Request::from_http(request, state.max_body_bytes).await {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            let response = match e {
                BodyError::TooLarge { .. } => Response::payload_too_large(),
                BodyError::Read(_) => Response::bad_request(),
            };
            metrics::record_dispatch(metrics::TRANSPORT_HTTP, response.status, start);
            return response;
        }
    };

    tracing::debug!(
        request_id = request.request_id().unwrap_or("unknown"),
        method = %request.method,
        path = %request.path,
        "Dispatching HTTP request"
    );

    let response = dispatch_with_deadline(state.dispatcher, request, state.request_timeout).await;
    metrics::record_dispatch(metrics::TRANSPORT_HTTP, response.status, start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut builder = Dispatcher::builder();
        builder
            .register("/", || Ok::<_, &'static str>(Response::ok([("message", "hello")])))
            .unwrap();
        builder
            .register("/boom", || Err::<Response, _>("stack trace here"))
            .unwrap();

        let config = HttpConfig {
            max_body_bytes: 32,
            ..HttpConfig::default()
        };
        HttpServer::new(&config, &TimeoutConfig::default(), Arc::new(builder.build()))
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn root_returns_json() {
        let response = server()
            .router()
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(body_bytes(response).await, br#"{"message":"hello"}"#);
    }

    #[tokio::test]
    async fn unknown_path_is_empty_404() {
        let response = server()
            .router()
            .oneshot(HttpRequest::get("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_opaque() {
        let response = server()
            .router()
            .oneshot(HttpRequest::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(!body.contains("stack trace"));
    }

    #[tokio::test]
    async fn client_request_id_is_propagated() {
        let response = server()
            .router()
            .oneshot(
                HttpRequest::get("/")
                    .header(X_REQUEST_ID, "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], "req-123");
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let response = server()
            .router()
            .oneshot(
                HttpRequest::post("/")
                    .header(header::CONTENT_LENGTH, "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_bytes(response).await, br#"{"error":"Payload Too Large"}"#);
    }

    #[tokio::test]
    async fn oversized_chunked_body_gets_same_413() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(vec![b'x'; 20]), Ok(vec![b'y'; 20])];
        let response = server()
            .router()
            .oneshot(
                HttpRequest::post("/")
                    .body(Body::from_stream(futures_util::stream::iter(chunks)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_bytes(response).await, br#"{"error":"Payload Too Large"}"#);
    }

    #[tokio::test]
    async fn broken_body_is_bad_request() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"par".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let response = server()
            .router()
            .oneshot(
                HttpRequest::post("/")
                    .body(Body::from_stream(futures_util::stream::iter(chunks)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_bytes(response).await, br#"{"error":"Bad Request"}"#);
    }
}
