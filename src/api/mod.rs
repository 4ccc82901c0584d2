use crate::{
    cli::telemetry,
    session::{PgIdentityLookup, PgRefreshTokenStore, SessionService, TokenCodec},
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Server settings gathered by the CLI.
#[derive(Debug)]
pub struct ServerConfig {
    port: u16,
    dsn: String,
    codec: TokenCodec,
    storage_timeout: Option<Duration>,
}

impl ServerConfig {
    #[must_use]
    pub fn new(port: u16, dsn: String, codec: TokenCodec) -> Self {
        Self {
            port,
            dsn,
            codec,
            storage_timeout: None,
        }
    }

    #[must_use]
    pub fn with_storage_timeout(mut self, storage_timeout: Option<Duration>) -> Self {
        self.storage_timeout = storage_timeout;
        self
    }
}

/// Serve the documented routes with request-id, tracing and CORS layers.
///
/// Handlers get the session service through an `Extension`; the database pool,
/// used only by the health check, is layered on by the caller.
#[must_use]
pub fn app(service: Arc<SessionService>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let (router, _openapi) = router().split_for_parts();
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(service)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(config: ServerConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&config.dsn)
        .await
        .context("Failed to connect to database")?;

    let mut service = SessionService::new(
        config.codec,
        Arc::new(PgRefreshTokenStore::new(pool.clone())),
        Arc::new(PgIdentityLookup::new(pool.clone())),
    );
    if let Some(timeout) = config.storage_timeout {
        service = service.with_storage_timeout(timeout);
    }

    let app = app(Arc::new(service)).layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{}", config.port)).await?;

    info!("Listening on [::]:{}", config.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    telemetry::shutdown_tracer();

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
