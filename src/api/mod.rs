//! HTTP surface: router, middleware, and server lifecycle.

use crate::api::handlers::{health, reset, root};
use crate::cli::globals::GlobalArgs;
use crate::credentials::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use crate::otp::memory::MemoryOtpStore;
use crate::otp::postgres::PgOtpStore;
use crate::otp::service::{ResetConfig, ResetService};
use crate::otp::store::{spawn_purge_worker, OtpStore};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod handlers;

use self::email::{CodeSender, HttpCodeSender, LogCodeSender, SmtpCodeSender};

// Reclamation cadence; correctness never depends on it since validate checks
// expiry inline.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// What the health endpoint probes: the pool when codes live in Postgres,
/// nothing when they live in memory.
#[derive(Clone)]
pub struct StoreStatus {
    pool: Option<PgPool>,
}

impl StoreStatus {
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self { pool: None }
    }

    pub(crate) fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::reset::request_code::request_code,
        handlers::reset::verify_code::verify_code,
        handlers::reset::complete_reset::complete_reset,
    ),
    components(schemas(
        handlers::health::Health,
        reset::RequestCodeRequest,
        reset::VerifyCodeRequest,
        reset::CompleteResetRequest,
        reset::MessageResponse,
    )),
    tags(
        (name = "reset", description = "Password reset flow"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// Build the application router around a reset service.
#[must_use]
pub fn router(service: Arc<ResetService>, status: StoreStatus, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health))
        .route("/v1/reset/request", post(reset::request_code))
        .route("/v1/reset/verify", post(reset::verify_code))
        .route("/v1/reset/complete", post(reset::complete_reset))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
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
                .layer(Extension(service))
                .layer(Extension(status)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn serve(port: u16, dsn: Option<String>, globals: &GlobalArgs) -> Result<()> {
    let store: Arc<dyn OtpStore>;
    let credentials: Arc<dyn CredentialStore>;
    let status: StoreStatus;

    match dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(&dsn)
                .await
                .context("Failed to connect to database")?;

            sqlx::migrate!()
                .run(&pool)
                .await
                .context("Failed to run migrations")?;

            store = Arc::new(PgOtpStore::new(pool.clone()));
            credentials = Arc::new(PgCredentialStore::new(pool.clone()));
            status = StoreStatus::postgres(pool);
        }
        None => {
            warn!("no --dsn given; codes and credentials are kept in memory");
            store = Arc::new(MemoryOtpStore::new());
            credentials = Arc::new(MemoryCredentialStore::new());
            status = StoreStatus::in_memory();
        }
    }

    let sender = build_sender(globals)?;
    let service = Arc::new(ResetService::new(
        store.clone(),
        sender,
        credentials,
        ResetConfig::new(),
    ));

    spawn_purge_worker(store, PURGE_INTERVAL);

    let cors = cors_layer(globals.frontend_url.as_deref())?;
    let app = router(service, status, cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
    }

    info!("Gracefully shutdown");
}

fn build_sender(globals: &GlobalArgs) -> Result<Arc<dyn CodeSender>> {
    if let Some(smtp) = &globals.smtp {
        info!(host = %smtp.host, "delivering reset codes over smtp");
        let sender = SmtpCodeSender::new(
            &smtp.host,
            smtp.username.clone(),
            &smtp.password,
            smtp.from.clone(),
        )?;
        return Ok(Arc::new(sender));
    }

    if let Some(endpoint) = &globals.mail_api_url {
        info!(endpoint = %endpoint, "delivering reset codes via mail api");
        return Ok(Arc::new(HttpCodeSender::new(endpoint.clone())?));
    }

    warn!("no delivery transport configured; reset codes are logged instead");
    Ok(Arc::new(LogCodeSender))
}

fn cors_layer(frontend_url: Option<&str>) -> Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST]);

    match frontend_url {
        Some(url) => Ok(cors.allow_origin(AllowOrigin::exact(frontend_origin(url)?))),
        None => Ok(cors.allow_origin(AllowOrigin::any())),
    }
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

fn frontend_origin(frontend_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(frontend_url).with_context(|| format!("Invalid frontend URL: {frontend_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend URL must include a valid host: {frontend_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
