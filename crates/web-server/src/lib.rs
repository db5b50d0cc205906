use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use configuration::Settings;
use database::DbRepository;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub db_repo: DbRepository,
}

/// Builds the CORS policy from the configured origins.
///
/// Methods and headers are mirrored from the request and credentials are
/// allowed. An empty list echoes back whatever origin the caller sent; an
/// explicit list only admits those origins.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "Ignoring CORS origin that is not a valid header value.");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Assembles every route, with `/api/v1` holding the programs, clients and
/// enrollments endpoints.
///
/// Collection endpoints answer both with and without the trailing slash.
pub fn build_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    let programs = post(handlers::create_program).get(handlers::list_programs);
    let clients = post(handlers::create_client).get(handlers::list_clients);
    let search = post(handlers::search_clients);
    let enrollments = post(handlers::create_enrollment).delete(handlers::delete_enrollment);

    let api = Router::new()
        .route("/programs/", programs.clone())
        .route("/programs", programs)
        .route(
            "/programs/:program_id",
            put(handlers::update_program).delete(handlers::delete_program),
        )
        .route("/clients/", clients.clone())
        .route("/clients", clients)
        .route(
            "/clients/:client_id",
            get(handlers::get_client)
                .put(handlers::update_client)
                .delete(handlers::delete_client),
        )
        .route("/clients/search/", search.clone())
        .route("/clients/search", search)
        .route("/enrollments/", enrollments.clone())
        .route("/enrollments", enrollments);

    Router::new()
        .route("/", get(handlers::root))
        .route("/hello/:name", get(handlers::say_hello))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        // This middleware will automatically log information about every incoming request.
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}

/// The main function to configure and run the web server.
///
/// Connects to the database, applies migrations, serves until Ctrl-C, then
/// closes the connection pool.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    // Tracing is initialized by the binary before this is called.
    let addr = settings.server.socket_addr()?;

    let db_pool = database::connect(&settings.database.url, settings.database.max_connections).await?;
    database::run_migrations(&db_pool).await?;
    let db_repo = DbRepository::new(db_pool);

    let app_state = Arc::new(AppState {
        db_repo: db_repo.clone(),
    });
    let app = build_router(app_state, &settings.server.allowed_origins());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_repo.close().await;
    tracing::info!("Web server stopped, database pool closed.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for the shutdown signal.");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received.");
}
