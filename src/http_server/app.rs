use std::sync::Arc;

#[cfg(not(debug_assertions))]
use axum::http::{HeaderValue, Method, header};
use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use color_eyre::eyre::{Context, eyre};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
#[cfg(not(debug_assertions))]
use tower_http::cors::AllowOrigin;
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    database::Database,
    http_server::{graphql, http_routes::playlist_generate, state::AppState},
    services::{
        generator::{GeneratorSettings, PlaylistGenerator, client::GroqHttpAdapter},
        playlist::PlaylistService,
        session::client::AuthHttpAdapter,
        user::{ProfileRetry, UserService},
    },
};

async fn root(State(app_state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match app_state.db.conn.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            log::error!("Health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable")
        }
    }
}

pub fn build_state(database: Arc<Database>, config: Config) -> color_eyre::Result<Arc<AppState>> {
    let auth = AuthHttpAdapter::new(config.auth_endpoint()?);
    let completion =
        GroqHttpAdapter::new(&config.completion.base_url, config.completion_api_key()?)?;

    let playlists = Arc::new(PlaylistService::new(database.clone()));
    let users = Arc::new(UserService::with_retry(
        database.clone(),
        ProfileRetry::from(&config.profile_sync),
    ));
    let generator = PlaylistGenerator::new(
        completion,
        playlists.clone(),
        users.clone(),
        GeneratorSettings::from(&config.completion),
    );

    Ok(Arc::new(AppState {
        db: database,
        allowed_origin: config.redirect_origin(),
        auth,
        playlists,
        users,
        generator,
    }))
}

pub fn router(app_state: Arc<AppState>) -> color_eyre::Result<Router> {
    let schema = graphql::create_schema(app_state.clone());

    #[cfg(debug_assertions)]
    let cors_layer = {
        log::debug!(
            "CORS is permissive in debug builds, release builds allow only {}",
            app_state.allowed_origin
        );
        CorsLayer::permissive()
    };

    #[cfg(not(debug_assertions))]
    let cors_layer = {
        let origin = &app_state.allowed_origin;
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(
                HeaderValue::from_str(origin)
                    .wrap_err_with(|| format!("Invalid CORS origin: {origin}"))?,
            ))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
    };

    Ok(Router::new()
        .route("/", get(root))
        .route(
            "/graphql",
            get(graphql::graphiql).post(graphql::graphql_handler),
        )
        .route(
            "/api/playlist/generate",
            post(playlist_generate::generate_suggestions),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer)
                .layer(Extension(schema)),
        )
        .with_state(app_state))
}

pub async fn start(port: u16, database: Arc<Database>, config: Config) -> color_eyre::Result<()> {
    let app_state = build_state(database, config)?;
    let app = router(app_state)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .wrap_err_with(|| eyre!("Failed to bind to port {}", port))?;
    log::info!("Listening on http://0.0.0.0:{port}");
    axum::serve(listener, app)
        .await
        .wrap_err("Failed to start HTTP server")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_app_state;

    #[tokio::test]
    async fn test_allowed_origin_comes_from_redirect_url() {
        let state = test_app_state().await;

        assert_eq!(state.allowed_origin, "http://localhost:5173");
    }

    #[tokio::test]
    async fn test_router_builds() {
        assert!(router(test_app_state().await).is_ok());
    }
}
