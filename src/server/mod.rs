//! HTTP interface of the explorer word count endpoints

mod auth;
mod handlers;

use crate::{
    cache::Cache, config::Config, embeddings::EmbeddingsClient, samples::SampleSearches,
    search::SearchClient, wordcount::WordCounter, Result,
};
use anyhow::Context;
use axum::{
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method},
    middleware,
    routing::get,
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;

/// Everything that request handlers need
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,

    /// Pre-defined sample searches
    pub samples: SampleSearches,

    /// Word counting service
    pub counter: WordCounter,
}
//
impl AppState {
    /// Set up upstream clients and the result cache
    pub fn new(config: Arc<Config>, samples: SampleSearches) -> Result<Self> {
        let search = SearchClient::new(config.search.clone())?;
        let embeddings = EmbeddingsClient::new(config.embeddings.clone())?;
        let cache = Cache::in_memory(config.cache);
        Ok(Self {
            counter: WordCounter::new(search, embeddings, cache),
            config,
            samples,
        })
    }
}

/// Set up request routing
pub fn router(state: AppState) -> Router {
    let members_only = Router::new()
        .route("/api/explorer/words/count", get(handlers::word_count))
        .route(
            "/api/explorer/words/compare/count",
            get(handlers::compare_word_counts),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));
    let public = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/explorer/demo/words/count", get(handlers::word_count))
        .route(
            "/api/explorer/demo/words/compare/count",
            get(handlers::demo_compare_word_counts),
        )
        .route(
            "/api/explorer/words/wordcount.csv/:search_id_or_query/:index",
            get(handlers::word_count_csv),
        );
    members_only.merge(public).with_state(state)
}

/// Serve requests until asked to shut down
pub async fn run(config: Arc<Config>, samples: SampleSearches) -> Result<()> {
    let address = config.listen;
    let state = AppState::new(config, samples)?;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));
    let app = router(state).layer(cors);

    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding to {address}"))?;
    log::info!("Serving explorer word counts on http://{address}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP requests")?;
    log::info!("Server shut down");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                log::error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to listen for terminate signals: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
