use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use verify_service::{
    api,
    config::{FaceBackend, IdentityStoreType, VerifyServiceConfig},
    face::{
        detector::OnnxFaceDetector,
        embedder::OnnxEmbeddingExtractor,
        mock::{CenterFaceDetector, LuminanceEmbeddingExtractor},
        session::SessionOptions,
        EmbeddingExtractor, FaceDetector,
    },
    store::{IdentityStore, MemoryIdentityStore, PgIdentityStore},
    VerifyError, VerifyServiceState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("verify-service");

    info!("Starting Verify Service...");

    let config = VerifyServiceConfig::from_env()?;
    info!(
        "Verify Service configuration: bind={}, store={:?}, backend={:?}, threshold={}",
        config.bind_addr, config.store_type, config.backend, config.threshold
    );

    let (detector, extractor) = build_face_backend(&config)?;

    let store = build_store(&config).await?;
    let state = match store {
        Some(store) => {
            info!("Identity store ready: {}", store.kind());
            VerifyServiceState::with_store(&config, detector, extractor, store)
        }
        None => {
            warn!("Running in stateless mode: every live frame with a face is accepted");
            VerifyServiceState::new(&config, detector, extractor)
        }
    };

    state.warm_up().await;

    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Verify Service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Verify Service stopped");
    Ok(())
}

fn build_face_backend(
    config: &VerifyServiceConfig,
) -> Result<(Arc<dyn FaceDetector>, Arc<dyn EmbeddingExtractor>)> {
    match config.backend {
        FaceBackend::Onnx => {
            let options = SessionOptions {
                execution_provider: config.execution_provider.clone(),
                intra_threads: config.intra_threads,
                ..SessionOptions::default()
            };

            let detector =
                OnnxFaceDetector::load(config.detector.clone(), &options).map_err(|e| {
                    error!("{}: {:#}", VerifyError::CascadeLoadFailure, e);
                    VerifyError::CascadeLoadFailure
                })?;
            info!(
                "Face detector loaded from {} ({})",
                config.detector.model_path,
                detector.execution_provider()
            );

            let extractor = OnnxEmbeddingExtractor::load(config.embedding.clone(), &options)
                .with_context(|| {
                    format!(
                        "Failed to load embedding model {}",
                        config.embedding.model_name
                    )
                })?;
            info!(
                "Embedding model {} loaded from {}",
                config.embedding.model_name, config.embedding.model_path
            );

            Ok((Arc::new(detector), Arc::new(extractor)))
        }
        FaceBackend::Mock => {
            warn!("Using the mock face backend; verification results carry no identity meaning");
            Ok((
                Arc::new(CenterFaceDetector::new(config.detector.min_size)),
                Arc::new(LuminanceEmbeddingExtractor::new(config.embedding.dimension)),
            ))
        }
    }
}

/// Store for the configured backend. The PostgreSQL pool connects on demand:
/// while the database is unreachable requests degrade to stateless answers and
/// they go back to real comparisons once it returns.
async fn build_store(config: &VerifyServiceConfig) -> Result<Option<Arc<dyn IdentityStore>>> {
    match config.store_type {
        IdentityStoreType::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DB_URI required for the postgres identity store")?;
            info!("Connecting to PostgreSQL identity store");
            let store = PgIdentityStore::connect_lazy(url)?;
            if let Err(e) = store.ensure_schema().await {
                warn!(
                    "Database not ready, answering in stateless mode until it is reachable: {}",
                    e
                );
            }
            Ok(Some(Arc::new(store)))
        }
        IdentityStoreType::Memory => Ok(Some(Arc::new(MemoryIdentityStore::new()))),
        IdentityStoreType::None => Ok(None),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
