//! Main Entrypoint for the PoseCoach API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the pose routine configuration.
//! 3. Connecting to the pose-classification model endpoint.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use posecoach_api::{config::Config, router::create_router, state::AppState};
use posecoach_core::{
    classifier::{HttpPoseClassifier, PoseClassifier},
    routine::Routine,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load the Pose Routine ---
    let routine = Routine::from_file(&config.routine_path)
        .context("Failed to load the pose routine")?;
    anyhow::ensure!(
        !routine.is_empty(),
        "Routine file '{}' lists no poses",
        config.routine_path.display()
    );
    info!(
        poses = routine.len(),
        path = %config.routine_path.display(),
        "Pose routine loaded."
    );

    // --- 4. Connect to the Classification Model ---
    // A failed connect aborts startup: a session must never begin against a
    // model that did not load.
    let classifier = HttpPoseClassifier::connect(&config.classifier_url)
        .await
        .context("Failed to load the pose model")?;
    info!(
        classes = classifier.labels().len(),
        url = %config.classifier_url,
        "Pose model loaded."
    );

    let app_state = Arc::new(AppState {
        classifier: Arc::new(classifier),
        routine,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
