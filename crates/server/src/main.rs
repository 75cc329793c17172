//! Narrator Server Entry Point

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use narrator_config::{load_settings, Settings};
use narrator_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first (need observability settings for tracing init)
    let env = std::env::var("NARRATOR_ENV").ok();
    let config = load_settings(env.as_deref())?;

    init_tracing(&config);

    tracing::info!("Starting Narrator Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        env = env.as_deref().unwrap_or("default"),
        provider = ?config.synthesis.provider.kind,
        store = ?config.persistence.backend,
        "Loaded configuration"
    );

    if config.observability.metrics_enabled {
        init_metrics()?;
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let store = narrator_persistence::init(&config.persistence).await?;
    tracing::info!(backend = store.backend(), "Content store ready");

    let state = AppState::from_settings(config.clone(), store)?;
    tracing::info!(
        max_requests = config.synthesis.rate_limit.max_requests_per_window,
        window_ms = config.synthesis.rate_limit.window_ms,
        min_delay_ms = config.synthesis.rate_limit.min_request_delay_ms,
        "Initialized application state"
    );

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing with optional OpenTelemetry integration
///
/// When `observability.otlp_endpoint` is configured, traces are exported to
/// the specified OTLP collector.
fn init_tracing(config: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("narrator={0},narrator_server={0},narrator_pipeline={0},narrator_persistence={0},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        if config.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(otlp_endpoint),
                )
                .with_trace_config(
                    opentelemetry_sdk::trace::Config::default().with_resource(
                        opentelemetry_sdk::Resource::new(vec![
                            opentelemetry::KeyValue::new("service.name", "narrator"),
                            opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                        ]),
                    ),
                )
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

                    subscriber.with(fmt_layer).with(otel_layer).init();

                    tracing::info!(
                        endpoint = %otlp_endpoint,
                        "OpenTelemetry tracing enabled, exporting to OTLP endpoint"
                    );
                    return;
                }
                Err(e) => {
                    eprintln!(
                        "Failed to initialize OpenTelemetry: {}. Falling back to console logging.",
                        e
                    );
                }
            }
        }
    }

    // Fallback: console logging only
    subscriber.with(fmt_layer).init();
}
