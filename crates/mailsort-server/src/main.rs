//! Mailsort
//!
//! Classifies inbound email into support, sales, partnership or spam with a
//! quantized transformer, serving predictions over HTTP.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use mailsort_classifiers::{predict, EmailClassifier, KeywordLabeler, Predictor};
use mailsort_server::cli::{run_label, Cli, Commands, ServeArgs};
use mailsort_server::{create_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match cli.command.unwrap_or(Commands::Serve(cli.serve)) {
        Commands::Serve(args) => serve(args).await,

        Commands::Predict { text, threshold } => {
            let result = tokio::task::spawn_blocking(move || predict(&text, threshold)).await??;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }

        Commands::Label => {
            let labeler = KeywordLabeler::new()?;
            let stats = run_label(&labeler, std::io::stdin().lock(), std::io::stdout().lock())?;
            info!(
                read = stats.read,
                labelled = stats.labelled,
                "Weak labelling complete"
            );
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Starting mailsort server");

    let config = ServerConfig::load(&args)?;
    info!(
        threshold = config.confidence_threshold,
        max_email_bytes = config.max_email_bytes,
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;

    let predictor = config.predictor();
    info!(
        model = %predictor.loader().paths().model_path.display(),
        tokenizer = %predictor.loader().paths().tokenizer_dir.display(),
        "Using classifier artifacts"
    );

    if config.preload {
        preload(&predictor).await;
    }

    let classifier = Arc::new(EmailClassifier::new(predictor));
    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let state = AppState::new(classifier, config).with_metrics(metrics_handle);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Load artifacts up front; a failure is logged and retried on first request
async fn preload(predictor: &Predictor) {
    let predictor = predictor.clone();
    match tokio::task::spawn_blocking(move || predictor.loader().get().map(|_| ())).await {
        Ok(Ok(())) => info!("Classifier artifacts preloaded"),
        Ok(Err(e)) => warn!(error = %e, "Preload failed, will retry on first request"),
        Err(e) => error!(error = %e, "Preload task panicked"),
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
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

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new(
            "mailsort=debug,mailsort_server=debug,mailsort_classifiers=debug,tower_http=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("mailsort=info,mailsort_server=info,mailsort_classifiers=info")
        })
    };

    // Logs go to stderr so `predict` and `label` output stays machine-readable.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "mailsort_requests_total",
        "Total number of prediction requests received"
    );
    metrics::describe_counter!(
        "mailsort_predictions_total",
        "Total number of predictions served by category"
    );
    metrics::describe_histogram!(
        "mailsort_inference_latency_us",
        metrics::Unit::Microseconds,
        "Classifier latency in microseconds"
    );
    metrics::describe_counter!("mailsort_errors_total", "Total number of errors by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}
